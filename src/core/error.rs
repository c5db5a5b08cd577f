// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Error types for bag reading.
//!
//! Every failure surfaces synchronously to the caller of the operation that
//! triggered it:
//! - Container format violations (magic, truncated records, missing fields)
//! - Short reads from the byte source
//! - Chunks compressed with a codec that has no registered decompressor
//! - Messages that reference a connection missing from the connection table

use thiserror::Error;

/// Boxed error produced by an external payload decoder.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while opening or iterating a bag.
#[derive(Debug, Error)]
pub enum BagError {
    /// Malformed container: bad magic, truncated record, missing field, wrong opcode.
    #[error("Format error in {context}: {message}")]
    Format {
        /// What was being parsed
        context: String,
        /// Error message
        message: String,
    },

    /// The byte source returned fewer bytes than requested.
    #[error("Short read: requested {requested} bytes at offset {offset}, but only {available} bytes available")]
    ShortRead {
        /// Absolute offset of the read
        offset: u64,
        /// Requested bytes
        requested: usize,
        /// Bytes the source could provide
        available: usize,
    },

    /// No decompressor is registered for a chunk's compression codec.
    #[error("Unsupported compression: '{codec}'")]
    UnsupportedCompression {
        /// Codec name from the chunk record
        codec: String,
    },

    /// A message references a connection id absent from the connection table.
    #[error("Unknown connection id {conn}")]
    UnknownConnection {
        /// Connection id found in the message record
        conn: u32,
    },

    /// A registered decompressor failed.
    #[error("{codec} decompression failed: {message}")]
    Decompression {
        /// Codec name
        codec: String,
        /// Error message
        message: String,
    },

    /// Error returned unchanged from the external payload decoder.
    #[error("Payload decode error: {0}")]
    Payload(#[source] BoxError),

    /// Invalid reader configuration.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error from a file-backed source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BagError {
    /// Create a format error.
    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        BagError::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a short read error.
    pub fn short_read(offset: u64, requested: usize, available: usize) -> Self {
        BagError::ShortRead {
            offset,
            requested,
            available,
        }
    }

    /// Create an unsupported compression error.
    pub fn unsupported_compression(codec: impl Into<String>) -> Self {
        BagError::UnsupportedCompression {
            codec: codec.into(),
        }
    }

    /// Create an unknown connection error.
    pub fn unknown_connection(conn: u32) -> Self {
        BagError::UnknownConnection { conn }
    }

    /// Create a decompression error.
    pub fn decompression(codec: impl Into<String>, message: impl Into<String>) -> Self {
        BagError::Decompression {
            codec: codec.into(),
            message: message.into(),
        }
    }

    /// Wrap an external decoder error.
    pub fn payload(err: impl Into<BoxError>) -> Self {
        BagError::Payload(err.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        BagError::Config {
            message: message.into(),
        }
    }

    /// Get structured fields for logging.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            BagError::Format { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            BagError::ShortRead {
                offset,
                requested,
                available,
            } => vec![
                ("offset", offset.to_string()),
                ("requested", requested.to_string()),
                ("available", available.to_string()),
            ],
            BagError::UnsupportedCompression { codec } => vec![("codec", codec.clone())],
            BagError::UnknownConnection { conn } => vec![("conn", conn.to_string())],
            BagError::Decompression { codec, message } => {
                vec![("codec", codec.clone()), ("message", message.clone())]
            }
            BagError::Payload(err) => vec![("message", err.to_string())],
            BagError::Config { message } => vec![("message", message.clone())],
            BagError::Io(err) => vec![("message", err.to_string())],
        }
    }
}

/// Result type for bag operations.
pub type Result<T> = std::result::Result<T, BagError>;
