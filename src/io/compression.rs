// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Chunk decompression registry.
//!
//! Chunks name their codec in the `compression` header field. `"none"` is
//! handled by the chunk store directly; every other name must resolve through
//! a [`DecompressorRegistry`] or the chunk fails with
//! [`BagError::UnsupportedCompression`].

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::{BagError, Result};

/// Codec name for uncompressed chunks.
pub const COMPRESSION_NONE: &str = "none";
/// Codec name for bzip2 chunks.
pub const COMPRESSION_BZ2: &str = "bz2";
/// Codec name for LZ4 frame chunks.
pub const COMPRESSION_LZ4: &str = "lz4";

/// Decompresses one chunk.
///
/// `size` is the decompressed size declared by the chunk record.
pub trait Decompress: Send + Sync {
    /// Decompress `input` into a buffer of (nominally) `size` bytes.
    fn decompress(&self, input: &[u8], size: usize) -> Result<Vec<u8>>;
}

impl<F> Decompress for F
where
    F: Fn(&[u8], usize) -> Result<Vec<u8>> + Send + Sync,
{
    fn decompress(&self, input: &[u8], size: usize) -> Result<Vec<u8>> {
        self(input, size)
    }
}

/// Mapping from codec name to decompressor.
#[derive(Clone, Default)]
pub struct DecompressorRegistry {
    codecs: HashMap<String, Arc<dyn Decompress>>,
}

impl fmt::Debug for DecompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("DecompressorRegistry")
            .field("codecs", &names)
            .finish()
    }
}

impl DecompressorRegistry {
    /// Create an empty registry; only uncompressed chunks can be read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `bz2` and `lz4` codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(COMPRESSION_BZ2, decompress_bz2);
        registry.register(COMPRESSION_LZ4, decompress_lz4);
        registry
    }

    /// Register (or replace) the decompressor for a codec name.
    pub fn register(&mut self, name: impl Into<String>, codec: impl Decompress + 'static) {
        self.codecs.insert(name.into(), Arc::new(codec));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, codec: impl Decompress + 'static) -> Self {
        self.register(name, codec);
        self
    }

    /// Look up a codec by name.
    pub fn get(&self, name: &str) -> Option<&dyn Decompress> {
        self.codecs.get(name).map(|codec| codec.as_ref())
    }

    /// Check if a codec is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Decompress with the named codec.
    pub fn decompress(&self, name: &str, input: &[u8], size: usize) -> Result<Vec<u8>> {
        let codec = self
            .get(name)
            .ok_or_else(|| BagError::unsupported_compression(name))?;
        codec.decompress(input, size)
    }
}

/// bzip2 decompression.
pub fn decompress_bz2(input: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut decoder = bzip2::read::BzDecoder::new(input);
    let mut decompressed = Vec::with_capacity(size);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| BagError::decompression(COMPRESSION_BZ2, e.to_string()))?;
    Ok(decompressed)
}

/// LZ4 frame decompression, as written by roslz4.
pub fn decompress_lz4(input: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(input);
    let mut decompressed = Vec::with_capacity(size);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| BagError::decompression(COMPRESSION_LZ4, e.to_string()))?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_empty_registry_rejects_codecs() {
        let registry = DecompressorRegistry::new();
        let err = registry.decompress("bz2", b"", 0).unwrap_err();
        assert!(matches!(err, BagError::UnsupportedCompression { codec } if codec == "bz2"));
    }

    #[test]
    fn test_default_codecs() {
        let registry = DecompressorRegistry::with_defaults();
        assert!(registry.contains(COMPRESSION_BZ2));
        assert!(registry.contains(COMPRESSION_LZ4));
        assert!(!registry.contains("zstd"));
    }

    #[test]
    fn test_bz2_round_trip() {
        let payload = b"chunk bytes chunk bytes chunk bytes".to_vec();
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let registry = DecompressorRegistry::with_defaults();
        let out = registry
            .decompress(COMPRESSION_BZ2, &compressed, payload.len())
            .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_lz4_frame_round_trip() {
        let payload = vec![7u8; 4096];
        let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decompress_lz4(&compressed, payload.len()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_corrupt_bz2_is_decompression_error() {
        let err = decompress_bz2(b"not bzip2", 10).unwrap_err();
        assert!(matches!(err, BagError::Decompression { .. }));
    }

    #[test]
    fn test_closure_codec_receives_declared_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let registry = DecompressorRegistry::new().with(
            "rev",
            move |input: &[u8], size: usize| -> Result<Vec<u8>> {
                seen.fetch_add(1, Ordering::SeqCst);
                assert_eq!(size, input.len());
                Ok(input.iter().rev().copied().collect())
            },
        );

        assert_eq!(registry.decompress("rev", b"abc", 3).unwrap(), b"cba");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
