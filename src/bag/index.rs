// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Container index: the open sequence.
//!
//! Opening a bag reads three things and nothing else:
//! 1. the magic line at offset 0
//! 2. the bag header record at offset 13
//! 3. the index section at `index_pos`: `conn_count` connection records
//!    followed by `chunk_count` chunk info records
//!
//! Chunk contents are never touched here.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use super::record::{
    read_record, read_records, BagHeader, ChunkSummary, Connection, HEADER_OFFSET, MAGIC,
};
use crate::io::source::ByteSource;
use crate::{BagConfig, BagError, Result, Time};

/// Connections and chunk summaries discovered at open time.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    /// The bag header record
    pub header: BagHeader,
    /// Connection table keyed by connection id
    pub connections: HashMap<u32, Connection>,
    /// Chunk summaries ordered by chunk position
    pub chunk_summaries: Vec<ChunkSummary>,
}

impl ContainerIndex {
    /// Run the full open sequence against a source.
    pub fn load<S: ByteSource + ?Sized>(source: &S, config: &BagConfig) -> Result<Self> {
        verify_magic(source)?;
        let header = read_header(source, config.header_readahead)?;
        let (connections, chunk_summaries) = read_connections_and_chunk_infos(
            source,
            header.index_pos,
            header.conn_count,
            header.chunk_count,
        )?;

        debug!(
            index_pos = header.index_pos,
            connections = connections.len(),
            chunks = chunk_summaries.len(),
            "Loaded bag index"
        );

        Ok(Self {
            header,
            connections,
            chunk_summaries,
        })
    }

    /// Earliest chunk start time, if there are chunks.
    pub fn start_time(&self) -> Option<Time> {
        self.chunk_summaries.iter().map(|c| c.start_time).min()
    }

    /// Latest chunk end time, if there are chunks.
    pub fn end_time(&self) -> Option<Time> {
        self.chunk_summaries.iter().map(|c| c.end_time).max()
    }
}

/// Check the 13-byte magic line at offset 0.
pub fn verify_magic<S: ByteSource + ?Sized>(source: &S) -> Result<()> {
    if source.size() < MAGIC.len() as u64 {
        return Err(BagError::format(
            "verify_magic",
            format!("file of {} bytes is too small for a bag", source.size()),
        ));
    }
    let magic = source.read(0, MAGIC.len())?;
    if magic.as_ref() != MAGIC {
        return Err(BagError::format(
            "verify_magic",
            format!(
                "invalid magic {:?}, expected {:?}",
                String::from_utf8_lossy(&magic),
                String::from_utf8_lossy(MAGIC)
            ),
        ));
    }
    Ok(())
}

/// Parse the bag header record at offset 13.
///
/// `readahead` bytes are read first; if the record declares more than that,
/// the exact record length is read again.
pub fn read_header<S: ByteSource + ?Sized>(source: &S, readahead: usize) -> Result<BagHeader> {
    const CONTEXT: &str = "read_header";

    let available = source.size().saturating_sub(HEADER_OFFSET) as usize;
    let first_len = readahead.min(available);
    if first_len < 4 {
        return Err(BagError::format(
            CONTEXT,
            format!("only {available} bytes after the magic"),
        ));
    }
    let mut buffer = source.read(HEADER_OFFSET, first_len)?;

    let header_len = LittleEndian::read_u32(&buffer[0..4]) as usize;
    let prefix_end = 4 + header_len + 4;
    if prefix_end > available {
        return Err(BagError::format(
            CONTEXT,
            format!("header of {header_len} bytes exceeds {available} available bytes"),
        ));
    }
    if prefix_end > buffer.len() {
        buffer = source.read(HEADER_OFFSET, prefix_end)?;
    }

    let data_len = LittleEndian::read_u32(&buffer[4 + header_len..prefix_end]) as usize;
    let total = prefix_end + data_len;
    if total > available {
        return Err(BagError::format(
            CONTEXT,
            format!("header record of {total} bytes exceeds {available} available bytes"),
        ));
    }
    if total > buffer.len() {
        buffer = source.read(HEADER_OFFSET, total)?;
    }

    Ok(read_record::<BagHeader>(&buffer, HEADER_OFFSET)?.record)
}

/// Read the index section: `conn_count` connections, then `chunk_count` chunk infos.
///
/// The whole section `[offset, size)` is read with one call. Chunk summaries
/// are returned ordered by chunk position.
pub fn read_connections_and_chunk_infos<S: ByteSource + ?Sized>(
    source: &S,
    offset: u64,
    conn_count: u32,
    chunk_count: u32,
) -> Result<(HashMap<u32, Connection>, Vec<ChunkSummary>)> {
    if conn_count == 0 && chunk_count == 0 {
        return Ok((HashMap::new(), Vec::new()));
    }

    let size = source.size();
    if offset < HEADER_OFFSET || offset >= size {
        return Err(BagError::format(
            "read_connections_and_chunk_infos",
            format!("index position {offset} is outside the file of {size} bytes"),
        ));
    }
    let buffer = source.read(offset, (size - offset) as usize)?;

    let parsed_connections = read_records::<Connection>(&buffer, conn_count as usize, offset)?;
    let cursor = parsed_connections
        .last()
        .map(|parsed| (parsed.span.end - offset) as usize)
        .unwrap_or(0);

    let mut connections = HashMap::with_capacity(parsed_connections.len());
    for parsed in parsed_connections {
        let conn = parsed.record;
        if let Some(previous) = connections.insert(conn.conn, conn) {
            warn!(
                conn = previous.conn,
                topic = %previous.topic,
                "Duplicate connection record, keeping the last one"
            );
        }
    }

    let mut chunk_summaries: Vec<ChunkSummary> = read_records::<ChunkSummary>(
        &buffer[cursor..],
        chunk_count as usize,
        offset + cursor as u64,
    )?
    .into_iter()
    .map(|parsed| parsed.record)
    .collect();

    if !chunk_summaries
        .windows(2)
        .all(|pair| pair[0].chunk_pos < pair[1].chunk_pos)
    {
        warn!("Chunk infos are not in file order, sorting by chunk position");
        chunk_summaries.sort_by_key(|summary| summary.chunk_pos);
    }

    Ok((connections, chunk_summaries))
}
