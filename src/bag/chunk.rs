// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Chunk loading and the per-reader chunk cache.
//!
//! A chunk is read as one contiguous region `[chunk_pos, next_chunk_pos)` (or
//! to the end of the source for the last chunk). That region holds the chunk
//! record followed by its `IndexData` records. The chunk data is decompressed
//! through the [`DecompressorRegistry`] unless its codec is `"none"`, in which
//! case memory-backed sources hand out borrowed bytes with no copy.
//!
//! [`ChunkStore`] caches payloads by chunk position. Payloads the iterator
//! marks as retained are never evicted; everything else is kept in a small
//! LRU of `chunk_cache_capacity` entries.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{trace, warn};

use super::record::{read_record, read_records, Chunk, ChunkSummary, IndexData, MessageData, Parsed};
use crate::io::compression::{DecompressorRegistry, COMPRESSION_NONE};
use crate::io::source::ByteSource;
use crate::{BagError, Result};

/// A decompressed chunk together with its per-connection indices.
#[derive(Debug, Clone)]
pub struct ChunkPayload<'a> {
    /// Offset of the chunk record in the source
    pub position: u64,
    /// Codec the chunk was stored with
    pub compression: String,
    /// Decompressed chunk data
    pub data: Cow<'a, [u8]>,
    /// Source offset of the chunk data; message offsets are reported relative to it
    pub data_offset: u64,
    /// Per-connection indices; entries are time-sorted within each
    pub indices: Vec<IndexData>,
}

impl ChunkPayload<'_> {
    /// Parse the message record at `offset` within the chunk data.
    pub fn message_at(&self, offset: u32) -> Result<Parsed<MessageData<'_>>> {
        let offset = offset as usize;
        if offset > self.data.len() {
            return Err(BagError::format(
                "ChunkPayload::message_at",
                format!(
                    "offset {offset} is past the end of chunk {} ({} bytes)",
                    self.position,
                    self.data.len()
                ),
            ));
        }
        read_record::<MessageData>(&self.data[offset..], self.data_offset + offset as u64)
    }

    /// Total index entries across all connections.
    pub fn entry_count(&self) -> usize {
        self.indices.iter().map(|index| index.entries.len()).sum()
    }
}

/// Load and decompress the chunk at `summaries[index]`.
///
/// The read length is derived from the next summary's position.
pub fn load_chunk<'a, S: ByteSource + ?Sized>(
    source: &'a S,
    summaries: &[ChunkSummary],
    index: usize,
    decompressors: &DecompressorRegistry,
) -> Result<ChunkPayload<'a>> {
    let summary = summaries.get(index).ok_or_else(|| {
        BagError::format(
            "load_chunk",
            format!("chunk index {index} out of range ({} chunks)", summaries.len()),
        )
    })?;
    let position = summary.chunk_pos;
    let end = summaries
        .get(index + 1)
        .map(|next| next.chunk_pos)
        .unwrap_or_else(|| source.size());
    if end <= position {
        return Err(BagError::format(
            "load_chunk",
            format!("chunk at {position} has no bytes before {end}"),
        ));
    }

    match source.read(position, (end - position) as usize)? {
        Cow::Borrowed(bytes) => build_payload(summary, bytes, decompressors, Cow::Borrowed),
        Cow::Owned(bytes) => build_payload(summary, &bytes, decompressors, |data| {
            Cow::Owned(data.to_vec())
        }),
    }
}

fn build_payload<'a, 'b>(
    summary: &ChunkSummary,
    region: &'b [u8],
    decompressors: &DecompressorRegistry,
    keep: impl FnOnce(&'b [u8]) -> Cow<'a, [u8]>,
) -> Result<ChunkPayload<'a>> {
    let position = summary.chunk_pos;
    let Parsed {
        record: chunk,
        span,
    } = read_record::<Chunk>(region, position)?;

    let rest = &region[span.length as usize..];
    let indices = read_records::<IndexData>(rest, summary.count as usize, span.end)?
        .into_iter()
        .map(|parsed| parsed.record)
        .collect();

    let Chunk {
        compression,
        size,
        data,
    } = chunk;
    let data = if compression == COMPRESSION_NONE {
        keep(data)
    } else {
        let decompressed = decompressors.decompress(&compression, data, size as usize)?;
        if decompressed.len() != size as usize {
            warn!(
                chunk_pos = position,
                codec = %compression,
                declared = size,
                actual = decompressed.len(),
                "Decompressed chunk size differs from the declared size"
            );
        }
        Cow::Owned(decompressed)
    };

    Ok(ChunkPayload {
        position,
        compression,
        data,
        data_offset: span.data_offset,
        indices,
    })
}

/// Chunk cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStoreStats {
    /// Chunks read from the source
    pub loads: u64,
    /// Requests answered from the cache
    pub hits: u64,
    /// Loads that ran a decompressor
    pub decompressions: u64,
    /// Payloads dropped from the cache
    pub evictions: u64,
}

struct CacheSlot<'a> {
    payload: Arc<ChunkPayload<'a>>,
    last_used: u64,
}

/// Per-reader chunk cache keyed by chunk position.
pub struct ChunkStore<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    summaries: &'a [ChunkSummary],
    decompressors: &'a DecompressorRegistry,
    capacity: usize,
    slots: HashMap<u64, CacheSlot<'a>>,
    retained: HashSet<u64>,
    tick: u64,
    stats: ChunkStoreStats,
}

impl<'a, S: ByteSource + ?Sized> ChunkStore<'a, S> {
    /// Create an empty store.
    ///
    /// `capacity` bounds the payloads kept beyond the retained set.
    pub fn new(
        source: &'a S,
        summaries: &'a [ChunkSummary],
        decompressors: &'a DecompressorRegistry,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            summaries,
            decompressors,
            capacity,
            slots: HashMap::new(),
            retained: HashSet::new(),
            tick: 0,
            stats: ChunkStoreStats::default(),
        }
    }

    /// Get the payload of `summaries[index]`, loading it on a miss.
    pub fn load(&mut self, index: usize) -> Result<Arc<ChunkPayload<'a>>> {
        let summary = self.summaries.get(index).ok_or_else(|| {
            BagError::format(
                "ChunkStore::load",
                format!("chunk index {index} out of range"),
            )
        })?;
        let position = summary.chunk_pos;
        self.tick += 1;

        if let Some(slot) = self.slots.get_mut(&position) {
            slot.last_used = self.tick;
            self.stats.hits += 1;
            trace!(chunk_pos = position, "Chunk cache hit");
            return Ok(Arc::clone(&slot.payload));
        }

        trace!(chunk_pos = position, "Chunk cache miss");
        let payload = Arc::new(load_chunk(
            self.source,
            self.summaries,
            index,
            self.decompressors,
        )?);
        self.stats.loads += 1;
        if payload.compression != COMPRESSION_NONE {
            self.stats.decompressions += 1;
        }

        self.slots.insert(
            position,
            CacheSlot {
                payload: Arc::clone(&payload),
                last_used: self.tick,
            },
        );
        self.evict();
        Ok(payload)
    }

    /// Pin exactly `positions`; every other payload becomes evictable.
    pub fn retain_only(&mut self, positions: impl IntoIterator<Item = u64>) {
        self.retained = positions.into_iter().collect();
        self.evict();
    }

    /// Drop every cached payload.
    pub fn release(&mut self) {
        self.stats.evictions += self.slots.len() as u64;
        self.slots.clear();
        self.retained.clear();
    }

    /// Check if the chunk at `position` is cached.
    pub fn contains(&self, position: u64) -> bool {
        self.slots.contains_key(&position)
    }

    /// Number of cached payloads.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cache counters.
    pub fn stats(&self) -> ChunkStoreStats {
        self.stats
    }

    fn evict(&mut self) {
        loop {
            let mut unpinned = self
                .slots
                .iter()
                .filter(|(position, _)| !self.retained.contains(*position));
            let Some(first) = unpinned.next() else {
                return;
            };
            let mut count = 1usize;
            let mut oldest = (*first.0, first.1.last_used);
            for (position, slot) in unpinned {
                count += 1;
                if slot.last_used < oldest.1 {
                    oldest = (*position, slot.last_used);
                }
            }
            if count <= self.capacity {
                return;
            }
            self.slots.remove(&oldest.0);
            self.stats.evictions += 1;
            trace!(chunk_pos = oldest.0, "Evicted chunk");
        }
    }
}
