// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Bag reader facade.
//!
//! [`Bag`] owns a byte source and the container index read at open time.
//! It hands out independent readers:
//! - [`Bag::message_iterator`] / [`Bag::reverse_message_iterator`]: windowed
//!   streaming iterators in global time order
//! - [`Bag::read_messages`]: coarse bulk read, merged per chunk
//!
//! Every reader owns its own chunk cache, so readers over the same `Bag` can
//! run on different threads.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace};

use super::chunk::{load_chunk, ChunkPayload, ChunkStore};
use super::decode::{MessageDecoder, PayloadDecoder};
use super::index::ContainerIndex;
use super::iterator::{IterOptions, MessageEvent, MessageIterator};
use super::merge::merge_chunk_indices;
use super::record::{BagHeader, ChunkSummary, Connection};
use super::window::Direction;
use crate::io::compression::DecompressorRegistry;
use crate::io::filter::TopicFilter;
use crate::io::source::{ByteSource, FileSource, MemorySource, MmapSource};
use crate::{BagConfig, Result, Time};

/// Options for [`Bag::read_messages`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Earliest message time (inclusive)
    pub start_time: Option<Time>,
    /// Latest message time (inclusive)
    pub end_time: Option<Time>,
    /// Topics to read
    pub topics: TopicFilter,
}

impl ReadOptions {
    /// Create default options: all topics, whole bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the earliest message time.
    pub fn with_start_time(mut self, start: Time) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Set the latest message time.
    pub fn with_end_time(mut self, end: Time) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Set the topic filter.
    pub fn with_topics(mut self, topics: impl Into<TopicFilter>) -> Self {
        self.topics = topics.into();
        self
    }
}

/// One message from a bulk read.
#[derive(Debug, Clone)]
pub struct ReadResult<'a> {
    /// The message
    pub event: MessageEvent<'a>,
    /// Index of the chunk among the chunks selected for the read
    pub chunk_offset: usize,
    /// Number of chunks selected for the read
    pub total_chunks: usize,
}

/// Per-topic statistics in [`BagInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    /// Topic name
    pub topic: String,
    /// Message type
    pub message_type: String,
    /// Connections publishing on the topic
    pub connections: usize,
    /// Messages on the topic, from the chunk infos
    pub message_count: u64,
}

/// Summary of a bag's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagInfo {
    /// Earliest chunk start time
    pub start_time: Option<Time>,
    /// Latest chunk end time
    pub end_time: Option<Time>,
    /// Number of chunks
    pub chunk_count: usize,
    /// Number of connections
    pub connection_count: usize,
    /// Number of messages, from the chunk infos
    pub message_count: u64,
    /// Per-topic statistics, sorted by topic
    pub topics: Vec<TopicInfo>,
}

/// An opened rosbag v2 container.
#[derive(Debug)]
pub struct Bag<S: ByteSource = MemorySource> {
    source: S,
    config: BagConfig,
    decompressors: DecompressorRegistry,
    index: ContainerIndex,
}

impl Bag<MemorySource> {
    /// Open a bag held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open(MemorySource::new(bytes))
    }
}

impl Bag<MmapSource> {
    /// Memory-map and open a bag file.
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(MmapSource::open(path)?)
    }
}

impl Bag<FileSource> {
    /// Open a bag file with positioned reads.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(FileSource::open(path)?)
    }
}

impl<S: ByteSource> Bag<S> {
    /// Open a bag with the default configuration and the built-in codecs.
    pub fn open(source: S) -> Result<Self> {
        Self::open_with(source, BagConfig::default(), DecompressorRegistry::with_defaults())
    }

    /// Open a bag with an explicit configuration and decompressor registry.
    ///
    /// Only the magic, the header and the index section are read; chunks are
    /// read on demand, so an unsupported codec surfaces on first use.
    pub fn open_with(
        source: S,
        config: BagConfig,
        decompressors: DecompressorRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let index = ContainerIndex::load(&source, &config)?;
        debug!(
            size = source.size(),
            start = ?index.start_time(),
            end = ?index.end_time(),
            "Opened bag"
        );
        Ok(Self {
            source,
            config,
            decompressors,
            index,
        })
    }

    /// The byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The reader configuration.
    pub fn config(&self) -> &BagConfig {
        &self.config
    }

    /// The decompressor registry.
    pub fn decompressors(&self) -> &DecompressorRegistry {
        &self.decompressors
    }

    /// The bag header record.
    pub fn header(&self) -> &BagHeader {
        &self.index.header
    }

    /// Connection table keyed by connection id.
    pub fn connections(&self) -> &HashMap<u32, Connection> {
        &self.index.connections
    }

    /// First connection on a topic (lowest id).
    pub fn connection_by_topic(&self, topic: &str) -> Option<&Connection> {
        self.index
            .connections
            .values()
            .filter(|conn| conn.topic == topic)
            .min_by_key(|conn| conn.conn)
    }

    /// Chunk summaries ordered by chunk position.
    pub fn chunk_summaries(&self) -> &[ChunkSummary] {
        &self.index.chunk_summaries
    }

    /// Earliest chunk start time.
    ///
    /// This is the minimum over all chunks rather than the first chunk's start
    /// in append order; the two differ when chunks overlap out of order.
    pub fn start_time(&self) -> Option<Time> {
        self.index.start_time()
    }

    /// Latest chunk end time.
    ///
    /// The maximum over all chunks, not the last chunk's end in append order.
    pub fn end_time(&self) -> Option<Time> {
        self.index.end_time()
    }

    /// Total messages according to the chunk infos.
    pub fn message_count(&self) -> u64 {
        self.index
            .chunk_summaries
            .iter()
            .map(ChunkSummary::message_count)
            .sum()
    }

    /// Sorted, deduplicated topic names.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self
            .index
            .connections
            .values()
            .map(|conn| conn.topic.as_str())
            .collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }

    /// Summarize the index.
    pub fn info(&self) -> BagInfo {
        let mut per_conn: HashMap<u32, u64> = HashMap::new();
        for summary in &self.index.chunk_summaries {
            for entry in &summary.connections {
                *per_conn.entry(entry.conn).or_default() += entry.count as u64;
            }
        }

        let mut topics: BTreeMap<&str, TopicInfo> = BTreeMap::new();
        for conn in self.index.connections.values() {
            let info = topics.entry(conn.topic.as_str()).or_insert_with(|| TopicInfo {
                topic: conn.topic.clone(),
                message_type: conn.message_type.clone(),
                connections: 0,
                message_count: 0,
            });
            info.connections += 1;
            info.message_count += per_conn.get(&conn.conn).copied().unwrap_or(0);
        }

        BagInfo {
            start_time: self.start_time(),
            end_time: self.end_time(),
            chunk_count: self.index.chunk_summaries.len(),
            connection_count: self.index.connections.len(),
            message_count: self.message_count(),
            topics: topics.into_values().collect(),
        }
    }

    /// A fresh chunk cache over this bag, sized by the configuration.
    pub fn chunk_store(&self) -> ChunkStore<'_, S> {
        ChunkStore::new(
            &self.source,
            &self.index.chunk_summaries,
            &self.decompressors,
            self.config.chunk_cache_capacity,
        )
    }

    /// Streaming iterator in the direction given by `options`.
    ///
    /// Without an explicit start, forward iteration starts at the bag start
    /// and reverse iteration at the bag end.
    pub fn message_iterator(&self, options: IterOptions) -> MessageIterator<'_, S> {
        let start = options.start.unwrap_or(match options.direction {
            Direction::Forward => self.start_time().unwrap_or(Time::ZERO),
            Direction::Reverse => self.end_time().unwrap_or(Time::MAX),
        });
        debug!(
            direction = ?options.direction,
            start = %start,
            end = ?options.end,
            topics = ?options.topics,
            "Creating message iterator"
        );
        MessageIterator::new(
            &self.source,
            &self.index.connections,
            &self.index.chunk_summaries,
            &self.decompressors,
            self.config.chunk_cache_capacity,
            &options.topics,
            options.direction,
            start,
            options.end,
        )
    }

    /// Streaming iterator in reverse time order.
    pub fn reverse_message_iterator(&self, options: IterOptions) -> MessageIterator<'_, S> {
        self.message_iterator(options.with_direction(Direction::Reverse))
    }

    /// Bulk read: every matching message, merged in time order within each chunk.
    ///
    /// Chunks are visited in file order, not globally re-sorted. When chunk
    /// time ranges overlap, the output is therefore not globally time-ordered;
    /// use [`message_iterator`](Self::message_iterator) for that.
    pub fn read_messages<F>(&self, options: &ReadOptions, mut callback: F) -> Result<()>
    where
        F: FnMut(ReadResult<'_>),
    {
        self.read_chunks(options, |event, chunk_offset, total_chunks| {
            callback(ReadResult {
                event,
                chunk_offset,
                total_chunks,
            });
            Ok(())
        })
    }

    /// Bulk read that also decodes every payload.
    pub fn read_decoded_messages<D, F>(
        &self,
        options: &ReadOptions,
        decoder: &mut PayloadDecoder<D>,
        mut callback: F,
    ) -> Result<()>
    where
        D: MessageDecoder,
        F: FnMut(ReadResult<'_>, D::Message),
    {
        self.read_chunks(options, |event, chunk_offset, total_chunks| {
            let message = decoder.decode(event.connection, event.data())?;
            callback(
                ReadResult {
                    event,
                    chunk_offset,
                    total_chunks,
                },
                message,
            );
            Ok(())
        })
    }

    fn read_chunks<'s, F>(&'s self, options: &ReadOptions, mut emit: F) -> Result<()>
    where
        F: FnMut(MessageEvent<'s>, usize, usize) -> Result<()>,
    {
        let start = options.start_time.unwrap_or(Time::ZERO);
        let end = options.end_time.unwrap_or(Time::MAX);
        let filter = options.topics.resolve(&self.index.connections);
        let summaries = &self.index.chunk_summaries;

        let selected: Vec<usize> = summaries
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start_time <= end && s.end_time >= start && filter.allows_chunk(s))
            .map(|(i, _)| i)
            .collect();
        let total_chunks = selected.len();
        debug!(
            chunks = total_chunks,
            start = %start,
            end = %end,
            parallel = self.config.parallel_bulk_read,
            "Bulk read"
        );

        let mut emit_chunk = |chunk: Arc<ChunkPayload<'s>>, chunk_offset: usize| -> Result<()> {
            for merged in merge_chunk_indices(&chunk.indices, &filter, start, end) {
                let event = MessageEvent::from_chunk(
                    Arc::clone(&chunk),
                    merged.entry.offset,
                    &self.index.connections,
                )?;
                emit(event, chunk_offset, total_chunks)?;
            }
            Ok(())
        };

        if self.config.parallel_bulk_read {
            // At most one decompressed chunk per worker is held at a time.
            let batch_len = rayon::current_num_threads().max(1);
            for (batch_index, batch) in selected.chunks(batch_len).enumerate() {
                let payloads = batch
                    .par_iter()
                    .map(|&index| load_chunk(&self.source, summaries, index, &self.decompressors))
                    .collect::<Result<Vec<_>>>()?;
                trace!(batch = batch_index, chunks = payloads.len(), "Decompressed batch");
                for (i, payload) in payloads.into_iter().enumerate() {
                    emit_chunk(Arc::new(payload), batch_index * batch_len + i)?;
                }
            }
        } else {
            for (chunk_offset, &index) in selected.iter().enumerate() {
                let payload = load_chunk(&self.source, summaries, index, &self.decompressors)?;
                emit_chunk(Arc::new(payload), chunk_offset)?;
            }
        }
        Ok(())
    }
}
