// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Windowed streaming iterators.
//!
//! [`MessageIterator`] yields messages in global time order (or reverse time
//! order) while only materializing the chunks of the current window. It is a
//! pull-based state machine:
//!
//! - `Idle(position)`: nothing queued; the next pull plans and loads the
//!   window starting at `position`
//! - `Draining(next)`: queued entries are popped one per pull; once the queue
//!   is empty the iterator goes back to `Idle(next)`
//! - `Exhausted`: no window remains
//!
//! Queue entries are ordered by `(time, chunk position, chunk offset)`, so
//! equal timestamps always come out in file order going forward and in
//! reverse file order going backward.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use super::chunk::{ChunkPayload, ChunkStore, ChunkStoreStats};
use super::decode::{MessageDecoder, PayloadDecoder};
use super::merge::MergeQueue;
use super::record::{ChunkSummary, Connection};
use super::window::{plan_window, Direction};
use crate::io::compression::DecompressorRegistry;
use crate::io::filter::{ConnectionFilter, TopicFilter};
use crate::io::source::ByteSource;
use crate::{BagError, Result, Time};

/// Options for [`Bag::message_iterator`](crate::Bag::message_iterator).
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// First position (inclusive); defaults to the bag start (forward) or end (reverse)
    pub start: Option<Time>,
    /// Last position (inclusive); iteration stops after it
    pub end: Option<Time>,
    /// Topics to yield
    pub topics: TopicFilter,
    /// Traversal direction
    pub direction: Direction,
}

impl IterOptions {
    /// Create default options: all topics, forward, whole bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start position.
    pub fn with_start(mut self, start: Time) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the end position.
    pub fn with_end(mut self, end: Time) -> Self {
        self.end = Some(end);
        self
    }

    /// Set the topic filter.
    pub fn with_topics(mut self, topics: impl Into<TopicFilter>) -> Self {
        self.topics = topics.into();
        self
    }

    /// Set the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// One message yielded by an iterator or a bulk read.
///
/// The payload stays inside its chunk buffer; [`data`](Self::data) borrows it.
#[derive(Clone)]
pub struct MessageEvent<'a> {
    /// Topic of the message's connection
    pub topic: &'a str,
    /// Connection id
    pub connection_id: u32,
    /// Connection metadata
    pub connection: &'a Connection,
    /// Receive timestamp
    pub timestamp: Time,
    /// Offset of the message record: the chunk's data offset plus its offset in the chunk data
    pub record_offset: u64,
    chunk: Arc<ChunkPayload<'a>>,
    range: Range<usize>,
}

impl<'a> MessageEvent<'a> {
    /// Build an event from a message record inside `chunk`.
    pub(crate) fn from_chunk(
        chunk: Arc<ChunkPayload<'a>>,
        offset: u32,
        connections: &'a HashMap<u32, Connection>,
    ) -> Result<Self> {
        let (conn, timestamp, record_offset, range) = {
            let parsed = chunk.message_at(offset)?;
            let start = (parsed.span.data_offset - chunk.data_offset) as usize;
            (
                parsed.record.conn,
                parsed.record.time,
                parsed.span.offset,
                start..start + parsed.record.data.len(),
            )
        };
        let connection = connections
            .get(&conn)
            .ok_or_else(|| BagError::unknown_connection(conn))?;
        Ok(Self {
            topic: &connection.topic,
            connection_id: conn,
            connection,
            timestamp,
            record_offset,
            chunk,
            range,
        })
    }

    /// Serialized payload.
    pub fn data(&self) -> &[u8] {
        &self.chunk.data[self.range.clone()]
    }

    /// Position of the chunk the message was read from.
    pub fn chunk_position(&self) -> u64 {
        self.chunk.position
    }
}

impl fmt::Debug for MessageEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("topic", &self.topic)
            .field("connection_id", &self.connection_id)
            .field("timestamp", &self.timestamp)
            .field("record_offset", &self.record_offset)
            .field("len", &self.range.len())
            .finish()
    }
}

/// A queued index entry.
struct QueuedEntry<'a> {
    time: Time,
    chunk_pos: u64,
    offset: u32,
    chunk: Arc<ChunkPayload<'a>>,
}

impl QueuedEntry<'_> {
    fn key(&self) -> (Time, u64, u32) {
        (self.time, self.chunk_pos, self.offset)
    }
}

impl PartialEq for QueuedEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEntry<'_> {}

impl PartialOrd for QueuedEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Idle(Time),
    Draining(Option<Time>),
    Exhausted,
}

/// Time-ordered streaming iterator over a bag.
pub struct MessageIterator<'a, S: ByteSource + ?Sized> {
    connections: &'a HashMap<u32, Connection>,
    summaries: &'a [ChunkSummary],
    store: ChunkStore<'a, S>,
    filter: ConnectionFilter,
    direction: Direction,
    end: Option<Time>,
    candidates: Vec<usize>,
    queue: MergeQueue<QueuedEntry<'a>>,
    state: IterState,
    windows_loaded: usize,
}

impl<'a, S: ByteSource + ?Sized> MessageIterator<'a, S> {
    /// Create an iterator positioned at `start`.
    ///
    /// Chunks holding no connection that passes the topic filter are dropped
    /// from consideration up front.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: &'a S,
        connections: &'a HashMap<u32, Connection>,
        summaries: &'a [ChunkSummary],
        decompressors: &'a DecompressorRegistry,
        cache_capacity: usize,
        topics: &TopicFilter,
        direction: Direction,
        start: Time,
        end: Option<Time>,
    ) -> Self {
        let filter = topics.resolve(connections);
        let candidates = summaries
            .iter()
            .enumerate()
            .filter(|(_, summary)| filter.allows_chunk(summary))
            .map(|(i, _)| i)
            .collect();

        Self {
            connections,
            summaries,
            store: ChunkStore::new(source, summaries, decompressors, cache_capacity),
            filter,
            direction,
            end,
            candidates,
            queue: MergeQueue::new(direction),
            state: IterState::Idle(start),
            windows_loaded: 0,
        }
    }

    /// Traversal direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Chunk cache counters of this iterator.
    pub fn cache_stats(&self) -> ChunkStoreStats {
        self.store.stats()
    }

    /// Windows loaded so far.
    pub fn windows_loaded(&self) -> usize {
        self.windows_loaded
    }

    /// Decode every payload with `decoder`.
    pub fn decoded<D: MessageDecoder>(self, decoder: D) -> DecodedIterator<'a, S, D> {
        DecodedIterator {
            inner: self,
            decoder: PayloadDecoder::new(decoder),
        }
    }

    fn past_end(&self, time: Time) -> bool {
        match (self.end, self.direction) {
            (Some(end), Direction::Forward) => time > end,
            (Some(end), Direction::Reverse) => time < end,
            (None, _) => false,
        }
    }

    /// Plan and load the window at `position`; returns the next state.
    fn load_window(&mut self, position: Time) -> Result<IterState> {
        if self.past_end(position) {
            return Ok(IterState::Exhausted);
        }
        let Some(plan) = plan_window(self.summaries, &mut self.candidates, position, self.direction)
        else {
            return Ok(IterState::Exhausted);
        };

        let mut lower = plan.lower;
        let mut upper = plan.upper;
        match (self.end, self.direction) {
            (Some(end), Direction::Forward) => upper = upper.min(end),
            (Some(end), Direction::Reverse) => lower = lower.max(end),
            (None, _) => {}
        }

        // Pin the whole window while loading so carried-over chunks survive.
        self.store.retain_only(
            plan.selected
                .iter()
                .chain(&plan.retained)
                .map(|&index| self.summaries[index].chunk_pos),
        );
        for &index in &plan.selected {
            let chunk = self.store.load(index)?;
            for index_data in &chunk.indices {
                if !self.filter.allows(index_data.conn) {
                    continue;
                }
                for entry in &index_data.entries {
                    if entry.time < lower || entry.time > upper {
                        continue;
                    }
                    self.queue.push(QueuedEntry {
                        time: entry.time,
                        chunk_pos: chunk.position,
                        offset: entry.offset,
                        chunk: Arc::clone(&chunk),
                    });
                }
            }
        }
        self.store.retain_only(
            plan.retained
                .iter()
                .map(|&index| self.summaries[index].chunk_pos),
        );
        self.windows_loaded += 1;

        debug!(
            direction = ?self.direction,
            chunks = plan.selected.len(),
            retained = plan.retained.len(),
            lower = %lower,
            upper = %upper,
            queued = self.queue.len(),
            "Loaded window"
        );

        let next = plan.next.filter(|next| !self.past_end(*next));
        Ok(IterState::Draining(next))
    }

    fn finish(&mut self) {
        self.state = IterState::Exhausted;
        self.queue.clear();
        self.store.release();
    }
}

impl<'a, S: ByteSource + ?Sized> Iterator for MessageIterator<'a, S> {
    type Item = Result<MessageEvent<'a>>;

    /// Errors are terminal: after one is returned the iterator yields `None`.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                IterState::Exhausted => return None,
                IterState::Idle(position) => match self.load_window(position) {
                    Ok(IterState::Exhausted) => self.finish(),
                    Ok(state) => self.state = state,
                    Err(err) => {
                        debug!(
                            position = %position,
                            error = ?err.log_fields(),
                            "Window load failed"
                        );
                        self.finish();
                        return Some(Err(err));
                    }
                },
                IterState::Draining(next) => match self.queue.pop() {
                    Some(entry) => {
                        let event =
                            MessageEvent::from_chunk(entry.chunk, entry.offset, self.connections);
                        if event.is_err() {
                            self.finish();
                        }
                        return Some(event);
                    }
                    None => match next {
                        Some(position) => self.state = IterState::Idle(position),
                        None => self.finish(),
                    },
                },
            }
        }
    }
}

/// A message together with its decoded value.
#[derive(Debug, Clone)]
pub struct DecodedMessage<'a, M> {
    /// The raw event
    pub event: MessageEvent<'a>,
    /// Decoder output
    pub message: M,
}

/// A [`MessageIterator`] that also runs a [`MessageDecoder`] on every payload.
///
/// A payload that fails to decode yields an error and iteration continues;
/// container errors from the inner iterator still end it.
pub struct DecodedIterator<'a, S: ByteSource + ?Sized, D: MessageDecoder> {
    inner: MessageIterator<'a, S>,
    decoder: PayloadDecoder<D>,
}

impl<'a, S: ByteSource + ?Sized, D: MessageDecoder> DecodedIterator<'a, S, D> {
    /// Borrow the underlying iterator.
    pub fn inner(&self) -> &MessageIterator<'a, S> {
        &self.inner
    }

    /// Borrow the payload decoder.
    pub fn payload_decoder(&self) -> &PayloadDecoder<D> {
        &self.decoder
    }
}

impl<'a, S: ByteSource + ?Sized, D: MessageDecoder> Iterator for DecodedIterator<'a, S, D> {
    type Item = Result<DecodedMessage<'a, D::Message>>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.inner.next()? {
            Ok(event) => event,
            Err(err) => return Some(Err(err)),
        };
        Some(
            self.decoder
                .decode(event.connection, event.data())
                .map(|message| DecodedMessage { event, message }),
        )
    }
}
