// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Time-ordered merging of index entries.
//!
//! [`MergeQueue`] is the direction-aware priority queue behind the windowed
//! iterators. [`merge_chunk_indices`] is the one-shot k-way merge the bulk
//! reader runs over the per-connection index lists of a single chunk.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::record::{IndexData, IndexEntry};
use super::window::Direction;
use crate::io::filter::ConnectionFilter;
use crate::Time;

/// Priority queue popping the smallest item (forward) or the largest (reverse).
#[derive(Debug, Clone)]
pub enum MergeQueue<T: Ord> {
    /// Min-heap
    Ascending(BinaryHeap<Reverse<T>>),
    /// Max-heap
    Descending(BinaryHeap<T>),
}

impl<T: Ord> MergeQueue<T> {
    /// Create an empty queue for a traversal direction.
    pub fn new(direction: Direction) -> Self {
        match direction {
            Direction::Forward => MergeQueue::Ascending(BinaryHeap::new()),
            Direction::Reverse => MergeQueue::Descending(BinaryHeap::new()),
        }
    }

    /// Add an item.
    pub fn push(&mut self, item: T) {
        match self {
            MergeQueue::Ascending(heap) => heap.push(Reverse(item)),
            MergeQueue::Descending(heap) => heap.push(item),
        }
    }

    /// Remove the next item in traversal order.
    pub fn pop(&mut self) -> Option<T> {
        match self {
            MergeQueue::Ascending(heap) => heap.pop().map(|Reverse(item)| item),
            MergeQueue::Descending(heap) => heap.pop(),
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        match self {
            MergeQueue::Ascending(heap) => heap.len(),
            MergeQueue::Descending(heap) => heap.len(),
        }
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        match self {
            MergeQueue::Ascending(heap) => heap.clear(),
            MergeQueue::Descending(heap) => heap.clear(),
        }
    }
}

/// An index entry tagged with its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedEntry {
    /// Connection id
    pub conn: u32,
    /// Message time and intra-chunk offset
    pub entry: IndexEntry,
}

/// Heap cursor: the head of one index list.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Cursor {
    time: Time,
    offset: u32,
    list: usize,
    position: usize,
}

/// Merge the index lists of one chunk into a single time-ordered sequence.
///
/// Only entries whose connection passes `filter` and whose time lies in
/// `[start, end]` are kept. Ties on time are broken by chunk offset, i.e.
/// record order within the chunk.
pub fn merge_chunk_indices(
    indices: &[IndexData],
    filter: &ConnectionFilter,
    start: Time,
    end: Time,
) -> Vec<MergedEntry> {
    let lists: Vec<&[IndexEntry]> = indices
        .iter()
        .map(|index| {
            if filter.allows(index.conn) {
                // Entries are time-sorted, so the range is a contiguous slice.
                let from = index.entries.partition_point(|e| e.time < start);
                let to = index.entries.partition_point(|e| e.time <= end);
                &index.entries[from..to.max(from)]
            } else {
                &index.entries[..0]
            }
        })
        .collect();

    let total = lists.iter().map(|list| list.len()).sum();
    let mut merged = Vec::with_capacity(total);
    let mut heap = MergeQueue::new(Direction::Forward);

    for (list, entries) in lists.iter().enumerate() {
        if let Some(first) = entries.first() {
            heap.push(Cursor {
                time: first.time,
                offset: first.offset,
                list,
                position: 0,
            });
        }
    }

    while let Some(cursor) = heap.pop() {
        let entries = lists[cursor.list];
        merged.push(MergedEntry {
            conn: indices[cursor.list].conn,
            entry: entries[cursor.position],
        });
        if let Some(next) = entries.get(cursor.position + 1) {
            heap.push(Cursor {
                time: next.time,
                offset: next.offset,
                list: cursor.list,
                position: cursor.position + 1,
            });
        }
    }

    merged
}
