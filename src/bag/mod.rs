// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! ROS1 bag (rosbag v2) reading.
//!
//! Layers, leaves first:
//! - [`fields`] / [`record`] - record codec for the on-disk format
//! - [`index`] - the open sequence (magic, header, connections, chunk infos)
//! - [`chunk`] - chunk loading, decompression and the per-reader cache
//! - [`window`] / [`merge`] - window planning and time-ordered merging
//! - [`iterator`] - forward and reverse streaming iterators
//! - [`reader`] - the [`Bag`] facade and the bulk read path
//! - [`decode`] - hooks for external payload decoders

pub mod chunk;
pub mod decode;
pub mod fields;
pub mod index;
pub mod iterator;
pub mod merge;
pub mod reader;
pub mod record;
pub mod window;

pub use chunk::{ChunkPayload, ChunkStore, ChunkStoreStats};
pub use decode::{MessageDecoder, PayloadDecoder};
pub use index::ContainerIndex;
pub use iterator::{DecodedIterator, DecodedMessage, IterOptions, MessageEvent, MessageIterator};
pub use reader::{Bag, BagInfo, ReadOptions, ReadResult, TopicInfo};
pub use record::{
    BagHeader, ChunkConnection, ChunkSummary, Connection, IndexData, IndexEntry, MessageData,
    Opcode, Record,
};
pub use window::Direction;
