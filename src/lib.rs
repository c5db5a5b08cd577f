// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Bagstream
//!
//! Streaming reader for ROS1 bag (rosbag v2) files.
//!
//! Messages are read in global time order, forward or backward, without
//! loading the whole file. Only the index is read at open time; chunks are
//! loaded, decompressed and released window by window as iteration proceeds,
//! even when chunk time ranges overlap.
//!
//! ## Architecture
//!
//! - `core/` - Error type, timestamps and reader configuration
//! - `io/` - Byte sources, chunk decompressors and topic filters
//! - `bag/` - Record codec, container index, chunk cache, iterators and the
//!   [`Bag`] facade
//!
//! ## Example: Forward iteration
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use bagstream::{Bag, IterOptions};
//!
//! let bag = Bag::open_mmap("recording.bag")?;
//! for event in bag.message_iterator(IterOptions::new().with_topics(["/imu"])) {
//!     let event = event?;
//!     println!("{} {} ({} bytes)", event.timestamp, event.topic, event.data().len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Example: Reverse iteration from a timestamp
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use bagstream::{Bag, IterOptions, Time};
//!
//! let bag = Bag::open_file("recording.bag")?;
//! let options = IterOptions::new().with_start(Time::new(1_700_000_000, 0));
//! let latest: Vec<_> = bag
//!     .reverse_message_iterator(options)
//!     .take(10)
//!     .collect::<Result<_, _>>()?;
//! # let _ = latest;
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

// Re-export core types for convenience
pub use core::{BagConfig, BagError, BoxError, Result, Time};

// I/O types (sources, decompression, filters)
pub mod io;

pub use io::{
    ByteSource, ConnectionFilter, Decompress, DecompressorRegistry, FileSource, MemorySource,
    MmapSource, TopicFilter,
};

// Bag format reading
pub mod bag;

pub use bag::{
    Bag, BagInfo, ChunkStore, ChunkStoreStats, ChunkSummary, Connection, DecodedIterator,
    DecodedMessage, Direction, IterOptions, MessageDecoder, MessageEvent, MessageIterator,
    PayloadDecoder, ReadOptions, ReadResult, TopicInfo,
};
