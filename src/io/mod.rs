// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! I/O layer: byte sources, chunk decompression and topic filtering.

// Random-access sources (memory, mmap, file)
pub mod source;
pub use source::{ByteSource, FileSource, MemorySource, MmapSource};

// Decompressors keyed by codec name
pub mod compression;
pub use compression::{Decompress, DecompressorRegistry};

// Filter for topic filtering
pub mod filter;
pub use filter::{ConnectionFilter, TopicFilter};
