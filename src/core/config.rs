// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Reader configuration.
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! header_readahead = 4096
//! chunk_cache_capacity = 2
//! parallel_bulk_read = true
//! ```

use serde::Deserialize;

use super::error::{BagError, Result};

/// Bytes read at the header offset when parsing the bag header record.
pub const DEFAULT_HEADER_READAHEAD: usize = 4096;

/// Configuration shared by every reader created from a [`Bag`](crate::Bag).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BagConfig {
    /// Bytes read after the magic when parsing the bag header record
    pub header_readahead: usize,
    /// Chunk payloads a chunk store may keep outside the retained window
    pub chunk_cache_capacity: usize,
    /// Decompress the chunks of a bulk read on the rayon thread pool, one
    /// batch of up to `current_num_threads()` chunks at a time
    pub parallel_bulk_read: bool,
}

impl Default for BagConfig {
    fn default() -> Self {
        Self {
            header_readahead: DEFAULT_HEADER_READAHEAD,
            chunk_cache_capacity: 1,
            parallel_bulk_read: false,
        }
    }
}

impl BagConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BagConfig =
            toml::from_str(text).map_err(|e| BagError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the header readahead.
    pub fn with_header_readahead(mut self, bytes: usize) -> Self {
        self.header_readahead = bytes;
        self
    }

    /// Set the chunk cache capacity.
    pub fn with_chunk_cache_capacity(mut self, capacity: usize) -> Self {
        self.chunk_cache_capacity = capacity;
        self
    }

    /// Enable or disable parallel chunk decompression for bulk reads.
    pub fn with_parallel_bulk_read(mut self, enabled: bool) -> Self {
        self.parallel_bulk_read = enabled;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        // A header record needs at least its two length prefixes.
        if self.header_readahead < 8 {
            return Err(BagError::config(format!(
                "header_readahead must be at least 8 bytes, got {}",
                self.header_readahead
            )));
        }
        Ok(())
    }
}
