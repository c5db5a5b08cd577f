// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Payload decoding hooks.
//!
//! The reader never interprets message payloads itself. A [`MessageDecoder`]
//! supplied by the caller is prepared once per connection (typically by
//! parsing the connection's message definition) and then reused for every
//! payload on that connection. [`PayloadDecoder`] owns the prepared state in
//! a side table keyed by connection id, so the connection table itself stays
//! immutable.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::record::Connection;
use crate::{BagError, BoxError, Result};

/// External message deserializer.
pub trait MessageDecoder {
    /// Per-connection state built from the connection metadata.
    type Prepared;
    /// Decoded message value.
    type Message;
    /// Decoder error; surfaced unchanged as the source of [`BagError::Payload`].
    type Error: Into<BoxError>;

    /// Build the per-connection state.
    fn prepare(&self, connection: &Connection) -> std::result::Result<Self::Prepared, Self::Error>;

    /// Decode one payload.
    fn decode(
        &self,
        prepared: &Self::Prepared,
        data: &[u8],
    ) -> std::result::Result<Self::Message, Self::Error>;
}

/// A [`MessageDecoder`] plus its per-connection side table.
pub struct PayloadDecoder<D: MessageDecoder> {
    decoder: D,
    prepared: HashMap<u32, D::Prepared>,
}

impl<D: MessageDecoder> PayloadDecoder<D> {
    /// Wrap a decoder with an empty side table.
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            prepared: HashMap::new(),
        }
    }

    /// Decode a payload, preparing the connection on first use.
    pub fn decode(&mut self, connection: &Connection, data: &[u8]) -> Result<D::Message> {
        let prepared = match self.prepared.entry(connection.conn) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let prepared = self
                    .decoder
                    .prepare(connection)
                    .map_err(BagError::payload)?;
                entry.insert(prepared)
            }
        };
        self.decoder
            .decode(prepared, data)
            .map_err(BagError::payload)
    }

    /// Number of connections prepared so far.
    pub fn prepared_count(&self) -> usize {
        self.prepared.len()
    }

    /// Borrow the wrapped decoder.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Unwrap the decoder, dropping the side table.
    pub fn into_inner(self) -> D {
        self.decoder
    }
}

impl<D: MessageDecoder> From<D> for PayloadDecoder<D> {
    fn from(decoder: D) -> Self {
        Self::new(decoder)
    }
}
