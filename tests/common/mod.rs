// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for integration tests.
//!
//! [`BagBuilder`] writes byte-exact rosbag v2 containers in memory: version
//! line, header record padded to 4096 bytes, chunks (connection records,
//! message records, then per-connection index records), and the trailing
//! index section of connection and chunk info records. Chunks are written
//! exactly as declared, so tests can produce overlapping time ranges.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use bagstream::{DecompressorRegistry, Result, Time};

const OP_MSG_DATA: u8 = 0x02;
const OP_BAG_HEADER: u8 = 0x03;
const OP_INDEX_DATA: u8 = 0x04;
const OP_CHUNK: u8 = 0x05;
const OP_CHUNK_INFO: u8 = 0x06;
const OP_CONNECTION: u8 = 0x07;

const MAGIC: &[u8] = b"#ROSBAG V2.0\n";
const HEADER_RECORD_LEN: usize = 4096 - 13;

// ============================================================================
// Fixture description
// ============================================================================

/// How a fixture chunk is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// `compression=none`
    None,
    /// `compression=bz2`
    Bz2,
    /// `compression=lz4` (LZ4 frame)
    Lz4,
    /// Bytes reversed; codec name `rev`, see [`reversing_registry`]
    Reverse,
    /// An arbitrary codec name; the data is stored uncompressed
    Named(&'static str),
}

impl Compression {
    fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Bz2 => "bz2",
            Compression::Lz4 => "lz4",
            Compression::Reverse => "rev",
            Compression::Named(name) => name,
        }
    }

    fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Compression::None | Compression::Named(_) => data.to_vec(),
            Compression::Reverse => data.iter().rev().copied().collect(),
            Compression::Bz2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(data).expect("bz2 encode");
                encoder.finish().expect("bz2 finish")
            }
            Compression::Lz4 => {
                let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
                encoder.write_all(data).expect("lz4 encode");
                encoder.finish().expect("lz4 finish")
            }
        }
    }
}

/// A message written by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureMessage {
    /// Connection id
    pub conn: u32,
    /// Message time
    pub time: Time,
    /// Payload: `value` as little-endian u32
    pub value: u32,
    /// Chunk the message was written to
    pub chunk: usize,
    /// Write order within the chunk
    pub seq: usize,
}

impl FixtureMessage {
    /// Sort key matching the iterator's tie-break: time, then file order.
    pub fn order_key(&self) -> (Time, usize, usize) {
        (self.time, self.chunk, self.seq)
    }
}

#[derive(Debug, Clone)]
struct FixtureConnection {
    topic: String,
    message_type: String,
    in_index: bool,
}

#[derive(Debug, Clone)]
struct FixtureChunk {
    compression: Compression,
    messages: Vec<(u32, Time, u32)>,
}

/// In-memory rosbag v2 writer for tests.
#[derive(Debug, Clone, Default)]
pub struct BagBuilder {
    connections: BTreeMap<u32, FixtureConnection>,
    chunks: Vec<FixtureChunk>,
}

impl BagBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection of type `std_msgs/UInt32`.
    pub fn connection(mut self, id: u32, topic: &str) -> Self {
        self.connections.insert(
            id,
            FixtureConnection {
                topic: topic.to_string(),
                message_type: "std_msgs/UInt32".to_string(),
                in_index: true,
            },
        );
        self
    }

    /// Add a connection that appears inside chunks but not in the index section.
    pub fn unlisted_connection(mut self, id: u32, topic: &str) -> Self {
        self.connections.insert(
            id,
            FixtureConnection {
                topic: topic.to_string(),
                message_type: "std_msgs/UInt32".to_string(),
                in_index: false,
            },
        );
        self
    }

    /// Add connections `0..count` with topics `/0`, `/1`, ...
    pub fn numbered_connections(mut self, count: u32) -> Self {
        for id in 0..count {
            self = self.connection(id, &format!("/{id}"));
        }
        self
    }

    /// Add an uncompressed chunk of `(conn, nsec, value)` messages at second 0.
    pub fn chunk(self, messages: &[(u32, u32, u32)]) -> Self {
        self.chunk_with(Compression::None, messages)
    }

    /// Add a chunk stored with `compression`.
    pub fn chunk_with(self, compression: Compression, messages: &[(u32, u32, u32)]) -> Self {
        let messages = messages
            .iter()
            .map(|&(conn, nsec, value)| (conn, Time::new(0, nsec), value))
            .collect();
        self.timed_chunk(compression, messages)
    }

    /// Add a chunk of `(conn, time, value)` messages.
    pub fn timed_chunk(mut self, compression: Compression, messages: Vec<(u32, Time, u32)>) -> Self {
        self.chunks.push(FixtureChunk {
            compression,
            messages,
        });
        self
    }

    /// All messages in write order.
    pub fn messages(&self) -> Vec<FixtureMessage> {
        self.chunks
            .iter()
            .enumerate()
            .flat_map(|(chunk, fixture)| {
                fixture.messages
                    .iter()
                    .enumerate()
                    .map(move |(seq, &(conn, time, value))| FixtureMessage {
                        conn,
                        time,
                        value,
                        chunk,
                        seq,
                    })
            })
            .collect()
    }

    /// Messages in forward iteration order.
    pub fn forward_order(&self) -> Vec<FixtureMessage> {
        let mut messages = self.messages();
        messages.sort_by_key(FixtureMessage::order_key);
        messages
    }

    /// Topic of a connection.
    pub fn topic(&self, conn: u32) -> &str {
        &self.connections[&conn].topic
    }

    /// Serialize the bag.
    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut chunk_infos = Vec::new();
        let data_start = (MAGIC.len() + HEADER_RECORD_LEN) as u64;

        for fixture in &self.chunks {
            let chunk_pos = data_start + body.len() as u64;
            let (chunk_bytes, info) = self.write_chunk(fixture, chunk_pos);
            body.extend(chunk_bytes);
            chunk_infos.push(info);
        }

        let index_pos = data_start + body.len() as u64;
        let listed: Vec<_> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.in_index)
            .collect();
        for &(&id, conn) in &listed {
            write_connection_record(&mut body, id, conn);
        }
        for info in &chunk_infos {
            body.extend(info);
        }

        let mut bag = MAGIC.to_vec();
        write_file_header_record(
            &mut bag,
            listed.len() as u32,
            chunk_infos.len() as u32,
            index_pos,
        );
        bag.extend(body);
        bag
    }

    /// Write one chunk record plus its index records; returns the bytes and
    /// the serialized chunk info record.
    fn write_chunk(&self, fixture: &FixtureChunk, chunk_pos: u64) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut written: BTreeSet<u32> = BTreeSet::new();
        let mut indexes: BTreeMap<u32, Vec<(Time, u32)>> = BTreeMap::new();

        for &(conn, time, value) in &fixture.messages {
            if written.insert(conn) {
                if let Some(info) = self.connections.get(&conn) {
                    write_connection_record(&mut data, conn, info);
                }
            }
            indexes
                .entry(conn)
                .or_default()
                .push((time, data.len() as u32));

            let mut fields = BTreeMap::new();
            fields.insert("op", vec![OP_MSG_DATA]);
            fields.insert("conn", conn.to_le_bytes().to_vec());
            fields.insert("time", time.to_le_bytes().to_vec());
            write_header(&mut data, &fields);
            write_data(&mut data, &value.to_le_bytes());
        }

        let mut out = Vec::new();
        let mut fields = BTreeMap::new();
        fields.insert("op", vec![OP_CHUNK]);
        fields.insert("compression", fixture.compression.name().as_bytes().to_vec());
        fields.insert("size", (data.len() as u32).to_le_bytes().to_vec());
        write_header(&mut out, &fields);
        write_data(&mut out, &fixture.compression.encode(&data));

        for (conn, entries) in &mut indexes {
            // Index entries are time-sorted; write order breaks ties.
            entries.sort_by_key(|&(time, _)| time);

            let mut fields = BTreeMap::new();
            fields.insert("op", vec![OP_INDEX_DATA]);
            fields.insert("ver", 1u32.to_le_bytes().to_vec());
            fields.insert("conn", conn.to_le_bytes().to_vec());
            fields.insert("count", (entries.len() as u32).to_le_bytes().to_vec());
            write_header(&mut out, &fields);

            let mut entry_bytes = Vec::with_capacity(entries.len() * 12);
            for (time, offset) in entries.iter() {
                entry_bytes.extend(time.to_le_bytes());
                entry_bytes.extend(offset.to_le_bytes());
            }
            write_data(&mut out, &entry_bytes);
        }

        let start = fixture.messages.iter().map(|m| m.1).min().unwrap_or(Time::ZERO);
        let end = fixture.messages.iter().map(|m| m.1).max().unwrap_or(Time::ZERO);
        let mut info = Vec::new();
        let mut fields = BTreeMap::new();
        fields.insert("op", vec![OP_CHUNK_INFO]);
        fields.insert("ver", 1u32.to_le_bytes().to_vec());
        fields.insert("chunk_pos", chunk_pos.to_le_bytes().to_vec());
        fields.insert("start_time", start.to_le_bytes().to_vec());
        fields.insert("end_time", end.to_le_bytes().to_vec());
        fields.insert("count", (indexes.len() as u32).to_le_bytes().to_vec());
        write_header(&mut info, &fields);
        let mut counts = Vec::new();
        for (conn, entries) in &indexes {
            counts.extend(conn.to_le_bytes());
            counts.extend((entries.len() as u32).to_le_bytes());
        }
        write_data(&mut info, &counts);

        (out, info)
    }
}

// ============================================================================
// Record writers
// ============================================================================

fn write_header(buffer: &mut Vec<u8>, fields: &BTreeMap<&str, Vec<u8>>) {
    let mut header = Vec::new();
    for (key, value) in fields {
        header.extend(((key.len() + 1 + value.len()) as u32).to_le_bytes());
        header.extend(key.as_bytes());
        header.push(b'=');
        header.extend(value);
    }
    buffer.extend((header.len() as u32).to_le_bytes());
    buffer.extend(header);
}

fn write_data(buffer: &mut Vec<u8>, data: &[u8]) {
    buffer.extend((data.len() as u32).to_le_bytes());
    buffer.extend(data);
}

/// Header record padded so the first chunk starts at byte 4096.
fn write_file_header_record(buffer: &mut Vec<u8>, conn_count: u32, chunk_count: u32, index_pos: u64) {
    let start = buffer.len();
    let mut fields = BTreeMap::new();
    fields.insert("op", vec![OP_BAG_HEADER]);
    fields.insert("index_pos", index_pos.to_le_bytes().to_vec());
    fields.insert("conn_count", conn_count.to_le_bytes().to_vec());
    fields.insert("chunk_count", chunk_count.to_le_bytes().to_vec());
    write_header(buffer, &fields);

    let used = buffer.len() - start;
    let padding = HEADER_RECORD_LEN - used - 4;
    write_data(buffer, &vec![b' '; padding]);
}

fn write_connection_record(buffer: &mut Vec<u8>, id: u32, conn: &FixtureConnection) {
    let mut fields = BTreeMap::new();
    fields.insert("op", vec![OP_CONNECTION]);
    fields.insert("conn", id.to_le_bytes().to_vec());
    fields.insert("topic", conn.topic.as_bytes().to_vec());
    write_header(buffer, &fields);

    let mut data_fields = BTreeMap::new();
    data_fields.insert("topic", conn.topic.as_bytes().to_vec());
    data_fields.insert("type", conn.message_type.as_bytes().to_vec());
    data_fields.insert("md5sum", b"304a39449588c7f8ce2df6e8001c5fce".to_vec());
    data_fields.insert("message_definition", b"uint32 data\n".to_vec());
    data_fields.insert("callerid", b"/fixture".to_vec());
    data_fields.insert("latching", b"0".to_vec());
    let mut data = Vec::new();
    write_header(&mut data, &data_fields);
    // The connection data block is itself a field list without an outer length.
    let data = data[4..].to_vec();
    write_data(buffer, &data);
}

// ============================================================================
// Helpers
// ============================================================================

/// Decode a fixture payload.
pub fn payload_value(data: &[u8]) -> u32 {
    u32::from_le_bytes(data[..4].try_into().expect("4-byte payload"))
}

/// Registry with the built-in codecs plus the `rev` test codec.
pub fn reversing_registry() -> DecompressorRegistry {
    DecompressorRegistry::with_defaults().with("rev", decompress_reversed)
}

/// Decoder for [`Compression::Reverse`] chunks.
pub fn decompress_reversed(input: &[u8], _size: usize) -> Result<Vec<u8>> {
    Ok(input.iter().rev().copied().collect())
}

/// `(nsec, value)` pairs of fixture messages.
pub fn fixture_pairs(messages: &[FixtureMessage]) -> Vec<(u32, u32)> {
    messages.iter().map(|m| (m.time.nsec, m.value)).collect()
}

// ============================================================================
// Temporary files
// ============================================================================

/// Unique temporary directory for one test.
fn temp_dir() -> PathBuf {
    // Process id plus clock nanos keeps parallel tests apart.
    let random = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    std::env::temp_dir().join(format!(
        "bagstream_test_{}_{}",
        std::process::id(),
        random
    ))
}

/// Removes the temporary directory when dropped.
#[derive(Debug)]
pub struct CleanupGuard(PathBuf);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Write `bytes` to `<tmp>/<name>.bag`; the file lives as long as the guard.
pub fn write_temp_bag(name: &str, bytes: &[u8]) -> (PathBuf, CleanupGuard) {
    let dir = temp_dir();
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join(format!("{name}.bag"));
    fs::write(&path, bytes).expect("write temp bag");
    (path, CleanupGuard(dir))
}

/// Path inside a fresh temporary directory that does not exist.
pub fn missing_bag_path() -> (PathBuf, CleanupGuard) {
    let dir = temp_dir();
    fs::create_dir_all(&dir).expect("create temp dir");
    (dir.join("missing.bag"), CleanupGuard(dir))
}
