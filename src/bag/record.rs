// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Record codec for the rosbag v2 container.
//!
//! # Record Format
//! All records follow: `<header_len: u32><header><data_len: u32><data>`
//! where header contains `<field_len: u32><field_name>=<field_value>` pairs
//! and always carries a one-byte `op` field naming the record kind.
//!
//! ## Op Codes
//! - 0x02: Message data
//! - 0x03: Bag header
//! - 0x04: Index data
//! - 0x05: Chunk
//! - 0x06: Chunk info
//! - 0x07: Connection
//!
//! Parsing is two-phase: header fields are split generically by
//! [`Fields`](super::fields::Fields), then the kind-specific fields are pulled
//! out by name. Every parsed record is stamped with a [`RecordSpan`] so
//! callers reading records back-to-back can advance a cursor by
//! `span.length`.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use super::fields::Fields;
use crate::{BagError, Result, Time};

/// Magic line at offset 0 of every supported container.
pub const MAGIC: &[u8; 13] = b"#ROSBAG V2.0\n";

/// Offset of the bag header record (directly after the magic).
pub const HEADER_OFFSET: u64 = MAGIC.len() as u64;

/// Size of one `IndexData` entry: 8-byte time + 4-byte offset.
const INDEX_ENTRY_LEN: usize = 12;

/// Size of one `ChunkInfo` entry: 4-byte conn + 4-byte count.
const CHUNK_CONNECTION_LEN: usize = 8;

/// Record kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Serialized message payload
    MessageData = 0x02,
    /// File header
    BagHeader = 0x03,
    /// Per-chunk, per-connection message index
    IndexData = 0x04,
    /// Possibly compressed block of records
    Chunk = 0x05,
    /// Chunk summary in the index section
    ChunkInfo = 0x06,
    /// Connection (channel) metadata
    Connection = 0x07,
}

impl Opcode {
    /// Map an on-disk opcode byte to a record kind.
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0x02 => Some(Opcode::MessageData),
            0x03 => Some(Opcode::BagHeader),
            0x04 => Some(Opcode::IndexData),
            0x05 => Some(Opcode::Chunk),
            0x06 => Some(Opcode::ChunkInfo),
            0x07 => Some(Opcode::Connection),
            _ => None,
        }
    }

    /// On-disk opcode byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Record kind name.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::MessageData => "MessageData",
            Opcode::BagHeader => "BagHeader",
            Opcode::IndexData => "IndexData",
            Opcode::Chunk => "Chunk",
            Opcode::ChunkInfo => "ChunkInfo",
            Opcode::Connection => "Connection",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

/// Absolute placement of a record within its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    /// Offset of the header length prefix
    pub offset: u64,
    /// Offset of the first data byte
    pub data_offset: u64,
    /// Offset one past the last data byte
    pub end: u64,
    /// Total record length (`end - offset`)
    pub length: u64,
}

/// The bag header record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagHeader {
    /// Offset of the index section (connections then chunk infos)
    pub index_pos: u64,
    /// Number of connection records in the index section
    pub conn_count: u32,
    /// Number of chunk info records in the index section
    pub chunk_count: u32,
}

/// A chunk record; `data` is still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Codec name ("none", "bz2", "lz4", ...)
    pub compression: String,
    /// Declared decompressed size
    pub size: u32,
    /// Raw (possibly compressed) chunk bytes
    pub data: &'a [u8],
}

/// Connection (channel) metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    /// Connection id
    pub conn: u32,
    /// Topic name
    pub topic: String,
    /// Message type name (e.g., "std_msgs/String")
    pub message_type: String,
    /// MD5 sum of the message definition
    pub md5sum: String,
    /// Full message definition text
    pub message_definition: String,
    /// Publishing node, if recorded
    pub callerid: Option<String>,
    /// Latched topic
    pub latching: bool,
}

/// A serialized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageData<'a> {
    /// Connection id
    pub conn: u32,
    /// Receive timestamp
    pub time: Time,
    /// Serialized payload
    pub data: &'a [u8],
}

/// Location of one message inside a decompressed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// Message timestamp
    pub time: Time,
    /// Offset of the message record from the start of the chunk data
    pub offset: u32,
}

/// Per-chunk, per-connection index; entries are time-sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexData {
    /// Index format version
    pub ver: u32,
    /// Connection id
    pub conn: u32,
    /// Number of entries
    pub count: u32,
    /// Index entries
    pub entries: Vec<IndexEntry>,
}

/// Message count of one connection inside a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkConnection {
    /// Connection id
    pub conn: u32,
    /// Messages on that connection in the chunk
    pub count: u32,
}

/// Chunk summary ("chunk info"): describes a chunk without its contents.
///
/// Summaries are ordered by `chunk_pos` (append order); their time ranges
/// may overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    /// Chunk info format version
    pub ver: u32,
    /// Offset of the chunk record
    pub chunk_pos: u64,
    /// Earliest message time in the chunk
    pub start_time: Time,
    /// Latest message time in the chunk
    pub end_time: Time,
    /// Number of connections (and index records) in the chunk
    pub count: u32,
    /// Per-connection message counts
    pub connections: Vec<ChunkConnection>,
}

impl ChunkSummary {
    /// Total messages in the chunk.
    pub fn message_count(&self) -> u64 {
        self.connections.iter().map(|c| c.count as u64).sum()
    }

    /// Check if `time` lies within `[start_time, end_time]`.
    pub fn contains(&self, time: Time) -> bool {
        self.start_time <= time && time <= self.end_time
    }
}

/// A parsed record of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    /// Bag header
    BagHeader(BagHeader),
    /// Chunk
    Chunk(Chunk<'a>),
    /// Connection
    Connection(Connection),
    /// Message data
    MessageData(MessageData<'a>),
    /// Index data
    IndexData(IndexData),
    /// Chunk info
    ChunkInfo(ChunkSummary),
}

impl Record<'_> {
    /// Record kind.
    pub fn opcode(&self) -> Opcode {
        match self {
            Record::BagHeader(_) => Opcode::BagHeader,
            Record::Chunk(_) => Opcode::Chunk,
            Record::Connection(_) => Opcode::Connection,
            Record::MessageData(_) => Opcode::MessageData,
            Record::IndexData(_) => Opcode::IndexData,
            Record::ChunkInfo(_) => Opcode::ChunkInfo,
        }
    }
}

/// A record together with its placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    /// The record
    pub record: T,
    /// Where it was read from
    pub span: RecordSpan,
}

/// Typed extraction of one record kind from [`Record`].
pub trait FromRecord<'a>: Sized {
    /// Opcode this type is parsed from.
    const OPCODE: Opcode;

    /// Unwrap the matching variant.
    fn from_record(record: Record<'a>) -> Option<Self>;
}

macro_rules! impl_from_record {
    ($ty:ty, $variant:ident) => {
        impl<'a> FromRecord<'a> for $ty {
            const OPCODE: Opcode = Opcode::$variant;

            fn from_record(record: Record<'a>) -> Option<Self> {
                match record {
                    Record::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_from_record!(BagHeader, BagHeader);
impl_from_record!(Chunk<'a>, Chunk);
impl_from_record!(Connection, Connection);
impl_from_record!(MessageData<'a>, MessageData);
impl_from_record!(IndexData, IndexData);
impl_from_record!(ChunkSummary, ChunkInfo);

/// Parse one record of any kind from the start of `buffer`.
///
/// `file_offset` is the absolute offset of `buffer[0]`, used to stamp the span.
pub fn parse_record(buffer: &[u8], file_offset: u64) -> Result<Parsed<Record<'_>>> {
    parse_record_inner(buffer, file_offset, None)
}

/// Parse one record and fail unless its opcode is `expected`.
pub fn parse_expected(
    buffer: &[u8],
    file_offset: u64,
    expected: Opcode,
) -> Result<Parsed<Record<'_>>> {
    parse_record_inner(buffer, file_offset, Some(expected))
}

/// Parse one record of kind `T`.
pub fn read_record<'a, T: FromRecord<'a>>(buffer: &'a [u8], file_offset: u64) -> Result<Parsed<T>> {
    let Parsed { record, span } = parse_expected(buffer, file_offset, T::OPCODE)?;
    let record = T::from_record(record).ok_or_else(|| {
        BagError::format("read_record", format!("record is not a {}", T::OPCODE))
    })?;
    Ok(Parsed { record, span })
}

/// Parse `count` back-to-back records of kind `T`.
pub fn read_records<'a, T: FromRecord<'a>>(
    buffer: &'a [u8],
    count: usize,
    file_offset: u64,
) -> Result<Vec<Parsed<T>>> {
    let mut records = Vec::with_capacity(count);
    let mut cursor = 0usize;
    for _ in 0..count {
        let parsed = read_record::<T>(&buffer[cursor.min(buffer.len())..], file_offset + cursor as u64)?;
        cursor += parsed.span.length as usize;
        records.push(parsed);
    }
    Ok(records)
}

fn parse_record_inner(
    buffer: &[u8],
    file_offset: u64,
    expected: Option<Opcode>,
) -> Result<Parsed<Record<'_>>> {
    const CONTEXT: &str = "parse_record";

    if buffer.len() < 4 {
        return Err(BagError::format(
            CONTEXT,
            format!("record at offset {file_offset} is truncated"),
        ));
    }
    let header_len = LittleEndian::read_u32(&buffer[0..4]) as usize;
    if header_len > buffer.len() - 4 {
        return Err(BagError::format(
            CONTEXT,
            format!(
                "record at offset {file_offset}: header length {header_len} exceeds {} available bytes",
                buffer.len() - 4
            ),
        ));
    }

    let fields = Fields::parse(&buffer[4..4 + header_len])?;
    let op = fields.op().ok_or_else(|| {
        BagError::format(
            CONTEXT,
            format!("record at offset {file_offset} is missing 'op' field"),
        )
    })?;
    if let Some(expected) = expected {
        if op != expected.as_u8() {
            return Err(BagError::format(
                CONTEXT,
                format!("expected {expected} at offset {file_offset} but found opcode {op}"),
            ));
        }
    }
    let opcode = Opcode::from_u8(op).ok_or_else(|| {
        BagError::format(
            CONTEXT,
            format!("unknown opcode {op} at offset {file_offset}"),
        )
    })?;

    let len_pos = 4 + header_len;
    if buffer.len() - len_pos < 4 {
        return Err(BagError::format(
            CONTEXT,
            format!("record at offset {file_offset}: missing data length"),
        ));
    }
    let data_len = LittleEndian::read_u32(&buffer[len_pos..len_pos + 4]) as usize;
    let data_start = len_pos + 4;
    if data_len > buffer.len() - data_start {
        return Err(BagError::format(
            CONTEXT,
            format!(
                "record at offset {file_offset}: data length {data_len} exceeds {} available bytes",
                buffer.len() - data_start
            ),
        ));
    }
    let data = &buffer[data_start..data_start + data_len];

    let record = match opcode {
        Opcode::BagHeader => Record::BagHeader(BagHeader {
            index_pos: fields.u64("index_pos")?,
            conn_count: fields.u32("conn_count")?,
            chunk_count: fields.u32("chunk_count")?,
        }),
        Opcode::Chunk => Record::Chunk(Chunk {
            compression: fields.string("compression")?,
            size: fields.u32("size")?,
            data,
        }),
        Opcode::Connection => Record::Connection(parse_connection(&fields, data)?),
        Opcode::MessageData => Record::MessageData(MessageData {
            conn: fields.u32("conn")?,
            time: fields.time("time")?,
            data,
        }),
        Opcode::IndexData => Record::IndexData(parse_index_data(&fields, data)?),
        Opcode::ChunkInfo => Record::ChunkInfo(parse_chunk_info(&fields, data)?),
    };

    let data_offset = file_offset + data_start as u64;
    let end = data_offset + data_len as u64;
    Ok(Parsed {
        record,
        span: RecordSpan {
            offset: file_offset,
            data_offset,
            end,
            length: end - file_offset,
        },
    })
}

fn parse_connection(fields: &Fields<'_>, data: &[u8]) -> Result<Connection> {
    // The data block is itself a field list (the connection header).
    let data_fields = Fields::parse(data)?;
    Ok(Connection {
        conn: fields.u32("conn")?,
        topic: fields.string("topic")?,
        message_type: data_fields.string("type")?,
        md5sum: data_fields.string("md5sum")?,
        message_definition: data_fields.string("message_definition")?,
        callerid: data_fields.optional_string("callerid"),
        latching: data_fields.get("latching") == Some(b"1".as_slice()),
    })
}

fn parse_index_data(fields: &Fields<'_>, data: &[u8]) -> Result<IndexData> {
    let ver = fields.u32("ver")?;
    let conn = fields.u32("conn")?;
    let count = fields.u32("count")?;

    let needed = count as usize * INDEX_ENTRY_LEN;
    if data.len() < needed {
        return Err(BagError::format(
            "parse_index_data",
            format!(
                "connection {conn}: {count} entries need {needed} bytes, found {}",
                data.len()
            ),
        ));
    }

    let entries = data[..needed]
        .chunks_exact(INDEX_ENTRY_LEN)
        .map(|entry| {
            Ok(IndexEntry {
                time: Time::read_le(&entry[0..8])?,
                offset: LittleEndian::read_u32(&entry[8..12]),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(IndexData {
        ver,
        conn,
        count,
        entries,
    })
}

fn parse_chunk_info(fields: &Fields<'_>, data: &[u8]) -> Result<ChunkSummary> {
    let count = fields.u32("count")?;

    let needed = count as usize * CHUNK_CONNECTION_LEN;
    if data.len() < needed {
        return Err(BagError::format(
            "parse_chunk_info",
            format!(
                "{count} connection entries need {needed} bytes, found {}",
                data.len()
            ),
        ));
    }

    let connections = data[..needed]
        .chunks_exact(CHUNK_CONNECTION_LEN)
        .map(|entry| ChunkConnection {
            conn: LittleEndian::read_u32(&entry[0..4]),
            count: LittleEndian::read_u32(&entry[4..8]),
        })
        .collect();

    Ok(ChunkSummary {
        ver: fields.u32("ver")?,
        chunk_pos: fields.u64("chunk_pos")?,
        start_time: fields.time("start_time")?,
        end_time: fields.time("end_time")?,
        count,
        connections,
    })
}
