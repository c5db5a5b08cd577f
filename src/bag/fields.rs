// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Generic `name=value` header field parsing.
//!
//! A header is a sequence of `<field_len: u32><name>=<value>` entries. The
//! first `=` separates name from value; values are raw bytes and are only
//! type-converted when a record kind asks for a field by name.

use byteorder::{ByteOrder, LittleEndian};

use crate::{BagError, Result, Time};

/// Parsed header fields borrowing from the record buffer.
#[derive(Debug, Clone, Default)]
pub struct Fields<'a> {
    entries: Vec<(&'a [u8], &'a [u8])>,
}

impl<'a> Fields<'a> {
    /// Split a header block into its fields.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut offset = 0usize;

        while offset < buffer.len() {
            if buffer.len() - offset < 4 {
                return Err(BagError::format(
                    "Fields::parse",
                    format!("truncated field length at byte {offset}"),
                ));
            }
            let field_len = LittleEndian::read_u32(&buffer[offset..offset + 4]) as usize;
            offset += 4;

            if field_len > buffer.len() - offset {
                return Err(BagError::format(
                    "Fields::parse",
                    format!(
                        "field of {field_len} bytes at byte {offset} overruns header of {} bytes",
                        buffer.len()
                    ),
                ));
            }

            let field = &buffer[offset..offset + field_len];
            let eq_pos = field.iter().position(|&b| b == b'=').ok_or_else(|| {
                BagError::format(
                    "Fields::parse",
                    format!("field at byte {offset} is missing '='"),
                )
            })?;
            entries.push((&field[..eq_pos], &field[eq_pos + 1..]));
            offset += field_len;
        }

        Ok(Self { entries })
    }

    /// Raw value of a field; the last occurrence wins.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| *key == name.as_bytes())
            .map(|&(_, value)| value)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw value of a required field.
    pub fn require(&self, name: &str) -> Result<&'a [u8]> {
        self.get(name)
            .ok_or_else(|| BagError::format("Fields", format!("missing required field '{name}'")))
    }

    fn require_len(&self, name: &str, len: usize) -> Result<&'a [u8]> {
        let value = self.require(name)?;
        if value.len() < len {
            return Err(BagError::format(
                "Fields",
                format!(
                    "field '{name}' has {} bytes, expected {len}",
                    value.len()
                ),
            ));
        }
        Ok(value)
    }

    /// Opcode byte of the record, if present.
    pub fn op(&self) -> Option<u8> {
        self.get("op").and_then(|value| value.first().copied())
    }

    /// Little-endian `u32` field.
    pub fn u32(&self, name: &str) -> Result<u32> {
        self.require_len(name, 4).map(LittleEndian::read_u32)
    }

    /// Little-endian `u64` field.
    pub fn u64(&self, name: &str) -> Result<u64> {
        self.require_len(name, 8).map(LittleEndian::read_u64)
    }

    /// 8-byte `{sec, nsec}` time field.
    pub fn time(&self, name: &str) -> Result<Time> {
        Time::read_le(self.require_len(name, Time::ENCODED_LEN)?)
    }

    /// UTF-8 string field (lossy).
    pub fn string(&self, name: &str) -> Result<String> {
        self.require(name).map(decode_string)
    }

    /// Optional UTF-8 string field (lossy).
    pub fn optional_string(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_string)
    }
}

fn decode_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(out: &mut Vec<u8>, name: &str, value: &[u8]) {
        out.extend(((name.len() + 1 + value.len()) as u32).to_le_bytes());
        out.extend(name.as_bytes());
        out.push(b'=');
        out.extend(value);
    }

    #[test]
    fn test_parse_op_and_conn() {
        let mut header = Vec::new();
        field(&mut header, "op", &[0x02]);
        field(&mut header, "conn", &1u32.to_le_bytes());

        let fields = Fields::parse(&header).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.op(), Some(0x02));
        assert_eq!(fields.u32("conn").unwrap(), 1);
    }

    #[test]
    fn test_parse_time_field() {
        let mut header = Vec::new();
        let mut time = Vec::new();
        time.extend(1_234_567_890u32.to_le_bytes());
        time.extend(123_456_789u32.to_le_bytes());
        field(&mut header, "time", &time);

        let fields = Fields::parse(&header).unwrap();
        assert_eq!(
            fields.time("time").unwrap(),
            Time::new(1_234_567_890, 123_456_789)
        );
    }

    #[test]
    fn test_time_field_rejects_out_of_range_nanos() {
        let mut header = Vec::new();
        let mut time = Vec::new();
        time.extend(0u32.to_le_bytes());
        time.extend(u32::MAX.to_le_bytes());
        field(&mut header, "end_time", &time);

        let fields = Fields::parse(&header).unwrap();
        assert!(matches!(
            fields.time("end_time"),
            Err(BagError::Format { .. })
        ));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let mut header = Vec::new();
        field(&mut header, "message_definition", b"int32 a=1");
        let fields = Fields::parse(&header).unwrap();
        assert_eq!(
            fields.string("message_definition").unwrap(),
            "int32 a=1"
        );
    }

    #[test]
    fn test_empty_block_has_no_fields() {
        let fields = Fields::parse(&[]).unwrap();
        assert!(fields.is_empty());
        assert_eq!(fields.op(), None);
    }

    #[test]
    fn test_overrunning_field_is_format_error() {
        let mut header = Vec::new();
        header.extend(100u32.to_le_bytes());
        header.extend(b"op=\x02");
        assert!(matches!(
            Fields::parse(&header),
            Err(BagError::Format { .. })
        ));
    }

    #[test]
    fn test_missing_equals_is_format_error() {
        let mut header = Vec::new();
        header.extend(4u32.to_le_bytes());
        header.extend(b"opxx");
        assert!(matches!(
            Fields::parse(&header),
            Err(BagError::Format { .. })
        ));
    }

    #[test]
    fn test_truncated_length_prefix_is_format_error() {
        let mut header = Vec::new();
        field(&mut header, "op", &[0x03]);
        header.extend([1, 0]);
        assert!(Fields::parse(&header).is_err());
    }

    #[test]
    fn test_missing_and_short_fields() {
        let mut header = Vec::new();
        field(&mut header, "conn", &[1, 0]);
        let fields = Fields::parse(&header).unwrap();
        assert!(matches!(fields.u32("conn"), Err(BagError::Format { .. })));
        assert!(matches!(fields.u64("index_pos"), Err(BagError::Format { .. })));
        assert_eq!(fields.optional_string("callerid"), None);
    }
}
