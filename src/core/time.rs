// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! ROS time as stored on disk: `{sec: u32, nsec: u32}`, little-endian.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::{BagError, Result};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A ROS timestamp.
///
/// Ordering compares seconds first, then nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    /// Seconds since the Unix epoch
    pub sec: u32,
    /// Nanoseconds within the second
    pub nsec: u32,
}

impl Time {
    /// The earliest representable time.
    pub const ZERO: Time = Time { sec: 0, nsec: 0 };

    /// The latest representable time.
    pub const MAX: Time = Time {
        sec: u32::MAX,
        nsec: NANOS_PER_SEC - 1,
    };

    /// Size of the on-disk encoding.
    pub const ENCODED_LEN: usize = 8;

    /// Create a time from seconds and nanoseconds.
    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Build a time from nanoseconds since the epoch, saturating at [`Time::MAX`].
    pub fn from_nanos(nanos: u64) -> Self {
        let sec = nanos / NANOS_PER_SEC as u64;
        if sec > u32::MAX as u64 {
            return Self::MAX;
        }
        Self {
            sec: sec as u32,
            nsec: (nanos % NANOS_PER_SEC as u64) as u32,
        }
    }

    /// Nanoseconds since the epoch.
    pub fn as_nanos(&self) -> u64 {
        self.sec as u64 * NANOS_PER_SEC as u64 + self.nsec as u64
    }

    /// Decode from the 8-byte on-disk layout.
    ///
    /// The caller guarantees `bytes.len() >= 8`. A nanosecond field of a full
    /// second or more is rejected.
    pub(crate) fn read_le(bytes: &[u8]) -> Result<Self> {
        let time = Self {
            sec: LittleEndian::read_u32(&bytes[0..4]),
            nsec: LittleEndian::read_u32(&bytes[4..8]),
        };
        if time.nsec >= NANOS_PER_SEC {
            return Err(BagError::format(
                "Time",
                format!("nanoseconds out of range in {}s {}ns", time.sec, time.nsec),
            ));
        }
        Ok(time)
    }

    /// Encode into the 8-byte on-disk layout.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        LittleEndian::write_u32(&mut out[0..4], self.sec);
        LittleEndian::write_u32(&mut out[4..8], self.nsec);
        out
    }

    /// One nanosecond later, or `None` past [`Time::MAX`].
    pub fn next_nano(&self) -> Option<Self> {
        if self.nsec < NANOS_PER_SEC - 1 {
            Some(Self::new(self.sec, self.nsec + 1))
        } else {
            self.sec.checked_add(1).map(|sec| Self::new(sec, 0))
        }
    }

    /// One nanosecond earlier, or `None` before [`Time::ZERO`].
    pub fn prev_nano(&self) -> Option<Self> {
        if self.nsec > 0 {
            Some(Self::new(self.sec, self.nsec - 1))
        } else {
            self.sec
                .checked_sub(1)
                .map(|sec| Self::new(sec, NANOS_PER_SEC - 1))
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

impl From<Time> for u64 {
    fn from(time: Time) -> Self {
        time.as_nanos()
    }
}
