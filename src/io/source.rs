// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Random-access byte sources backing a bag.
//!
//! A [`ByteSource`] answers `read(offset, length)` with exactly `length`
//! bytes or a [`BagError::ShortRead`]. Sources must tolerate concurrent
//! outstanding reads because independent iterators over the same bag may run
//! on different threads.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{BagError, Result};

/// Random access to the bytes of a container.
pub trait ByteSource: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Memory-backed sources return borrowed slices; others allocate.
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>>;

    /// Total length of the source in bytes.
    fn size(&self) -> u64;
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

/// Borrow `length` bytes at `offset` from an in-memory buffer.
fn slice_at(data: &[u8], offset: u64, length: usize) -> Result<&[u8]> {
    let available = (data.len() as u64).saturating_sub(offset) as usize;
    if available < length {
        return Err(BagError::short_read(offset, length, available));
    }
    let start = offset as usize;
    Ok(&data[start..start + length])
}

/// A bag held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap an owned buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteSource for MemorySource {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        slice_at(&self.data, offset, length).map(Cow::Borrowed)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A memory-mapped bag file; reads are zero-copy.
pub struct MmapSource {
    mmap: memmap2::Mmap,
}

impl MmapSource {
    /// Map a file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is read-only; concurrent mutation of the file while
        // it is open is outside the supported use.
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;
        Ok(Self { mmap })
    }
}

impl ByteSource for MmapSource {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        slice_at(&self.mmap[..], offset, length).map(Cow::Borrowed)
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

/// A bag file read with positioned reads.
///
/// Each read allocates its own buffer; only the file handle is shared.
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn read(&self, offset: u64, length: usize) -> Result<Cow<'_, [u8]>> {
        let available = self.size.saturating_sub(offset) as usize;
        if available < length {
            return Err(BagError::short_read(offset, length, available));
        }

        let mut buffer = vec![0u8; length];
        let mut file = self
            .file
            .lock()
            .map_err(|_| BagError::Io(std::io::Error::other("file handle lock poisoned")))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BagError::short_read(offset, length, available)
            } else {
                BagError::Io(e)
            }
        })?;
        Ok(Cow::Owned(buffer))
    }

    fn size(&self) -> u64 {
        self.size
    }
}
