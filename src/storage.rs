// Copyright 2026 ParameterStore authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use byteorder::{BigEndian, ByteOrder};
use core::cmp::min;

/// Marker written at the start of the physical region.
///
/// A region that does not start with this word (big-endian) is considered
/// blank and is zeroed before use.
pub const MAGIC: u32 = 0xfade_0042;

/// Size in bytes of the magic marker.
///
/// The store addresses the region past the marker, so the usable size is the
/// physical size minus this prefix.
pub const MAGIC_SIZE: usize = 4;

/// Block size used when zeroing the region.
const RESET_BLOCK_SIZE: usize = 100;

/// Represents a possible storage error.
#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Arguments are out of bounds.
    OutOfBounds,

    /// Implementation-specific error.
    ///
    /// In particular, an interrupted write reports this error. The bytes of
    /// the affected range may have been partially modified.
    CustomError,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Abstracts a byte-addressable non-volatile memory.
///
/// Implementations provide random access to a fixed-size physical region
/// (NVRAM, FRAM, battery-backed SRAM, or a test double). A `write` that
/// returns has been committed durably; a `write` interrupted by power loss
/// may leave any prefix of the affected range modified.
///
/// The provided methods expose the usable window following the magic marker:
/// all their offsets are relative to the end of the marker. Out-of-range
/// access through them is a bug in the caller, reported as
/// [`StorageError::OutOfBounds`].
pub trait Storage {
    /// The size in bytes of the physical region, including the magic marker.
    fn len(&self) -> usize;

    /// Reads `buffer.len()` bytes starting at the physical offset `offset`.
    fn read(&self, offset: usize, buffer: &mut [u8]) -> StorageResult<()>;

    /// Writes `value` starting at the physical offset `offset`.
    fn write(&mut self, offset: usize, value: &[u8]) -> StorageResult<()>;

    /// The size in bytes of the usable region.
    fn size(&self) -> usize {
        self.len() - MAGIC_SIZE
    }

    /// Makes the region usable, zeroing it first if it is blank.
    fn begin(&mut self) -> StorageResult<()> {
        if !self.is_magic_set()? {
            self.reset_store()?;
        }
        Ok(())
    }

    /// Returns whether the region starts with the magic marker.
    fn is_magic_set(&self) -> StorageResult<bool> {
        let mut word = [0; MAGIC_SIZE];
        self.read(0, &mut word)?;
        Ok(BigEndian::read_u32(&word) == MAGIC)
    }

    /// Zeroes the whole region, then writes the magic marker.
    ///
    /// The marker is written last. If the reset is interrupted, the marker is
    /// missing or partial and the next [`begin`](Storage::begin) starts over.
    fn reset_store(&mut self) -> StorageResult<()> {
        let zeros = [0; RESET_BLOCK_SIZE];
        let mut offset = 0;
        while offset < self.len() {
            let length = min(RESET_BLOCK_SIZE, self.len() - offset);
            self.write(offset, &zeros[..length])?;
            offset += length;
        }
        let mut word = [0; MAGIC_SIZE];
        BigEndian::write_u32(&mut word, MAGIC);
        self.write(0, &word)
    }

    /// Reads a byte slice from the usable region.
    fn read_slice(&self, offset: usize, buffer: &mut [u8]) -> StorageResult<()> {
        check_range(offset, buffer.len(), self.size())?;
        self.read(MAGIC_SIZE + offset, buffer)
    }

    /// Writes a byte slice to the usable region.
    fn write_slice(&mut self, offset: usize, value: &[u8]) -> StorageResult<()> {
        check_range(offset, value.len(), self.size())?;
        self.write(MAGIC_SIZE + offset, value)
    }

    /// Reads a byte from the usable region.
    fn read_byte(&self, offset: usize) -> StorageResult<u8> {
        let mut byte = [0; 1];
        self.read_slice(offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Writes a byte to the usable region.
    fn write_byte(&mut self, offset: usize, value: u8) -> StorageResult<()> {
        self.write_slice(offset, &[value])
    }

    /// Reads a big-endian 16-bit integer from the usable region.
    fn read_u16(&self, offset: usize) -> StorageResult<u16> {
        let mut bytes = [0; 2];
        self.read_slice(offset, &mut bytes)?;
        Ok(BigEndian::read_u16(&bytes))
    }

    /// Writes a big-endian 16-bit integer to the usable region.
    fn write_u16(&mut self, offset: usize, value: u16) -> StorageResult<()> {
        let mut bytes = [0; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.write_slice(offset, &bytes)
    }

    /// Reads a big-endian 32-bit integer from the usable region.
    fn read_u32(&self, offset: usize) -> StorageResult<u32> {
        let mut bytes = [0; 4];
        self.read_slice(offset, &mut bytes)?;
        Ok(BigEndian::read_u32(&bytes))
    }

    /// Writes a big-endian 32-bit integer to the usable region.
    fn write_u32(&mut self, offset: usize, value: u32) -> StorageResult<()> {
        let mut bytes = [0; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.write_slice(offset, &bytes)
    }
}

/// Returns whether `length` bytes at `offset` fit in a region of `size` bytes.
fn check_range(offset: usize, length: usize, size: usize) -> StorageResult<()> {
    if offset <= size && length <= size - offset {
        Ok(())
    } else {
        Err(StorageError::OutOfBounds)
    }
}
