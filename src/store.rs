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

use crate::format::{
    self, Entry, Plan, CRC_SEED, ENTRY_FLAG_OFFSET, ENTRY_HEADER_SIZE, ENTRY_NAME_OFFSET,
    FLAG_FREE, FLAG_FREED, FLAG_SET, FORMAT, FORMAT_OFFSET, FREE_HEADER_SIZE, HEADER_SIZE, KEY_SIZE,
    MAX_VALUE_LEN, PLAN_OFFSET, PLAN_SIZE, SIZE_OFFSET,
};
use crate::{Storage, StorageError};
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use core::cmp::max;

/// Represents a possible store error.
#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Invalid argument.
    ///
    /// The store is left unchanged. The operation will repeatedly fail until
    /// the argument is fixed.
    InvalidArgument,

    /// No free record is large enough.
    ///
    /// The store is left unchanged. The operation will repeatedly fail until
    /// a large enough record is freed. Note that freed records are reused but
    /// never merged, so the sum of all free bytes may exceed the largest
    /// storable value.
    NoCapacity,

    /// The key has no live entry.
    ///
    /// A lookup whose buffer length differs from the declared length of the
    /// live entry also reports this error.
    NotFound,

    /// The store header does not match this store.
    ///
    /// Either the layout version tag is unknown or the declared size differs
    /// from the size of the storage. The store is not modified.
    InvalidFormat,

    /// The storage content is invalid.
    ///
    /// The entry chain or the plan cannot be decoded. The storage should be
    /// reset, losing all content.
    InvalidStorage,

    /// A storage operation failed.
    ///
    /// The operation may or may not have taken effect. The store must be
    /// rebuilt from its storage, which runs recovery.
    StorageError,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StorageError> for StoreError {
    fn from(error: StorageError) -> StoreError {
        match error {
            StorageError::CustomError => StoreError::StorageError,
            // The store always accesses the storage in bounds.
            StorageError::OutOfBounds => unreachable!(),
        }
    }
}

/// Implements a parameter store above a byte-addressable storage.
///
/// The store is a partial map from short keys to small byte-string values.
/// Mutations are atomic with respect to power loss: building the store from
/// its storage replays or rolls back whatever operation was in flight.
#[derive(Clone)]
pub struct Store<S: Storage> {
    /// The underlying storage.
    storage: S,

    /// The usable size, also recorded in the store header.
    size: usize,
}

impl<S: Storage> Store<S> {
    /// Resumes or initializes a store for a given storage.
    ///
    /// If the storage is blank or cleared, an empty store is written to it.
    /// If an operation was interrupted by power loss, it is recovered: the
    /// store behaves as if the operation either completed or never started.
    ///
    /// Errors are returned together with the storage, which is not modified
    /// further.
    ///
    /// # Panics
    ///
    /// Panics if the usable size is too small to hold the header and one free
    /// record, or does not fit the 16-bit on-media offsets.
    pub fn new(storage: S) -> Result<Store<S>, (StoreError, S)> {
        let size = storage.size();
        assert!(HEADER_SIZE + FREE_HEADER_SIZE <= size && size <= 0xffff);
        let mut store = Store { storage, size };
        match store.init() {
            Ok(()) => Ok(store),
            Err(error) => Err((error, store.storage)),
        }
    }

    /// Extracts the storage.
    pub fn extract_storage(self) -> S {
        self.storage
    }

    /// Provides read-only access to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Provides mutable access to the storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// The usable size in bytes of the store.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Iterates over the records of the store, in chain order.
    pub fn iter(&self) -> StoreIter<'_, S> {
        StoreIter {
            store: self,
            offset: HEADER_SIZE,
            failed: false,
        }
    }

    /// The length in bytes of the largest value that can be stored now.
    ///
    /// This accounts for first-fit allocation: only a single free record can
    /// back a value, regardless of the total number of free bytes.
    pub fn capacity(&self) -> StoreResult<usize> {
        let mut best = 0;
        for handle in self.iter() {
            let handle = handle?;
            if !handle.entry.is_free() {
                continue;
            }
            // A record can hold a value if the footprint fits and the
            // remainder is zero or a valid free record.
            let total = handle.entry.total_bytes();
            let mut budget = total;
            if budget % format::UNIT != 0 {
                budget = budget.saturating_sub(budget % format::UNIT + format::UNIT);
            }
            if budget >= ENTRY_HEADER_SIZE + format::CRC_SIZE {
                best = max(best, budget - (ENTRY_HEADER_SIZE + format::CRC_SIZE));
            }
        }
        Ok(best)
    }

    /// Associates a value with a key.
    ///
    /// The new value is durable once this returns. If the operation is
    /// interrupted, the next [`Store::new`] restores the previous value or
    /// installs the new one, depending on how far the write went; the key
    /// never reads back torn or absent.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty or longer than 8 bytes.
    pub fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.set_name(key_name(key), value)
    }

    /// Associates a 32-bit value with a key, as 4 big-endian bytes.
    pub fn set_u32(&mut self, key: &str, value: u32) -> StoreResult<()> {
        let mut bytes = [0; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.set(key, &bytes)
    }

    /// Reads the value of a key.
    ///
    /// The buffer length must equal the declared length of the value;
    /// otherwise the key is reported absent.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty or longer than 8 bytes.
    pub fn get(&self, key: &str, buffer: &mut [u8]) -> StoreResult<()> {
        let name = key_name(key);
        match self.find_key(0, &name, Some(buffer.len()))? {
            None => Err(StoreError::NotFound),
            Some(offset) => {
                self.storage.read_slice(offset + ENTRY_HEADER_SIZE, buffer)?;
                Ok(())
            }
        }
    }

    /// Reads the 32-bit value of a key from its 4 big-endian bytes.
    pub fn get_u32(&self, key: &str) -> StoreResult<u32> {
        let mut bytes = [0; 4];
        self.get(key, &mut bytes)?;
        Ok(BigEndian::read_u32(&bytes))
    }

    /// Writes the live entries as text to a buffer.
    ///
    /// Each entry is a `KEY=HEX` line where `HEX` is the value in uppercase
    /// hexadecimal, two digits per byte. The output ends with a NUL byte.
    /// Returns the number of bytes written, including the NUL. Returns
    /// [`StoreError::NoCapacity`] if the buffer is too small.
    pub fn serialize(&self, buffer: &mut [u8]) -> StoreResult<usize> {
        let mut fill = 0;
        for handle in self.iter() {
            let handle = handle?;
            let (length, name) = match handle.entry {
                Entry::Set { length, name } => (length, name),
                _ => continue,
            };
            for &byte in name.iter().take_while(|&&byte| byte != 0) {
                push_byte(buffer, &mut fill, byte)?;
            }
            push_byte(buffer, &mut fill, b'=')?;
            for byte in self.value_bytes(handle.offset, length)? {
                push_byte(buffer, &mut fill, hex_digit(byte >> 4))?;
                push_byte(buffer, &mut fill, hex_digit(byte & 0x0f))?;
            }
            push_byte(buffer, &mut fill, b'\n')?;
        }
        push_byte(buffer, &mut fill, 0)?;
        Ok(fill)
    }

    /// Replaces the whole content of the store with parsed text.
    ///
    /// The input is a sequence of `KEY=HEX` segments separated by `\n`, as
    /// produced by [`Store::serialize`]; a segment is truncated at the first
    /// NUL and empty segments are skipped. The store is reinitialized first,
    /// so on failure it holds the entries of the segments preceding the
    /// offending one.
    ///
    /// Unlike [`Store::set`], this rewrite is not protected against power
    /// loss as a whole; each replayed entry is.
    pub fn deserialize(&mut self, text: &[u8]) -> StoreResult<()> {
        self.storage.write_u16(SIZE_OFFSET, self.size as u16)?;
        let gap = format::build_free(self.size - HEADER_SIZE);
        self.storage.write_slice(HEADER_SIZE, &gap)?;
        self.storage.write_u16(FORMAT_OFFSET, FORMAT)?;
        for segment in text.split(|&byte| byte == b'\n') {
            let line = match segment.iter().position(|&byte| byte == 0) {
                Some(nul) => &segment[..nul],
                None => segment,
            };
            if line.is_empty() {
                continue;
            }
            self.deserialize_line(line)?;
        }
        Ok(())
    }

    /// Parses one `KEY=HEX` line and stores it.
    fn deserialize_line(&mut self, line: &[u8]) -> StoreResult<()> {
        let equal = match line.iter().position(|&byte| byte == b'=') {
            Some(position) => position,
            None => return Err(StoreError::InvalidArgument),
        };
        if equal == 0 || equal > KEY_SIZE {
            return Err(StoreError::InvalidArgument);
        }
        let mut name = [0; KEY_SIZE];
        name[..equal].copy_from_slice(&line[..equal]);
        let digits = &line[equal + 1..];
        if digits.len() % 2 != 0 {
            return Err(StoreError::InvalidArgument);
        }
        let mut value = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks(2) {
            match (nibble(pair[0]), nibble(pair[1])) {
                (Some(high), Some(low)) => value.push(high << 4 | low),
                _ => return Err(StoreError::InvalidArgument),
            }
        }
        self.set_name(name, &value)
    }

    /// Makes the storage usable and recovers an interrupted operation.
    fn init(&mut self) -> StoreResult<()> {
        self.storage.begin()?;
        let format_tag = self.storage.read_u16(FORMAT_OFFSET)?;
        if format_tag == 0 {
            // Cleared storage. Write the format tag last: if initialization
            // is interrupted the tag stays 0 and the next store starts over.
            self.storage.write_u16(SIZE_OFFSET, self.size as u16)?;
            let gap = format::build_free(self.size - HEADER_SIZE);
            self.storage.write_slice(HEADER_SIZE, &gap)?;
            self.storage.write_u16(FORMAT_OFFSET, FORMAT)?;
        } else if format_tag != FORMAT {
            return Err(StoreError::InvalidFormat);
        } else if self.storage.read_u16(SIZE_OFFSET)? as usize != self.size {
            return Err(StoreError::InvalidFormat);
        }
        self.recover()
    }

    /// Executes the plan left by an interrupted mutation, if any.
    ///
    /// Recovery is idempotent: it only commits by clearing the plan flag at
    /// the very end, so interrupting recovery replays it identically.
    fn recover(&mut self) -> StoreResult<()> {
        let mut bytes = [0; PLAN_SIZE];
        self.storage.read_slice(PLAN_OFFSET, &mut bytes)?;
        let plan = match format::parse_plan(&bytes)? {
            None => return Ok(()),
            Some(plan) => plan,
        };
        let offset = plan.offset as usize;
        let length = plan.length as usize;
        let total = ENTRY_HEADER_SIZE + format::round_unit(length) + format::CRC_SIZE;
        if offset < HEADER_SIZE || offset + total > self.size {
            return Err(StoreError::InvalidStorage);
        }
        if self.planned_entry_ok(offset, length, plan.entry_crc)? {
            // The new entry is complete. If the entry it replaces is still
            // live, it has the same key; free it.
            let mut name = [0; KEY_SIZE];
            self.storage.read_slice(offset + ENTRY_NAME_OFFSET, &mut name)?;
            let mut found = self.find_key(0, &name, None)?;
            if found == Some(offset) {
                found = self.find_key(offset + 1, &name, None)?;
            }
            if let Some(other) = found {
                self.storage.write_byte(other + ENTRY_FLAG_OFFSET, FLAG_FREED)?;
            }
        } else {
            // The write did not complete. Give the target range back to the
            // allocator as it was before the plan.
            self.storage.write_slice(offset, &plan.restore)?;
        }
        self.storage.write_byte(PLAN_OFFSET, FLAG_FREE)?;
        Ok(())
    }

    /// Returns whether the entry at `offset` matches the planned checksum.
    ///
    /// Both the recomputed checksum and the checksum word at the tail of the
    /// entry must match for the write to count as complete.
    fn planned_entry_ok(&self, offset: usize, length: usize, expected: u32) -> StoreResult<bool> {
        let mut data = vec![0; ENTRY_HEADER_SIZE + length];
        self.storage.read_slice(offset, &mut data)?;
        let tail = self
            .storage
            .read_u32(offset + ENTRY_HEADER_SIZE + format::round_unit(length))?;
        Ok(format::crc(CRC_SEED, &data) == expected && tail == expected)
    }

    /// Stores a value under an already encoded key.
    fn set_name(&mut self, name: [u8; KEY_SIZE], value: &[u8]) -> StoreResult<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(StoreError::InvalidArgument);
        }
        let prior = self.find_key(0, &name, None)?;
        let length = ENTRY_HEADER_SIZE + format::round_unit(value.len()) + format::CRC_SIZE;
        let (offset, found) = match self.find_free_space(length)? {
            None => return Err(StoreError::NoCapacity),
            Some(found) => found,
        };

        // Split the free record. Harmless if interrupted: the old header at
        // `offset` still spans the whole record.
        if found > length {
            let gap = format::build_free(found - length);
            self.storage.write_slice(offset + length, &gap)?;
        }

        let header = format::build_entry(&name, value.len());
        let crc = format::entry_crc(&header, value);

        // Record the plan, flag byte last so that it only becomes valid once
        // completely written.
        let mut restore = [0; FREE_HEADER_SIZE];
        self.storage.read_slice(offset, &mut restore)?;
        let plan = Plan {
            offset: offset as u16,
            length: value.len() as u16,
            entry_crc: crc,
            restore,
        };
        let bytes = plan.build();
        self.storage.write_slice(PLAN_OFFSET + 1, &bytes[1..])?;
        self.storage.write_byte(PLAN_OFFSET, bytes[0])?;

        // Write the entry. The checksum word commits it.
        self.storage.write_slice(offset, &header)?;
        self.storage
            .write_slice(offset + ENTRY_HEADER_SIZE, value)?;
        self.storage
            .write_u32(offset + ENTRY_HEADER_SIZE + format::round_unit(value.len()), crc)?;

        // Free the previous entry for this key.
        if let Some(prior) = prior {
            self.storage.write_byte(prior + ENTRY_FLAG_OFFSET, FLAG_FREED)?;
        }

        // Clear the plan.
        self.storage.write_byte(PLAN_OFFSET, FLAG_FREE)?;
        Ok(())
    }

    /// Finds the first free record able to hold `needed` bytes.
    ///
    /// First fit. Returns the offset and the actual footprint of the record,
    /// so the caller can split off the remainder. A record is skipped if the
    /// remainder would be too small to hold a free-record header.
    fn find_free_space(&self, needed: usize) -> StoreResult<Option<(usize, usize)>> {
        let mut offset = HEADER_SIZE;
        while offset < self.size {
            let entry = self.read_entry(offset)?;
            let total = entry.total_bytes();
            if entry.is_free() && needed <= total {
                let extra = total - needed;
                if extra == 0 || extra >= FREE_HEADER_SIZE {
                    return Ok(Some((offset, total)));
                }
            }
            offset += total;
        }
        Ok(None)
    }

    /// Finds the first live entry with the given name at or past `start`.
    ///
    /// If `expected` is given and the declared length of the matching entry
    /// differs, the key is reported absent.
    fn find_key(
        &self,
        start: usize,
        name: &[u8; KEY_SIZE],
        expected: Option<usize>,
    ) -> StoreResult<Option<usize>> {
        let mut offset = HEADER_SIZE;
        while offset < self.size {
            let entry = self.read_entry(offset)?;
            let total = entry.total_bytes();
            if offset >= start {
                if let Entry::Set {
                    length,
                    name: entry_name,
                } = entry
                {
                    if entry_name == *name {
                        return match expected {
                            Some(size) if size != length => Ok(None),
                            _ => Ok(Some(offset)),
                        };
                    }
                }
            }
            offset += total;
        }
        Ok(None)
    }

    /// Decodes the record at `offset`.
    ///
    /// The record must fit between `offset` and the end of the store, which
    /// makes chain walks terminate exactly at the usable size.
    fn read_entry(&self, offset: usize) -> StoreResult<Entry> {
        if offset + FREE_HEADER_SIZE > self.size {
            return Err(StoreError::InvalidStorage);
        }
        let mut bytes = [0; FREE_HEADER_SIZE];
        self.storage.read_slice(offset, &mut bytes)?;
        let head = format::parse_head(&bytes);
        match head.flag {
            FLAG_FREE => {
                if head.length < FREE_HEADER_SIZE || offset + head.length > self.size {
                    return Err(StoreError::InvalidStorage);
                }
                Ok(Entry::Free { length: head.length })
            }
            FLAG_SET => {
                let total = ENTRY_HEADER_SIZE + format::round_unit(head.length) + format::CRC_SIZE;
                if offset + total > self.size {
                    return Err(StoreError::InvalidStorage);
                }
                let mut name = [0; KEY_SIZE];
                self.storage.read_slice(offset + ENTRY_NAME_OFFSET, &mut name)?;
                Ok(Entry::Set {
                    length: head.length,
                    name,
                })
            }
            FLAG_FREED => {
                let total = ENTRY_HEADER_SIZE + format::round_unit(head.length) + format::CRC_SIZE;
                if offset + total > self.size {
                    return Err(StoreError::InvalidStorage);
                }
                Ok(Entry::Freed { length: head.length })
            }
            _ => Err(StoreError::InvalidStorage),
        }
    }

    /// Reads the payload of the entry at `offset`.
    fn value_bytes(&self, offset: usize, length: usize) -> StoreResult<Vec<u8>> {
        let mut value = vec![0; length];
        self.storage.read_slice(offset + ENTRY_HEADER_SIZE, &mut value)?;
        Ok(value)
    }
}

/// Iterates over the records of a store, in chain order.
pub struct StoreIter<'a, S: Storage> {
    /// The store being walked.
    store: &'a Store<S>,

    /// Offset of the next record.
    offset: usize,

    /// Whether the walk hit an invalid record.
    failed: bool,
}

impl<'a, S: Storage> Iterator for StoreIter<'a, S> {
    type Item = StoreResult<StoreHandle>;

    fn next(&mut self) -> Option<StoreResult<StoreHandle>> {
        if self.failed || self.offset >= self.store.size {
            return None;
        }
        match self.store.read_entry(self.offset) {
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
            Ok(entry) => {
                let handle = StoreHandle {
                    offset: self.offset,
                    entry,
                };
                self.offset += handle.entry.total_bytes();
                Some(Ok(handle))
            }
        }
    }
}

/// Points to a record of the store.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    /// Offset of the record.
    offset: usize,

    /// Decoded record.
    entry: Entry,
}

impl StoreHandle {
    /// The offset of the record in the store.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The number of bytes the record occupies.
    pub fn total_bytes(&self) -> usize {
        self.entry.total_bytes()
    }

    /// Whether the record is a live entry, visible to lookups.
    pub fn is_live(&self) -> bool {
        matches!(self.entry, Entry::Set { .. })
    }

    /// Whether the record is a tombstone left by an overwrite.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.entry, Entry::Freed { .. })
    }

    /// Whether the record is a free gap.
    pub fn is_gap(&self) -> bool {
        matches!(self.entry, Entry::Free { .. })
    }

    /// The key of a live entry, zero-padded to 8 bytes.
    pub fn key(&self) -> Option<[u8; KEY_SIZE]> {
        match self.entry {
            Entry::Set { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The declared value length of a live entry.
    pub fn length(&self) -> Option<usize> {
        match self.entry {
            Entry::Set { length, .. } => Some(length),
            _ => None,
        }
    }

    /// Reads the value of a live entry.
    pub fn get_value<S: Storage>(&self, store: &Store<S>) -> StoreResult<Vec<u8>> {
        match self.entry {
            Entry::Set { length, .. } => store.value_bytes(self.offset, length),
            _ => Err(StoreError::InvalidArgument),
        }
    }
}

/// Encodes a key into the fixed-width name field.
///
/// # Panics
///
/// Panics if the key is empty or longer than the field. A name whose first
/// byte is zero would read back as a free record, so empty keys cannot be
/// represented.
fn key_name(key: &str) -> [u8; KEY_SIZE] {
    let bytes = key.as_bytes();
    assert!(!bytes.is_empty() && bytes.len() <= KEY_SIZE);
    let mut name = [0; KEY_SIZE];
    name[..bytes.len()].copy_from_slice(bytes);
    name
}

/// Appends a byte to a buffer being filled.
fn push_byte(buffer: &mut [u8], fill: &mut usize, byte: u8) -> StoreResult<()> {
    if *fill == buffer.len() {
        return Err(StoreError::NoCapacity);
    }
    buffer[*fill] = byte;
    *fill += 1;
    Ok(())
}

/// The uppercase hexadecimal digit of a nibble.
fn hex_digit(nibble: u8) -> u8 {
    match nibble {
        0..=9 => b'0' + nibble,
        _ => b'A' + nibble - 10,
    }
}

/// The value of a hexadecimal digit.
fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
