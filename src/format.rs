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

use crate::{StoreError, StoreResult};
use byteorder::{BigEndian, ByteOrder};

/// Version tag of the on-media layout.
///
/// A store whose header carries the tag 0 is freshly cleared and not yet
/// initialized. Any other value than `FORMAT` is from a different layout.
pub(crate) const FORMAT: u16 = 1;

/// Alignment in bytes of entry payloads.
pub(crate) const UNIT: usize = 4;

/// Size in bytes of the fixed key field.
pub(crate) const KEY_SIZE: usize = 8;

/// Size in bytes of an entry checksum.
pub(crate) const CRC_SIZE: usize = 4;

/// Seed of all checksums.
pub(crate) const CRC_SEED: u32 = 0xa5a5;

/// Size in bytes of the header of a named entry.
///
/// The header is the size field (2 bytes), the status field (2 bytes), and
/// the key field. It is followed by the payload, the padding, and the
/// checksum.
pub(crate) const ENTRY_HEADER_SIZE: usize = 2 + 2 + KEY_SIZE;

/// Size in bytes of the header of a free record.
///
/// Free records only store their size and status fields. Their gap length is
/// at least this size so that the header itself fits in the gap.
pub(crate) const FREE_HEADER_SIZE: usize = 4;

/// Size in bytes of the write-ahead plan.
pub(crate) const PLAN_SIZE: usize = 18;

/// Size in bytes of the store header.
pub(crate) const HEADER_SIZE: usize = 2 + 2 + PLAN_SIZE;

/// Offset of the format field in the store header.
pub(crate) const FORMAT_OFFSET: usize = 0;

/// Offset of the size field in the store header.
pub(crate) const SIZE_OFFSET: usize = 2;

/// Offset of the plan in the store header.
///
/// The plan starts with its flag byte, which is also the byte that commits
/// and clears it.
pub(crate) const PLAN_OFFSET: usize = 4;

/// Offset of the status flag within an entry.
///
/// Only the first status byte is the flag; the second is reserved.
pub(crate) const ENTRY_FLAG_OFFSET: usize = 2;

/// Offset of the key field within a named entry.
pub(crate) const ENTRY_NAME_OFFSET: usize = 4;

/// Number of plan bytes covered by the plan checksum.
const PLAN_CRC_OFFSET: usize = 14;

/// Status flag of a free record.
pub(crate) const FLAG_FREE: u8 = 0;

/// Status flag of a live entry.
pub(crate) const FLAG_SET: u8 = 1;

/// Status flag of a tombstone.
///
/// Tombstones keep the footprint of the live entry they replace, so their
/// size field is still a payload length.
pub(crate) const FLAG_FREED: u8 = 2;

/// Maximum length in bytes of a value.
///
/// Bounds the on-media footprint of an entry to a 16-bit length.
pub(crate) const MAX_VALUE_LEN: usize = 0xffff - (ENTRY_HEADER_SIZE + CRC_SIZE + UNIT - 1);

/// Computes the checksum of a byte slice.
///
/// Folds each byte into a 32-bit accumulator with a shift-and-feedback step.
/// This is not a cryptographic digest; it only needs to catch the truncations
/// and partial writes left by an interrupted operation.
pub(crate) fn crc(seed: u32, bytes: &[u8]) -> u32 {
    let mut crc = seed;
    for &byte in bytes {
        crc ^= byte as u32;
        crc <<= 4;
        crc ^= crc >> 24;
    }
    crc
}

/// Rounds a length up to the payload alignment.
pub(crate) fn round_unit(length: usize) -> usize {
    (length + UNIT - 1) / UNIT * UNIT
}

/// Logical view of a record of the entry chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    /// A gap of `length` bytes, including its own 4 header bytes.
    Free {
        /// The gap length, taken verbatim from the size field.
        length: usize,
    },

    /// A live entry holding the value of a key.
    Set {
        /// The declared payload length.
        length: usize,

        /// The key, zero-padded to the key field width.
        name: [u8; KEY_SIZE],
    },

    /// A tombstone left by an overwrite.
    Freed {
        /// The payload length of the entry before it was freed.
        length: usize,
    },
}

impl Entry {
    /// The number of bytes this record occupies in the chain.
    ///
    /// Free records encode their footprint directly in their size field.
    /// Named records (live or freed) derive it from their payload length.
    pub fn total_bytes(&self) -> usize {
        match *self {
            Entry::Free { length } => length,
            Entry::Set { length, .. } | Entry::Freed { length } => {
                ENTRY_HEADER_SIZE + round_unit(length) + CRC_SIZE
            }
        }
    }

    /// Whether this record may be reused by the allocator.
    pub fn is_free(&self) -> bool {
        !matches!(self, Entry::Set { .. })
    }
}

/// First 4 bytes of a record: the size field and the status flag.
pub(crate) struct RawHead {
    /// The size field. Its meaning depends on the flag.
    pub length: usize,

    /// The first status byte.
    pub flag: u8,
}

/// Parses the size and status fields of a record.
pub(crate) fn parse_head(bytes: &[u8; FREE_HEADER_SIZE]) -> RawHead {
    RawHead {
        length: BigEndian::read_u16(&bytes[..2]) as usize,
        flag: bytes[ENTRY_FLAG_OFFSET],
    }
}

/// Builds the header of a free record of `length` bytes.
pub(crate) fn build_free(length: usize) -> [u8; FREE_HEADER_SIZE] {
    debug_assert!(length <= 0xffff);
    let mut bytes = [0; FREE_HEADER_SIZE];
    BigEndian::write_u16(&mut bytes[..2], length as u16);
    bytes[ENTRY_FLAG_OFFSET] = FLAG_FREE;
    bytes
}

/// Builds the header of a live entry.
pub(crate) fn build_entry(name: &[u8; KEY_SIZE], length: usize) -> [u8; ENTRY_HEADER_SIZE] {
    debug_assert!(length <= MAX_VALUE_LEN);
    let mut bytes = [0; ENTRY_HEADER_SIZE];
    BigEndian::write_u16(&mut bytes[..2], length as u16);
    bytes[ENTRY_FLAG_OFFSET] = FLAG_SET;
    bytes[ENTRY_NAME_OFFSET..].copy_from_slice(name);
    bytes
}

/// Computes the checksum of an entry as stored.
///
/// Covers the header and the payload, but not the padding.
pub(crate) fn entry_crc(header: &[u8; ENTRY_HEADER_SIZE], value: &[u8]) -> u32 {
    crc(crc(CRC_SEED, header), value)
}

/// The write-ahead plan of a mutation in flight.
///
/// The plan records where the new entry goes, which checksum proves it was
/// written completely, and the 4 bytes needed to give the target range back
/// to the allocator if it was not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Plan {
    /// Offset of the new entry.
    pub offset: u16,

    /// Declared payload length of the new entry.
    pub length: u16,

    /// Expected checksum of the new entry.
    pub entry_crc: u32,

    /// The size and status fields that lived at `offset` before the plan.
    pub restore: [u8; FREE_HEADER_SIZE],
}

/// Parses a plan from its storage representation.
///
/// Returns `None` for an empty plan: either the flag byte says so or the
/// plan checksum does not validate (the plan was never completely written).
pub(crate) fn parse_plan(bytes: &[u8; PLAN_SIZE]) -> StoreResult<Option<Plan>> {
    let checksum = BigEndian::read_u32(&bytes[PLAN_CRC_OFFSET..]);
    if bytes[0] == FLAG_FREE || crc(CRC_SEED, &bytes[..PLAN_CRC_OFFSET]) != checksum {
        return Ok(None);
    }
    if bytes[0] != FLAG_SET {
        // A valid checksum over an unknown kind of plan cannot come from this
        // layout version.
        return Err(StoreError::InvalidStorage);
    }
    Ok(Some(Plan {
        offset: BigEndian::read_u16(&bytes[2..4]),
        length: BigEndian::read_u16(&bytes[4..6]),
        entry_crc: BigEndian::read_u32(&bytes[6..10]),
        restore: [bytes[10], bytes[11], bytes[12], bytes[13]],
    }))
}

impl Plan {
    /// Builds the storage representation of the plan.
    ///
    /// The first byte is the flag. Writing everything but the flag first and
    /// the flag last guarantees a plan is never observed valid before it is
    /// completely written.
    pub fn build(&self) -> [u8; PLAN_SIZE] {
        let mut bytes = [0; PLAN_SIZE];
        bytes[0] = FLAG_SET;
        BigEndian::write_u16(&mut bytes[2..4], self.offset);
        BigEndian::write_u16(&mut bytes[4..6], self.length);
        BigEndian::write_u32(&mut bytes[6..10], self.entry_crc);
        bytes[10..14].copy_from_slice(&self.restore);
        let checksum = crc(CRC_SEED, &bytes[..PLAN_CRC_OFFSET]);
        BigEndian::write_u32(&mut bytes[PLAN_CRC_OFFSET..], checksum);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sizes_ok() {
        assert_eq!(ENTRY_HEADER_SIZE, 12);
        assert_eq!(HEADER_SIZE, 22);
        assert_eq!(PLAN_SIZE, 18);
        assert_eq!(PLAN_OFFSET + PLAN_SIZE, HEADER_SIZE);
    }

    #[test]
    fn round_unit_ok() {
        assert_eq!(round_unit(0), 0);
        assert_eq!(round_unit(1), 4);
        assert_eq!(round_unit(4), 4);
        assert_eq!(round_unit(5), 8);
        assert_eq!(round_unit(14), 16);
    }

    #[test]
    fn crc_detects_truncation_and_flips() {
        let bytes = b"parameter";
        let checksum = crc(CRC_SEED, bytes);
        assert_eq!(checksum, crc(CRC_SEED, bytes));
        assert_ne!(checksum, crc(CRC_SEED, &bytes[..8]));
        let mut flipped = *bytes;
        flipped[3] ^= 0x01;
        assert_ne!(checksum, crc(CRC_SEED, &flipped));
    }

    #[test]
    fn total_bytes_distinguishes_free_and_named() {
        // The same size field means a footprint for free records and a
        // payload length for named records.
        assert_eq!(Entry::Free { length: 40 }.total_bytes(), 40);
        let name = *b"named\0\0\0";
        assert_eq!(Entry::Set { length: 40, name }.total_bytes(), 12 + 40 + 4);
        assert_eq!(Entry::Freed { length: 14 }.total_bytes(), 12 + 16 + 4);
        assert_eq!(Entry::Set { length: 0, name }.total_bytes(), 16);
    }

    #[test]
    fn head_roundtrip_ok() {
        let head = parse_head(&build_free(1978));
        assert_eq!(head.length, 1978);
        assert_eq!(head.flag, FLAG_FREE);

        let entry = build_entry(b"config\0\0", 14);
        let head = parse_head(&[entry[0], entry[1], entry[2], entry[3]]);
        assert_eq!(head.length, 14);
        assert_eq!(head.flag, FLAG_SET);
        assert_eq!(&entry[ENTRY_NAME_OFFSET..], b"config\0\0");
    }

    #[test]
    fn entry_crc_covers_header_and_payload() {
        let header = build_entry(b"key\0\0\0\0\0", 3);
        let checksum = entry_crc(&header, b"abc");
        assert_ne!(checksum, entry_crc(&header, b"abd"));
        assert_ne!(checksum, entry_crc(&header, b"ab"));
    }

    #[test]
    fn crc_misses_some_early_flips() {
        // The shift folds early bytes out of the accumulator, so a flip
        // followed by enough bytes can cancel out. Interrupted writes
        // truncate instead, which is what the checksum has to catch.
        let checksum = entry_crc(&build_entry(b"key\0\0\0\0\0", 3), b"abc");
        assert_eq!(checksum, entry_crc(&build_entry(b"kez\0\0\0\0\0", 3), b"abc"));
    }

    #[test]
    fn plan_roundtrip_ok() {
        let plan = Plan {
            offset: 0x0123,
            length: 14,
            entry_crc: 0xdead_beef,
            restore: [0x07, 0xba, 0x00, 0x00],
        };
        let bytes = plan.build();
        assert_eq!(bytes.len(), PLAN_SIZE);
        assert_eq!(bytes[0], FLAG_SET);
        assert_eq!(parse_plan(&bytes), Ok(Some(plan)));
    }

    #[test]
    fn plan_empty_when_flag_clear() {
        let mut bytes = Plan {
            offset: 30,
            length: 4,
            entry_crc: 17,
            restore: [0; 4],
        }
        .build();
        bytes[0] = FLAG_FREE;
        // Clearing only the flag empties the plan, stale bytes included.
        assert_eq!(parse_plan(&bytes), Ok(None));
    }

    #[test]
    fn plan_empty_when_checksum_invalid() {
        let mut bytes = Plan {
            offset: 30,
            length: 4,
            entry_crc: 17,
            restore: [0; 4],
        }
        .build();
        // Damage to the tail of the covered bytes is reliably caught; early
        // flips may shift out of the weak checksum (see
        // crc_misses_some_early_flips).
        for index in 8..PLAN_CRC_OFFSET {
            let mut torn = bytes;
            torn[index] ^= 0x10;
            assert_eq!(parse_plan(&torn), Ok(None));
        }
        bytes[PLAN_SIZE - 1] ^= 0x10;
        assert_eq!(parse_plan(&bytes), Ok(None));
    }

    #[test]
    fn plan_unknown_kind_is_invalid() {
        let mut bytes = Plan {
            offset: 30,
            length: 4,
            entry_crc: 17,
            restore: [0; 4],
        }
        .build();
        bytes[0] = 3;
        let checksum = crc(CRC_SEED, &bytes[..PLAN_CRC_OFFSET]);
        BigEndian::write_u32(&mut bytes[PLAN_CRC_OFFSET..], checksum);
        assert_eq!(parse_plan(&bytes), Err(StoreError::InvalidStorage));
    }
}
