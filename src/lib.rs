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

//! Parameter store for byte-addressable NVRAM
//!
//! # Specification
//!
//! The [store](Store) provides a partial function from keys to values on top
//! of a byte-addressable [storage](Storage) interface (FRAM, battery-backed
//! SRAM, EEPROM emulations), sized in the low thousands of bytes. Mutable
//! operations are atomic with respect to power loss: at any interruption
//! point, the next start reconstructs a state where each key holds either its
//! previous value or its new value, never a torn or absent one.
//!
//! ## Definitions
//!
//! An _entry_ is a pair of a key and a value. A _key_ is a string of 1 to 8
//! bytes. A _value_ is a byte slice whose declared length is part of the
//! entry: reading a key back requires its exact length.
//!
//! The store provides the following operations:
//! -   Given a key and a value, [`Store::set`] updates the store such that
//!     the value is associated with the key. The values of other keys are
//!     left unchanged. [`Store::set_u32`] stores a 32-bit integer as its 4
//!     big-endian bytes.
//! -   Given a key, [`Store::get`] reads the associated value into a buffer
//!     of its exact length. [`Store::get_u32`] reads a 32-bit integer back.
//! -   [`Store::serialize`] writes all entries as `KEY=HEX` text lines, and
//!     [`Store::deserialize`] replaces the whole content from such text.
//! -   [`Store::iter`] enumerates the records of the store in chain order,
//!     and [`Store::capacity`] returns the largest value length that can be
//!     stored without freeing anything.
//!
//! There is no delete operation: keys are dropped only by rewriting the
//! whole store through [`Store::deserialize`].
//!
//! ## Preconditions
//!
//! The store relies on the following storage interface:
//! -   The region is randomly byte-addressable for both reads and writes,
//!     with no erase cycle and no practical write wear (FRAM-class parts).
//! -   A write call that returned has been committed durably.
//! -   A write call interrupted by power loss may leave any subset of the
//!     affected range modified; bytes outside the range are untouched.
//! -   Reads are deterministic and observe previously completed writes.
//!
//! The store assumes sole ownership of the region. There is no concurrent
//! access model: operations are serialized by the caller and never suspend.
//!
//! # Implementation
//!
//! The physical region starts with a 4-byte magic marker; the store
//! addresses the _usable_ region after it. The usable region is a 22-byte
//! header followed by a chain of variable-length records that exactly
//! partitions the remaining space:
//!
//! | offset | size | field                                  |
//! | ------:| ----:| -------------------------------------- |
//! | 0      | 2    | layout version tag (1, or 0 if blank)  |
//! | 2      | 2    | usable size at initialization          |
//! | 4      | 18   | write-ahead plan                       |
//!
//! A record starts with a 2-byte size field and a 2-byte status field whose
//! first byte is the flag. A _free_ record (flag 0) spans the number of
//! bytes given by its size field, its own 4 header bytes included. A _named_
//! record (flag 1 live, flag 2 freed) interprets the size field as a payload
//! length N and spans a 12-byte header (size, status, 8-byte zero-padded
//! key), N payload bytes, padding to the next 4-byte boundary, and a 4-byte
//! checksum of the header and payload. The same size field thus measures two
//! different things depending on the flag, which is what lets the allocator
//! walk the chain by summing record footprints.
//!
//! A [`Store::set`] allocates first-fit from the free records (splitting off
//! the remainder as a new free record), then writes in order: the plan body,
//! the plan flag, the entry, a tombstone flag over the previous entry of the
//! key, and a zero over the plan flag. The plan records the target offset,
//! the declared length, the expected entry checksum, the 4 bytes the target
//! range held before, and a checksum of the plan itself:
//!
//! | offset | size | field                                     |
//! | ------:| ----:| ----------------------------------------- |
//! | 0      | 1    | flag (0 free, 1 set in flight)            |
//! | 1      | 1    | reserved                                  |
//! | 2      | 2    | offset of the new entry                   |
//! | 4      | 2    | declared value length                     |
//! | 6      | 4    | expected entry checksum                   |
//! | 10     | 4    | previous size and status bytes at offset  |
//! | 14     | 4    | plan checksum over the 14 previous bytes  |
//!
//! Building a [`Store`] runs recovery: a plan whose flag and checksum are
//! valid describes an interrupted write. If the entry at the planned offset
//! matches the planned checksum (recomputed over its bytes and read from its
//! tail), the write is kept and any other live entry with the same key is
//! tombstoned; otherwise the saved 4 bytes are written back, which gives the
//! range back to the allocator exactly as it was. Either way the plan is
//! cleared by zeroing its flag byte. This single-byte commit also makes
//! recovery idempotent when it is itself interrupted.
//!
//! Checksums use a 32-bit fold (xor byte, shift left 4, feed back the top
//! byte) seeded with 0xA5A5. This is not cryptographic; detecting the
//! truncations and partial writes of an interrupted operation is the only
//! requirement.
//!
//! # Testing
//!
//! With the `std` feature, [`BufferStorage`] simulates a device whose writes
//! can be interrupted after a chosen number of bytes, [`FileStorage`]
//! persists the region in a host file, and [`StoreDriver`] replays
//! operations against a [`StoreModel`] while checking the store invariants
//! after every step and every simulated power loss. The `fuzz` directory
//! drives random operation and interruption sequences through the same
//! driver.

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
mod buffer;
#[cfg(feature = "std")]
mod driver;
#[cfg(feature = "std")]
mod file;
mod format;
#[cfg(feature = "std")]
mod model;
mod storage;
mod store;
#[cfg(test)]
mod test;

#[cfg(feature = "std")]
pub use self::buffer::BufferStorage;
#[cfg(feature = "std")]
pub use self::driver::{
    StoreDriver, StoreDriverOff, StoreDriverOn, StoreInterruption, StoreInvariant,
};
#[cfg(feature = "std")]
pub use self::file::FileStorage;
#[cfg(feature = "std")]
pub use self::model::StoreModel;
pub use self::storage::{Storage, StorageError, StorageResult, MAGIC, MAGIC_SIZE};
pub use self::store::{Store, StoreError, StoreHandle, StoreIter, StoreResult};
