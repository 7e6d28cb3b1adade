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

//! NVRAM storage for testing.
//!
//! [`BufferStorage`] implements the byte-addressable [`Storage`] interface
//! but doesn't interface with an actual non-volatile memory. Instead it uses
//! a buffer in memory to represent the storage state.

use crate::{Storage, StorageError, StorageResult};
use alloc::boxed::Box;

/// Simulates a byte-addressable NVRAM using a buffer in memory.
///
/// This storage can be used in place of an actual device. It is particularly
/// useful for tests and fuzzing, for which it has dedicated functionalities.
///
/// Writes can be interrupted after a chosen number of bytes, simulating a
/// power loss in the middle of an operation: the affected write keeps its
/// prefix up to the budget, reports an error, and the storage refuses further
/// writes until the interruption is reset.
#[derive(Clone, Debug)]
pub struct BufferStorage {
    /// Content of the storage.
    storage: Box<[u8]>,

    /// Interruption state.
    interruption: Interruption,

    /// Total number of bytes written so far.
    write_count: usize,
}

impl BufferStorage {
    /// Creates a buffer storage over its initial content.
    ///
    /// A zeroed buffer behaves like a blank device: the first
    /// [`begin`](Storage::begin) resets it and writes the magic marker.
    pub fn new(storage: Box<[u8]>) -> BufferStorage {
        BufferStorage {
            storage,
            interruption: Interruption::Ready,
            write_count: 0,
        }
    }

    /// Arms an interruption after a write budget of `delay` bytes.
    ///
    /// Subsequent writes decrement the budget. The write that would exceed it
    /// keeps only its first remaining bytes and fails. Writes after that
    /// panic until the interruption is [reset](BufferStorage::reset_interruption).
    ///
    /// # Panics
    ///
    /// Panics if an interruption is already armed.
    pub fn arm_interruption(&mut self, delay: usize) {
        match self.interruption {
            Interruption::Ready => self.interruption = Interruption::Armed { delay },
            _ => panic!("interruption already armed"),
        }
    }

    /// Disarms an interruption that did not trigger.
    ///
    /// Returns the remaining write budget.
    ///
    /// # Panics
    ///
    /// Panics if an interruption was not armed or has triggered.
    pub fn disarm_interruption(&mut self) -> usize {
        match self.interruption {
            Interruption::Armed { delay } => {
                self.interruption = Interruption::Ready;
                delay
            }
            _ => panic!("interruption not armed or already triggered"),
        }
    }

    /// Resets an interruption regardless of triggering.
    ///
    /// # Panics
    ///
    /// Panics if an interruption was not armed.
    pub fn reset_interruption(&mut self) {
        match self.interruption {
            Interruption::Ready => panic!("interruption not armed"),
            _ => self.interruption = Interruption::Ready,
        }
    }

    /// Returns the total number of bytes written to the storage.
    ///
    /// Interrupted writes count only the bytes actually kept.
    pub fn write_count(&self) -> usize {
        self.write_count
    }
}

impl Storage for BufferStorage {
    fn len(&self) -> usize {
        self.storage.len()
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> StorageResult<()> {
        match self.storage.get(offset..offset + buffer.len()) {
            None => Err(StorageError::OutOfBounds),
            Some(slice) => {
                buffer.copy_from_slice(slice);
                Ok(())
            }
        }
    }

    fn write(&mut self, offset: usize, value: &[u8]) -> StorageResult<()> {
        let budget = match self.interruption {
            Interruption::Ready => None,
            Interruption::Armed { delay } => Some(delay),
            Interruption::Triggered => panic!("write after power loss"),
        };
        let slice = match self.storage.get_mut(offset..offset + value.len()) {
            None => return Err(StorageError::OutOfBounds),
            Some(slice) => slice,
        };
        match budget {
            Some(delay) if delay < value.len() => {
                // Power loss in the middle of this write: keep the prefix.
                slice[..delay].copy_from_slice(&value[..delay]);
                self.write_count += delay;
                self.interruption = Interruption::Triggered;
                Err(StorageError::CustomError)
            }
            _ => {
                slice.copy_from_slice(value);
                self.write_count += value.len();
                if let Some(delay) = budget {
                    self.interruption = Interruption::Armed {
                        delay: delay - value.len(),
                    };
                }
                Ok(())
            }
        }
    }
}

impl core::fmt::Display for BufferStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        for (index, chunk) in self.storage.chunks(16).enumerate() {
            write!(f, "{:04x}:", 16 * index)?;
            for byte in chunk {
                write!(f, " {:02x}", byte)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Controls when a write is interrupted.
///
/// This can be used to simulate power loss while the device is writing to
/// the storage.
#[derive(Clone, Debug)]
enum Interruption {
    /// Writes have normal behavior.
    Ready,

    /// Writes decrement the budget. A write exceeding it keeps only its
    /// prefix and fails.
    Armed { delay: usize },

    /// Writes panic.
    Triggered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAGIC_SIZE, Storage};

    fn new_storage(len: usize) -> BufferStorage {
        BufferStorage::new(vec![0; len].into_boxed_slice())
    }

    #[test]
    fn read_write_ok() {
        let mut storage = new_storage(64);
        storage.write(8, &[0x5c; 4]).unwrap();
        let mut bytes = [0; 6];
        storage.read(7, &mut bytes).unwrap();
        assert_eq!(bytes, [0, 0x5c, 0x5c, 0x5c, 0x5c, 0]);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let mut storage = new_storage(64);
        let mut bytes = [0; 4];
        assert_eq!(storage.read(61, &mut bytes), Err(StorageError::OutOfBounds));
        assert_eq!(storage.write(64, &[1]), Err(StorageError::OutOfBounds));
        assert_eq!(storage.read(64, &mut []), Ok(()));
    }

    #[test]
    fn begin_writes_magic_once() {
        let mut storage = new_storage(64);
        assert!(!storage.is_magic_set().unwrap());
        storage.begin().unwrap();
        assert!(storage.is_magic_set().unwrap());
        assert_eq!(storage.size(), 64 - MAGIC_SIZE);

        // A later begin must not clear the content.
        storage.write_slice(0, &[0xa7; 4]).unwrap();
        storage.begin().unwrap();
        let mut bytes = [0; 4];
        storage.read_slice(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0xa7; 4]);
    }

    #[test]
    fn reset_store_clears_content() {
        let mut storage = new_storage(256);
        storage.begin().unwrap();
        storage.write_slice(100, &[0x42; 8]).unwrap();
        storage.reset_store().unwrap();
        assert!(storage.is_magic_set().unwrap());
        let mut bytes = [0; 8];
        storage.read_slice(100, &mut bytes).unwrap();
        assert_eq!(bytes, [0; 8]);
    }

    #[test]
    fn big_endian_helpers_ok() {
        let mut storage = new_storage(64);
        storage.write_u32(0, 0x0102_0304).unwrap();
        storage.write_u16(4, 0x0506).unwrap();
        storage.write_byte(6, 0x07).unwrap();
        let mut bytes = [0; 7];
        storage.read_slice(0, &mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(storage.read_u32(0).unwrap(), 0x0102_0304);
        assert_eq!(storage.read_u16(4).unwrap(), 0x0506);
        assert_eq!(storage.read_byte(6).unwrap(), 0x07);
    }

    #[test]
    fn interrupt_delay_ok() {
        let mut storage = new_storage(64);
        storage.arm_interruption(10);
        storage.write(0, &[0x5c; 8]).unwrap();
        assert_eq!(storage.disarm_interruption(), 2);
        assert_eq!(storage.write_count(), 8);
    }

    #[test]
    fn interrupt_keeps_prefix() {
        let mut storage = new_storage(64);
        storage.arm_interruption(3);
        assert_eq!(storage.write(0, &[0x5c; 8]), Err(StorageError::CustomError));
        let mut bytes = [0; 8];
        storage.read(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0x5c, 0x5c, 0x5c, 0, 0, 0, 0, 0]);
        assert_eq!(storage.write_count(), 3);
        storage.reset_interruption();
        storage.write(0, &[0x93; 8]).unwrap();
    }

    #[test]
    #[should_panic]
    fn write_after_trigger_panics() {
        let mut storage = new_storage(64);
        storage.arm_interruption(0);
        let _ = storage.write(0, &[0x5c; 8]);
        let _ = storage.write(8, &[0x5c; 8]);
    }

    #[test]
    #[should_panic]
    fn disarm_after_trigger_panics() {
        let mut storage = new_storage(64);
        storage.arm_interruption(0);
        let _ = storage.write(0, &[0x5c; 8]);
        storage.disarm_interruption();
    }
}
