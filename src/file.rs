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

//! File-backed NVRAM storage.
//!
//! [`FileStorage`] implements the byte-addressable [`Storage`] interface but
//! doesn't interface with an actual non-volatile memory. Instead it uses a
//! host-based file to persist the storage state.

use crate::{BufferStorage, Storage, StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Simulates a byte-addressable NVRAM using a host-based file.
///
/// It provides the same functions as [`BufferStorage`] for testing, but also
/// saves stored data between application restarts.
#[derive(Debug)]
pub struct FileStorage {
    /// Content of the storage.
    storage: BufferStorage,

    /// File to persist contents of the storage.
    backing_file: File,
}

/// Size in bytes of the simulated region, magic marker included.
const REGION_SIZE: usize = 0x800;

impl From<std::io::Error> for StorageError {
    fn from(_: std::io::Error) -> StorageError {
        StorageError::CustomError
    }
}

impl FileStorage {
    pub fn new(path: &Path) -> StorageResult<FileStorage> {
        let mut storage = BufferStorage::new(vec![0; REGION_SIZE].into_boxed_slice());

        let mut backing_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_len = backing_file.metadata()?.len();

        if file_len == 0 {
            backing_file.set_len(REGION_SIZE as u64)?;
            backing_file.seek(SeekFrom::Start(0))?;
            backing_file.write_all(&vec![0; REGION_SIZE])?;
        } else if file_len == REGION_SIZE as u64 {
            backing_file.seek(SeekFrom::Start(0))?;
            let mut content = vec![0; REGION_SIZE];
            backing_file.read_exact(&mut content)?;
            storage.write(0, &content)?;
        } else {
            // The simulated region has a fixed size. Opening a file saved
            // from a region of a different size is not supported.
            panic!("Invalid file size {}, should be {}", file_len, REGION_SIZE);
        }
        Ok(FileStorage {
            storage,
            backing_file,
        })
    }
}

impl Storage for FileStorage {
    fn len(&self) -> usize {
        self.storage.len()
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> StorageResult<()> {
        self.storage.read(offset, buffer)
    }

    fn write(&mut self, offset: usize, value: &[u8]) -> StorageResult<()> {
        self.backing_file.seek(SeekFrom::Start(offset as u64))?;
        self.backing_file.write_all(value)?;
        self.storage.write(offset, value)
    }
}

impl core::fmt::Display for FileStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        self.storage.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const FILE_NAME: &str = "parameter_storage.bin";

    fn make_tmp_dir() -> PathBuf {
        let tmp_dir = TempDir::new().unwrap();
        tmp_dir.into_path()
    }

    fn remove_tmp_dir(tmp_dir: PathBuf) {
        std::fs::remove_dir_all(tmp_dir).unwrap();
    }

    fn temp_storage(tmp_dir: &PathBuf) -> FileStorage {
        let mut tmp_file = tmp_dir.clone();
        tmp_file.push(FILE_NAME);
        FileStorage::new(&tmp_file).unwrap()
    }

    #[test]
    fn read_write_persist_ok() {
        let tmp_dir = make_tmp_dir();
        {
            let mut file_storage = temp_storage(&tmp_dir);
            file_storage.write(8, &[0xee, 0xdd, 0xbb, 0x77]).unwrap();
            let mut bytes = [0; 4];
            file_storage.read(8, &mut bytes).unwrap();
            assert_eq!(bytes, [0xee, 0xdd, 0xbb, 0x77]);
        }
        // Reload and check the data from the previously persisted storage.
        {
            let file_storage = temp_storage(&tmp_dir);
            let mut bytes = [0; 4];
            file_storage.read(8, &mut bytes).unwrap();
            assert_eq!(bytes, [0xee, 0xdd, 0xbb, 0x77]);
        }
        remove_tmp_dir(tmp_dir);
    }

    #[test]
    fn store_survives_restart() {
        let tmp_dir = make_tmp_dir();
        {
            let mut store = Store::new(temp_storage(&tmp_dir)).unwrap();
            store.set("boot", b"count").unwrap();
            store.set_u32("cycles", 17).unwrap();
        }
        {
            let store = Store::new(temp_storage(&tmp_dir)).unwrap();
            let mut value = [0; 5];
            store.get("boot", &mut value).unwrap();
            assert_eq!(&value, b"count");
            assert_eq!(store.get_u32("cycles").unwrap(), 17);
        }
        remove_tmp_dir(tmp_dir);
    }
}
