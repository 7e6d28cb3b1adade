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

use crate::{BufferStorage, Store, StoreDriverOff};

#[derive(Clone)]
pub struct Config {
    /// Size in bytes of the physical region, magic marker included.
    pub len: usize,
}

impl Config {
    pub fn new_driver(&self) -> StoreDriverOff {
        StoreDriverOff::new(self.len)
    }

    pub fn new_store(&self) -> Store<BufferStorage> {
        self.new_driver().power_on().unwrap().extract_store()
    }
}

pub const MINIMAL: Config = Config { len: 64 };

/// A couple of kilobytes, the size class of a small FRAM part.
pub const TYPICAL: Config = Config { len: 2004 };

#[test]
fn minimal_capacity() {
    // Usable size 60, initial gap 38: an 8-word footprint plus a 6-byte
    // unusable tail, which leaves room for a 16-byte value.
    let store = MINIMAL.new_store();
    assert_eq!(store.size(), 60);
    assert_eq!(store.capacity().unwrap(), 16);
}

#[test]
fn typical_capacity() {
    let store = TYPICAL.new_store();
    assert_eq!(store.size(), 2000);
    assert_eq!(store.capacity().unwrap(), 1956);
}

#[test]
fn capacity_tracks_allocation() {
    let mut store = TYPICAL.new_store();
    store.set("named", &[0x5c; 14]).unwrap();
    // The 32-byte footprint of the new entry comes out of the initial gap.
    assert_eq!(store.capacity().unwrap(), 1956 - 32);
}
