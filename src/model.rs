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

//! Store specification.

use std::collections::HashMap;

/// Models the content of a store.
///
/// The model doesn't simulate the storage, the allocator, or read-only
/// operations. This is done by the [driver](crate::StoreDriver).
#[derive(Clone, Debug, Default)]
pub struct StoreModel {
    /// Represents the content of the store.
    content: HashMap<String, Vec<u8>>,
}

impl StoreModel {
    /// Creates an empty model.
    pub fn new() -> StoreModel {
        StoreModel::default()
    }

    /// Returns the modeled content.
    pub fn content(&self) -> &HashMap<String, Vec<u8>> {
        &self.content
    }

    /// Simulates a successful write.
    pub fn set(&mut self, key: &str, value: &[u8]) {
        self.content.insert(key.to_string(), value.to_vec());
    }

    /// Returns the modeled value of a key.
    pub fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.content.get(key)
    }
}
