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

//! Store wrapper for testing.
//!
//! [`StoreDriver`] wraps a [`Store`] and compares its behavior with its
//! associated [`StoreModel`], including across simulated power losses.

use crate::format::{FLAG_FREE, PLAN_OFFSET};
use crate::{BufferStorage, Storage, Store, StoreError, StoreModel};
use std::collections::HashMap;

/// Tracks the store behavior against its model and its storage.
#[derive(Clone)]
pub enum StoreDriver {
    /// When the store is running.
    On(StoreDriverOn),

    /// When the store is off.
    Off(StoreDriverOff),
}

/// Keeps a power-on store and its model in sync.
#[derive(Clone)]
pub struct StoreDriverOn {
    /// The store being tracked.
    store: Store<BufferStorage>,

    /// The model associated to the store.
    model: StoreModel,
}

/// Keeps a power-off store and its potential models in sync.
#[derive(Clone)]
pub struct StoreDriverOff {
    /// The storage of the store being tracked.
    storage: BufferStorage,

    /// The last valid model before power off.
    model: StoreModel,

    /// In case of interrupted operation, the model after completion.
    complete: Option<StoreModel>,
}

/// Specifies an interruption.
///
/// The delay is a write budget in bytes: the power is lost once the store has
/// written that many bytes to its storage.
pub struct StoreInterruption {
    /// After how many written bytes the interruption should happen.
    pub delay: usize,
}

impl StoreInterruption {
    /// Builds an interruption that never triggers.
    pub fn none() -> StoreInterruption {
        StoreInterruption { delay: usize::MAX }
    }

    /// Builds an interruption after a given write budget.
    pub fn pure(delay: usize) -> StoreInterruption {
        StoreInterruption { delay }
    }
}

/// Possible ways a driver operation may fail.
#[derive(Debug)]
pub enum StoreInvariant {
    /// The store returned an unexpected error.
    StoreError(StoreError),

    /// The store did not recover an interrupted operation.
    Interrupted {
        /// The reason why the store didn't roll back the operation.
        rollback: Box<StoreInvariant>,

        /// The reason why the store didn't complete the operation.
        complete: Box<StoreInvariant>,
    },

    /// The store has more than one live entry for a key.
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },

    /// The store has an entry not present in the model.
    OnlyInStore {
        /// The key of the additional entry.
        key: String,
    },

    /// The store has a different value than the model for an entry.
    DifferentValue {
        /// The key of the entry with a different value.
        key: String,

        /// The value of the entry in the store.
        store: Vec<u8>,

        /// The value of the entry in the model.
        model: Vec<u8>,
    },

    /// The store is missing an entry from the model.
    OnlyInModel {
        /// The key of the missing entry.
        key: String,
    },

    /// The store kept a plan after a completed operation.
    PlanNotCleared,

    /// The store reported no capacity although a free record has room.
    NoCapacityWithRoom {
        /// The length of the value that was refused.
        length: usize,

        /// The length the store claims it could hold.
        capacity: usize,
    },
}

impl From<StoreError> for StoreInvariant {
    fn from(error: StoreError) -> StoreInvariant {
        StoreInvariant::StoreError(error)
    }
}

impl StoreDriver {
    /// Provides read-only access to the storage.
    pub fn storage(&self) -> &BufferStorage {
        match self {
            StoreDriver::On(driver) => driver.store().storage(),
            StoreDriver::Off(driver) => driver.storage(),
        }
    }

    /// Provides read-only access to the model.
    pub fn model(&self) -> &StoreModel {
        match self {
            StoreDriver::On(driver) => driver.model(),
            StoreDriver::Off(driver) => driver.model(),
        }
    }

    /// Extracts the power-on version of the driver.
    pub fn on(self) -> Option<StoreDriverOn> {
        match self {
            StoreDriver::On(driver) => Some(driver),
            StoreDriver::Off(_) => None,
        }
    }

    /// Powers on the store if not already on.
    pub fn power_on(self) -> Result<StoreDriverOn, StoreInvariant> {
        match self {
            StoreDriver::On(driver) => Ok(driver),
            StoreDriver::Off(driver) => driver.power_on(),
        }
    }

    /// Extracts the power-off version of the driver.
    pub fn off(self) -> Option<StoreDriverOff> {
        match self {
            StoreDriver::On(_) => None,
            StoreDriver::Off(driver) => Some(driver),
        }
    }
}

impl StoreDriverOff {
    /// Starts a simulation with a blank region of `len` physical bytes.
    pub fn new(len: usize) -> StoreDriverOff {
        let storage = BufferStorage::new(vec![0; len].into_boxed_slice());
        StoreDriverOff::new_dirty(storage)
    }

    /// Starts a simulation from an existing storage.
    pub fn new_dirty(storage: BufferStorage) -> StoreDriverOff {
        StoreDriverOff {
            storage,
            model: StoreModel::new(),
            complete: None,
        }
    }

    /// Provides read-only access to the storage.
    pub fn storage(&self) -> &BufferStorage {
        &self.storage
    }

    /// Provides mutable access to the storage.
    pub fn storage_mut(&mut self) -> &mut BufferStorage {
        &mut self.storage
    }

    /// Provides read-only access to the model.
    pub fn model(&self) -> &StoreModel {
        &self.model
    }

    /// Powers on the store without interruption.
    pub fn power_on(self) -> Result<StoreDriverOn, StoreInvariant> {
        Ok(self
            .partial_power_on(StoreInterruption::none())
            .map_err(|(_, invariant)| invariant)?
            .on()
            .unwrap())
    }

    /// Powers on the store with a possible interruption.
    ///
    /// An interrupted power-on leaves the driver off; recovery restarts at the
    /// next power-on, which is how recovery idempotence gets exercised.
    pub fn partial_power_on(
        self,
        interruption: StoreInterruption,
    ) -> Result<StoreDriver, (BufferStorage, StoreInvariant)> {
        let StoreDriverOff {
            mut storage,
            model,
            complete,
        } = self;
        storage.arm_interruption(interruption.delay);
        match Store::new(storage) {
            Ok(mut store) => {
                store.storage_mut().disarm_interruption();
                match complete {
                    None => StoreDriverOn::new(store, model)
                        .map(StoreDriver::On)
                        .map_err(|(invariant, store)| (store.extract_storage(), invariant)),
                    // The state must match the operation either completed or
                    // rolled back.
                    Some(complete) => match StoreDriverOn::new(store, complete) {
                        Ok(driver) => Ok(StoreDriver::On(driver)),
                        Err((complete_invariant, store)) => StoreDriverOn::new(store, model)
                            .map(StoreDriver::On)
                            .map_err(|(rollback, store)| {
                                let invariant = StoreInvariant::Interrupted {
                                    rollback: Box::new(rollback),
                                    complete: Box::new(complete_invariant),
                                };
                                (store.extract_storage(), invariant)
                            }),
                    },
                }
            }
            Err((StoreError::StorageError, mut storage)) => {
                storage.reset_interruption();
                Ok(StoreDriver::Off(StoreDriverOff {
                    storage,
                    model,
                    complete,
                }))
            }
            Err((error, mut storage)) => {
                storage.reset_interruption();
                Err((storage, error.into()))
            }
        }
    }

    /// Returns the number of bytes written by an uninterrupted power-on.
    ///
    /// Returns `None` if the store cannot power on successfully.
    pub fn count_power_on_bytes(&self) -> Option<usize> {
        let initial_delay = usize::MAX;
        let mut storage = self.storage.clone();
        storage.arm_interruption(initial_delay);
        let mut store = Store::new(storage).ok()?;
        Some(initial_delay - store.storage_mut().disarm_interruption())
    }
}

impl StoreDriverOn {
    /// Provides read-only access to the store.
    pub fn store(&self) -> &Store<BufferStorage> {
        &self.store
    }

    /// Provides mutable access to the store.
    pub fn store_mut(&mut self) -> &mut Store<BufferStorage> {
        &mut self.store
    }

    /// Extracts the store.
    pub fn extract_store(self) -> Store<BufferStorage> {
        self.store
    }

    /// Provides read-only access to the model.
    pub fn model(&self) -> &StoreModel {
        &self.model
    }

    /// Applies a write to the store and model without interruption.
    ///
    /// Returns the store error for results the model does not predict
    /// (missing capacity), after checking that the error is legitimate.
    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<Option<StoreError>, StoreInvariant> {
        let result = match self.store.set(key, value) {
            Ok(()) => {
                self.model.set(key, value);
                None
            }
            Err(StoreError::NoCapacity) => {
                self.check_no_capacity(value.len())?;
                Some(StoreError::NoCapacity)
            }
            Err(error) => return Err(error.into()),
        };
        self.check()?;
        Ok(result)
    }

    /// Applies a write to the store and model with a possible interruption.
    pub fn partial_set(
        self,
        key: &str,
        value: &[u8],
        interruption: StoreInterruption,
    ) -> Result<(Option<StoreError>, StoreDriver), (Store<BufferStorage>, StoreInvariant)> {
        let StoreDriverOn { mut store, model } = self;
        // Whether the operation would succeed decides which states are
        // acceptable after an interruption.
        let mut probe = store.clone();
        let would_succeed = probe.set(key, value).is_ok();
        store.storage_mut().arm_interruption(interruption.delay);
        match store.set(key, value) {
            Ok(()) => {
                store.storage_mut().disarm_interruption();
                let mut model = model;
                model.set(key, value);
                match StoreDriverOn::new(store, model) {
                    Ok(driver) => Ok((None, StoreDriver::On(driver))),
                    Err((invariant, store)) => Err((store, invariant)),
                }
            }
            Err(StoreError::NoCapacity) => {
                store.storage_mut().disarm_interruption();
                let driver = StoreDriverOn { store, model };
                if let Err(invariant) = driver.check_no_capacity(value.len()) {
                    return Err((driver.store, invariant));
                }
                match driver.check() {
                    Ok(()) => Ok((Some(StoreError::NoCapacity), StoreDriver::On(driver))),
                    Err(invariant) => Err((driver.store, invariant)),
                }
            }
            Err(StoreError::StorageError) => {
                let mut storage = store.extract_storage();
                storage.reset_interruption();
                let complete = would_succeed.then(|| {
                    let mut complete = model.clone();
                    complete.set(key, value);
                    complete
                });
                let driver = StoreDriverOff {
                    storage,
                    model,
                    complete,
                };
                Ok((None, StoreDriver::Off(driver)))
            }
            Err(error) => Err((store, error.into())),
        }
    }

    /// Returns the number of bytes an uninterrupted write would write.
    ///
    /// Returns `None` if the write would not succeed.
    pub fn count_set_bytes(&self, key: &str, value: &[u8]) -> Option<usize> {
        let initial_delay = usize::MAX;
        let mut store = self.store.clone();
        store.storage_mut().arm_interruption(initial_delay);
        let result = store.set(key, value);
        let remaining = store.storage_mut().disarm_interruption();
        result.ok()?;
        Some(initial_delay - remaining)
    }

    /// Powers off the store.
    pub fn power_off(self) -> StoreDriverOff {
        StoreDriverOff {
            storage: self.store.extract_storage(),
            model: self.model,
            complete: None,
        }
    }

    /// Checks that the store and model are in sync.
    pub fn check(&self) -> Result<(), StoreInvariant> {
        self.check_plan()?;
        self.check_content()?;
        Ok(())
    }

    /// Starts a simulation from a powered-on store.
    fn new(
        store: Store<BufferStorage>,
        model: StoreModel,
    ) -> Result<StoreDriverOn, (StoreInvariant, Store<BufferStorage>)> {
        let driver = StoreDriverOn { store, model };
        match driver.check() {
            Ok(()) => Ok(driver),
            Err(invariant) => Err((invariant, driver.store)),
        }
    }

    /// Checks that the plan is cleared.
    fn check_plan(&self) -> Result<(), StoreInvariant> {
        let flag = self
            .store
            .storage()
            .read_byte(PLAN_OFFSET)
            .map_err(|_| StoreInvariant::StoreError(StoreError::StorageError))?;
        if flag != FLAG_FREE {
            return Err(StoreInvariant::PlanNotCleared);
        }
        Ok(())
    }

    /// Checks that the store content and the model are equal.
    ///
    /// Walking the chain also checks that the records exactly partition the
    /// usable space: the walk fails on any record that does not land within
    /// it.
    fn check_content(&self) -> Result<(), StoreInvariant> {
        let mut content: HashMap<String, Vec<u8>> = HashMap::new();
        for handle in self.store.iter() {
            let handle = handle?;
            let name = match handle.key() {
                None => continue,
                Some(name) => name,
            };
            let length = name.iter().position(|&byte| byte == 0).unwrap_or(name.len());
            let key = String::from_utf8_lossy(&name[..length]).into_owned();
            let value = handle.get_value(&self.store)?;
            if content.insert(key.clone(), value).is_some() {
                return Err(StoreInvariant::DuplicateKey { key });
            }
        }
        let mut model_content = self.model.content().clone();
        for (key, store_value) in content {
            let model_value = match model_content.remove(&key) {
                None => return Err(StoreInvariant::OnlyInStore { key }),
                Some(value) => value,
            };
            if store_value != model_value {
                return Err(StoreInvariant::DifferentValue {
                    key,
                    store: store_value,
                    model: model_value,
                });
            }
        }
        if let Some(key) = model_content.keys().next() {
            return Err(StoreInvariant::OnlyInModel { key: key.clone() });
        }
        Ok(())
    }

    /// Checks that a refused write indeed exceeds the capacity.
    fn check_no_capacity(&self, length: usize) -> Result<(), StoreInvariant> {
        let capacity = self.store.capacity().map_err(StoreInvariant::from)?;
        if length <= capacity {
            return Err(StoreInvariant::NoCapacityWithRoom { length, capacity });
        }
        Ok(())
    }
}
