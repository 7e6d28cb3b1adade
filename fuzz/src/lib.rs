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

//! Fuzzing library for the parameter store.
//!
//! Fuzzing is a function from seeds (byte slices) to sequences of store
//! manipulations: writing entries, losing power in the middle of a write,
//! rebooting, losing power in the middle of the recovery of a reboot. The
//! store is checked against its model after each step, so any seed that
//! breaks an invariant is a replayable artifact.

mod store;

pub use store::fuzz;
