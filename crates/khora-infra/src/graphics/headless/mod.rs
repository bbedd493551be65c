// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A graphics backend without a GPU.
//!
//! Buffers and textures are byte vectors. Command encoders record copies that
//! run when their command buffer is submitted, and fences report completion
//! after a configurable number of status queries, so code driving the device
//! sees the same incomplete/complete sequence a real GPU produces.

mod command;
mod device;
mod dstorage;

pub use self::command::HeadlessCommandEncoder;
pub use self::device::{HeadlessDevice, HeadlessLimits};
pub use self::dstorage::HeadlessDirectStorageQueue;

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
