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

//! # Khora I/O
//!
//! Asynchronous I/O services for the engine's asset loading.
//!
//! Each service owns one worker thread that executes load operations queued by
//! any number of caller threads. A caller describes the work, hands the service a
//! shared [`Request`], and then polls the request's status (or registers
//! per-status callbacks) until it reaches a terminal state.
//!
//! - [`RamService`] reads byte ranges from a [`VirtualFileSystem`] into memory.
//! - [`VramService`] creates GPU resources and fills them, either through a
//!   staging buffer and a copy queue, or through a hardware transfer queue.
//!   Requests picked up in the same worker cycle share one submission and one fence.
//! - [`ServicePool`] spreads requests round-robin over several services.
//!
//! [`VirtualFileSystem`]: khora_core::vfs::VirtualFileSystem

#![warn(missing_docs)]

pub mod config;
mod container;
pub mod error;
pub mod pool;
pub mod ram;
pub mod request;
pub mod service;
pub mod task;
pub mod vram;

pub use config::{ServiceConfig, SleepMode, SortMethod, MAX_TASK_COUNT, SLEEP_TIME_MAX};
pub use error::IoError;
pub use pool::ServicePool;
pub use ram::{RamIoDescriptor, RamRequest, RamService};
pub use request::{Request, RequestStatus};
pub use service::{IoService, RunningStatus, ServiceStats, ThreadStatus};
pub use task::{Priority, TaskCallbacks};
pub use vram::{
    VramIoDescriptor, VramIoKind, VramRequest, VramResource, VramResourceDescriptor, VramService,
};
