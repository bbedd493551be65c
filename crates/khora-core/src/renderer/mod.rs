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

//! Provides the public, backend-agnostic GPU contracts used by the I/O services.
//!
//! This module defines the subset of GPU functionality an upload pipeline needs:
//! resource creation, copy recording, queue submission, fences, and hardware
//! file-to-GPU transfers. Following the CLAD architecture, this module defines the
//! 'what', while the 'how' is handled by a concrete backend in the `khora-infra`
//! crate which implements these traits.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::*;
pub use self::error::ResourceError;
pub use self::traits::{CommandEncoder, DirectStorageQueue, GraphicsDevice};
