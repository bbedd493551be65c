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

//! Errors returned synchronously by the I/O services.
//!
//! Failures that happen on the worker thread never surface here: they move the
//! request to [`RequestStatus::Error`](crate::RequestStatus::Error) and are
//! described by [`Request::error`](crate::Request::error).

use khora_core::renderer::ResourceError;
use khora_core::vfs::VfsError;
use thiserror::Error;

/// An error raised by an I/O service.
#[derive(Debug, Error)]
pub enum IoError {
    /// A critical service refused a request because its queue is full.
    #[error("service '{service}' dropped a request: {limit} tasks already queued")]
    QueueFull {
        /// The name of the service.
        service: String,
        /// The configured soft queue limit.
        limit: usize,
    },

    /// The worker thread could not be started.
    #[error("failed to spawn the worker thread of service '{service}'")]
    WorkerSpawn {
        /// The name of the service.
        service: String,
        /// The error reported by the OS.
        #[source]
        source: std::io::Error,
    },

    /// The service has been destroyed and no longer accepts requests.
    #[error("service '{service}' has been destroyed")]
    ServiceStopped {
        /// The name of the service.
        service: String,
    },

    /// The service configuration is invalid or could not be parsed.
    #[error("invalid service configuration: {0}")]
    Config(String),

    /// The request descriptor cannot be executed as given.
    #[error("invalid request descriptor: {0}")]
    InvalidDescriptor(String),

    /// A filesystem operation failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// A GPU operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
