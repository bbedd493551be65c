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

//! Configuration shared by every I/O service.
//!
//! A [`ServiceConfig`] can be built in code with its `with_*` methods or loaded
//! from RON, with every missing field falling back to its default:
//!
//! ```
//! use khora_io::{ServiceConfig, SleepMode, SortMethod};
//!
//! let config = ServiceConfig::from_ron_str(
//!     "(name: \"textures\", sleep_mode: fixed_sleep, sleep_time_ms: 2, sort_method: partial)",
//! )
//! .unwrap();
//! assert_eq!(config.sleep_mode, SleepMode::FixedSleep);
//! assert_eq!(config.sort_method, SortMethod::Partial);
//! assert!(!config.lockless);
//! ```

use crate::error::IoError;
use serde::Deserialize;

/// Sentinel sleep time meaning "sleep until a request arrives".
///
/// Only meaningful with [`SleepMode::CondVar`]; each new request then wakes the
/// worker immediately.
pub const SLEEP_TIME_MAX: u32 = u32::MAX;

/// Default soft limit on the number of queued tasks.
pub const MAX_TASK_COUNT: usize = 32;

/// How the worker thread waits when it has nothing to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepMode {
    /// Never sleep; yield the time slice and poll again.
    Busy,
    /// Sleep for `sleep_time_ms` before polling again.
    FixedSleep,
    /// Wait on a condition variable, woken by new requests.
    #[default]
    CondVar,
}

/// How queued tasks are ordered before each dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMethod {
    /// First in, first out.
    Never,
    /// Full stable sort by priority, then sub-priority.
    #[default]
    Stable,
    /// Only the best half of the pending tasks is ordered, at the front.
    Partial,
}

/// Configuration of an I/O service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used for the worker thread and in diagnostics.
    pub name: String,
    /// How the worker waits when idle.
    pub sleep_mode: SleepMode,
    /// Sleep duration in milliseconds, or [`SLEEP_TIME_MAX`].
    pub sleep_time_ms: u32,
    /// Queue requests through a lock-free channel instead of a mutex-guarded deque.
    ///
    /// Lockless services cannot cancel immediately: `try_cancel` always fails and
    /// only deferred cancellation is honoured.
    pub lockless: bool,
    /// Ordering applied before each dispatch.
    pub sort_method: SortMethod,
    /// Refuse requests once `max_task_count` tasks are queued (mutex mode only).
    pub critical: bool,
    /// Soft queue limit enforced for critical services.
    pub max_task_count: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "io-service".to_string(),
            sleep_mode: SleepMode::CondVar,
            sleep_time_ms: SLEEP_TIME_MAX,
            lockless: false,
            sort_method: SortMethod::Stable,
            critical: false,
            max_task_count: MAX_TASK_COUNT,
        }
    }
}

impl ServiceConfig {
    /// Creates a default configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parses a configuration from RON.
    ///
    /// # Errors
    /// Returns [`IoError::Config`] if the text is not valid RON or fails validation.
    pub fn from_ron_str(source: &str) -> Result<Self, IoError> {
        let config: Self = ron::from_str(source).map_err(|e| IoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a service relies on.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.name.is_empty() {
            return Err(IoError::Config("service name must not be empty".into()));
        }
        if self.critical && self.max_task_count == 0 {
            return Err(IoError::Config(format!(
                "critical service '{}' needs a non-zero max_task_count",
                self.name
            )));
        }
        Ok(())
    }

    /// Sets the sleep mode.
    pub fn with_sleep_mode(mut self, sleep_mode: SleepMode) -> Self {
        self.sleep_mode = sleep_mode;
        self
    }

    /// Sets the sleep time in milliseconds.
    pub fn with_sleep_time(mut self, sleep_time_ms: u32) -> Self {
        self.sleep_time_ms = sleep_time_ms;
        self
    }

    /// Selects the lockless queue.
    pub fn with_lockless(mut self, lockless: bool) -> Self {
        self.lockless = lockless;
        self
    }

    /// Sets the dispatch ordering.
    pub fn with_sort_method(mut self, sort_method: SortMethod) -> Self {
        self.sort_method = sort_method;
        self
    }

    /// Marks the service as critical, enforcing `max_task_count`.
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Sets the soft queue limit.
    pub fn with_max_task_count(mut self, max_task_count: usize) -> Self {
        self.max_task_count = max_task_count;
        self
    }
}
