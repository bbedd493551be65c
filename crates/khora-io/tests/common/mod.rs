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

#![allow(dead_code)]

use khora_io::{Request, RequestStatus, TaskCallbacks};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `request` until it is terminal or `timeout` expires, and returns its status.
pub fn wait_until_finished<T>(request: &Request<T>, timeout: Duration) -> RequestStatus {
    let deadline = Instant::now() + timeout;
    while !request.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    request.status()
}

/// A shared log of `(label, status)` pairs filled by status callbacks.
#[derive(Clone, Default)]
pub struct StatusLog {
    entries: Arc<Mutex<Vec<(String, RequestStatus)>>>,
}

impl StatusLog {
    /// Callbacks recording every status under `label`.
    pub fn callbacks(&self, label: &str) -> TaskCallbacks {
        let mut callbacks = TaskCallbacks::new();
        for status in [
            RequestStatus::Enqueued,
            RequestStatus::CreatingResource,
            RequestStatus::RamLoading,
            RequestStatus::VramLoading,
            RequestStatus::Ok,
            RequestStatus::Cancelled,
            RequestStatus::Error,
        ] {
            let entries = Arc::clone(&self.entries);
            let label = label.to_string();
            callbacks.set(status, move |status| {
                entries.lock().unwrap().push((label.clone(), status));
            });
        }
        callbacks
    }

    /// Every status recorded for `label`, in order.
    pub fn statuses(&self, label: &str) -> Vec<RequestStatus> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, s)| *s)
            .collect()
    }

    /// The labels that entered `status`, in order.
    pub fn labels_entering(&self, status: RequestStatus) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(l, _)| l.clone())
            .collect()
    }
}
