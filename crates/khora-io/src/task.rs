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

//! Scheduling metadata attached to every queued operation.

use crate::request::{Request, RequestStatus};
use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Coarse dispatch priority. Higher priorities are dispatched first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Prefetching and other work nobody waits on.
    Background,
    /// Regular loads.
    #[default]
    Normal,
    /// Loads blocking visible content.
    Urgent,
}

/// A callback invoked when a request enters a status.
///
/// User data is whatever the closure captures. Callbacks run on the thread
/// performing the transition: the caller's thread for `Enqueued` and for
/// immediate cancellation, the worker thread otherwise.
pub type StatusCallback = Box<dyn Fn(RequestStatus) + Send + Sync + 'static>;

/// A per-status callback table.
///
/// Each slot fires at most once per transition into its status; empty slots are skipped.
#[derive(Default)]
pub struct TaskCallbacks {
    table: [Option<StatusCallback>; RequestStatus::COUNT],
}

impl TaskCallbacks {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `status`, replacing any previous one.
    pub fn on(
        mut self,
        status: RequestStatus,
        callback: impl Fn(RequestStatus) + Send + Sync + 'static,
    ) -> Self {
        self.set(status, callback);
        self
    }

    /// Registers `callback` for `status` in place.
    pub fn set(
        &mut self,
        status: RequestStatus,
        callback: impl Fn(RequestStatus) + Send + Sync + 'static,
    ) {
        self.table[status.index()] = Some(Box::new(callback));
    }

    /// Returns `true` if a callback is registered for `status`.
    pub fn is_set(&self, status: RequestStatus) -> bool {
        self.table[status.index()].is_some()
    }

    /// Invokes the callback registered for `status`.
    ///
    /// A panicking callback is logged and swallowed so it cannot take down the
    /// thread performing the transition.
    pub(crate) fn fire(&self, status: RequestStatus) {
        if let Some(callback) = &self.table[status.index()] {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                log::error!("Callback for status {:?} panicked.", status);
            }
        }
    }
}

impl fmt::Debug for TaskCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<usize> = self
            .table
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect();
        f.debug_struct("TaskCallbacks")
            .field("registered", &registered)
            .finish()
    }
}

/// A queued operation: the caller's request plus everything needed to schedule it.
pub(crate) struct Task<P, O> {
    pub(crate) request: Arc<Request<O>>,
    pub(crate) priority: Priority,
    pub(crate) sub_priority: f32,
    pub(crate) callbacks: TaskCallbacks,
    pub(crate) payload: P,
}

impl<P, O> Task<P, O> {
    pub(crate) fn new(
        request: &Arc<Request<O>>,
        priority: Priority,
        sub_priority: f32,
        callbacks: TaskCallbacks,
        payload: P,
    ) -> Self {
        Self {
            request: Arc::clone(request),
            priority,
            sub_priority,
            callbacks,
            payload,
        }
    }

    /// Orders tasks so that the one to dispatch first compares `Less`.
    pub(crate) fn dispatch_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sub_priority.total_cmp(&self.sub_priority))
    }

    pub(crate) fn status(&self) -> RequestStatus {
        self.request.status()
    }

    /// Publishes `status` on the request, then fires its callback.
    pub(crate) fn transition(&self, status: RequestStatus) {
        self.request.set_status(status);
        self.callbacks.fire(status);
    }

    /// Ends the task with [`RequestStatus::Error`].
    pub(crate) fn fail(&self, message: String) {
        self.request.set_error(message);
        self.transition(RequestStatus::Error);
    }
}
