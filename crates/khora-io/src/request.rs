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

//! The caller-visible handle of one asynchronous operation.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The lifecycle of a [`Request`].
///
/// Statuses only move forward: `None → Enqueued → (CreatingResource →) Loading → Ok`.
/// `Cancelled` can pre-empt a request while it is still `Enqueued`, and `Error`
/// ends a request whose execution failed. A service refuses a request that is
/// queued or executing; a finished one may be submitted again and restarts at
/// `Enqueued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestStatus {
    /// The request has not been handed to a service.
    None = 0,
    /// The request waits in a service queue.
    Enqueued = 1,
    /// The GPU destination resource is being created.
    CreatingResource = 2,
    /// Bytes are being read into memory.
    RamLoading = 3,
    /// Bytes are being transferred into a GPU resource.
    VramLoading = 4,
    /// The operation completed; the output can be taken.
    Ok = 5,
    /// The request was cancelled before it started executing.
    Cancelled = 6,
    /// The operation failed; see [`Request::error`].
    Error = 7,
}

impl RequestStatus {
    /// Number of distinct statuses.
    pub const COUNT: usize = 8;

    /// Position of this status in per-status tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether no further transition can happen.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Ok | RequestStatus::Cancelled | RequestStatus::Error
        )
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => RequestStatus::Enqueued,
            2 => RequestStatus::CreatingResource,
            3 => RequestStatus::RamLoading,
            4 => RequestStatus::VramLoading,
            5 => RequestStatus::Ok,
            6 => RequestStatus::Cancelled,
            7 => RequestStatus::Error,
            _ => RequestStatus::None,
        }
    }
}

/// A status-bearing handle for one operation, shared between the caller and a service.
///
/// Callers create it, wrap it in an `Arc` and pass it to a service's `request`.
/// The service writes the status from its worker thread; callers read it from any
/// thread. Once the status is [`RequestStatus::Ok`] the produced output belongs to
/// the caller and can be moved out with [`take_output`](Request::take_output).
pub struct Request<T> {
    status: AtomicU8,
    cancel_requested: AtomicBool,
    output: Mutex<Option<T>>,
    error: Mutex<Option<String>>,
}

impl<T> Request<T> {
    /// Creates a request in the [`RequestStatus::None`] state.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RequestStatus::None as u8),
            cancel_requested: AtomicBool::new(false),
            output: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Returns `true` once the operation completed successfully.
    pub fn is_ready(&self) -> bool {
        self.status() == RequestStatus::Ok
    }

    /// Returns `true` once the request reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Returns `true` if a deferred cancellation is pending.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Moves the output out of the request.
    ///
    /// Returns `None` until the status is [`RequestStatus::Ok`], and after the
    /// output has already been taken.
    pub fn take_output(&self) -> Option<T> {
        if !self.is_ready() {
            return None;
        }
        lock(&self.output).take()
    }

    /// Returns the failure description of a request in [`RequestStatus::Error`].
    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    pub(crate) fn set_status(&self, status: RequestStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Moves an idle or finished request to [`RequestStatus::Enqueued`].
    ///
    /// Returns `false`, leaving the request untouched, while it is queued or
    /// executing. A finished request is reset: its output, error and pending
    /// cancellation are discarded.
    pub(crate) fn claim(&self) -> bool {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            let status = RequestStatus::from_u8(current);
            if status != RequestStatus::None && !status.is_terminal() {
                return false;
            }
            match self.status.compare_exchange_weak(
                current,
                RequestStatus::Enqueued as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.clear_cancel();
        lock(&self.output).take();
        lock(&self.error).take();
        true
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub(crate) fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::Release);
    }

    pub(crate) fn store_output(&self, output: T) {
        *lock(&self.output) = Some(output);
    }

    pub(crate) fn set_error(&self, message: String) {
        *lock(&self.error) = Some(message);
    }
}

impl<T> Default for Request<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("status", &self.status())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish_non_exhaustive()
    }
}

/// Locks a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_idle() {
        let request = Request::<Vec<u8>>::new();
        assert_eq!(request.status(), RequestStatus::None);
        assert!(!request.is_finished());
        assert!(!request.is_cancel_requested());
        assert!(request.error().is_none());
    }

    #[test]
    fn test_output_is_only_released_when_ok() {
        let request = Request::new();
        request.store_output(vec![1u8, 2, 3]);
        request.set_status(RequestStatus::RamLoading);
        assert_eq!(request.take_output(), None);

        request.set_status(RequestStatus::Ok);
        assert_eq!(request.take_output(), Some(vec![1, 2, 3]));
        assert_eq!(request.take_output(), None);
    }

    #[test]
    fn test_status_table_indices_are_dense() {
        let all = [
            RequestStatus::None,
            RequestStatus::Enqueued,
            RequestStatus::CreatingResource,
            RequestStatus::RamLoading,
            RequestStatus::VramLoading,
            RequestStatus::Ok,
            RequestStatus::Cancelled,
            RequestStatus::Error,
        ];
        for (i, status) in all.iter().enumerate() {
            assert_eq!(status.index(), i);
            assert_eq!(RequestStatus::from_u8(i as u8), *status);
        }
        assert_eq!(all.len(), RequestStatus::COUNT);
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::VramLoading.is_terminal());
    }

    #[test]
    fn test_cancel_flag_round_trip() {
        let request = Request::<()>::new();
        request.request_cancel();
        assert!(request.is_cancel_requested());
        request.clear_cancel();
        assert!(!request.is_cancel_requested());
    }

    #[test]
    fn test_claim_refuses_live_requests_and_resets_finished_ones() {
        let request = Request::new();
        assert!(request.claim());
        assert_eq!(request.status(), RequestStatus::Enqueued);
        assert!(!request.claim());

        request.set_status(RequestStatus::RamLoading);
        assert!(!request.claim());
        assert_eq!(request.status(), RequestStatus::RamLoading);

        request.store_output(vec![7u8]);
        request.set_error("stale".to_string());
        request.request_cancel();
        request.set_status(RequestStatus::Error);
        assert!(request.claim());
        assert_eq!(request.status(), RequestStatus::Enqueued);
        assert!(request.error().is_none());
        assert!(!request.is_cancel_requested());
        request.set_status(RequestStatus::Ok);
        assert_eq!(request.take_output(), None);
    }
}
