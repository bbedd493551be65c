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

//! The interface shared by every I/O service, and the plumbing behind it.

pub(crate) mod runtime;

pub use runtime::{RunningStatus, ServiceStats, ThreadStatus};

use crate::config::ServiceConfig;
use crate::container::TaskContainer;
use crate::error::IoError;
use crate::request::{Request, RequestStatus};
use crate::task::Task;
use runtime::{ServiceCore, ServiceShared, ServiceWorker};
use std::sync::Arc;

/// Operations common to every I/O service.
///
/// Each service also offers its own `request` method, since what a load needs
/// to know differs between services.
pub trait IoService: Send + Sync {
    /// What a completed request of this service hands back to the caller.
    type Output: Send + 'static;

    /// The name the service was configured with.
    fn name(&self) -> &str;

    /// Cancels `request` immediately if it is still waiting in the queue.
    ///
    /// Returns `true` if the request moved to [`RequestStatus::Cancelled`].
    /// Always `false` for lockless services and for requests already dispatched.
    fn try_cancel(&self, request: &Arc<Request<Self::Output>>) -> bool;

    /// Asks for `request` to be cancelled the next time the worker dequeues.
    ///
    /// Has no effect once the request has been dispatched.
    fn defer_cancel(&self, request: &Request<Self::Output>);

    /// The current status of `request`.
    fn get_status(&self, request: &Request<Self::Output>) -> RequestStatus {
        request.status()
    }

    /// Resumes a service suspended by [`stop`](Self::stop).
    fn run(&self);

    /// Suspends the worker. With `wait_drain`, first waits for every pending task.
    fn stop(&self, wait_drain: bool);

    /// Blocks until every pending task is terminal and the worker sleeps.
    ///
    /// Returns early, with a warning, if the service is suspended or destroyed.
    fn drain(&self);

    /// Changes how long the worker sleeps when idle. Takes effect on its next sleep.
    fn set_sleep_time(&self, ms: u32);

    /// A snapshot of the service's counters.
    fn stats(&self) -> ServiceStats;

    /// Number of accepted requests that are not terminal yet.
    fn pending(&self) -> usize;

    /// Number of requests still waiting in the queue.
    fn queued(&self) -> usize;

    /// Whether the worker may execute tasks.
    fn thread_status(&self) -> ThreadStatus;

    /// Whether the worker is busy or asleep.
    fn running_status(&self) -> RunningStatus;

    /// Stops and joins the worker. Idempotent, and also run on drop.
    fn destroy(&self);
}

/// The queue and worker thread behind a concrete service.
pub(crate) struct ServiceHandle<P, O> {
    container: Arc<TaskContainer<P, O>>,
    core: ServiceCore,
}

impl<P: Send + 'static, O: Send + 'static> ServiceHandle<P, O> {
    /// Validates `config`, then starts the worker built by `make_worker`.
    pub(crate) fn start<W, F>(config: &ServiceConfig, make_worker: F) -> Result<Self, IoError>
    where
        W: ServiceWorker,
        F: FnOnce(Arc<TaskContainer<P, O>>, Arc<ServiceShared>) -> W,
    {
        config.validate()?;
        let shared = Arc::new(ServiceShared::new(config));
        let container = Arc::new(TaskContainer::new(config, Arc::clone(&shared)));
        let worker = make_worker(Arc::clone(&container), Arc::clone(&shared));
        let core = ServiceCore::spawn(shared, worker)?;
        log::info!(
            "IoService '{}' created ({:?}, {:?} sort{}).",
            config.name,
            config.sleep_mode,
            config.sort_method,
            if config.lockless { ", lockless" } else { "" }
        );
        Ok(Self { container, core })
    }

    /// Queues `task` and wakes the worker.
    pub(crate) fn submit(&self, task: Task<P, O>) -> Result<(), IoError> {
        let shared = self.core.shared();
        if shared.thread_status() == ThreadStatus::Quit {
            return Err(IoError::ServiceStopped {
                service: shared.name().to_string(),
            });
        }
        self.container.enqueue(task)?;
        shared.notify_request();
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        self.core.shared().name()
    }

    pub(crate) fn try_cancel(&self, request: &Arc<Request<O>>) -> bool {
        self.container.try_cancel(request)
    }

    pub(crate) fn defer_cancel(&self, request: &Request<O>) {
        self.container.defer_cancel(request);
    }

    pub(crate) fn run(&self) {
        self.core.run();
    }

    pub(crate) fn stop(&self, wait_drain: bool) {
        self.core.stop(wait_drain);
    }

    pub(crate) fn drain(&self) {
        self.core.drain();
    }

    pub(crate) fn set_sleep_time(&self, ms: u32) {
        self.core.set_sleep_time(ms);
    }

    pub(crate) fn stats(&self) -> ServiceStats {
        self.core.shared().stats()
    }

    pub(crate) fn pending(&self) -> usize {
        self.core.shared().pending()
    }

    pub(crate) fn queued(&self) -> usize {
        self.container.len()
    }

    pub(crate) fn thread_status(&self) -> ThreadStatus {
        self.core.shared().thread_status()
    }

    pub(crate) fn running_status(&self) -> RunningStatus {
        self.core.shared().running_status()
    }

    pub(crate) fn destroy(&self) {
        self.core.destroy();
    }
}

/// Implements [`IoService`] for a service wrapping a `ServiceHandle` in its `handle` field.
macro_rules! delegate_io_service {
    ($service:ty, $output:ty) => {
        impl $crate::service::IoService for $service {
            type Output = $output;

            fn name(&self) -> &str {
                self.handle.name()
            }

            fn try_cancel(&self, request: &std::sync::Arc<$crate::request::Request<$output>>) -> bool {
                self.handle.try_cancel(request)
            }

            fn defer_cancel(&self, request: &$crate::request::Request<$output>) {
                self.handle.defer_cancel(request);
            }

            fn run(&self) {
                self.handle.run();
            }

            fn stop(&self, wait_drain: bool) {
                self.handle.stop(wait_drain);
            }

            fn drain(&self) {
                self.handle.drain();
            }

            fn set_sleep_time(&self, ms: u32) {
                self.handle.set_sleep_time(ms);
            }

            fn stats(&self) -> $crate::service::ServiceStats {
                self.handle.stats()
            }

            fn pending(&self) -> usize {
                self.handle.pending()
            }

            fn queued(&self) -> usize {
                self.handle.queued()
            }

            fn thread_status(&self) -> $crate::service::ThreadStatus {
                self.handle.thread_status()
            }

            fn running_status(&self) -> $crate::service::RunningStatus {
                self.handle.running_status()
            }

            fn destroy(&self) {
                self.handle.destroy();
            }
        }
    };
}

pub(crate) use delegate_io_service;
