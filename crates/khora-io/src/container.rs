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

//! The thread-safe task queue shared by callers and a service's worker.

use crate::config::{ServiceConfig, SortMethod};
use crate::error::IoError;
use crate::request::{lock, Request, RequestStatus};
use crate::service::runtime::{ServiceShared, TaskOutcome};
use crate::task::Task;
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A priority queue of tasks with immediate and deferred cancellation.
///
/// In mutex mode every operation goes through one lock over the deque. In
/// lockless mode callers push into an unbounded MPSC channel that the worker
/// drains on each [`peek`](Self::peek); immediate cancellation is unavailable.
pub(crate) struct TaskContainer<P, O> {
    sort_method: SortMethod,
    critical: bool,
    max_task_count: usize,
    tasks: Mutex<VecDeque<Task<P, O>>>,
    admitting: AtomicUsize,
    inbox: Option<(Sender<Task<P, O>>, Receiver<Task<P, O>>)>,
    shared: Arc<ServiceShared>,
}

impl<P: Send, O: Send> TaskContainer<P, O> {
    pub(crate) fn new(config: &ServiceConfig, shared: Arc<ServiceShared>) -> Self {
        Self {
            sort_method: config.sort_method,
            critical: config.critical,
            max_task_count: config.max_task_count,
            tasks: Mutex::new(VecDeque::new()),
            admitting: AtomicUsize::new(0),
            inbox: config.lockless.then(crossbeam_channel::unbounded),
            shared,
        }
    }

    /// Marks the task `Enqueued` and inserts it.
    ///
    /// A critical container refuses the task once the soft limit is reached;
    /// the request then stays untouched. A request still queued or executing
    /// is refused as well.
    pub(crate) fn enqueue(&self, task: Task<P, O>) -> Result<(), IoError> {
        match &self.inbox {
            None => {
                {
                    let tasks = lock(&self.tasks);
                    let queued = tasks.len() + self.admitting.load(Ordering::Relaxed);
                    if self.critical && queued >= self.max_task_count {
                        log::warn!(
                            "IoService '{}': queue full ({} tasks), dropping request.",
                            self.shared.name(),
                            queued
                        );
                        self.shared.task_dropped();
                        return Err(IoError::QueueFull {
                            service: self.shared.name().to_string(),
                            limit: self.max_task_count,
                        });
                    }
                    self.claim(&task)?;
                    // Holds the slot while the callback runs unlocked.
                    self.admitting.fetch_add(1, Ordering::Relaxed);
                }

                task.callbacks.fire(RequestStatus::Enqueued);
                let mut tasks = lock(&self.tasks);
                tasks.push_back(task);
                self.admitting.fetch_sub(1, Ordering::Relaxed);
            }
            Some((sender, _)) => {
                self.claim(&task)?;
                task.callbacks.fire(RequestStatus::Enqueued);
                if sender.send(task).is_err() {
                    self.shared.task_rejected();
                    return Err(IoError::ServiceStopped {
                        service: self.shared.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn claim(&self, task: &Task<P, O>) -> Result<(), IoError> {
        if !task.request.claim() {
            return Err(IoError::InvalidDescriptor(format!(
                "request is already {:?} in service '{}'",
                task.status(),
                self.shared.name()
            )));
        }
        self.shared.task_accepted();
        Ok(())
    }

    /// Removes and returns the next task to dispatch.
    ///
    /// Tasks whose cancellation was deferred are retired first.
    pub(crate) fn peek(&self) -> Option<Task<P, O>> {
        let (next, cancelled) = {
            let mut tasks = lock(&self.tasks);
            if let Some((_, receiver)) = &self.inbox {
                tasks.extend(receiver.try_iter());
            }

            let cancelled = Self::take_cancelled(&mut tasks);
            if tasks.is_empty() {
                (None, cancelled)
            } else {
                self.sort(&mut tasks);
                (tasks.pop_front(), cancelled)
            }
        };

        for task in cancelled {
            self.retire_cancelled(&task);
        }
        next
    }

    fn take_cancelled(tasks: &mut VecDeque<Task<P, O>>) -> Vec<Task<P, O>> {
        let wants_cancel = |task: &Task<P, O>| {
            task.request.is_cancel_requested()
                && matches!(
                    task.status(),
                    RequestStatus::Enqueued | RequestStatus::Cancelled
                )
        };
        if !tasks.iter().any(wants_cancel) {
            return Vec::new();
        }

        let mut cancelled = Vec::new();
        let mut kept = VecDeque::with_capacity(tasks.len());
        for task in tasks.drain(..) {
            if wants_cancel(&task) {
                cancelled.push(task);
            } else {
                kept.push_back(task);
            }
        }
        *tasks = kept;
        cancelled
    }

    fn sort(&self, tasks: &mut VecDeque<Task<P, O>>) {
        match self.sort_method {
            SortMethod::Never => {}
            SortMethod::Stable => tasks.make_contiguous().sort_by(Task::dispatch_order),
            SortMethod::Partial => {
                let slice = tasks.make_contiguous();
                let mid = (slice.len() / 2).max(1);
                if mid < slice.len() {
                    slice.select_nth_unstable_by(mid - 1, Task::dispatch_order);
                }
                slice[..mid].sort_unstable_by(Task::dispatch_order);
            }
        }
    }

    fn retire_cancelled(&self, task: &Task<P, O>) {
        log::debug!("IoService '{}': request cancelled.", self.shared.name());
        task.transition(RequestStatus::Cancelled);
        self.shared.task_retired(TaskOutcome::Cancelled);
    }

    /// Cancels `request` if it is still waiting in the queue.
    pub(crate) fn try_cancel(&self, request: &Arc<Request<O>>) -> bool {
        if self.inbox.is_some() {
            return false;
        }

        let removed = {
            let mut tasks = lock(&self.tasks);
            tasks
                .iter()
                .position(|task| {
                    Arc::ptr_eq(&task.request, request) && task.status() == RequestStatus::Enqueued
                })
                .and_then(|index| tasks.remove(index))
        };

        match removed {
            Some(task) => {
                self.retire_cancelled(&task);
                true
            }
            None => false,
        }
    }

    /// Flags `request` for cancellation on the next [`peek`](Self::peek).
    pub(crate) fn defer_cancel(&self, request: &Request<O>) {
        request.request_cancel();
    }

    /// Number of tasks waiting to be dispatched.
    pub(crate) fn len(&self) -> usize {
        let queued = lock(&self.tasks).len();
        queued + self.inbox.as_ref().map_or(0, |(_, receiver)| receiver.len())
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
