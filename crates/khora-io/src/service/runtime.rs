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

//! Worker-thread lifecycle shared by every service.

use crate::config::{ServiceConfig, SleepMode, SLEEP_TIME_MAX};
use crate::error::IoError;
use crate::request::lock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Re-check interval of a blocked `drain`, so that a concurrent `stop` or
/// `destroy` cannot leave it waiting forever.
const DRAIN_RECHECK: Duration = Duration::from_millis(20);

/// Whether the worker thread is allowed to execute tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadStatus {
    /// The worker executes tasks.
    Running = 0,
    /// The worker is alive but does not dequeue.
    Suspended = 1,
    /// The worker exits; terminal.
    Quit = 2,
}

/// What the worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunningStatus {
    /// The worker is executing or polling outstanding work.
    Running = 0,
    /// The worker found nothing to do and is asleep.
    Sleeping = 1,
}

/// A snapshot of a service's task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Requests accepted into the queue.
    pub enqueued: u64,
    /// Requests refused because a critical queue was full.
    pub dropped: u64,
    /// Requests that reached `Ok`.
    pub completed: u64,
    /// Requests that reached `Cancelled`.
    pub cancelled: u64,
    /// Requests that reached `Error`.
    pub failed: u64,
}

impl ServiceStats {
    /// Adds the counters of `other` to these.
    pub fn merge(&mut self, other: &ServiceStats) {
        self.enqueued += other.enqueued;
        self.dropped += other.dropped;
        self.completed += other.completed;
        self.cancelled += other.cancelled;
        self.failed += other.failed;
    }
}

/// How a task left the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// The result of one worker cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerCycle {
    /// Work was dequeued or advanced; run again immediately.
    Busy,
    /// Nothing new, but GPU work is outstanding; poll again soon.
    Waiting,
    /// Nothing to do.
    Idle,
}

/// The per-service logic run on the worker thread.
pub(crate) trait ServiceWorker: Send + 'static {
    /// Runs one cycle: dequeue, execute, poll.
    fn run_cycle(&mut self) -> WorkerCycle;

    /// Called once on the worker thread after the service quits.
    fn shutdown(&mut self) {}
}

/// State shared between a service's callers, its queue and its worker.
#[derive(Debug)]
pub(crate) struct ServiceShared {
    name: String,
    sleep_mode: SleepMode,
    sleep_time_ms: AtomicU32,
    thread_status: AtomicU8,
    running_status: AtomicU8,
    wake_pending: Mutex<bool>,
    wake: Condvar,
    idle_lock: Mutex<()>,
    idle: Condvar,
    pending: AtomicUsize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl ServiceShared {
    pub(crate) fn new(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            sleep_mode: config.sleep_mode,
            sleep_time_ms: AtomicU32::new(config.sleep_time_ms),
            thread_status: AtomicU8::new(ThreadStatus::Running as u8),
            running_status: AtomicU8::new(RunningStatus::Running as u8),
            wake_pending: Mutex::new(false),
            wake: Condvar::new(),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            pending: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn thread_status(&self) -> ThreadStatus {
        match self.thread_status.load(Ordering::Acquire) {
            0 => ThreadStatus::Running,
            1 => ThreadStatus::Suspended,
            _ => ThreadStatus::Quit,
        }
    }

    fn set_thread_status(&self, status: ThreadStatus) {
        self.thread_status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn running_status(&self) -> RunningStatus {
        match self.running_status.load(Ordering::Acquire) {
            0 => RunningStatus::Running,
            _ => RunningStatus::Sleeping,
        }
    }

    fn set_running_status(&self, status: RunningStatus) {
        self.running_status.store(status as u8, Ordering::Release);
        if status == RunningStatus::Sleeping {
            self.notify_idle();
        }
    }

    pub(crate) fn sleep_time_ms(&self) -> u32 {
        self.sleep_time_ms.load(Ordering::Acquire)
    }

    pub(crate) fn set_sleep_time(&self, ms: u32) {
        self.sleep_time_ms.store(ms, Ordering::Release);
    }

    /// Number of tasks accepted and not yet terminal.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> ServiceStats {
        ServiceStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Accounts for a task about to be inserted in the queue.
    pub(crate) fn task_accepted(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Reverts [`task_accepted`](Self::task_accepted) for a task that never reached the queue.
    pub(crate) fn task_rejected(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.enqueued.fetch_sub(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounts for a task that reached a terminal status.
    pub(crate) fn task_retired(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Completed => &self.completed,
            TaskOutcome::Cancelled => &self.cancelled,
            TaskOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.notify_idle();
    }

    /// Wakes a worker blocked on the condition variable without a timeout.
    pub(crate) fn notify_request(&self) {
        if self.sleep_mode == SleepMode::CondVar && self.sleep_time_ms() == SLEEP_TIME_MAX {
            self.wake();
        }
    }

    fn wake(&self) {
        *lock(&self.wake_pending) = true;
        self.wake.notify_one();
    }

    fn notify_idle(&self) {
        drop(lock(&self.idle_lock));
        self.idle.notify_all();
    }

    fn is_drained(&self) -> bool {
        self.pending() == 0 && self.running_status() == RunningStatus::Sleeping
    }

    /// Puts the worker to sleep according to the configured policy.
    fn sleep(&self) {
        let ms = self.sleep_time_ms();
        match self.sleep_mode {
            SleepMode::Busy => {
                std::hint::spin_loop();
                thread::yield_now();
            }
            SleepMode::FixedSleep => {
                if ms == SLEEP_TIME_MAX {
                    thread::yield_now();
                } else {
                    thread::sleep(Duration::from_millis(ms as u64));
                }
            }
            SleepMode::CondVar => {
                let pending = lock(&self.wake_pending);
                let mut pending = if ms == SLEEP_TIME_MAX {
                    self.wake
                        .wait_while(pending, |woken| !*woken)
                        .unwrap_or_else(|e| e.into_inner())
                } else {
                    self.wake
                        .wait_timeout_while(pending, Duration::from_millis(ms as u64), |woken| {
                            !*woken
                        })
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                };
                *pending = false;
            }
        }
    }

    fn drain(&self) {
        if self.sleep_mode == SleepMode::Busy {
            while !self.is_drained() {
                if self.thread_status() != ThreadStatus::Running {
                    break;
                }
                std::hint::spin_loop();
                thread::yield_now();
            }
        } else {
            let mut guard = lock(&self.idle_lock);
            while !self.is_drained() && self.thread_status() == ThreadStatus::Running {
                guard = self
                    .idle
                    .wait_timeout(guard, DRAIN_RECHECK)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
        }
        if !self.is_drained() {
            log::warn!(
                "IoService '{}': drain returned with {} pending task(s) while the worker is {:?}",
                self.name,
                self.pending(),
                self.thread_status()
            );
        }
    }
}

/// Owns a service's worker thread.
#[derive(Debug)]
pub(crate) struct ServiceCore {
    shared: Arc<ServiceShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceCore {
    /// Starts the worker thread running `worker`'s cycles.
    pub(crate) fn spawn<W: ServiceWorker>(
        shared: Arc<ServiceShared>,
        mut worker: W,
    ) -> Result<Self, IoError> {
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(shared.name().to_string())
            .spawn(move || {
                let shared = thread_shared;
                log::info!("IoService '{}' worker started.", shared.name());
                loop {
                    match shared.thread_status() {
                        ThreadStatus::Quit => break,
                        ThreadStatus::Suspended => {
                            shared.set_running_status(RunningStatus::Sleeping);
                            shared.sleep();
                            continue;
                        }
                        ThreadStatus::Running => {}
                    }

                    shared.set_running_status(RunningStatus::Running);
                    match panic::catch_unwind(AssertUnwindSafe(|| worker.run_cycle())) {
                        Ok(WorkerCycle::Busy) => {}
                        Ok(WorkerCycle::Waiting) => thread::yield_now(),
                        Ok(WorkerCycle::Idle) => {
                            log::trace!("IoService '{}' is idle.", shared.name());
                            shared.set_running_status(RunningStatus::Sleeping);
                            shared.sleep();
                        }
                        Err(_) => {
                            // The worker state can no longer be trusted; refuse new
                            // requests and release blocked drains.
                            log::error!(
                                "IoService '{}' worker panicked; the service quits.",
                                shared.name()
                            );
                            shared.set_thread_status(ThreadStatus::Quit);
                            break;
                        }
                    }
                }
                worker.shutdown();
                shared.set_running_status(RunningStatus::Sleeping);
                log::info!("IoService '{}' worker stopped.", shared.name());
            })
            .map_err(|source| IoError::WorkerSpawn {
                service: shared.name().to_string(),
                source,
            })?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<ServiceShared> {
        &self.shared
    }

    /// Resumes a suspended worker.
    pub(crate) fn run(&self) {
        if self.shared.thread_status() == ThreadStatus::Quit {
            return;
        }
        self.shared.set_thread_status(ThreadStatus::Running);
        self.shared.wake();
    }

    /// Suspends the worker, optionally draining the queue first.
    pub(crate) fn stop(&self, wait_drain: bool) {
        if wait_drain {
            self.drain();
        }
        if self.shared.thread_status() != ThreadStatus::Quit {
            self.shared.set_thread_status(ThreadStatus::Suspended);
        }
    }

    /// Blocks until no task is pending and the worker sleeps.
    pub(crate) fn drain(&self) {
        self.shared.drain();
    }

    pub(crate) fn set_sleep_time(&self, ms: u32) {
        self.shared.set_sleep_time(ms);
    }

    /// Stops and joins the worker. Idempotent.
    pub(crate) fn destroy(&self) {
        self.shared.set_thread_status(ThreadStatus::Quit);
        self.shared.wake();
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                log::error!(
                    "IoService '{}' cannot be destroyed from its own worker thread.",
                    self.shared.name()
                );
                return;
            }
            if handle.join().is_err() {
                log::error!("IoService '{}' worker panicked.", self.shared.name());
            }
            let pending = self.shared.pending();
            if pending > 0 {
                log::warn!(
                    "IoService '{}' destroyed with {} unfinished task(s).",
                    self.shared.name(),
                    pending
                );
            }
        }
    }
}

impl Drop for ServiceCore {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct CountingWorker {
        cycles: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    impl ServiceWorker for CountingWorker {
        fn run_cycle(&mut self) -> WorkerCycle {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            WorkerCycle::Idle
        }

        fn shutdown(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn spawn(config: ServiceConfig) -> (ServiceCore, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let cycles = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let core = ServiceCore::spawn(
            Arc::new(ServiceShared::new(&config)),
            CountingWorker {
                cycles: Arc::clone(&cycles),
                stopped: Arc::clone(&stopped),
            },
        )
        .expect("worker should spawn");
        (core, cycles, stopped)
    }

    #[test]
    fn test_service_core_lifecycle() {
        let (core, cycles, stopped) = spawn(ServiceConfig::new("core-lifecycle"));
        core.drain();
        assert_eq!(core.shared().running_status(), RunningStatus::Sleeping);
        assert!(cycles.load(Ordering::SeqCst) >= 1);

        core.stop(true);
        assert_eq!(core.shared().thread_status(), ThreadStatus::Suspended);
        core.run();
        assert_eq!(core.shared().thread_status(), ThreadStatus::Running);

        core.destroy();
        assert_eq!(core.shared().thread_status(), ThreadStatus::Quit);
        assert!(stopped.load(Ordering::SeqCst));

        // Quit is terminal.
        core.run();
        assert_eq!(core.shared().thread_status(), ThreadStatus::Quit);
        core.destroy();
    }

    #[test]
    fn test_condvar_worker_wakes_on_request() {
        let (core, cycles, _) = spawn(ServiceConfig::new("core-wake"));
        core.drain();
        let before = cycles.load(Ordering::SeqCst);

        core.shared().notify_request();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while cycles.load(Ordering::SeqCst) == before && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(cycles.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_fixed_sleep_worker_keeps_polling() {
        let config = ServiceConfig::new("core-fixed")
            .with_sleep_mode(SleepMode::FixedSleep)
            .with_sleep_time(1);
        let (core, cycles, _) = spawn(config);
        thread::sleep(Duration::from_millis(50));
        assert!(cycles.load(Ordering::SeqCst) > 2);

        core.set_sleep_time(5);
        assert_eq!(core.shared().sleep_time_ms(), 5);
    }

    struct PanickingWorker;

    impl ServiceWorker for PanickingWorker {
        fn run_cycle(&mut self) -> WorkerCycle {
            panic!("worker cycle failure");
        }
    }

    #[test]
    fn test_panicking_worker_quits_instead_of_hanging_drain() {
        let config = ServiceConfig::new("core-panic");
        let shared = Arc::new(ServiceShared::new(&config));
        shared.task_accepted();
        let core = ServiceCore::spawn(Arc::clone(&shared), PanickingWorker).expect("worker should spawn");

        core.drain();
        assert_eq!(shared.thread_status(), ThreadStatus::Quit);
        assert_eq!(shared.pending(), 1);
        core.destroy();
    }

    #[test]
    fn test_busy_drain_returns_when_idle() {
        let (core, _, _) = spawn(ServiceConfig::new("core-busy").with_sleep_mode(SleepMode::Busy));
        core.drain();
        assert_eq!(core.shared().pending(), 0);
    }

    #[test]
    fn test_stats_track_retirement() {
        let shared = ServiceShared::new(&ServiceConfig::default());
        shared.task_accepted();
        shared.task_accepted();
        shared.task_accepted();
        shared.task_rejected();
        shared.task_retired(TaskOutcome::Completed);
        shared.task_retired(TaskOutcome::Failed);
        assert_eq!(shared.pending(), 0);

        let mut stats = shared.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);

        stats.merge(&ServiceStats {
            cancelled: 3,
            ..Default::default()
        });
        assert_eq!(stats.cancelled, 3);
    }
}
