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

use super::batch::{BatchKind, TaskBatch};
use super::task::InFlightTask;
use super::{VramPayload, VramResource};
use crate::container::TaskContainer;
use crate::service::runtime::{ServiceShared, ServiceWorker, WorkerCycle};
use std::sync::Arc;

pub(super) struct VramWorker {
    container: Arc<TaskContainer<VramPayload, VramResource>>,
    shared: Arc<ServiceShared>,
    cycle: u64,
    batches: Vec<TaskBatch>,
}

impl VramWorker {
    pub(super) fn new(
        container: Arc<TaskContainer<VramPayload, VramResource>>,
        shared: Arc<ServiceShared>,
    ) -> Self {
        Self {
            container,
            shared,
            cycle: 0,
            batches: Vec::new(),
        }
    }

    /// Moves everything queued into this cycle's batches. Returns `true` if
    /// anything was dequeued.
    fn collect(&mut self) -> bool {
        let mut upload = TaskBatch::new(self.cycle, BatchKind::Upload);
        let mut storage = TaskBatch::new(self.cycle, BatchKind::DirectStorage);
        while let Some(task) = self.container.peek() {
            match BatchKind::of(&task.payload.kind) {
                BatchKind::Upload => upload.push(InFlightTask::new(task)),
                BatchKind::DirectStorage => storage.push(InFlightTask::new(task)),
            }
        }

        let mut collected = false;
        for batch in [upload, storage] {
            if !batch.is_empty() {
                collected = true;
                self.batches.push(batch);
            }
        }
        collected
    }

    fn sweep(&mut self) {
        let (retired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.batches)
            .into_iter()
            .partition(TaskBatch::is_retired);
        self.batches = live;
        for batch in retired {
            batch.release(&self.shared);
        }
    }
}

impl ServiceWorker for VramWorker {
    fn run_cycle(&mut self) -> WorkerCycle {
        self.cycle += 1;
        let collected = self.collect();

        for batch in &mut self.batches {
            batch.advance(&self.shared);
            if batch.ready_to_submit() {
                batch.submit(&self.shared);
            }
            batch.poll(&self.shared);
        }
        self.sweep();

        if collected {
            WorkerCycle::Busy
        } else if !self.batches.is_empty() {
            WorkerCycle::Waiting
        } else {
            WorkerCycle::Idle
        }
    }

    fn shutdown(&mut self) {
        for mut batch in std::mem::take(&mut self.batches) {
            batch.abort_all(&self.shared, "service shut down");
            batch.release(&self.shared);
        }
    }
}
