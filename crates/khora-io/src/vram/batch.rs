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

use super::task::{InFlightTask, VramStep};
use super::VramIoKind;
use crate::error::IoError;
use crate::service::runtime::ServiceShared;
use khora_core::renderer::{
    CommandEncoder, DirectStorageQueue, FenceId, FenceStatus, GraphicsDevice, QueueId,
    ResourceError,
};
use std::sync::Arc;

/// The transfer path shared by every task of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BatchKind {
    Upload,
    DirectStorage,
}

impl BatchKind {
    pub(super) fn of(kind: &VramIoKind) -> Self {
        match kind {
            VramIoKind::Upload { .. } => BatchKind::Upload,
            VramIoKind::DirectStorage { .. } => BatchKind::DirectStorage,
        }
    }
}

enum QueueTarget {
    Copy {
        queue: QueueId,
        encoder: Option<Box<dyn CommandEncoder>>,
    },
    DirectStorage {
        queue: Arc<dyn DirectStorageQueue>,
    },
}

/// One queue a batch submits to, with the fence signaled by that submission.
struct BatchQueue {
    device: Arc<dyn GraphicsDevice>,
    target: QueueTarget,
    fence: Option<FenceId>,
}

impl BatchQueue {
    fn is_copy_queue(&self, device: &Arc<dyn GraphicsDevice>, queue: QueueId) -> bool {
        Arc::ptr_eq(&self.device, device)
            && matches!(&self.target, QueueTarget::Copy { queue: q, .. } if *q == queue)
    }

    fn is_storage_queue(
        &self,
        device: &Arc<dyn GraphicsDevice>,
        queue: &Arc<dyn DirectStorageQueue>,
    ) -> bool {
        Arc::ptr_eq(&self.device, device)
            && matches!(&self.target, QueueTarget::DirectStorage { queue: q } if Arc::ptr_eq(q, queue))
    }

    fn submit(&mut self) -> Result<(), ResourceError> {
        let fence = self.device.create_fence()?;
        self.fence = Some(fence);
        match &mut self.target {
            QueueTarget::Copy { queue, encoder } => match encoder.take() {
                Some(encoder) => {
                    let commands = encoder.finish()?;
                    self.device.submit(*queue, &[commands], Some(fence))
                }
                None => Ok(()),
            },
            QueueTarget::DirectStorage { queue } => queue.submit(fence),
        }
    }
}

/// Tasks dispatched in the same worker cycle that share one submission.
///
/// The batch is submitted once every task has recorded its transfer. Its tasks
/// complete together, when all of the batch's fences have signaled.
pub(super) struct TaskBatch {
    id: u64,
    kind: BatchKind,
    tasks: Vec<InFlightTask>,
    queues: Vec<BatchQueue>,
    submitted: bool,
    signaled: bool,
    failure: Option<String>,
}

impl TaskBatch {
    pub(super) fn new(id: u64, kind: BatchKind) -> Self {
        Self {
            id,
            kind,
            tasks: Vec::new(),
            queues: Vec::new(),
            submitted: false,
            signaled: false,
            failure: None,
        }
    }

    pub(super) fn push(&mut self, task: InFlightTask) {
        self.tasks.push(task);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Moves every task one pipeline step forward.
    ///
    /// A task that fails leaves the batch; the others carry on.
    pub(super) fn advance(&mut self, shared: &ServiceShared) {
        for mut task in std::mem::take(&mut self.tasks) {
            let advanced = match task.step {
                VramStep::None => task.create_resource(),
                VramStep::ResourceCreated => self.record(&mut task),
                VramStep::Uploading | VramStep::HardwareTransfer => Ok(()),
            };
            match advanced {
                Ok(()) => self.tasks.push(task),
                Err(e) => task.abort(shared, e.to_string()),
            }
        }
    }

    fn record(&mut self, task: &mut InFlightTask) -> Result<(), IoError> {
        let device = Arc::clone(&task.payload().device);
        match &task.payload().kind {
            VramIoKind::Upload { queue, .. } => {
                let queue = *queue;
                let encoder = self.copy_encoder(&device, queue)?;
                task.record_upload(encoder)
            }
            VramIoKind::DirectStorage { queue, .. } => {
                let queue = Arc::clone(queue);
                if !self.queues.iter().any(|q| q.is_storage_queue(&device, &queue)) {
                    self.queues.push(BatchQueue {
                        device,
                        target: QueueTarget::DirectStorage { queue },
                        fence: None,
                    });
                }
                task.record_hardware_transfer()
            }
        }
    }

    fn copy_encoder(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        queue: QueueId,
    ) -> Result<&mut dyn CommandEncoder, IoError> {
        let index = match self.queues.iter().position(|q| q.is_copy_queue(device, queue)) {
            Some(index) => index,
            None => {
                let label = format!("vram batch {}", self.id);
                let encoder = device.create_command_encoder(queue, Some(&label))?;
                self.queues.push(BatchQueue {
                    device: Arc::clone(device),
                    target: QueueTarget::Copy {
                        queue,
                        encoder: Some(encoder),
                    },
                    fence: None,
                });
                self.queues.len() - 1
            }
        };
        match &mut self.queues[index].target {
            QueueTarget::Copy {
                encoder: Some(encoder),
                ..
            } => Ok(encoder.as_mut()),
            _ => Err(IoError::InvalidDescriptor(format!(
                "batch {} was already submitted",
                self.id
            ))),
        }
    }

    pub(super) fn ready_to_submit(&self) -> bool {
        !self.submitted
            && !self.tasks.is_empty()
            && self.tasks.iter().all(InFlightTask::is_recorded)
    }

    /// Submits every queue of the batch with a fresh signal fence.
    pub(super) fn submit(&mut self, shared: &ServiceShared) {
        self.submitted = true;
        log::debug!(
            "IoService '{}': submitting {:?} batch {} ({} tasks, {} queues).",
            shared.name(),
            self.kind,
            self.id,
            self.tasks.len(),
            self.queues.len()
        );
        for entry in &mut self.queues {
            if let Err(e) = entry.submit() {
                self.failure.get_or_insert_with(|| e.to_string());
            }
        }
    }

    /// Completes the batch once every fence has signaled.
    ///
    /// All tasks move to `Ok` in the same call, or all to `Error` if the
    /// submission failed.
    pub(super) fn poll(&mut self, shared: &ServiceShared) {
        if !self.submitted || self.signaled {
            return;
        }
        for entry in &self.queues {
            let Some(fence) = entry.fence else { continue };
            match entry.device.query_fence_status(fence) {
                Ok(FenceStatus::Incomplete) => return,
                Ok(FenceStatus::Complete | FenceStatus::NotSubmitted) => {}
                Err(e) => {
                    self.failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        self.signaled = true;
        let tasks = std::mem::take(&mut self.tasks);
        match &self.failure {
            Some(failure) => {
                let message = format!("batch {} failed: {}", self.id, failure);
                for task in tasks {
                    task.abort(shared, message.clone());
                }
            }
            None => {
                log::debug!(
                    "IoService '{}': {:?} batch {} signaled, {} tasks done.",
                    shared.name(),
                    self.kind,
                    self.id,
                    tasks.len()
                );
                for task in tasks {
                    task.finish(shared);
                }
            }
        }
    }

    /// Whether nothing in the batch is waiting for the GPU anymore.
    pub(super) fn is_retired(&self) -> bool {
        self.tasks.is_empty() && (self.signaled || !self.submitted)
    }

    /// Fails every task still in the batch.
    pub(super) fn abort_all(&mut self, shared: &ServiceShared, message: &str) {
        for task in std::mem::take(&mut self.tasks) {
            task.abort(shared, message.to_string());
        }
    }

    /// Destroys the batch's fences.
    pub(super) fn release(self, shared: &ServiceShared) {
        for entry in self.queues {
            if let Some(fence) = entry.fence {
                if let Err(e) = entry.device.destroy_fence(fence) {
                    log::warn!(
                        "IoService '{}': failed to destroy fence {:?}: {}",
                        shared.name(),
                        fence,
                        e
                    );
                }
            }
        }
    }
}
