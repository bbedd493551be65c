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

use super::{VramIoKind, VramPayload, VramResource, VramResourceDescriptor};
use crate::error::IoError;
use crate::request::RequestStatus;
use crate::service::runtime::{ServiceShared, TaskOutcome};
use crate::task::Task;
use khora_core::renderer::{
    BufferBarrier, BufferDescriptor, BufferId, CommandEncoder, DStorageDestination,
    DStorageFileId, DStorageRequest, QueueType, ResourceState, TextureBarrier,
};

/// Where a task stands in the VRAM pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum VramStep {
    None,
    ResourceCreated,
    Uploading,
    HardwareTransfer,
}

/// A dispatched VRAM task and the GPU objects it owns so far.
pub(super) struct InFlightTask {
    pub(super) task: Task<VramPayload, VramResource>,
    pub(super) step: VramStep,
    resource: Option<VramResource>,
    staging: Option<BufferId>,
    file: Option<DStorageFileId>,
    transfer_size: u64,
}

impl InFlightTask {
    pub(super) fn new(task: Task<VramPayload, VramResource>) -> Self {
        Self {
            task,
            step: VramStep::None,
            resource: None,
            staging: None,
            file: None,
            transfer_size: 0,
        }
    }

    pub(super) fn payload(&self) -> &VramPayload {
        &self.task.payload
    }

    /// Whether the transfer has been recorded and only waits for submission.
    pub(super) fn is_recorded(&self) -> bool {
        matches!(self.step, VramStep::Uploading | VramStep::HardwareTransfer)
    }

    /// `None -> ResourceCreated`: creates the destination.
    pub(super) fn create_resource(&mut self) -> Result<(), IoError> {
        self.task.transition(RequestStatus::CreatingResource);

        let payload = &mut self.task.payload;
        match &payload.kind {
            VramIoKind::Upload { bytes, .. } => self.transfer_size = bytes.len() as u64,
            VramIoKind::DirectStorage { queue, path } => {
                let file = queue.open_file(path)?;
                self.file = Some(file);
                let file_size = queue.query_file_info(file)?.file_size;
                match &mut payload.resource {
                    VramResourceDescriptor::Buffer(desc) => {
                        if file_size == 0 {
                            return Err(IoError::InvalidDescriptor(format!(
                                "'{path}' is empty"
                            )));
                        }
                        desc.size = file_size;
                        self.transfer_size = file_size;
                    }
                    VramResourceDescriptor::Texture(desc) => {
                        let expected = desc.base_level_size();
                        if file_size < expected {
                            return Err(IoError::InvalidDescriptor(format!(
                                "'{path}' holds {file_size} bytes, texture needs {expected}"
                            )));
                        }
                        self.transfer_size = expected;
                    }
                }
            }
        }

        let resource = match &payload.resource {
            VramResourceDescriptor::Buffer(desc) => {
                VramResource::Buffer(payload.device.create_buffer(desc)?)
            }
            VramResourceDescriptor::Texture(desc) => {
                VramResource::Texture(payload.device.create_texture(desc)?)
            }
        };
        self.resource = Some(resource);
        self.step = VramStep::ResourceCreated;
        Ok(())
    }

    /// `ResourceCreated -> Uploading`: fills a staging buffer and records the
    /// copy and the ownership release into `encoder`.
    pub(super) fn record_upload(&mut self, encoder: &mut dyn CommandEncoder) -> Result<(), IoError> {
        self.task.transition(RequestStatus::VramLoading);

        let resource = self.created()?;
        let payload = &mut self.task.payload;
        let VramIoKind::Upload { bytes, .. } = &mut payload.kind else {
            return Err(IoError::InvalidDescriptor(
                "hardware transfer recorded as an upload".to_string(),
            ));
        };

        let size = bytes.len() as u64;
        let label = match &payload.resource {
            VramResourceDescriptor::Buffer(desc) => desc.label.as_deref(),
            VramResourceDescriptor::Texture(desc) => desc.label.as_deref(),
        }
        .map_or_else(|| "vram upload staging".to_string(), |l| format!("{l} staging"));
        let staging = payload
            .device
            .create_buffer(&BufferDescriptor::staging(label, size))?;
        self.staging = Some(staging);
        payload.device.write_buffer(staging, 0, bytes.as_slice())?;
        // The staging buffer now holds the only copy the GPU needs.
        *bytes = Vec::new();

        let release_to = (encoder.queue().kind != QueueType::Graphics).then_some(QueueType::Graphics);
        match (resource, &payload.resource) {
            (VramResource::Buffer(buffer), _) => {
                encoder.copy_buffer_to_buffer(&staging, 0, &buffer, 0, size);
                encoder.resource_barrier(
                    &[BufferBarrier {
                        buffer,
                        src_state: ResourceState::CopyDest,
                        dst_state: ResourceState::Common,
                        queue_release: release_to,
                    }],
                    &[],
                );
            }
            (VramResource::Texture(texture), VramResourceDescriptor::Texture(desc)) => {
                encoder.copy_buffer_to_texture(&staging, 0, desc.bytes_per_row(), &texture, desc.size);
                encoder.resource_barrier(
                    &[],
                    &[TextureBarrier {
                        texture,
                        src_state: ResourceState::CopyDest,
                        dst_state: ResourceState::ShaderResource,
                        queue_release: release_to,
                    }],
                );
            }
            (VramResource::Texture(_), VramResourceDescriptor::Buffer(_)) => {
                return Err(IoError::InvalidDescriptor(
                    "texture created from a buffer descriptor".to_string(),
                ));
            }
        }

        self.step = VramStep::Uploading;
        Ok(())
    }

    /// `ResourceCreated -> HardwareTransfer`: enqueues the read on the hardware queue.
    pub(super) fn record_hardware_transfer(&mut self) -> Result<(), IoError> {
        self.task.transition(RequestStatus::VramLoading);

        let resource = self.created()?;
        let VramIoKind::DirectStorage { queue, path } = &self.task.payload.kind else {
            return Err(IoError::InvalidDescriptor(
                "upload recorded as a hardware transfer".to_string(),
            ));
        };
        let file = self.file.ok_or_else(|| {
            IoError::InvalidDescriptor(format!("'{path}' was never opened"))
        })?;

        let destination = match resource {
            VramResource::Buffer(buffer) => DStorageDestination::Buffer { buffer, offset: 0 },
            VramResource::Texture(texture) => DStorageDestination::Texture { texture },
        };
        queue.enqueue_request(&DStorageRequest {
            file,
            offset: 0,
            size: self.transfer_size,
            destination,
        })?;

        self.step = VramStep::HardwareTransfer;
        Ok(())
    }

    fn created(&self) -> Result<VramResource, IoError> {
        self.resource.ok_or_else(|| {
            IoError::InvalidDescriptor("transfer recorded before the resource exists".to_string())
        })
    }

    /// Hands the resource to the caller and moves the request to `Ok`.
    pub(super) fn finish(mut self, shared: &ServiceShared) {
        self.release_transient(shared);
        match self.resource.take() {
            Some(resource) => {
                self.task.request.store_output(resource);
                self.task.transition(RequestStatus::Ok);
                shared.task_retired(TaskOutcome::Completed);
            }
            None => self.abort(shared, "finished without a resource".to_string()),
        }
    }

    /// Releases everything the task created and moves the request to `Error`.
    pub(super) fn abort(mut self, shared: &ServiceShared, message: String) {
        log::error!(
            "IoService '{}': VRAM request failed: {}",
            shared.name(),
            message
        );
        self.release_transient(shared);
        if let Some(resource) = self.resource.take() {
            let device = &self.task.payload.device;
            let destroyed = match resource {
                VramResource::Buffer(id) => device.destroy_buffer(id),
                VramResource::Texture(id) => device.destroy_texture(id),
            };
            if let Err(e) = destroyed {
                log::warn!(
                    "IoService '{}': failed to destroy {:?}: {}",
                    shared.name(),
                    resource,
                    e
                );
            }
        }
        self.task.fail(message);
        shared.task_retired(TaskOutcome::Failed);
    }

    fn release_transient(&mut self, shared: &ServiceShared) {
        if let Some(staging) = self.staging.take() {
            if let Err(e) = self.task.payload.device.destroy_buffer(staging) {
                log::warn!(
                    "IoService '{}': failed to release staging buffer {:?}: {}",
                    shared.name(),
                    staging,
                    e
                );
            }
        }
        if let (Some(file), VramIoKind::DirectStorage { queue, .. }) =
            (self.file.take(), &self.task.payload.kind)
        {
            queue.close_file(file);
        }
    }
}
