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

mod common;

use anyhow::{anyhow, Result};
use common::{init_logger, wait_until_finished, StatusLog, TIMEOUT};
use khora_core::math::Extent3D;
use khora_core::renderer::{
    BufferDescriptor, BufferUsage, DirectStorageQueue, GraphicsDevice, QueueId, QueueType,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsage,
};
use khora_core::vfs::VirtualFileSystem;
use khora_infra::{HeadlessDevice, HeadlessDirectStorageQueue, HeadlessLimits, MemoryFileSystem};
use khora_io::{
    IoError, IoService, RequestStatus, ServiceConfig, VramIoDescriptor, VramRequest,
    VramResource, VramResourceDescriptor, VramService,
};
use std::sync::{Arc, Mutex};

struct Gpu {
    device: HeadlessDevice,
    handle: Arc<dyn GraphicsDevice>,
    transfer: QueueId,
}

impl Gpu {
    fn new(limits: HeadlessLimits) -> Result<Self> {
        let device = HeadlessDevice::new(limits);
        let transfer = device
            .get_queue(QueueType::Transfer)
            .ok_or_else(|| anyhow!("no transfer queue"))?;
        Ok(Self {
            handle: Arc::new(device.clone()),
            device,
            transfer,
        })
    }

    fn upload_buffer(&self, label: &str, bytes: Vec<u8>) -> VramIoDescriptor {
        VramIoDescriptor::upload(
            Arc::clone(&self.handle),
            VramResourceDescriptor::Buffer(
                BufferDescriptor::device_local(label.to_string(), 0, BufferUsage::VERTEX),
            ),
            self.transfer,
            bytes,
        )
    }

    fn storage_queue(&self, vfs: Arc<dyn VirtualFileSystem>) -> Arc<dyn DirectStorageQueue> {
        Arc::new(HeadlessDirectStorageQueue::new(self.device.clone(), vfs))
    }
}

fn rgba_texture(width: u32, height: u32) -> TextureDescriptor<'static> {
    TextureDescriptor {
        label: Some("albedo".into()),
        size: Extent3D::new_2d(width, height),
        mip_level_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::TEXTURE_BINDING,
    }
}

fn suspended_service(name: &str) -> Result<VramService> {
    let service = VramService::create(ServiceConfig::new(name))?;
    service.drain();
    service.stop(false);
    Ok(service)
}

#[test]
fn test_buffer_upload_round_trip() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let service = VramService::create(ServiceConfig::new("vram-buffer"))?;
    let log = StatusLog::default();
    let bytes: Vec<u8> = (1..=16).collect();
    let request = Arc::new(VramRequest::new());

    service.request(
        gpu.upload_buffer("vertices", bytes.clone())
            .with_callbacks(log.callbacks("vb")),
        &request,
    )?;
    service.drain();

    assert_eq!(
        log.statuses("vb"),
        vec![
            RequestStatus::Enqueued,
            RequestStatus::CreatingResource,
            RequestStatus::VramLoading,
            RequestStatus::Ok
        ]
    );
    let Some(VramResource::Buffer(buffer)) = request.take_output() else {
        return Err(anyhow!("expected a buffer, got status {:?}", request.status()));
    };
    assert_eq!(gpu.device.read_buffer(buffer), Some(bytes));

    // Only the destination survives: the staging buffer and the fence are gone.
    assert_eq!(gpu.device.live_buffer_count(), 1);
    assert_eq!(gpu.device.live_fence_count(), 0);
    assert_eq!(gpu.device.barrier_count(), 1);
    Ok(())
}

#[test]
fn test_texture_upload_fills_base_level() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let service = VramService::create(ServiceConfig::new("vram-texture"))?;
    let texels: Vec<u8> = (0..64).collect();
    let request = Arc::new(VramRequest::new());

    service.request(
        VramIoDescriptor::upload(
            Arc::clone(&gpu.handle),
            VramResourceDescriptor::Texture(rgba_texture(4, 4)),
            gpu.transfer,
            texels.clone(),
        ),
        &request,
    )?;
    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Ok);

    let Some(VramResource::Texture(texture)) = request.take_output() else {
        return Err(anyhow!("expected a texture"));
    };
    assert_eq!(gpu.device.read_texture(texture), Some(texels));
    service.drain();
    assert_eq!(gpu.device.live_buffer_count(), 0);
    assert_eq!(gpu.device.live_texture_count(), 1);
    Ok(())
}

#[test]
fn test_batch_members_complete_in_the_same_fence_observation() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits {
        fence_latency: 3,
        ..Default::default()
    })?;
    let service = suspended_service("vram-batch")?;
    let observations = Arc::new(Mutex::new(Vec::new()));

    let requests: Vec<_> = (0..4).map(|_| Arc::new(VramRequest::new())).collect();
    for (i, request) in requests.iter().enumerate() {
        let device = gpu.device.clone();
        let observations = Arc::clone(&observations);
        service.request(
            gpu.upload_buffer(&format!("batched-{i}"), vec![i as u8; 32])
                .on(RequestStatus::Ok, move |_| {
                    observations
                        .lock()
                        .unwrap()
                        .push(device.fence_query_count());
                }),
            request,
        )?;
    }
    service.run();
    service.drain();

    assert!(requests.iter().all(|r| r.status() == RequestStatus::Ok));
    let observations = observations.lock().unwrap();
    assert_eq!(observations.len(), 4);
    assert!(observations.iter().all(|&count| count == observations[0]));
    assert!(observations[0] > 3);

    // One shared encoder for the transfer queue, one submission.
    assert_eq!(gpu.device.submission_count(), 1);
    assert_eq!(gpu.device.live_fence_count(), 0);
    Ok(())
}

#[test]
fn test_direct_storage_sizes_buffer_from_file() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let contents: Vec<u8> = (0..100).map(|i| (i * 3) as u8).collect();
    let vfs = MemoryFileSystem::new();
    vfs.write_all("meshes/rock.bin", &contents)?;
    let storage = Arc::new(HeadlessDirectStorageQueue::new(gpu.device.clone(), Arc::new(vfs)));

    let service = VramService::create(ServiceConfig::new("vram-dstorage"))?;
    let log = StatusLog::default();
    let request = Arc::new(VramRequest::new());
    service.request(
        VramIoDescriptor::direct_storage(
            Arc::clone(&gpu.handle),
            VramResourceDescriptor::Buffer(BufferDescriptor::device_local(
                "rock",
                0,
                BufferUsage::VERTEX,
            )),
            storage.clone(),
            "meshes/rock.bin",
        )
        .with_callbacks(log.callbacks("rock")),
        &request,
    )?;
    service.drain();

    assert_eq!(
        log.statuses("rock"),
        vec![
            RequestStatus::Enqueued,
            RequestStatus::CreatingResource,
            RequestStatus::VramLoading,
            RequestStatus::Ok
        ]
    );
    let Some(VramResource::Buffer(buffer)) = request.take_output() else {
        return Err(anyhow!("expected a buffer"));
    };
    assert_eq!(gpu.device.read_buffer(buffer), Some(contents));
    assert_eq!(storage.open_file_count(), 0);
    assert_eq!(gpu.device.live_fence_count(), 0);
    Ok(())
}

#[test]
fn test_direct_storage_texture_reads_the_base_level() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let vfs: Arc<dyn VirtualFileSystem> = Arc::new(MemoryFileSystem::new());
    // 2x2 RGBA8 base level followed by a mip tail the request ignores.
    let file: Vec<u8> = (0..20).collect();
    vfs.write_all("textures/tiny.tex", &file)?;

    let service = VramService::create(ServiceConfig::new("vram-dstorage-tex"))?;
    let request = Arc::new(VramRequest::new());
    service.request(
        VramIoDescriptor::direct_storage(
            Arc::clone(&gpu.handle),
            VramResourceDescriptor::Texture(rgba_texture(2, 2)),
            gpu.storage_queue(Arc::clone(&vfs)),
            "textures/tiny.tex",
        ),
        &request,
    )?;
    service.drain();

    let Some(VramResource::Texture(texture)) = request.take_output() else {
        return Err(anyhow!("expected a texture, got {:?}", request.error()));
    };
    assert_eq!(gpu.device.read_texture(texture), Some(file[..16].to_vec()));
    Ok(())
}

#[test]
fn test_direct_storage_missing_file_fails_cleanly() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let storage = Arc::new(HeadlessDirectStorageQueue::new(
        gpu.device.clone(),
        Arc::new(MemoryFileSystem::new()),
    ));
    let service = VramService::create(ServiceConfig::new("vram-dstorage-missing"))?;
    let log = StatusLog::default();
    let request = Arc::new(VramRequest::new());

    service.request(
        VramIoDescriptor::direct_storage(
            Arc::clone(&gpu.handle),
            VramResourceDescriptor::Buffer(BufferDescriptor::device_local(
                "ghost",
                0,
                BufferUsage::STORAGE,
            )),
            storage.clone(),
            "ghost.bin",
        )
        .with_callbacks(log.callbacks("ghost")),
        &request,
    )?;
    service.drain();

    assert_eq!(request.status(), RequestStatus::Error);
    assert_eq!(
        log.statuses("ghost"),
        vec![
            RequestStatus::Enqueued,
            RequestStatus::CreatingResource,
            RequestStatus::Error
        ]
    );
    assert_eq!(gpu.device.live_buffer_count(), 0);
    assert_eq!(storage.open_file_count(), 0);
    assert_eq!(service.stats().failed, 1);
    Ok(())
}

#[test]
fn test_failed_member_leaves_the_rest_of_the_batch() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits {
        max_buffer_size: 64,
        ..Default::default()
    })?;
    let service = suspended_service("vram-partial-failure")?;

    let too_big = Arc::new(VramRequest::new());
    let fits = Arc::new(VramRequest::new());
    service.request(gpu.upload_buffer("too-big", vec![7; 128]), &too_big)?;
    service.request(gpu.upload_buffer("fits", vec![9; 32]), &fits)?;
    service.run();
    service.drain();

    assert_eq!(too_big.status(), RequestStatus::Error);
    assert!(too_big.error().is_some_and(|e| e.contains("128")));
    assert_eq!(fits.status(), RequestStatus::Ok);
    assert_eq!(gpu.device.live_buffer_count(), 1);
    Ok(())
}

#[test]
fn test_upload_and_direct_storage_in_one_cycle() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let vfs: Arc<dyn VirtualFileSystem> = Arc::new(MemoryFileSystem::new());
    vfs.write_all("blob", &[5; 10])?;
    let service = suspended_service("vram-mixed")?;

    let uploaded = Arc::new(VramRequest::new());
    let streamed = Arc::new(VramRequest::new());
    service.request(gpu.upload_buffer("uploaded", vec![1; 8]), &uploaded)?;
    service.request(
        VramIoDescriptor::direct_storage(
            Arc::clone(&gpu.handle),
            VramResourceDescriptor::Buffer(BufferDescriptor::device_local(
                "streamed",
                0,
                BufferUsage::INDEX,
            )),
            gpu.storage_queue(vfs),
            "blob",
        ),
        &streamed,
    )?;
    service.run();
    service.drain();

    assert_eq!(uploaded.status(), RequestStatus::Ok);
    assert_eq!(streamed.status(), RequestStatus::Ok);
    assert_eq!(gpu.device.live_fence_count(), 0);
    assert_eq!(service.stats().completed, 2);
    Ok(())
}

#[test]
fn test_invalid_descriptors_are_rejected_synchronously() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let service = VramService::create(ServiceConfig::new("vram-invalid"))?;
    let request = Arc::new(VramRequest::new());

    let wrong_texel_count = VramIoDescriptor::upload(
        Arc::clone(&gpu.handle),
        VramResourceDescriptor::Texture(rgba_texture(4, 4)),
        gpu.transfer,
        vec![0; 10],
    );
    assert!(matches!(
        service.request(wrong_texel_count, &request),
        Err(IoError::InvalidDescriptor(_))
    ));

    let too_small = VramIoDescriptor::upload(
        Arc::clone(&gpu.handle),
        VramResourceDescriptor::Buffer(BufferDescriptor::device_local(
            "small",
            4,
            BufferUsage::UNIFORM,
        )),
        gpu.transfer,
        vec![0; 8],
    );
    assert!(matches!(
        service.request(too_small, &request),
        Err(IoError::InvalidDescriptor(_))
    ));
    assert!(matches!(
        service.request(gpu.upload_buffer("empty", Vec::new()), &request),
        Err(IoError::InvalidDescriptor(_))
    ));
    assert_eq!(request.status(), RequestStatus::None);
    Ok(())
}

#[test]
fn test_cancel_before_dispatch_creates_nothing() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let service = suspended_service("vram-cancel")?;
    let request = Arc::new(VramRequest::new());

    service.request(gpu.upload_buffer("cancelled", vec![1; 4]), &request)?;
    assert!(service.try_cancel(&request));
    service.run();
    service.drain();

    assert_eq!(request.status(), RequestStatus::Cancelled);
    assert_eq!(gpu.device.live_buffer_count(), 0);
    assert_eq!(gpu.device.submission_count(), 0);
    Ok(())
}

#[test]
fn test_destroyed_service_refuses_requests() -> Result<()> {
    init_logger();
    let gpu = Gpu::new(HeadlessLimits::default())?;
    let service = VramService::create(ServiceConfig::new("vram-destroyed"))?;
    service.destroy();
    service.destroy();

    let request = Arc::new(VramRequest::new());
    assert!(matches!(
        service.request(gpu.upload_buffer("late", vec![1]), &request),
        Err(IoError::ServiceStopped { .. })
    ));
    Ok(())
}
