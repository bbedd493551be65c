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

use anyhow::Result;
use common::{init_logger, wait_until_finished, StatusLog, TIMEOUT};
use khora_core::vfs::VirtualFileSystem;
use khora_infra::{LocalFileSystem, MemoryFileSystem};
use khora_io::{
    IoError, IoService, Priority, RamIoDescriptor, RamRequest, RamService, RequestStatus,
    ServiceConfig, ServicePool, SleepMode, SortMethod, ThreadStatus,
};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn memory_vfs(files: &[(&str, &[u8])]) -> Result<Arc<dyn VirtualFileSystem>> {
    let vfs = MemoryFileSystem::new();
    for (path, bytes) in files {
        vfs.write_all(path, bytes)?;
    }
    Ok(Arc::new(vfs))
}

/// Creates a service, lets it settle, then suspends it so that requests pile up.
fn suspended_service(config: ServiceConfig) -> Result<RamService> {
    let service = RamService::create(config)?;
    service.drain();
    service.stop(false);
    assert_eq!(service.thread_status(), ThreadStatus::Suspended);
    Ok(service)
}

#[test]
fn test_read_whole_file_without_destination() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"Hello, World!")])?;
    let service = RamService::create(ServiceConfig::new("ram-hello"))?;
    let log = StatusLog::default();
    let request = Arc::new(RamRequest::new());

    service.request(
        &vfs,
        RamIoDescriptor::new("f")
            .with_range(0, 13)
            .with_callbacks(log.callbacks("f")),
        &request,
        None,
    )?;

    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Ok);
    assert_eq!(request.take_output().as_deref(), Some(&b"Hello, World!"[..]));
    assert_eq!(
        log.statuses("f"),
        vec![
            RequestStatus::Enqueued,
            RequestStatus::RamLoading,
            RequestStatus::Ok
        ]
    );
    Ok(())
}

#[test]
fn test_read_range_from_local_directory() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join("packs"))?;
    std::fs::write(dir.path().join("packs/level.pack"), (0u8..=255).collect::<Vec<_>>())?;
    let vfs: Arc<dyn VirtualFileSystem> = Arc::new(LocalFileSystem::new(dir.path()));

    let service = RamService::create(ServiceConfig::new("ram-local"))?;
    let request = Arc::new(RamRequest::new());
    service.request(
        &vfs,
        RamIoDescriptor::new("packs/level.pack").with_range(100, 50),
        &request,
        Some(vec![0xAA; 4]),
    )?;
    service.drain();

    assert_eq!(request.status(), RequestStatus::Ok);
    assert_eq!(request.take_output(), Some((100u8..150).collect::<Vec<_>>()));
    assert_eq!(service.stats().completed, 1);
    assert_eq!(service.pending(), 0);
    Ok(())
}

#[test]
fn test_partial_sort_dispatches_urgent_first() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("a", b"aaaa"), ("b", b"bbbb")])?;
    let service =
        suspended_service(ServiceConfig::new("ram-partial").with_sort_method(SortMethod::Partial))?;
    let log = StatusLog::default();

    let a = Arc::new(RamRequest::new());
    let b = Arc::new(RamRequest::new());
    service.request(
        &vfs,
        RamIoDescriptor::new("a")
            .with_priority(Priority::Normal)
            .with_callbacks(log.callbacks("a")),
        &a,
        None,
    )?;
    service.request(
        &vfs,
        RamIoDescriptor::new("b")
            .with_priority(Priority::Urgent)
            .with_callbacks(log.callbacks("b")),
        &b,
        None,
    )?;
    assert_eq!(service.queued(), 2);

    service.run();
    service.drain();

    assert_eq!(log.labels_entering(RequestStatus::RamLoading), vec!["b", "a"]);
    assert_eq!(a.status(), RequestStatus::Ok);
    assert_eq!(b.status(), RequestStatus::Ok);
    Ok(())
}

#[test]
fn test_sub_priority_breaks_ties_under_stable_sort() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("x", b"x")])?;
    let service = suspended_service(ServiceConfig::new("ram-stable"))?;
    let log = StatusLog::default();

    let labels = ["low", "high", "mid"];
    let weights = [0.1, 0.9, 0.5];
    let mut requests = Vec::new();
    for (label, weight) in labels.iter().zip(weights) {
        let request = Arc::new(RamRequest::new());
        service.request(
            &vfs,
            RamIoDescriptor::new("x")
                .with_sub_priority(weight)
                .with_callbacks(log.callbacks(label)),
            &request,
            None,
        )?;
        requests.push(request);
    }

    service.run();
    service.drain();
    assert_eq!(
        log.labels_entering(RequestStatus::RamLoading),
        vec!["high", "mid", "low"]
    );
    Ok(())
}

#[test]
fn test_try_cancel_on_suspended_worker() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"data")])?;
    let service = suspended_service(ServiceConfig::new("ram-cancel"))?;
    let log = StatusLog::default();
    let request = Arc::new(RamRequest::new());

    service.request(
        &vfs,
        RamIoDescriptor::new("f").with_callbacks(log.callbacks("f")),
        &request,
        None,
    )?;
    assert!(service.try_cancel(&request));
    assert_eq!(service.get_status(&request), RequestStatus::Cancelled);
    assert!(!service.try_cancel(&request));

    service.run();
    service.drain();

    assert_eq!(request.status(), RequestStatus::Cancelled);
    assert_eq!(request.take_output(), None);
    assert_eq!(
        log.statuses("f"),
        vec![RequestStatus::Enqueued, RequestStatus::Cancelled]
    );
    assert_eq!(service.stats().cancelled, 1);
    Ok(())
}

#[test]
fn test_try_cancel_fails_once_finished() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"data")])?;
    let service = RamService::create(ServiceConfig::new("ram-late-cancel"))?;
    let request = Arc::new(RamRequest::new());

    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    service.drain();
    assert!(!service.try_cancel(&request));
    assert_eq!(request.status(), RequestStatus::Ok);
    Ok(())
}

#[test]
fn test_deferred_cancel_then_drain() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"data")])?;

    // Suspended: the flag is seen before dispatch.
    let service = suspended_service(ServiceConfig::new("ram-defer"))?;
    let request = Arc::new(RamRequest::new());
    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    service.defer_cancel(&request);
    assert_eq!(request.status(), RequestStatus::Enqueued);
    service.run();
    service.drain();
    assert_eq!(request.status(), RequestStatus::Cancelled);

    // Running: the request may already be gone, either outcome is valid.
    let service = RamService::create(ServiceConfig::new("ram-defer-race"))?;
    let request = Arc::new(RamRequest::new());
    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    service.defer_cancel(&request);
    service.drain();
    assert!(matches!(
        request.status(),
        RequestStatus::Cancelled | RequestStatus::Ok
    ));
    Ok(())
}

#[test]
fn test_missing_file_moves_to_error() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("present", b"1")])?;
    let service = RamService::create(ServiceConfig::new("ram-missing"))?;
    let log = StatusLog::default();
    let missing = Arc::new(RamRequest::new());
    let present = Arc::new(RamRequest::new());

    service.request(
        &vfs,
        RamIoDescriptor::new("absent.bin").with_callbacks(log.callbacks("absent")),
        &missing,
        None,
    )?;
    service.request(&vfs, RamIoDescriptor::new("present"), &present, None)?;
    service.drain();

    assert_eq!(missing.status(), RequestStatus::Error);
    assert!(missing
        .error()
        .is_some_and(|message| message.contains("absent.bin")));
    assert_eq!(
        log.statuses("absent").last(),
        Some(&RequestStatus::Error)
    );
    assert_eq!(present.status(), RequestStatus::Ok);

    let stats = service.stats();
    assert_eq!((stats.failed, stats.completed), (1, 1));
    Ok(())
}

#[test]
fn test_short_file_is_an_error() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("short", b"abc")])?;
    let service = RamService::create(ServiceConfig::new("ram-short"))?;
    let request = Arc::new(RamRequest::new());

    service.request(&vfs, RamIoDescriptor::new("short").with_range(1, 10), &request, None)?;
    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Error);
    Ok(())
}

#[test]
fn test_range_larger_than_memory_is_an_error() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"Hello, World!")])?;
    let service = RamService::create(ServiceConfig::new("ram-huge-range"))?;
    let huge = Arc::new(RamRequest::new());
    let after = Arc::new(RamRequest::new());

    service.request(&vfs, RamIoDescriptor::new("f").with_range(0, u64::MAX), &huge, None)?;
    service.request(&vfs, RamIoDescriptor::new("f").with_range(7, 5), &after, None)?;

    assert_eq!(wait_until_finished(&huge, TIMEOUT), RequestStatus::Error);
    assert_eq!(wait_until_finished(&after, TIMEOUT), RequestStatus::Ok);
    assert_eq!(after.take_output().as_deref(), Some(&b"World"[..]));
    service.drain();
    assert_eq!(service.pending(), 0);
    Ok(())
}

#[test]
fn test_panicking_callback_does_not_stall_the_service() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("a", b"first"), ("b", b"second")])?;
    let service = RamService::create(ServiceConfig::new("ram-callback-panic"))?;
    let first = Arc::new(RamRequest::new());
    let second = Arc::new(RamRequest::new());

    service.request(
        &vfs,
        RamIoDescriptor::new("a").on(RequestStatus::Ok, |_| panic!("user callback failure")),
        &first,
        None,
    )?;
    service.request(&vfs, RamIoDescriptor::new("b"), &second, None)?;

    assert_eq!(wait_until_finished(&first, TIMEOUT), RequestStatus::Ok);
    assert_eq!(wait_until_finished(&second, TIMEOUT), RequestStatus::Ok);
    assert_eq!(second.take_output().as_deref(), Some(&b"second"[..]));
    service.drain();
    assert_eq!(service.thread_status(), ThreadStatus::Running);
    assert_eq!(service.stats().completed, 2);
    Ok(())
}

#[test]
fn test_request_in_flight_cannot_be_submitted_twice() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"Hello, World!")])?;
    let service = suspended_service(ServiceConfig::new("ram-resubmit"))?;
    let request = Arc::new(RamRequest::new());

    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    let again = service.request(&vfs, RamIoDescriptor::new("f"), &request, None);
    assert!(matches!(again, Err(IoError::InvalidDescriptor(_))));
    assert_eq!(request.status(), RequestStatus::Enqueued);
    assert_eq!(service.queued(), 1);

    service.run();
    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Ok);
    assert_eq!(request.take_output().as_deref(), Some(&b"Hello, World!"[..]));

    // A finished request may be reused for a new read.
    service.request(&vfs, RamIoDescriptor::new("f").with_range(0, 5), &request, None)?;
    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Ok);
    assert_eq!(request.take_output().as_deref(), Some(&b"Hello"[..]));
    assert_eq!(service.stats().enqueued, 2);
    Ok(())
}

#[test]
fn test_lockless_service_accepts_concurrent_callers() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("shared", b"0123456789")])?;
    let service = Arc::new(RamService::create(
        ServiceConfig::new("ram-lockless").with_lockless(true),
    )?);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let service = Arc::clone(&service);
            let vfs = Arc::clone(&vfs);
            thread::spawn(move || -> Result<Vec<Arc<RamRequest>>, IoError> {
                (0..25)
                    .map(|i| {
                        let request = Arc::new(RamRequest::new());
                        let offset = ((worker + i) % 10) as u64;
                        service.request(
                            &vfs,
                            RamIoDescriptor::new("shared").with_range(offset, 1),
                            &request,
                            None,
                        )?;
                        Ok(request)
                    })
                    .collect()
            })
        })
        .collect();

    let mut requests = Vec::new();
    for handle in handles {
        requests.extend(handle.join().expect("caller thread panicked")?);
    }
    service.drain();

    assert_eq!(requests.len(), 100);
    assert!(requests.iter().all(|r| r.status() == RequestStatus::Ok));
    assert!(!service.try_cancel(&requests[0]));
    assert_eq!(service.stats().completed, 100);
    Ok(())
}

#[test]
fn test_critical_service_drops_past_the_limit() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"f")])?;
    let service = suspended_service(
        ServiceConfig::new("ram-critical")
            .with_critical(true)
            .with_max_task_count(2),
    )?;

    let accepted: Vec<_> = (0..2).map(|_| Arc::new(RamRequest::new())).collect();
    for request in &accepted {
        service.request(&vfs, RamIoDescriptor::new("f"), request, None)?;
    }
    let refused = Arc::new(RamRequest::new());
    let result = service.request(&vfs, RamIoDescriptor::new("f"), &refused, None);

    assert!(matches!(result, Err(IoError::QueueFull { limit: 2, .. })));
    assert_eq!(refused.status(), RequestStatus::None);

    service.run();
    service.drain();
    assert!(accepted.iter().all(|r| r.status() == RequestStatus::Ok));
    let stats = service.stats();
    assert_eq!((stats.enqueued, stats.dropped, stats.completed), (2, 1, 2));
    Ok(())
}

#[test]
fn test_service_built_from_ron_config() -> Result<()> {
    init_logger();
    let config = ServiceConfig::from_ron_str(
        r#"(
            name: "ram-ron",
            sleep_mode: fixed_sleep,
            sleep_time_ms: 1,
            sort_method: partial,
        )"#,
    )?;
    assert_eq!(config.sleep_mode, SleepMode::FixedSleep);

    let vfs = memory_vfs(&[("f", b"ron")])?;
    let service = RamService::create(config)?;
    assert_eq!(service.name(), "ram-ron");
    let request = Arc::new(RamRequest::new());
    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    assert_eq!(wait_until_finished(&request, TIMEOUT), RequestStatus::Ok);

    service.set_sleep_time(0);
    service.drain();
    Ok(())
}

#[test]
fn test_busy_service_completes_and_drains() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"busy")])?;
    let service = RamService::create(ServiceConfig::new("ram-busy").with_sleep_mode(SleepMode::Busy))?;
    let request = Arc::new(RamRequest::new());

    service.request(&vfs, RamIoDescriptor::new("f"), &request, None)?;
    service.drain();
    assert_eq!(request.take_output().as_deref(), Some(&b"busy"[..]));

    service.stop(true);
    assert_eq!(service.thread_status(), ThreadStatus::Suspended);
    service.destroy();
    assert_eq!(service.thread_status(), ThreadStatus::Quit);
    Ok(())
}

#[test]
fn test_pool_spreads_requests_round_robin() -> Result<()> {
    init_logger();
    let vfs = memory_vfs(&[("f", b"pooled")])?;
    let pool = ServicePool::from_fn(3, |i| RamService::create(ServiceConfig::new(format!("ram-pool-{i}"))))?;

    let requests: Vec<_> = (0..9).map(|_| Arc::new(RamRequest::new())).collect();
    for request in &requests {
        pool.next()
            .request(&vfs, RamIoDescriptor::new("f"), request, None)?;
    }
    pool.drain_all();

    assert!(requests.iter().all(|r| r.status() == RequestStatus::Ok));
    assert_eq!(pool.stats().completed, 9);
    for service in &pool {
        assert_eq!(service.stats().enqueued, 3);
    }
    Ok(())
}
