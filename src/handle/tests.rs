//! Tests for resource handles.

use super::*;
use crate::error::ObjectReleased;
use crate::lifecycle::ReleaseOutcome;
use crate::testing::MockSystem;
use std::time::Duration;
use tracing_test::traced_test;

fn mock() -> Arc<MockSystem> {
    Arc::new(MockSystem::new())
}

#[test]
fn second_release_is_a_no_op() {
    let system = mock();
    let handle = ResourceHandle::acquire(system.clone(), &"file").unwrap();
    let reference = handle.get().unwrap();

    let first = handle.release().unwrap();
    let second = handle.release().unwrap();

    assert_eq!(first.outcome, ReleaseOutcome::Released);
    assert_eq!(second.outcome, ReleaseOutcome::AlreadyReleased);
    assert_eq!(system.releases_of(reference), 1);
}

#[test]
fn get_after_release_fails() {
    let handle = ResourceHandle::acquire(mock(), &"file").unwrap();
    handle.release().unwrap();

    let err: ObjectReleased = handle.get().unwrap_err();
    assert!(err.object.starts_with("mock#"));
    assert_eq!(handle.state(), LifecycleState::Released);
}

#[test]
fn denied_acquisition_reports_system() {
    let system = Arc::new(MockSystem::new().denying());
    let err = ResourceHandle::acquire(system.clone(), &"file").unwrap_err();

    assert!(matches!(err, AcquireError::Denied { ref system, .. } if system == "mock"));
    assert_eq!(system.acquisitions(), 0);
}

#[test]
fn failed_system_release_is_recorded_not_raised() {
    let system = Arc::new(MockSystem::new().failing_release("sock"));
    let handle = ResourceHandle::acquire(system.clone(), &"sock").unwrap();

    let report = handle.release().unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "release reference");
    assert!(handle.is_released());
    assert_eq!(system.total_releases(), 1);
}

#[test]
fn fatal_system_release_escapes_as_corruption() {
    let system = Arc::new(MockSystem::new().corrupting_release("shm"));
    let handle = ResourceHandle::acquire(system.clone(), &"shm").unwrap();

    let corruption = handle.release().unwrap_err();

    assert_eq!(corruption.step, "release reference");
    assert!(handle.is_released());
    assert!(handle.release().unwrap().outcome == ReleaseOutcome::AlreadyReleased);
    assert_eq!(system.total_releases(), 1);
}

#[traced_test]
#[test]
fn dropping_live_handle_releases_inline() {
    let system = mock();
    let handle = ResourceHandle::acquire(system.clone(), &"file").unwrap();
    let reference = handle.get().unwrap();

    drop(handle);

    assert_eq!(system.releases_of(reference), 1);
    assert!(logs_contain("dropped without release"));
}

#[test]
fn dropping_tracked_handle_defers_to_sweep() {
    let system = mock();
    let reclaimer = Reclaimer::new();
    let handle =
        ResourceHandle::acquire_with_fallback(system.clone(), &"file", &reclaimer).unwrap();
    let reference = handle.get().unwrap();
    assert!(handle.has_fallback());

    drop(handle);
    assert_eq!(system.releases_of(reference), 0);
    assert_eq!(reclaimer.abandoned(), 1);

    reclaimer.sweep();
    assert_eq!(system.releases_of(reference), 1);
    assert_eq!(reclaimer.pending(), 0);
}

#[test]
fn explicit_release_deregisters_fallback() {
    let system = mock();
    let reclaimer = Reclaimer::new();
    let handle =
        ResourceHandle::acquire_with_fallback(system.clone(), &"file", &reclaimer).unwrap();

    handle.release().unwrap();
    assert_eq!(reclaimer.pending(), 0);
    assert!(!handle.has_fallback());

    reclaimer.shutdown();
    assert_eq!(system.total_releases(), 1);
}

#[test]
fn racing_releases_call_system_once() {
    let system = mock();
    let handle = Arc::new(ResourceHandle::acquire(system.clone(), &"file").unwrap());
    let reference = handle.get().unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            std::thread::spawn(move || handle.release().unwrap().is_first())
        })
        .collect();
    let winners = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|first| *first)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(system.releases_of(reference), 1);
}

#[test]
fn heap_handle_frees_block() {
    let heap = Arc::new(HeapAllocator::new());
    let layout = std::alloc::Layout::array::<u8>(64).unwrap();
    let handle = ResourceHandle::acquire(heap.clone(), &layout).unwrap();

    assert_eq!(handle.get().unwrap().len(), 64);
    assert_eq!(heap.live_blocks(), 1);

    handle.release().unwrap();
    assert_eq!(heap.live_blocks(), 0);
}

#[cfg(feature = "async")]
mod bounded {
    use super::*;

    #[tokio::test]
    async fn acquire_within_timeout_succeeds() {
        let system = mock();
        let handle = ResourceHandle::acquire_timeout(system.clone(), "fast", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(system.acquisitions(), 1);
        handle.release().unwrap();
        assert_eq!(system.live(), 0);
    }

    #[tokio::test]
    async fn late_reference_is_rolled_back_after_timeout() {
        let system = Arc::new(MockSystem::new().with_acquire_delay(Duration::from_millis(100)));

        let err = ResourceHandle::acquire_timeout(system.clone(), "slow", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AcquireError::Timeout { after } if after == Duration::from_millis(10)
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(system.acquisitions(), 1);
        assert_eq!(system.total_releases(), 1);
        assert_eq!(system.live(), 0);
    }

    #[tokio::test]
    async fn cancelled_acquisition_is_rolled_back() {
        let system = Arc::new(MockSystem::new().with_acquire_delay(Duration::from_millis(50)));

        let acquiring =
            ResourceHandle::acquire_timeout(system.clone(), "slow", Duration::from_secs(5));
        let raced = tokio::time::timeout(Duration::from_millis(5), acquiring).await;
        assert!(raced.is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(system.acquisitions(), 1);
        assert_eq!(system.live(), 0);
    }

    #[tokio::test]
    async fn bounded_acquisition_can_opt_into_fallback() {
        let system = mock();
        let reclaimer = Reclaimer::new();

        let handle = ResourceHandle::acquire_timeout_with_fallback(
            system.clone(),
            "pooled",
            Duration::from_secs(5),
            &reclaimer,
        )
        .await
        .unwrap();
        assert!(handle.has_fallback());

        drop(handle);
        assert_eq!(system.live(), 1);

        assert_eq!(reclaimer.sweep().reclaimed, 1);
        assert_eq!(system.live(), 0);
    }

    #[tokio::test]
    async fn timed_out_fallback_acquisition_registers_nothing() {
        let system = Arc::new(MockSystem::new().with_acquire_delay(Duration::from_millis(100)));
        let reclaimer = Reclaimer::new();

        let err = ResourceHandle::acquire_timeout_with_fallback(
            system.clone(),
            "slow",
            Duration::from_millis(10),
            &reclaimer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AcquireError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(reclaimer.pending(), 0);
        assert_eq!(system.live(), 0);
    }

    #[tokio::test]
    async fn denied_bounded_acquisition_maps_error() {
        let system = Arc::new(MockSystem::new().denying());
        let err = ResourceHandle::acquire_timeout(system, "x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Denied { .. }));
    }
}
