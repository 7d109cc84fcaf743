//! Property-based tests for the release protocol

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use relinquish::testing::MockSystem;
use relinquish::{
    CompositeOwner, Lifecycle, Releasable, ReleaseOutcome, ResourceHandle, ResourceHolder, Scope,
};

fn counting(name: &str, runs: &Arc<AtomicUsize>) -> Lifecycle {
    let runs = runs.clone();
    Lifecycle::builder(name)
        .managed("count", move || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
}

proptest! {
    #[test]
    fn prop_any_number_of_releases_cleans_up_once(calls in 1usize..50) {
        let runs = Arc::new(AtomicUsize::new(0));
        let lifecycle = counting("owner", &runs);

        let firsts = (0..calls)
            .map(|_| lifecycle.release().unwrap())
            .filter(|report| report.outcome == ReleaseOutcome::Released)
            .count();

        prop_assert_eq!(firsts, 1);
        prop_assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prop_handle_reference_released_once(calls in 1usize..20, drop_after in any::<bool>()) {
        let system = Arc::new(MockSystem::new());
        let handle = ResourceHandle::acquire(system.clone(), &"res").unwrap();
        let reference = handle.get().unwrap();

        for _ in 0..calls {
            handle.release().unwrap();
        }
        if drop_after {
            drop(handle);
        }

        prop_assert_eq!(system.releases_of(reference), 1);
    }

    #[test]
    fn prop_chain_of_depth_d_runs_each_level_once_top_down(depth in 0usize..16) {
        let system = Arc::new(MockSystem::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = order.clone();
        let holder = ResourceHolder::extend(
            ResourceHandle::acquire(system.clone(), &"base").unwrap(),
            move |mut builder, _| {
                for level in 0..depth {
                    let record = record.clone();
                    builder = builder.managed(format!("level {level}"), move || {
                        record.lock().push(level);
                        Ok(())
                    });
                }
                builder
            },
        );

        holder.release().unwrap();
        holder.release().unwrap();

        let expected: Vec<usize> = (0..depth).rev().collect();
        prop_assert_eq!(&*order.lock(), &expected);
        prop_assert_eq!(system.total_releases(), 1);
    }

    #[test]
    fn prop_nested_scopes_exit_in_reverse(depth in 1usize..12) {
        let order = Arc::new(Mutex::new(Vec::new()));
        let lifecycles: Vec<Lifecycle> = (0..depth)
            .map(|n| {
                let order = order.clone();
                Lifecycle::builder(format!("scope {n}"))
                    .managed("record", move || {
                        order.lock().push(n);
                        Ok(())
                    })
                    .build()
            })
            .collect();

        {
            let mut guards = Vec::new();
            for lifecycle in lifecycles {
                guards.push(Scope::new(lifecycle).enter());
            }
            while let Some(guard) = guards.pop() {
                drop(guard);
            }
        }

        let expected: Vec<usize> = (0..depth).rev().collect();
        prop_assert_eq!(&*order.lock(), &expected);
    }

    #[test]
    fn prop_composite_attempts_every_child(
        failing in prop::collection::vec(any::<bool>(), 0..12)
    ) {
        let owner = CompositeOwner::new("owner");
        let runs = Arc::new(AtomicUsize::new(0));
        for (n, fails) in failing.iter().copied().enumerate() {
            let runs = runs.clone();
            let child = Lifecycle::builder(format!("child {n}"))
                .managed("close", move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    if fails {
                        Err(relinquish::StepError::failed("refused"))
                    } else {
                        Ok(())
                    }
                })
                .build();
            owner.push(child).unwrap();
        }

        let report = owner.release().unwrap();

        prop_assert_eq!(runs.load(Ordering::SeqCst), failing.len());
        prop_assert_eq!(report.failures.len(), failing.iter().filter(|f| **f).count());
    }
}
