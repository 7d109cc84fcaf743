//! Owners of several children released as one.
//!
//! A [`CompositeOwner`] propagates a single `release()` to every child in a
//! documented order, by default insertion order. Release is best-effort:
//! each child gets exactly one attempt even if an earlier one failed or
//! reported corruption. Order dependent children accordingly; a connection
//! that must close before its pool is pushed before the pool.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::testing::MockSystem;
//! use relinquish::{CompositeOwner, Releasable, ResourceHandle};
//!
//! let system = Arc::new(MockSystem::new());
//! let owner = CompositeOwner::new("session");
//! owner.push(ResourceHandle::acquire(system.clone(), &"socket").unwrap()).unwrap();
//! owner.push(ResourceHandle::acquire(system.clone(), &"log").unwrap()).unwrap();
//!
//! owner.release().unwrap();
//!
//! assert_eq!(system.release_log(), vec!["socket", "log"]);
//! assert!(owner.push(ResourceHandle::acquire(system, &"late").unwrap()).is_err());
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Corruption, ObjectReleased, StepError};
use crate::lifecycle::{Lifecycle, Releasable, ReleaseReport};

type Child = Box<dyn Releasable + Send + Sync>;

/// Order in which children are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseOrder {
    /// First pushed, first released.
    #[default]
    Insertion,
    /// Last pushed, first released.
    Reverse,
}

/// Children released together, best-effort.
pub struct CompositeOwner {
    children: Arc<Mutex<Vec<Child>>>,
    order: ReleaseOrder,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for CompositeOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeOwner")
            .field("name", &self.lifecycle.name())
            .field("children", &self.len())
            .field("order", &self.order)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl CompositeOwner {
    /// An empty owner releasing in insertion order.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_order(name, ReleaseOrder::Insertion)
    }

    /// An empty owner releasing in `order`.
    pub fn with_order(name: impl Into<String>, order: ReleaseOrder) -> Self {
        let children: Arc<Mutex<Vec<Child>>> = Arc::default();
        let drained = Arc::clone(&children);

        let lifecycle = Lifecycle::builder(name)
            .managed("release children", move || {
                let mut taken = std::mem::take(&mut *drained.lock());
                if order == ReleaseOrder::Reverse {
                    taken.reverse();
                }
                release_all(taken)
            })
            .build();

        CompositeOwner {
            children,
            order,
            lifecycle,
        }
    }

    /// Add a child. Fails once the owner has been released.
    pub fn push<R>(&self, child: R) -> Result<(), ObjectReleased>
    where
        R: Releasable + Send + Sync + 'static,
    {
        let mut children = self.children.lock();
        self.lifecycle.ensure_active()?;
        children.push(Box::new(child));
        Ok(())
    }

    /// Children currently held.
    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    /// True when no child is held.
    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    /// The configured release order.
    pub fn order(&self) -> ReleaseOrder {
        self.order
    }
}

fn release_all(children: Vec<Child>) -> Result<(), StepError> {
    let mut failures = Vec::new();
    let mut corruption: Option<Corruption> = None;

    for child in &children {
        match child.release() {
            Ok(report) => failures.extend(report.failures),
            Err(c) => {
                tracing::error!(child = child.name(), "child release hit corruption: {}", c);
                corruption.get_or_insert(c);
            }
        }
    }

    match corruption {
        Some(c) => Err(StepError::Corrupted(c.to_string())),
        None if failures.is_empty() => Ok(()),
        None => Err(StepError::Nested(failures)),
    }
}

impl Releasable for CompositeOwner {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        self.lifecycle.release()
    }

    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    fn name(&self) -> &str {
        self.lifecycle.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSystem;
    use crate::ResourceHandle;

    fn handles(
        system: &Arc<MockSystem>,
        labels: &[&'static str],
    ) -> Vec<Arc<ResourceHandle<MockSystem>>> {
        labels
            .iter()
            .map(|label| Arc::new(ResourceHandle::acquire(system.clone(), label).unwrap()))
            .collect()
    }

    #[test]
    fn releases_in_insertion_order() {
        let system = Arc::new(MockSystem::new());
        let owner = CompositeOwner::new("owner");
        for child in handles(&system, &["c1", "c2", "c3"]) {
            owner.push(child).unwrap();
        }

        owner.release().unwrap();

        assert_eq!(system.release_log(), vec!["c1", "c2", "c3"]);
        assert!(owner.is_empty());
    }

    #[test]
    fn reverse_order_is_lifo() {
        let system = Arc::new(MockSystem::new());
        let owner = CompositeOwner::with_order("owner", ReleaseOrder::Reverse);
        for child in handles(&system, &["c1", "c2", "c3"]) {
            owner.push(child).unwrap();
        }

        owner.release().unwrap();

        assert_eq!(system.release_log(), vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn failing_child_does_not_block_siblings() {
        let system = Arc::new(MockSystem::new().failing_release("c2"));
        let children = handles(&system, &["c1", "c2", "c3"]);
        let owner = CompositeOwner::new("owner");
        for child in &children {
            owner.push(child.clone()).unwrap();
        }

        let report = owner.release().unwrap();

        assert!(children.iter().all(|c| c.is_released()));
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].object.starts_with("mock#"));
        assert!(owner.is_released());
    }

    #[test]
    fn corrupted_child_propagates_after_siblings() {
        let system = Arc::new(MockSystem::new().corrupting_release("c2"));
        let children = handles(&system, &["c1", "c2", "c3"]);
        let owner = CompositeOwner::new("owner");
        for child in &children {
            owner.push(child.clone()).unwrap();
        }

        let corruption = owner.release().unwrap_err();

        assert_eq!(corruption.object, "owner");
        assert!(children.iter().all(|c| c.is_released()));
        assert_eq!(system.total_releases(), 3);
        assert!(!owner.release().unwrap().is_first());
    }

    #[test]
    fn second_release_touches_nothing() {
        let system = Arc::new(MockSystem::new());
        let owner = CompositeOwner::new("owner");
        for child in handles(&system, &["a", "b"]) {
            owner.push(child).unwrap();
        }

        owner.release().unwrap();
        owner.release().unwrap();

        assert_eq!(system.total_releases(), 2);
    }

    #[test]
    fn nested_composites_release_depth_first() {
        let system = Arc::new(MockSystem::new());
        let inner = CompositeOwner::new("inner");
        for child in handles(&system, &["i1", "i2"]) {
            inner.push(child).unwrap();
        }
        let outer = CompositeOwner::new("outer");
        outer.push(handles(&system, &["o1"]).remove(0)).unwrap();
        outer.push(inner).unwrap();
        outer.push(handles(&system, &["o2"]).remove(0)).unwrap();

        outer.release().unwrap();

        assert_eq!(system.release_log(), vec!["o1", "i1", "i2", "o2"]);
    }

    #[test]
    fn push_after_release_fails() {
        let owner = CompositeOwner::new("owner");
        owner.release().unwrap();

        let err = owner.push(Lifecycle::builder("late").build()).unwrap_err();
        assert_eq!(err.object, "owner");
    }
}
