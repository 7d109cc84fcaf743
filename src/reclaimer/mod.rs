//! Process-wide safety net for owners that are never explicitly released.
//!
//! Explicit release and scope guards are the deterministic paths. The
//! [`Reclaimer`] exists for the cases they miss:
//!
//! - an owner holding a [`FallbackToken`] is dropped without release: the
//!   token dies, its entry becomes *abandoned*, and the next [`sweep`]
//!   runs the entry's callback;
//! - an owner is leaked outright (`mem::forget`, a cycle): its entry stays
//!   reachable until [`shutdown`] releases everything that is left.
//!
//! Sweeps happen whenever the host decides: called by hand, by a
//! background task ([`Reclaimer::spawn_sweeper`]), or at shutdown. There is
//! no bound on when an abandoned entry is processed and no ordering between
//! unrelated entries.
//!
//! Callbacks never propagate failure. Errors and panics are logged,
//! counted, and dropped, because no caller is around to receive them.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use relinquish::Reclaimer;
//!
//! let reclaimer = Reclaimer::new();
//! let freed = Arc::new(AtomicUsize::new(0));
//!
//! let f = freed.clone();
//! let token = reclaimer
//!     .register("raw block", move || {
//!         f.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let id = token.id();
//! drop(token); // owner vanished without release
//!
//! let report = reclaimer.sweep();
//! assert_eq!(report.reclaimed, 1);
//! assert_eq!(freed.load(Ordering::SeqCst), 1);
//! assert!(!reclaimer.is_registered(id));
//! ```
//!
//! # Shutdown
//!
//! Nothing runs on its own at process end. Hosts call
//! [`Reclaimer::shutdown`], or hold the [`ShutdownGuard`] returned by
//! [`Reclaimer::guard`] for the life of `main`. Once shutdown has begun,
//! `register` refuses new entries and owners fall back to cleaning up inline
//! when dropped.
//!
//! [`sweep`]: Reclaimer::sweep
//! [`shutdown`]: Reclaimer::shutdown

mod config;
#[cfg(feature = "async")]
mod sweeper;


use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::error::StepError;

pub use config::{LeakPolicy, ReclaimerConfig};
#[cfg(feature = "async")]
pub use sweeper::SweeperHandle;

/// Callback run when an entry is reclaimed.
pub type FallbackCallback = Box<dyn FnOnce() -> Result<(), StepError> + Send>;

struct Entry {
    label: String,
    liveness: Weak<()>,
    callback: FallbackCallback,
}

impl Entry {
    fn is_abandoned(&self) -> bool {
        self.liveness.strong_count() == 0
    }
}

struct Shared {
    config: ReclaimerConfig,
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    finalized: AtomicBool,
    reclaimed: AtomicU64,
    failed: AtomicU64,
}

/// Registry of fallback callbacks.
///
/// Cheap to clone; clones share one registry. Register, deregister and
/// sweep removal are serialized on one lock, so an entry's callback runs at
/// most once. Callbacks themselves run outside the lock.
#[derive(Clone)]
pub struct Reclaimer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("config", &self.shared.config)
            .field("pending", &self.pending())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepReport {
    /// Callbacks that completed cleanly.
    pub reclaimed: usize,
    /// Callbacks that failed or panicked. Each still ran exactly once.
    pub failed: usize,
    /// Of the processed entries, how many still had a live owner. Non-zero
    /// only during shutdown.
    pub leaked: usize,
    /// Entries left in the registry afterwards.
    pub remaining: usize,
    /// The sweep did nothing because shutdown had begun.
    pub skipped: bool,
}

/// Lifetime totals for a reclaimer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReclaimerStats {
    /// Callbacks that completed cleanly.
    pub reclaimed: u64,
    /// Callbacks that failed or panicked.
    pub failed: u64,
}

impl Reclaimer {
    /// Create a reclaimer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ReclaimerConfig::default())
    }

    /// Create a reclaimer with `config`.
    pub fn with_config(config: ReclaimerConfig) -> Self {
        Reclaimer {
            shared: Arc::new(Shared {
                config,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
                finalized: AtomicBool::new(false),
                reclaimed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide reclaimer.
    ///
    /// It is never shut down automatically. Call
    /// [`shutdown`](Self::shutdown) before the process exits, or hold
    /// `Reclaimer::global().guard()` in `main`, so entries abandoned or leaked
    /// late are still released.
    pub fn global() -> &'static Reclaimer {
        static GLOBAL: OnceLock<Reclaimer> = OnceLock::new();
        GLOBAL.get_or_init(Reclaimer::new)
    }

    /// The configuration this reclaimer was built with.
    pub fn config(&self) -> &ReclaimerConfig {
        &self.shared.config
    }

    /// Register a fallback callback.
    ///
    /// The entry stays reachable while the returned token is alive. Hand
    /// the token back through [`deregister`](Self::deregister) on explicit
    /// release; dropping it instead abandons the entry to the next sweep.
    ///
    /// Returns `None` once shutdown has begun, since no sweep would ever
    /// run the callback. The caller keeps responsibility for its cleanup.
    pub fn register<F>(&self, label: impl Into<String>, callback: F) -> Option<FallbackToken>
    where
        F: FnOnce() -> Result<(), StepError> + Send + 'static,
    {
        let label = label.into();
        let liveness = Arc::new(());

        let mut entries = self.shared.entries.lock();
        if self.is_shutting_down() {
            tracing::debug!(label = %label, "fallback refused: shutdown in progress");
            return None;
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            id,
            Entry {
                label: label.clone(),
                liveness: Arc::downgrade(&liveness),
                callback: Box::new(callback),
            },
        );
        drop(entries);
        tracing::debug!(id, label = %label, "registered fallback");

        Some(FallbackToken {
            id,
            _liveness: liveness,
            reclaimer: self.clone(),
        })
    }

    /// Remove an entry without running its callback.
    ///
    /// Returns `false` if the entry was already gone (processed by a
    /// shutdown sweep).
    pub fn deregister(&self, token: FallbackToken) -> bool {
        let removed = self.shared.entries.lock().remove(&token.id);
        tracing::debug!(id = token.id, found = removed.is_some(), "deregistered fallback");
        removed.is_some()
    }

    /// Whether an entry with `id` is still registered.
    pub fn is_registered(&self, id: u64) -> bool {
        self.shared.entries.lock().contains_key(&id)
    }

    /// Registered entries, reachable or abandoned.
    pub fn pending(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Entries whose owner is gone and that the next sweep will process.
    pub fn abandoned(&self) -> usize {
        self.shared
            .entries
            .lock()
            .values()
            .filter(|entry| entry.is_abandoned())
            .count()
    }

    /// Lifetime totals.
    pub fn stats(&self) -> ReclaimerStats {
        ReclaimerStats {
            reclaimed: self.shared.reclaimed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// True once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }

    /// Mark shutdown without processing anything.
    ///
    /// Later sweeps skip and `register` refuses new entries. Entries already
    /// registered wait for [`shutdown`](Self::shutdown).
    pub fn begin_shutdown(&self) {
        let _entries = self.shared.entries.lock();
        self.shared.shutting_down.store(true, Ordering::Release);
    }

    /// Run the callbacks of every abandoned entry.
    ///
    /// Skips all work once shutdown has begun.
    pub fn sweep(&self) -> SweepReport {
        if self.is_shutting_down() {
            tracing::debug!("sweep skipped: shutdown in progress");
            return SweepReport {
                skipped: true,
                remaining: self.pending(),
                ..SweepReport::default()
            };
        }

        let abandoned = self.take_abandoned();
        let mut report = self.process(abandoned, LeakPolicy::Ignore);
        report.remaining = self.pending();

        if report.reclaimed + report.failed > 0 {
            tracing::debug!(
                reclaimed = report.reclaimed,
                failed = report.failed,
                remaining = report.remaining,
                "sweep finished"
            );
        }
        report
    }

    /// Final sweep: mark shutdown, then release every remaining entry.
    ///
    /// Works after [`begin_shutdown`](Self::begin_shutdown) too. Entries
    /// whose owner is still reachable are handled according to the
    /// configured [`LeakPolicy`]. Calling this twice is a no-op the second
    /// time.
    ///
    /// # Panics
    ///
    /// With [`LeakPolicy::Panic`], panics after every entry was processed
    /// if any of them was still reachable.
    pub fn shutdown(&self) -> SweepReport {
        self.finish(self.shared.config.leak_policy())
    }

    /// A guard that calls [`shutdown`](Self::shutdown) when dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use relinquish::Reclaimer;
    ///
    /// let reclaimer = Reclaimer::new();
    /// {
    ///     let _shutdown = reclaimer.guard();
    ///     drop(reclaimer.register("socket", || Ok(())));
    /// }
    /// assert!(reclaimer.is_shutting_down());
    /// assert_eq!(reclaimer.pending(), 0);
    /// ```
    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            reclaimer: self.clone(),
        }
    }

    fn finish(&self, policy: LeakPolicy) -> SweepReport {
        if self.shared.finalized.swap(true, Ordering::AcqRel) {
            return SweepReport {
                skipped: true,
                remaining: self.pending(),
                ..SweepReport::default()
            };
        }

        let everything = {
            let mut entries = self.shared.entries.lock();
            self.shared.shutting_down.store(true, Ordering::Release);
            let mut taken: Vec<(u64, Entry)> = entries.drain().collect();
            taken.sort_by_key(|(id, _)| *id);
            taken
        };
        let leaked_labels: Vec<String> = everything
            .iter()
            .filter(|(_, entry)| !entry.is_abandoned())
            .map(|(_, entry)| entry.label.clone())
            .collect();

        let mut report = self.process(everything, policy);
        report.remaining = self.pending();
        tracing::debug!(
            reclaimed = report.reclaimed,
            failed = report.failed,
            leaked = report.leaked,
            "reclaimer shut down"
        );

        if policy == LeakPolicy::Panic && !leaked_labels.is_empty() {
            panic!(
                "{} owner(s) were never released: {}",
                leaked_labels.len(),
                leaked_labels.join(", ")
            );
        }
        report
    }

    fn take_abandoned(&self) -> Vec<(u64, Entry)> {
        let mut entries = self.shared.entries.lock();
        if self.is_shutting_down() {
            return Vec::new();
        }
        let ids: Vec<u64> = entries
            .iter()
            .filter(|(_, entry)| entry.is_abandoned())
            .map(|(id, _)| *id)
            .collect();
        let mut taken: Vec<(u64, Entry)> = ids
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
            .collect();
        taken.sort_by_key(|(id, _)| *id);
        taken
    }

    fn process(&self, entries: Vec<(u64, Entry)>, policy: LeakPolicy) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, entry) in entries {
            let Entry {
                label,
                liveness,
                callback,
            } = entry;

            if liveness.strong_count() > 0 {
                report.leaked += 1;
                if policy != LeakPolicy::Ignore {
                    tracing::warn!(
                        id,
                        label = %label,
                        "owner was never released; reclaiming at shutdown"
                    );
                }
            }

            let outcome = catch_unwind(AssertUnwindSafe(callback));
            match outcome {
                Ok(Ok(())) => {
                    report.reclaimed += 1;
                    self.shared.reclaimed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => {
                    report.failed += 1;
                    self.shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(id, label = %label, "fallback cleanup failed: {}", err);
                }
                Err(_) => {
                    report.failed += 1;
                    self.shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(id, label = %label, "fallback cleanup panicked");
                }
            }
        }

        report
    }
}

/// Proof of a fallback registration, held by the registering owner.
///
/// While the token lives its entry is reachable and sweeps leave it alone.
#[must_use = "dropping a fallback token abandons its entry to the next sweep"]
pub struct FallbackToken {
    id: u64,
    _liveness: Arc<()>,
    reclaimer: Reclaimer,
}

impl std::fmt::Debug for FallbackToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackToken").field("id", &self.id).finish()
    }
}

impl FallbackToken {
    /// Registry id of this entry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deregister from the reclaimer that issued this token.
    pub fn deregister(self) -> bool {
        let reclaimer = self.reclaimer.clone();
        reclaimer.deregister(self)
    }
}

/// Shuts its reclaimer down when dropped. Hold one for the life of `main`.
///
/// While the thread is unwinding, [`LeakPolicy::Panic`] is downgraded to
/// [`LeakPolicy::Warn`] so leaks are still released and reported.
#[must_use = "dropping the guard shuts the reclaimer down immediately"]
#[derive(Debug)]
pub struct ShutdownGuard {
    reclaimer: Reclaimer,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let mut policy = self.reclaimer.config().leak_policy();
        if policy == LeakPolicy::Panic && std::thread::panicking() {
            policy = LeakPolicy::Warn;
        }
        self.reclaimer.finish(policy);
    }
}
