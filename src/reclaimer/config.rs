//! Reclaimer configuration.

use std::time::Duration;

/// What shutdown does about entries whose owners are still reachable.
///
/// Those owners were never released and never dropped (leaked through
/// `mem::forget`, a reference cycle, or a static). Shutdown releases them
/// either way; the policy only decides how loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LeakPolicy {
    /// Release silently.
    Ignore,
    /// Release and log a warning per leaked owner.
    #[default]
    Warn,
    /// Release, then panic listing the leaked owners. For test suites and
    /// debug builds that treat a leak as a bug.
    Panic,
}

/// Reclaimer settings.
///
/// Pure data, like every policy in this crate: build it, hand it to
/// [`Reclaimer::with_config`](super::Reclaimer::with_config).
///
/// # Example
///
/// ```rust
/// use relinquish::{LeakPolicy, ReclaimerConfig};
/// use std::time::Duration;
///
/// let config = ReclaimerConfig::default()
///     .with_leak_policy(LeakPolicy::Panic)
///     .with_sweep_interval(Duration::from_millis(250));
///
/// assert_eq!(config.leak_policy(), LeakPolicy::Panic);
/// assert_eq!(config.sweep_interval(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimerConfig {
    leak_policy: LeakPolicy,
    sweep_interval: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        ReclaimerConfig {
            leak_policy: LeakPolicy::default(),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl ReclaimerConfig {
    /// Set the shutdown leak policy.
    pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
        self.leak_policy = policy;
        self
    }

    /// Set how often a background sweeper runs.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "sweep interval must be non-zero");
        self.sweep_interval = interval;
        self
    }

    /// The shutdown leak policy.
    pub fn leak_policy(&self) -> LeakPolicy {
        self.leak_policy
    }

    /// The background sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}
