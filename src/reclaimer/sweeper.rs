//! Background sweeping on a tokio runtime.

use tokio::task::JoinHandle;

use super::Reclaimer;

/// A running background sweeper. Dropping the handle stops it.
#[derive(Debug)]
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Reclaimer {
    /// Sweep every [`sweep_interval`](super::ReclaimerConfig::sweep_interval)
    /// on the current tokio runtime until stopped or shut down.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    ///
    /// # Example
    ///
    /// ```rust
    /// use relinquish::{Reclaimer, ReclaimerConfig};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let reclaimer = Reclaimer::with_config(
    ///     ReclaimerConfig::default().with_sweep_interval(Duration::from_millis(5)),
    /// );
    /// let token = reclaimer.register("socket", || Ok(())).unwrap();
    /// drop(token);
    ///
    /// let sweeper = reclaimer.spawn_sweeper();
    /// tokio::time::sleep(Duration::from_millis(50)).await;
    /// sweeper.stop().await;
    ///
    /// assert_eq!(reclaimer.pending(), 0);
    /// # });
    /// ```
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let reclaimer = self.clone();
        let interval = self.config().sweep_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if reclaimer.is_shutting_down() {
                    tracing::debug!("background sweeper exiting: shutdown in progress");
                    break;
                }
                reclaimer.sweep();
            }
        });

        SweeperHandle { task: Some(task) }
    }
}
