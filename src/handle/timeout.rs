//! Bounded acquisition on the tokio blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::{ExternalSystem, ResourceHandle};
use crate::error::AcquireError;
use crate::reclaimer::Reclaimer;

type Delivery<S> = Result<<S as ExternalSystem>::Ref, <S as ExternalSystem>::Error>;

/// Receiving end of an in-flight acquisition.
///
/// If it is dropped before a result was taken (timeout or cancellation), a
/// reference that already arrived is released here and one that arrives
/// later is released by the sender.
struct PendingAcquire<S: ExternalSystem> {
    rx: oneshot::Receiver<Delivery<S>>,
    system: Arc<S>,
    delivered: bool,
}

impl<S: ExternalSystem> PendingAcquire<S> {
    async fn wait(&mut self) -> Result<S::Ref, AcquireError> {
        let received = (&mut self.rx).await;
        self.delivered = true;
        match received {
            Ok(Ok(reference)) => Ok(reference),
            Ok(Err(err)) => Err(AcquireError::denied(self.system.name(), err)),
            Err(_) => Err(AcquireError::Cancelled),
        }
    }
}

impl<S: ExternalSystem> Drop for PendingAcquire<S> {
    fn drop(&mut self) {
        if self.delivered {
            return;
        }
        self.rx.close();
        if let Ok(Ok(reference)) = self.rx.try_recv() {
            roll_back(&*self.system, reference);
        }
    }
}

fn roll_back<S: ExternalSystem>(system: &S, reference: S::Ref) {
    tracing::debug!(system = system.name(), ?reference, "rolling back abandoned acquisition");
    if let Err(err) = system.release(reference) {
        tracing::warn!(
            system = system.name(),
            ?reference,
            "rollback of abandoned acquisition failed: {}",
            err
        );
    }
}

impl<S> ResourceHandle<S>
where
    S: ExternalSystem,
    S::Spec: Sized + Send + 'static,
{
    /// Acquire with an upper bound on how long to wait.
    ///
    /// The system call runs on the blocking pool. If `timeout` elapses
    /// first, returns [`AcquireError::Timeout`]; if the returned future is
    /// dropped, the acquisition is cancelled. In both cases a reference the
    /// system hands out afterwards is released immediately, so the caller
    /// either owns a handle or nothing was acquired.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use relinquish::testing::MockSystem;
    /// use relinquish::{AcquireError, ResourceHandle};
    ///
    /// # tokio_test::block_on(async {
    /// let slow = Arc::new(MockSystem::new().with_acquire_delay(Duration::from_millis(100)));
    /// let result = ResourceHandle::acquire_timeout(slow, "lock", Duration::from_millis(5)).await;
    /// assert!(matches!(result, Err(AcquireError::Timeout { .. })));
    /// # });
    /// ```
    pub async fn acquire_timeout(
        system: Arc<S>,
        spec: S::Spec,
        timeout: Duration,
    ) -> Result<Self, AcquireError> {
        Self::acquire_bounded(system, spec, timeout, None).await
    }

    /// [`acquire_timeout`](Self::acquire_timeout), registering the handle
    /// with `reclaimer` once it is acquired.
    ///
    /// A reference rolled back after a timeout or cancellation is never
    /// registered.
    pub async fn acquire_timeout_with_fallback(
        system: Arc<S>,
        spec: S::Spec,
        timeout: Duration,
        reclaimer: &Reclaimer,
    ) -> Result<Self, AcquireError> {
        Self::acquire_bounded(system, spec, timeout, Some(reclaimer)).await
    }

    async fn acquire_bounded(
        system: Arc<S>,
        spec: S::Spec,
        timeout: Duration,
        fallback: Option<&Reclaimer>,
    ) -> Result<Self, AcquireError> {
        let (tx, rx) = oneshot::channel::<Delivery<S>>();
        let worker = Arc::clone(&system);

        tokio::task::spawn_blocking(move || {
            let result = worker.acquire(&spec);
            if let Err(Ok(reference)) = tx.send(result) {
                roll_back(&*worker, reference);
            }
        });

        let mut pending = PendingAcquire {
            rx,
            system: Arc::clone(&system),
            delivered: false,
        };

        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(result) => result.map(|reference| Self::adopt(system, reference, fallback)),
            Err(_) => {
                tracing::debug!(system = system.name(), ?timeout, "acquisition timed out");
                Err(AcquireError::Timeout { after: timeout })
            }
        }
    }
}
