//! Single-flight credential renewal
//!
//! When requests fail with `401`, only the first one starts a renewal. Every
//! other request that fails while that renewal is pending waits on the same
//! renewal operation and receives the same outcome.
//!
//! The check-and-set that starts a renewal happens under a plain mutex that is
//! never held across an `.await`, so two flows can never both observe "idle".
//! The renewal itself runs on its own task, bounded by a timeout, so dropping
//! the caller that started it cannot leave the operation pending forever.

use super::error::RenewalError;
use super::teardown::SessionTeardown;
use super::transport::{PendingRequest, Transport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};
use tracing::{debug, info, warn};

/// Outcome shared by every waiter of one renewal
pub type RenewalOutcome = Result<(), RenewalError>;

/// Performs the actual renewal and reacts to its failure.
#[async_trait]
pub trait Renewer: Send + Sync + 'static {
    /// Ask the backend for fresh credentials
    async fn renew(&self) -> RenewalOutcome;

    /// Called once per failed renewal, before any waiter is released
    async fn renewal_failed(&self, error: &RenewalError);
}

/// Coarse coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    Idle,
    Renewing,
}

/// One in-flight renewal attempt.
///
/// Pending until `outcome` is set; waiters park on `notify`.
pub(crate) struct RenewalOperation {
    outcome: OnceCell<RenewalOutcome>,
    notify: Notify,
}

impl RenewalOperation {
    fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn resolve(&self, outcome: RenewalOutcome) {
        let _ = self.outcome.set(outcome);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RenewalOutcome {
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }

            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }

            notified.await;
        }
    }
}

#[derive(Default)]
struct Slot {
    /// Bumped on every successful renewal
    epoch: u64,
    pending: Option<Arc<RenewalOperation>>,
}

/// Ensures at most one renewal is pending at any time
pub struct RefreshCoordinator {
    renewer: Arc<dyn Renewer>,
    timeout: Duration,
    slot: Mutex<Slot>,
    started: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(renewer: Arc<dyn Renewer>, timeout: Duration) -> Self {
        Self {
            renewer,
            timeout,
            slot: Mutex::new(Slot::default()),
            started: AtomicU64::new(0),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful renewals so far.
    ///
    /// Read it before sending a request and hand it to
    /// [`ensure_renewed`](Self::ensure_renewed) if that request is rejected.
    pub fn epoch(&self) -> u64 {
        self.lock_slot().epoch
    }

    pub fn state(&self) -> RenewalState {
        if self.lock_slot().pending.is_some() {
            RenewalState::Renewing
        } else {
            RenewalState::Idle
        }
    }

    /// Total renewals started by this coordinator
    pub fn renewals_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Make sure credentials newer than `observed_epoch` exist.
    ///
    /// Returns immediately if a renewal already succeeded since the caller
    /// read `observed_epoch`. Otherwise joins the pending renewal, or starts
    /// one if none is pending, and waits for its outcome.
    pub async fn ensure_renewed(self: &Arc<Self>, observed_epoch: u64) -> RenewalOutcome {
        let operation = {
            let mut slot = self.lock_slot();
            if slot.epoch != observed_epoch {
                debug!(
                    observed_epoch,
                    epoch = slot.epoch,
                    "Credentials already renewed since request was sent"
                );
                return Ok(());
            }
            if let Some(pending) = &slot.pending {
                debug!("Joining in-flight renewal");
                Arc::clone(pending)
            } else {
                let operation = Arc::new(RenewalOperation::new());
                slot.pending = Some(Arc::clone(&operation));
                self.spawn_renewal(Arc::clone(&operation));
                operation
            }
        };

        operation.wait().await
    }

    fn spawn_renewal(self: &Arc<Self>, operation: Arc<RenewalOperation>) {
        let coordinator = Arc::clone(self);
        let episode = self.started.fetch_add(1, Ordering::Relaxed) + 1;

        tokio::spawn(async move {
            info!(episode, "Renewing session credentials");

            let renewer = Arc::clone(&coordinator.renewer);
            let mut attempt = tokio::spawn(async move { renewer.renew().await });
            let outcome = match tokio::time::timeout(coordinator.timeout, &mut attempt).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_error)) => Err(RenewalError::Aborted(join_error.to_string())),
                Err(_) => {
                    attempt.abort();
                    Err(RenewalError::TimedOut(coordinator.timeout))
                }
            };

            match &outcome {
                Ok(()) => info!(episode, "Session credentials renewed"),
                Err(error) => {
                    warn!(episode, error = %error, "Session renewal failed");
                    coordinator.renewer.renewal_failed(error).await;
                }
            }

            coordinator.complete(&operation, outcome);
        });
    }

    fn complete(&self, operation: &Arc<RenewalOperation>, outcome: RenewalOutcome) {
        {
            let mut slot = self.lock_slot();
            if slot
                .pending
                .as_ref()
                .is_some_and(|pending| Arc::ptr_eq(pending, operation))
            {
                slot.pending = None;
            }
            if outcome.is_ok() {
                slot.epoch += 1;
            }
        }
        operation.resolve(outcome);
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}

/// Renews by calling the backend's refresh endpoint; tears the session down
/// when that fails.
pub(crate) struct HttpRenewer {
    transport: Transport,
    refresh_path: String,
    teardown: Arc<SessionTeardown>,
}

impl HttpRenewer {
    pub(crate) fn new(
        transport: Transport,
        refresh_path: String,
        teardown: Arc<SessionTeardown>,
    ) -> Self {
        Self {
            transport,
            refresh_path,
            teardown,
        }
    }
}

#[async_trait]
impl Renewer for HttpRenewer {
    async fn renew(&self) -> RenewalOutcome {
        let request = PendingRequest::get(self.refresh_path.clone());
        match self.transport.send(&request).await {
            Ok(_) => Ok(()),
            Err(TransportError::Unauthorized { .. }) => Err(RenewalError::Rejected { status: 401 }),
            Err(TransportError::Status { status, .. }) => Err(RenewalError::Rejected {
                status: status.as_u16(),
            }),
            Err(TransportError::Network(e)) => Err(RenewalError::Network(e.to_string())),
        }
    }

    async fn renewal_failed(&self, error: &RenewalError) {
        self.teardown.invalidate(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;

    struct FakeRenewer {
        calls: AtomicUsize,
        failures: AtomicUsize,
        delay: Duration,
        outcome: RenewalOutcome,
    }

    impl FakeRenewer {
        fn new(delay: Duration, outcome: RenewalOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay,
                outcome,
            })
        }
    }

    #[async_trait]
    impl Renewer for FakeRenewer {
        async fn renew(&self) -> RenewalOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }

        async fn renewal_failed(&self, _error: &RenewalError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator(renewer: &Arc<FakeRenewer>, timeout: Duration) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(renewer.clone(), timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_one_renewal() {
        let renewer = FakeRenewer::new(Duration::from_millis(100), Ok(()));
        let coordinator = coordinator(&renewer, Duration::from_secs(5));

        let epoch = coordinator.epoch();
        let results = join_all((0..10).map(|_| coordinator.ensure_renewed(epoch))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.renewals_started(), 1);
        assert_eq!(coordinator.epoch(), epoch + 1);
        assert_eq!(coordinator.state(), RenewalState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter_once() {
        let rejected = Err(RenewalError::Rejected { status: 401 });
        let renewer = FakeRenewer::new(Duration::from_millis(100), rejected.clone());
        let coordinator = coordinator(&renewer, Duration::from_secs(5));

        let results = join_all((0..3).map(|_| coordinator.ensure_renewed(0))).await;

        assert!(results.iter().all(|r| *r == rejected));
        assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renewer.failures.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.epoch(), 0);
        assert_eq!(coordinator.state(), RenewalState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_episodes_each_renew() {
        let renewer = FakeRenewer::new(Duration::from_millis(10), Ok(()));
        let coordinator = coordinator(&renewer, Duration::from_secs(5));

        coordinator.ensure_renewed(coordinator.epoch()).await.unwrap();
        coordinator.ensure_renewed(coordinator.epoch()).await.unwrap();

        assert_eq!(renewer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.epoch(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_epoch_skips_renewal() {
        let renewer = FakeRenewer::new(Duration::from_millis(10), Ok(()));
        let coordinator = coordinator(&renewer, Duration::from_secs(5));

        coordinator.ensure_renewed(0).await.unwrap();
        // A request sent before the renewal above finished
        coordinator.ensure_renewed(0).await.unwrap();

        assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let renewer = FakeRenewer::new(Duration::from_secs(3600), Ok(()));
        let coordinator = coordinator(&renewer, Duration::from_millis(50));

        let result = coordinator.ensure_renewed(0).await;

        assert_eq!(
            result,
            Err(RenewalError::TimedOut(Duration::from_millis(50)))
        );
        assert_eq!(renewer.failures.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), RenewalState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_initiator_does_not_strand_waiters() {
        let renewer = FakeRenewer::new(Duration::from_millis(100), Ok(()));
        let coordinator = coordinator(&renewer, Duration::from_secs(5));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), coordinator.ensure_renewed(0)).await;
        assert!(abandoned.is_err());
        assert_eq!(coordinator.state(), RenewalState::Renewing);

        coordinator.ensure_renewed(0).await.unwrap();
        assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), RenewalState::Idle);
    }
}
