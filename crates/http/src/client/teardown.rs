//! Forced logout after a failed renewal

use super::error::RenewalError;
use super::transport::{PendingRequest, Transport};
use shortly_core::SessionStore;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Callback run when the session is torn down
pub type InvalidationListener = Arc<dyn Fn(&RenewalError) + Send + Sync>;

/// Clears the session and tells the application about it.
///
/// Idempotent: only the call that actually removes a present session logs
/// out on the server and notifies listeners.
pub struct SessionTeardown {
    session: SessionStore,
    listeners: RwLock<Vec<InvalidationListener>>,
    server_logout: Option<(Transport, String)>,
}

impl SessionTeardown {
    pub fn new(session: SessionStore) -> Self {
        Self {
            session,
            listeners: RwLock::new(Vec::new()),
            server_logout: None,
        }
    }

    /// Also call `path` on the backend (best effort) when tearing down
    #[must_use]
    pub fn with_server_logout(mut self, transport: Transport, path: impl Into<String>) -> Self {
        self.server_logout = Some((transport, path.into()));
        self
    }

    /// Register a listener, e.g. to send the user back to login
    pub fn subscribe(&self, listener: InvalidationListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Tear the session down because of `cause`.
    ///
    /// The session is cleared and listeners are notified before this returns.
    /// The server-side logout is fire-and-forget on its own task and never
    /// delays the caller. Returns `false` without side effects if no session
    /// was present. Must be called within a Tokio runtime.
    pub fn invalidate(&self, cause: &RenewalError) -> bool {
        if !self.session.clear() {
            debug!(cause = %cause, "Session already cleared, skipping teardown");
            return false;
        }
        warn!(cause = %cause, "Session invalidated");

        if let Some((transport, path)) = &self.server_logout {
            let transport = transport.clone();
            let request = PendingRequest::post(path.as_str());
            tokio::spawn(async move {
                match transport.send(&request).await {
                    Ok(_) => debug!("Server-side logout acknowledged"),
                    Err(e) => debug!(error = ?e, "Server-side logout failed, ignoring"),
                }
            });
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(cause);
        }
        true
    }
}

impl std::fmt::Debug for SessionTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTeardown")
            .field("session", &self.session)
            .field("server_logout", &self.server_logout.as_ref().map(|(_, p)| p))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortly_core::UserProfile;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn logged_in() -> SessionStore {
        let store = SessionStore::in_memory();
        store
            .set(UserProfile {
                id: "u1".into(),
                name: "Bob".into(),
                email: "bob@example.com".into(),
                phone_number: None,
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let session = logged_in();
        let teardown = SessionTeardown::new(session.clone());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        teardown.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let cause = RenewalError::Rejected { status: 401 };
        assert!(teardown.invalidate(&cause));
        assert!(!teardown.invalidate(&cause));
        assert!(!teardown.invalidate(&cause));

        assert!(!session.is_present());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_receives_cause() {
        let teardown = SessionTeardown::new(logged_in());
        let seen = Arc::new(RwLock::new(None));
        let slot = seen.clone();
        teardown.subscribe(Arc::new(move |cause| {
            *slot.write().unwrap() = Some(cause.clone());
        }));

        let cause = RenewalError::Network("connection refused".into());
        teardown.invalidate(&cause);

        assert_eq!(seen.read().unwrap().clone(), Some(cause));
    }
}
