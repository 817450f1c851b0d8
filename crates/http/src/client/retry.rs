//! Retry after renewal

use super::error::{ClientError, SessionExpiredCause};
use super::transport::{PendingRequest, Transport, TransportError};
use reqwest::Response;
use tracing::{debug, warn};

/// Decides which rejected requests may be retried after a renewal.
///
/// Only a request's first attempt that failed with `401` qualifies, and it is
/// retried exactly once. Failures for any other reason are never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    const MAX_RETRIES: u8 = 1;

    pub const fn new() -> Self {
        Self
    }

    /// Whether a `401` on this request should go through renewal
    pub const fn allows_renewal(&self, request: &PendingRequest) -> bool {
        request.attempt() < Self::MAX_RETRIES
    }

    /// Re-send `request` once after a successful renewal.
    ///
    /// A second `401` is permanent: the caller gets
    /// [`SessionExpiredCause::RejectedAfterRenewal`] and no further renewal is
    /// attempted. Other failures pass through unchanged.
    pub async fn retry_once(
        &self,
        transport: &Transport,
        request: &PendingRequest,
    ) -> Result<Response, ClientError> {
        if !self.allows_renewal(request) {
            return Err(ClientError::SessionExpired(
                SessionExpiredCause::RejectedAfterRenewal,
            ));
        }

        let retried = request.next_attempt();
        debug!(
            method = %retried.method(),
            path = retried.path(),
            "Retrying request after renewal"
        );
        match transport.send(&retried).await {
            Ok(response) => Ok(response),
            Err(TransportError::Unauthorized { .. }) => {
                warn!(
                    path = retried.path(),
                    "Request still unauthorized after renewal"
                );
                Err(ClientError::SessionExpired(
                    SessionExpiredCause::RejectedAfterRenewal,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_attempt_may_renew() {
        let policy = RetryPolicy::new();
        let original = PendingRequest::get("/api/user/urls");
        let retried = original.next_attempt();

        assert!(policy.allows_renewal(&original));
        assert!(!policy.allows_renewal(&retried));
        assert!(!policy.allows_renewal(&retried.next_attempt()));
    }
}
