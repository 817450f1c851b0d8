//! Client error types

use super::transport::{CookieStoreError, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Why a credential renewal did not succeed.
///
/// Every caller waiting on the same renewal receives an identical copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// The refresh endpoint answered with a non-success status
    #[error("refresh endpoint rejected the session with status {status}")]
    Rejected { status: u16 },

    /// No response from the refresh endpoint
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The refresh endpoint did not answer in time
    #[error("refresh did not complete within {0:?}")]
    TimedOut(Duration),

    /// The renewal task ended without producing a result
    #[error("renewal aborted: {0}")]
    Aborted(String),
}

/// Detail carried by [`ClientError::SessionExpired`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionExpiredCause {
    /// Renewal failed and the session was torn down
    #[error("{0}")]
    RenewalFailed(RenewalError),

    /// Renewal succeeded but the retried request was still rejected
    #[error("credentials still rejected after renewal")]
    RejectedAfterRenewal,

    /// The session had already been torn down when the request was rejected
    #[error("session was invalidated")]
    Invalidated,
}

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error (no usable response)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The session is gone; the user has to log in again
    #[error("Session expired: {0}")]
    SessionExpired(SessionExpiredCause),

    /// No session is present, nothing was sent
    #[error("Not logged in")]
    NotAuthenticated,

    /// Authentication failed on an endpoint that does not renew (login, register)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Any other 4xx, e.g. a custom alias that is already taken
    #[error("Rejected with status {status}: {message}")]
    Validation { status: u16, message: String },

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Cookie credentials could not be saved or restored
    #[error("Cookie store error: {0}")]
    Cookies(#[from] CookieStoreError),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            code @ 402..=499 => Self::Validation {
                status: code,
                message,
            },
            code => Self::ServerError {
                status: code,
                message,
            },
        }
    }

    /// Whether the caller should send the user back to login
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::NotAuthenticated)
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(e) => Self::Request(e),
            TransportError::Unauthorized { message } => Self::AuthenticationFailed(message),
            TransportError::Status { status, message } => Self::from_status(status, message),
        }
    }
}
