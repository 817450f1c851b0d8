//! Shortly HTTP client
//!
//! An authenticated client for the Shortly URL-shortener API. Every call made
//! through [`ShortlyClient`] carries the cookie credentials issued at login.
//! When the backend answers `401`, the client renews the session once (shared
//! by every request that failed at the same time), retries the original
//! request once, and tears the session down if renewal fails.

pub mod client;
pub mod types;

pub use client::{
    ShortlyClient, ShortlyClientBuilder,
    error::{ClientError, RenewalError, SessionExpiredCause},
    transport::PendingRequest,
};
