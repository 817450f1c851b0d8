//! Request transport bound to one origin
//!
//! Every request goes out through the same `reqwest` client and cookie store,
//! so credentials set by the backend (login, refresh) ride along implicitly.

use cookie_store::CookieStore;
use reqwest::{Client, Method, Response, StatusCode, Url};
use reqwest_cookie_store::CookieStoreMutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::io::{BufRead, Write};
use std::sync::{Arc, MutexGuard, PoisonError};
use tracing::debug;

/// One outbound call.
///
/// Values are immutable; a retry is a new value with the attempt count bumped,
/// carrying the same method, path and body.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    method: Method,
    path: String,
    body: Option<JsonValue>,
    attempt: u8,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            attempt: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` and attach it
    pub fn with_json<T: Serialize>(self, body: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn body(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }

    /// 0 for the original send, 1 for the retry after renewal
    pub const fn attempt(&self) -> u8 {
        self.attempt
    }

    pub(crate) fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

/// How a send failed
#[derive(Debug)]
pub enum TransportError {
    /// No response was received
    Network(reqwest::Error),
    /// The backend rejected the credentials (401)
    Unauthorized { message: String },
    /// Any other non-success status
    Status { status: StatusCode, message: String },
}

/// HTTP client bound to the backend origin
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: Url,
    cookies: Arc<CookieStoreMutex>,
}

impl Transport {
    pub(crate) fn new(client: Client, base_url: Url, cookies: Arc<CookieStoreMutex>) -> Self {
        Self {
            client,
            base_url,
            cookies,
        }
    }

    /// Origin every path is resolved against
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Send the request and classify the outcome
    pub async fn send(&self, request: &PendingRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), self.url(request.path()));
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            attempt = request.attempt(),
            "Sending request"
        );
        let response = builder.send().await.map_err(TransportError::Network)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        debug!(
            method = %request.method(),
            path = request.path(),
            status = status.as_u16(),
            "Request rejected"
        );
        if status == StatusCode::UNAUTHORIZED {
            Err(TransportError::Unauthorized { message })
        } else {
            Err(TransportError::Status { status, message })
        }
    }

    fn lock_cookies(&self) -> MutexGuard<'_, CookieStore> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write every held cookie as JSON, attributes (path, expiry) included.
    ///
    /// Session cookies are kept too, so a later process can pick them up
    /// with [`load_cookies`](Self::load_cookies).
    pub fn save_cookies<W: Write>(&self, writer: &mut W) -> Result<(), CookieStoreError> {
        let store = self.lock_cookies();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, writer)
            .map_err(|e| CookieStoreError(e.to_string()))
    }

    /// Replace the held cookies with ones written by [`save_cookies`](Self::save_cookies).
    ///
    /// Cookies that expired in the meantime are dropped.
    pub fn load_cookies<R: BufRead>(&self, reader: R) -> Result<(), CookieStoreError> {
        let loaded =
            cookie_store::serde::json::load(reader).map_err(|e| CookieStoreError(e.to_string()))?;
        *self.lock_cookies() = loaded;
        Ok(())
    }
}

/// Cookies could not be saved or loaded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CookieStoreError(pub String);

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}
