//! Shortly HTTP client

pub mod auth;
pub mod error;
pub mod refresh;
pub mod retry;
pub mod routes;
pub mod teardown;
pub mod transport;
pub mod urls;

use error::{ClientError, RenewalError, SessionExpiredCause};
use refresh::{HttpRenewer, RefreshCoordinator, RenewalState};
use reqwest::{ClientBuilder, Response, Url};
use reqwest_cookie_store::CookieStoreMutex;
use retry::RetryPolicy;
use serde::de::DeserializeOwned;
use shortly_core::SessionStore;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use teardown::SessionTeardown;
use tracing::debug;
use transport::{PendingRequest, Transport, TransportError};

const DEFAULT_USER_PATH: &str = "/api/user";
const DEFAULT_AUTH_PATH: &str = "/api/auth";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_USER_AGENT: &str = concat!("shortly-client/", env!("CARGO_PKG_VERSION"));

/// Shortly API client.
///
/// Cheap to clone; clones share the cookie store, the session and the refresh
/// coordinator, so renewal is single-flight across all of them.
#[derive(Clone)]
pub struct ShortlyClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Transport,
    session: SessionStore,
    coordinator: Arc<RefreshCoordinator>,
    teardown: Arc<SessionTeardown>,
    retry: RetryPolicy,
    user_path: String,
    auth_path: String,
}

impl ShortlyClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ShortlyClientBuilder {
        ShortlyClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.inner.transport.base_url()
    }

    /// The session this client reads and tears down
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Whether a renewal is currently in flight
    pub fn renewal_state(&self) -> RenewalState {
        self.inner.coordinator.state()
    }

    /// Number of renewals this client has started
    pub fn renewals_started(&self) -> u64 {
        self.inner.coordinator.renewals_started()
    }

    /// Run `callback` whenever a failed renewal forces the user out
    pub fn on_session_invalidated<F>(&self, callback: F)
    where
        F: Fn(&RenewalError) + Send + Sync + 'static,
    {
        self.inner.teardown.subscribe(Arc::new(callback));
    }

    /// Write the cookie credentials currently held, as JSON
    pub fn save_cookies<W: Write>(&self, writer: &mut W) -> Result<(), ClientError> {
        Ok(self.inner.transport.save_cookies(writer)?)
    }

    /// Restore cookie credentials written by [`save_cookies`](Self::save_cookies)
    pub fn load_cookies<R: BufRead>(&self, reader: R) -> Result<(), ClientError> {
        Ok(self.inner.transport.load_cookies(reader)?)
    }

    pub(crate) fn user_route(&self, route: &str) -> String {
        format!("{}{route}", self.inner.user_path)
    }

    pub(crate) fn auth_route(&self, route: &str) -> String {
        format!("{}{route}", self.inner.auth_path)
    }

    /// Send a request that needs the session and decode the JSON response.
    ///
    /// Fails fast with [`ClientError::NotAuthenticated`] when nobody is logged
    /// in. A `401` is recovered by one shared renewal and one retry; the caller
    /// only ever sees the final result.
    pub async fn call_authenticated<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> Result<T, ClientError> {
        let response = self.send_authenticated(request).await?;
        decode(response).await
    }

    /// Send a request to an endpoint that does not need the session.
    ///
    /// A `401` here is an ordinary error and never triggers renewal.
    pub async fn call_public<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> Result<T, ClientError> {
        let response = self.inner.transport.send(&request).await?;
        decode(response).await
    }

    async fn send_authenticated(&self, request: PendingRequest) -> Result<Response, ClientError> {
        let inner = &self.inner;
        if !inner.session.is_present() {
            return Err(ClientError::NotAuthenticated);
        }

        let epoch = inner.coordinator.epoch();
        match inner.transport.send(&request).await {
            Ok(response) => Ok(response),
            Err(TransportError::Unauthorized { .. }) if inner.retry.allows_renewal(&request) => {
                if !inner.session.is_present() {
                    return Err(ClientError::SessionExpired(
                        SessionExpiredCause::Invalidated,
                    ));
                }
                debug!(path = request.path(), "Unauthorized, waiting for renewal");
                inner
                    .coordinator
                    .ensure_renewed(epoch)
                    .await
                    .map_err(|e| ClientError::SessionExpired(SessionExpiredCause::RenewalFailed(e)))?;
                inner.retry.retry_once(&inner.transport, &request).await
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode a JSON body; a malformed body is a [`ClientError::Serialization`]
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

impl std::fmt::Debug for ShortlyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortlyClient")
            .field("base_url", &self.base_url())
            .field("session", &self.inner.session)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for ShortlyClient
#[derive(Default)]
pub struct ShortlyClientBuilder {
    base_url: Option<String>,
    user_path: Option<String>,
    auth_path: Option<String>,
    timeout: Option<Duration>,
    renewal_timeout: Option<Duration>,
    user_agent: Option<String>,
    session: Option<SessionStore>,
    server_logout_on_teardown: Option<bool>,
}

impl ShortlyClientBuilder {
    /// Set the base URL (origin of the API)
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Prefix of the user routes (default `/api/user`)
    #[must_use]
    pub fn user_path(mut self, path: impl Into<String>) -> Self {
        self.user_path = Some(path.into());
        self
    }

    /// Prefix of the auth routes (default `/api/auth`)
    #[must_use]
    pub fn auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = Some(path.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Upper bound on one renewal; hitting it counts as renewal failure
    #[must_use]
    pub const fn renewal_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Use an existing session store (default: a fresh in-memory one)
    #[must_use]
    pub fn session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Whether teardown also calls the backend's logout route (default `true`)
    #[must_use]
    pub const fn server_logout_on_teardown(mut self, enabled: bool) -> Self {
        self.server_logout_on_teardown = Some(enabled);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ShortlyClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url: Url = base_url
            .trim_end_matches('/')
            .parse()
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let renewal_timeout = self.renewal_timeout.unwrap_or(DEFAULT_RENEWAL_TIMEOUT);
        if renewal_timeout.is_zero() {
            return Err(ClientError::Configuration(
                "renewal_timeout must be greater than zero".into(),
            ));
        }

        let user_path = normalize_prefix(self.user_path.as_deref().unwrap_or(DEFAULT_USER_PATH));
        let auth_path = normalize_prefix(self.auth_path.as_deref().unwrap_or(DEFAULT_AUTH_PATH));

        let cookies = Arc::new(CookieStoreMutex::default());
        let client = ClientBuilder::new()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .build()?;
        let transport = Transport::new(client, base_url, cookies);

        let session = self.session.unwrap_or_else(SessionStore::in_memory);
        let mut teardown = SessionTeardown::new(session.clone());
        if self.server_logout_on_teardown.unwrap_or(true) {
            teardown =
                teardown.with_server_logout(transport.clone(), format!("{auth_path}{}", routes::LOGOUT));
        }
        let teardown = Arc::new(teardown);

        let renewer = HttpRenewer::new(
            transport.clone(),
            format!("{auth_path}{}", routes::REFRESH_TOKEN),
            Arc::clone(&teardown),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(renewer),
            renewal_timeout,
        ));

        Ok(ShortlyClient {
            inner: Arc::new(ClientInner {
                transport,
                session,
                coordinator,
                teardown,
                retry: RetryPolicy::new(),
                user_path,
                auth_path,
            }),
        })
    }
}

fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
