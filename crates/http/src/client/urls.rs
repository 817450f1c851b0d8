//! URL management through the authenticated path, plus voluntary logout

use super::error::ClientError;
use super::transport::{PendingRequest, TransportError};
use super::{ShortlyClient, decode, routes};
use crate::types::{ShortenRequest, ShortenResponse, StatusResponse, UrlsResponse};
use tracing::{debug, info};

impl ShortlyClient {
    /// Create a short URL, optionally with a custom alias
    pub async fn shorten_url(
        &self,
        long_url: &str,
        custom_url: Option<&str>,
    ) -> Result<ShortenResponse, ClientError> {
        let body = ShortenRequest {
            long_url: long_url.to_string(),
            custom_url: custom_url
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(str::to_string),
        };
        let request = PendingRequest::post(self.user_route(routes::SHORTEN)).with_json(&body)?;
        self.call_authenticated(request).await
    }

    /// List the logged-in user's URLs
    pub async fn get_user_urls(&self) -> Result<UrlsResponse, ClientError> {
        let request = PendingRequest::get(self.user_route(routes::URLS));
        self.call_authenticated(request).await
    }

    /// Delete one of the user's URLs
    pub async fn delete_url(&self, url_id: &str) -> Result<StatusResponse, ClientError> {
        if matches!(url_id.trim(), "" | "." | "..") {
            return Err(ClientError::BadRequest(format!("invalid URL id {url_id:?}")));
        }
        let request = PendingRequest::delete(self.user_route(&routes::url(url_id)));
        self.call_authenticated(request).await
    }

    /// Log out on the server and clear the local session.
    ///
    /// This is a voluntary logout: a `401` is not renewed and invalidation
    /// listeners are never notified. When the server says the session is
    /// already gone, the local session is cleared and the logout still
    /// succeeds.
    pub async fn logout(&self) -> Result<StatusResponse, ClientError> {
        if !self.session().is_present() {
            return Err(ClientError::NotAuthenticated);
        }

        let request = PendingRequest::post(self.user_route(routes::LOGOUT));
        let response = match self.inner.transport.send(&request).await {
            Ok(response) => decode(response).await?,
            Err(TransportError::Unauthorized { .. }) => {
                debug!("Server session already expired");
                StatusResponse {
                    success: true,
                    message: "Session had already expired; logged out locally".to_string(),
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.session().clear();
        info!("Logged out");
        Ok(response)
    }
}
