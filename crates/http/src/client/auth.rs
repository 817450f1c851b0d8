//! Account endpoints that do not need a session

use super::error::ClientError;
use super::transport::PendingRequest;
use super::{ShortlyClient, routes};
use crate::types::{AuthResponse, LoginRequest, RegisterRequest};
use shortly_core::UserProfile;
use tracing::{info, warn};

impl ShortlyClient {
    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        let request = PendingRequest::post(self.auth_route(routes::REGISTER)).with_json(request)?;
        self.call_public(request).await
    }

    /// Log in and record the returned user in the session store.
    ///
    /// The session cookie set by the backend lands in this client's cookie jar.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = PendingRequest::post(self.auth_route(routes::LOGIN)).with_json(&body)?;
        let response: AuthResponse = self.call_public(request).await?;

        let user = response.user.ok_or_else(|| {
            ClientError::AuthenticationFailed(
                response
                    .message
                    .unwrap_or_else(|| "login response did not include a user".to_string()),
            )
        })?;

        if let Err(e) = self.session().set(user.clone()) {
            warn!(error = %e, "Logged in, but the session could not be persisted");
        }
        info!(user_id = %user.id, "Logged in");
        Ok(user)
    }
}
