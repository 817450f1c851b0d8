//! Request and response bodies of the Shortly API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortly_core::UserProfile;

/// Shorten request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenRequest {
    pub long_url: String,
    /// Optional alias; omitted from the body when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
}

/// A freshly created short URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenedUrl {
    pub id: String,
    pub short_url: String,
    pub long_url: String,
    pub short_code: String,
    #[serde(default)]
    pub custom_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_clicks: u64,
}

/// Shorten response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: ShortenedUrl,
}

/// One of the user's short URLs, with click statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub id: String,
    pub short_url: String,
    pub long_url: String,
    pub short_code: String,
    #[serde(default)]
    pub custom_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_clicks: u64,
    #[serde(default)]
    pub last_clicked: Option<DateTime<Utc>>,
}

/// List response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlsResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<UrlRecord>,
}

/// Acknowledgement returned by delete and logout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Account registration request
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login request
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response of register and login.
///
/// The backend has shipped the profile both as `user` and as `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "data")]
    pub user: Option<UserProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shorten_request_omits_missing_alias() {
        let body = serde_json::to_value(ShortenRequest {
            long_url: "example.com/a".into(),
            custom_url: None,
        })
        .unwrap();
        assert_eq!(body, json!({ "longUrl": "example.com/a" }));

        let body = serde_json::to_value(ShortenRequest {
            long_url: "example.com/a".into(),
            custom_url: Some("my-alias".into()),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "longUrl": "example.com/a", "customUrl": "my-alias" })
        );
    }

    #[test]
    fn test_urls_response_parses_backend_payload() {
        let payload = json!({
            "success": true,
            "data": [{
                "id": "6650a1",
                "shortUrl": "https://sho.rt/abc123",
                "longUrl": "https://example.com/a",
                "shortCode": "abc123",
                "customUrl": null,
                "createdAt": "2024-05-24T10:15:00.000Z",
                "totalClicks": 7,
                "lastClicked": null
            }]
        });
        let parsed: UrlsResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].short_code, "abc123");
        assert_eq!(parsed.data[0].total_clicks, 7);
        assert!(parsed.data[0].last_clicked.is_none());
    }

    #[test]
    fn test_auth_response_accepts_data_alias() {
        let payload = json!({
            "success": true,
            "message": "Login successful",
            "data": { "_id": "u1", "name": "Bob", "email": "bob@example.com" }
        });
        let parsed: AuthResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.user.unwrap().id, "u1");
    }

    #[test]
    fn test_credentials_are_redacted_in_debug() {
        let login = LoginRequest {
            email: "bob@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{login:?}").contains("hunter2"));
    }
}
