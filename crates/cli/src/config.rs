//! CLI configuration
//!
//! Values are layered: built-in defaults, then the config file (if any), then
//! `SHORTLY_*` environment variables, e.g. `SHORTLY_API__BASE_URL`.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use shortly_http::ShortlyClient;
use std::path::Path;
use std::time::Duration;

/// Complete CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
}

/// Where the backend lives and how long to wait for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Origin of the API, e.g. `https://sho.rt`
    pub base_url: String,
    /// Prefix of the URL management routes
    pub user_path: String,
    /// Prefix of the account and refresh routes
    pub auth_path: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Upper bound on one session renewal
    pub renewal_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            user_path: "/api/user".to_string(),
            auth_path: "/api/auth".to_string(),
            timeout_secs: 30,
            renewal_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load configuration with defaults, an optional file and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, a value has
    /// the wrong type, or a timeout is zero
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ApiSettings::default();

        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.base_url)?
            .set_default("api.user_path", defaults.user_path)?
            .set_default("api.auth_path", defaults.auth_path)?
            .set_default("api.timeout_secs", defaults.timeout_secs)?
            .set_default("api.renewal_timeout_secs", defaults.renewal_timeout_secs)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SHORTLY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than zero");
        }
        if self.api.renewal_timeout_secs == 0 {
            bail!("api.renewal_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Build an API client from these settings
    pub fn client_builder(&self) -> shortly_http::ShortlyClientBuilder {
        ShortlyClient::builder()
            .base_url(&self.api.base_url)
            .user_path(&self.api.user_path)
            .auth_path(&self.api.auth_path)
            .timeout(Duration::from_secs(self.api.timeout_secs))
            .renewal_timeout(Duration::from_secs(self.api.renewal_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(Some(&temp_dir.path().join("missing.toml"))).unwrap();
        assert_eq!(settings.api, ApiSettings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://sho.rt\"\nrenewal_timeout_secs = 3\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.api.base_url, "https://sho.rt");
        assert_eq!(settings.api.renewal_timeout_secs, 3);
        assert_eq!(settings.api.user_path, "/api/user");
        assert_eq!(settings.api.timeout_secs, 30);
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        std::fs::write(&path, "[api]\nrenewal_timeout_secs = 0\n").unwrap();
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("renewal_timeout_secs"));

        std::fs::write(&path, "[api]\ntimeout_secs = 0\n").unwrap();
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("api.timeout_secs"));
    }

    #[test]
    fn test_client_builder_uses_settings() {
        let settings = Settings {
            api: ApiSettings {
                base_url: "https://sho.rt/".to_string(),
                ..ApiSettings::default()
            },
        };
        let client = settings.client_builder().build().unwrap();
        assert_eq!(client.base_url(), "https://sho.rt");
    }
}
