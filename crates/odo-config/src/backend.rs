//! Hosted backend (identity provider + database RPC) configuration.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://abcd.supabase.co`.
    #[serde(default)]
    pub url: String,

    /// Public anonymous API key sent as `apikey` on every request.
    #[serde(default)]
    pub anon_key: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Check if the backend config has the minimum required fields.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }

    /// Base URL without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` when url or key is missing and
    /// `ConfigError::InvalidValue` when the URL has no http(s) scheme.
    pub fn base_url(&self) -> Result<&str, ConfigError> {
        if !self.is_configured() {
            return Err(ConfigError::NotConfigured {
                section: "backend".into(),
            });
        }
        let trimmed = self.url.trim_end_matches('/');
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                field: "backend.url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }
        Ok(trimmed)
    }
}
