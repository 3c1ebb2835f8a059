//! # odo-config
//!
//! Layered configuration loading for Odonto using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`ODONTO_*` prefix, `__` as separator)
//! 2. Project-level `.odonto/config.toml`
//! 3. User-level `~/.config/odonto/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `ODONTO_BACKEND__URL` -> `backend.url`,
//! `ODONTO_SESSION__DURATION_HOURS` -> `session.duration_hours`, etc.
//!
//! ```no_run
//! use odo_config::OdoConfig;
//!
//! let config = OdoConfig::load_with_dotenv().expect("config");
//! if config.backend.is_configured() {
//!     println!("backend: {}", config.backend.url);
//! }
//! ```

mod backend;
mod error;
mod general;
mod session;

pub use backend::BackendConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;
pub use session::SessionConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OdoConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl OdoConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Does NOT call `dotenvy`; use [`load_with_dotenv`](Self::load_with_dotenv)
    /// if `.env` files should be honoured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be parsed or a value has
    /// the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the current directory first, then [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can extract from it directly or add providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        let local_path = PathBuf::from(".odonto/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("ODONTO_").split("__"))
    }

    /// Reject values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero session duration or an
    /// unknown default output format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.duration_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.duration_hours".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !matches!(
            self.general.default_format.as_str(),
            "json" | "table" | "raw"
        ) {
            return Err(ConfigError::InvalidValue {
                field: "general.default_format".into(),
                reason: format!("'{}' is not one of json, table, raw", self.general.default_format),
            });
        }
        Ok(())
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("odonto").join("config.toml"))
    }
}
