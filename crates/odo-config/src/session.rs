//! Clinic session settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const fn default_duration_hours() -> u32 {
    8
}

fn default_keyring_service() -> String {
    "odonto".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Lifetime requested when establishing an active clinic scope.
    #[serde(default = "default_duration_hours")]
    pub duration_hours: u32,

    /// Where the persisted session document lives. Empty = `~/.odonto/session.json`.
    #[serde(default)]
    pub state_path: String,

    /// OS keyring service name for identity provider credentials.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_hours: default_duration_hours(),
            state_path: String::new(),
            keyring_service: default_keyring_service(),
        }
    }
}

impl SessionConfig {
    /// Resolved path of the persisted session document.
    #[must_use]
    pub fn resolved_state_path(&self) -> Option<PathBuf> {
        if self.state_path.is_empty() {
            dirs::home_dir().map(|home| home.join(".odonto").join("session.json"))
        } else {
            Some(PathBuf::from(&self.state_path))
        }
    }
}
