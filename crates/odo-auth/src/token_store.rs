use std::fs;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

const KEYRING_USER: &str = "backend-session";
const CREDENTIALS_FILE_NAME: &str = "credentials";

/// Identity provider session tokens.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    access_token: String,
    refresh_token: String,
}

impl From<&Credentials> for StoredCredentials {
    fn from(credentials: &Credentials) -> Self {
        Self {
            access_token: credentials.access_token.expose_secret().to_string(),
            refresh_token: credentials.refresh_token.expose_secret().to_string(),
        }
    }
}

impl From<StoredCredentials> for Credentials {
    fn from(stored: StoredCredentials) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
        }
    }
}

/// Where backend credentials live between runs.
///
/// Keyring first, falling back to `~/.odonto/credentials` (0600) when the OS
/// keyring is unavailable.
#[derive(Debug, Clone)]
pub struct TokenStore {
    keyring_service: Option<String>,
    file_path: Option<PathBuf>,
}

impl TokenStore {
    /// Keyring + file fallback.
    ///
    /// `ODONTO_KEYRING_SERVICE` overrides `service`, so tests can avoid touching
    /// real credentials.
    #[must_use]
    pub fn new(service: &str) -> Self {
        let service =
            std::env::var("ODONTO_KEYRING_SERVICE").unwrap_or_else(|_| service.to_string());
        Self {
            keyring_service: Some(service),
            file_path: default_credentials_path(),
        }
    }

    /// File storage only, never the keyring.
    #[must_use]
    pub fn file_only(path: impl Into<PathBuf>) -> Self {
        Self {
            keyring_service: None,
            file_path: Some(path.into()),
        }
    }

    /// Store credentials. Falls back to the file if the keyring fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if both keyring and file storage fail.
    pub fn store(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let payload = serde_json::to_string(&StoredCredentials::from(credentials))
            .map_err(|e| AuthError::Storage(format!("serialize credentials: {e}")))?;

        if let Some(service) = &self.keyring_service {
            match keyring::Entry::new(service, KEYRING_USER) {
                Ok(entry) => match entry.set_password(&payload) {
                    Ok(()) => return Ok(()),
                    Err(error) => {
                        tracing::warn!(%error, "keyring store failed; falling back to file");
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, "keyring unavailable; falling back to file");
                }
            }
        }

        self.store_file(&payload)
    }

    /// Load credentials. Priority: keyring → file.
    #[must_use]
    pub fn load(&self) -> Option<Credentials> {
        if let Some(service) = &self.keyring_service
            && let Ok(entry) = keyring::Entry::new(service, KEYRING_USER)
            && let Ok(payload) = entry.get_password()
            && let Some(credentials) = decode(&payload)
        {
            return Some(credentials);
        }

        let path = self.file_path.as_ref()?;
        let payload = fs::read_to_string(path).ok()?;
        decode(&payload)
    }

    /// Delete stored credentials from keyring and file.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the credentials file cannot be removed.
    pub fn delete(&self) -> Result<(), AuthError> {
        if let Some(service) = &self.keyring_service
            && let Ok(entry) = keyring::Entry::new(service, KEYRING_USER)
        {
            let _ = entry.delete_credential();
        }

        if let Some(path) = &self.file_path
            && path.exists()
        {
            fs::remove_file(path).map_err(|e| {
                AuthError::Storage(format!("failed to delete {}: {e}", path.display()))
            })?;
        }

        Ok(())
    }

    fn store_file(&self, payload: &str) -> Result<(), AuthError> {
        let path = self.file_path.as_ref().ok_or_else(|| {
            AuthError::Storage("home directory not found, cannot store credentials".into())
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("mkdir {}: {e}", parent.display())))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("failed to chmod 0700 {}: {e}", parent.display());
                }
            }
        }
        fs::write(path, payload)
            .map_err(|e| AuthError::Storage(format!("write {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Storage(format!("chmod {}: {e}", path.display())))?;
        }

        Ok(())
    }
}

fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".odonto").join(CREDENTIALS_FILE_NAME))
}

fn decode(payload: &str) -> Option<Credentials> {
    if payload.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<StoredCredentials>(payload) {
        Ok(stored) => Some(stored.into()),
        Err(error) => {
            tracing::warn!(%error, "ignoring unreadable stored credentials");
            None
        }
    }
}
