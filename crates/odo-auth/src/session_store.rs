//! Durable storage for the subset of controller state that survives restarts.
//!
//! The document is a JSON object with a single namespaced entry
//! (`odonto-session`) so the file can be shared with other local settings
//! without clobbering them.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use odo_core::Identity;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AuthError;

pub const STORAGE_KEY: &str = "odonto-session";

/// Persisted session layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub active_clinic_id: Option<String>,
    #[serde(default)]
    pub active_clinic_name: Option<String>,
    #[serde(default)]
    pub needs_clinic_selection: bool,
    #[serde(default)]
    pub is_authenticated: bool,
}

pub trait SessionStore: Send + Sync {
    /// Read the persisted session. Missing storage is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the storage exists but cannot be read or parsed.
    fn load(&self) -> Result<Option<PersistedSession>, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the session cannot be written.
    fn save(&self, session: &PersistedSession) -> Result<(), AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the entry cannot be removed.
    fn clear(&self) -> Result<(), AuthError>;
}

/// JSON file store, written with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("read {}: {e}", self.path.display())))?;
        if raw.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| AuthError::Storage(format!("parse {}: {e}", self.path.display())))
    }

    /// Document to update before a write. An unreadable document is replaced
    /// rather than blocking every later write.
    fn document_for_update(&self) -> serde_json::Map<String, serde_json::Value> {
        self.read_document().unwrap_or_else(|error| {
            warn!(%error, "replacing unreadable session file");
            serde_json::Map::new()
        })
    }

    /// Write through a sibling temp file and rename it into place, so readers
    /// see either the old document or the new one.
    fn write_document(
        &self,
        document: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("mkdir {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_string_pretty(document)
            .map_err(|e| AuthError::Storage(format!("serialize session: {e}")))?;

        let temp_path = self.path.with_extension("json.tmp");
        // A leftover from an interrupted write keeps its old mode on truncate.
        let _ = fs::remove_file(&temp_path);
        let storage = |e: std::io::Error| {
            AuthError::Storage(format!("write {}: {e}", temp_path.display()))
        };

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path).map_err(storage)?;
        file.write_all(body.as_bytes()).map_err(storage)?;
        file.sync_all().map_err(storage)?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .map_err(|e| AuthError::Storage(format!("rename to {}: {e}", self.path.display())))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, AuthError> {
        let mut document = self.read_document()?;
        let Some(entry) = document.remove(STORAGE_KEY) else {
            return Ok(None);
        };
        serde_json::from_value(entry)
            .map(Some)
            .map_err(|e| AuthError::Storage(format!("decode {STORAGE_KEY}: {e}")))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), AuthError> {
        let mut document = self.document_for_update();
        let entry = serde_json::to_value(session)
            .map_err(|e| AuthError::Storage(format!("serialize session: {e}")))?;
        document.insert(STORAGE_KEY.to_string(), entry);
        self.write_document(&document)
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(error) => {
                warn!(%error, "removing unreadable session file");
                return fs::remove_file(&self.path).map_err(|e| {
                    AuthError::Storage(format!("failed to delete {}: {e}", self.path.display()))
                });
            }
        };
        if document.remove(STORAGE_KEY).is_none() {
            return Ok(());
        }
        if document.is_empty() {
            fs::remove_file(&self.path).map_err(|e| {
                AuthError::Storage(format!("failed to delete {}: {e}", self.path.display()))
            })
        } else {
            self.write_document(&document)
        }
    }
}

/// In-process store, used by tests and by embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<PersistedSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }

    /// Current contents, for assertions.
    #[must_use]
    pub fn current(&self) -> Option<PersistedSession> {
        self.inner.lock().ok().and_then(|guard| guard.clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, AuthError> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| AuthError::Storage(format!("session lock poisoned: {e}")))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), AuthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| AuthError::Storage(format!("session lock poisoned: {e}")))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| AuthError::Storage(format!("session lock poisoned: {e}")))?;
        *guard = None;
        Ok(())
    }
}
