//! Error types shared across Odonto crates.
//!
//! `ErrorKind` is the user-facing taxonomy the session controller records in its
//! state. Transport and storage errors are defined in their own crates and are
//! mapped onto these kinds before they reach the UI.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds surfaced by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Any unexpected remote failure. Transport details stay in the logs.
    #[error("could not reach the clinic service, check your connection and try again")]
    NetworkError,

    #[error("you do not have access to that clinic")]
    ClinicAccessDenied,

    /// Non-fatal; profile data could not be loaded and the user must pick a clinic.
    #[error("clinic profile could not be loaded")]
    ProfileFetchDegraded,

    #[error("your session has expired, sign in again")]
    SessionExpired,

    #[error("not signed in")]
    NotAuthenticated,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::NetworkError => "network_error",
            Self::ClinicAccessDenied => "clinic_access_denied",
            Self::ProfileFetchDegraded => "profile_fetch_degraded",
            Self::SessionExpired => "session_expired",
            Self::NotAuthenticated => "not_authenticated",
        }
    }
}

/// Errors that can be raised by any Odonto crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A phase transition was attempted that the state machine does not allow.
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Data failed validation (format, unknown enum value).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
