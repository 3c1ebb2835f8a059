use odo_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("not authenticated with the clinic backend")]
    Unauthorized,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("unexpected backend response: {0}")]
    Decode(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(#[from] odo_config::ConfigError),
}

impl AuthError {
    /// How a failed password sign-in is shown to the user.
    #[must_use]
    pub const fn sign_in_kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            _ => ErrorKind::NetworkError,
        }
    }

    /// How a failed clinic selection is shown to the user.
    #[must_use]
    pub const fn selection_kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied(_) | Self::InvalidCredentials => ErrorKind::ClinicAccessDenied,
            Self::Http { status, .. } if *status >= 400 && *status < 500 => {
                ErrorKind::ClinicAccessDenied
            }
            Self::Unauthorized => ErrorKind::SessionExpired,
            _ => ErrorKind::NetworkError,
        }
    }

    /// Whether the remote session is gone and the user must sign in again.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
