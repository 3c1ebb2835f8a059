use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CoreError;

/// Where a session stands, derived from the controller state.
///
/// ```text
/// signed_out → authenticating → needs_clinic_selection → active
///                             → active
/// needs_clinic_selection | active → signed_out
/// active → needs_clinic_selection (scope revoked remotely)
/// ```
///
/// Every phase may fall back to `signed_out` when the remote session expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    SignedOut,
    Authenticating,
    NeedsClinicSelection,
    Active,
}

impl SessionPhase {
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::SignedOut => &[Self::Authenticating],
            Self::Authenticating => &[Self::NeedsClinicSelection, Self::Active, Self::SignedOut],
            Self::NeedsClinicSelection => &[Self::Active, Self::Authenticating, Self::SignedOut],
            Self::Active => &[Self::NeedsClinicSelection, Self::Authenticating, Self::SignedOut],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || self.allowed_next_states().contains(&next)
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` when `next` is not reachable.
    pub fn check_transition(self, next: Self) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Whether protected content may be rendered.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignedOut => "signed_out",
            Self::Authenticating => "authenticating",
            Self::NeedsClinicSelection => "needs_clinic_selection",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
