//! Clinic memberships and the active clinic scope.
//!
//! Memberships are fetched from the backend and never mutated locally; the
//! backend is the only authority that grants or revokes them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CoreError;

/// Role a user holds within one clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClinicRole {
    Admin,
    Provider,
    Staff,
}

impl ClinicRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Provider => "provider",
            Self::Staff => "staff",
        }
    }

    /// Parse a role string as the backend reports it (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for anything other than the three known roles.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "provider" => Ok(Self::Provider),
            "staff" => Ok(Self::Staff),
            other => Err(CoreError::Validation(format!("unknown clinic role '{other}'"))),
        }
    }
}

impl fmt::Display for ClinicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One clinic a user may act within.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClinicMembership {
    pub clinic_id: String,
    pub clinic_name: String,
    pub role: ClinicRole,
    #[serde(default)]
    pub provider_id: Option<String>,
}

impl ClinicMembership {
    /// The selection this membership would produce if activated.
    #[must_use]
    pub fn to_active(&self) -> ActiveClinic {
        ActiveClinic {
            clinic_id: self.clinic_id.clone(),
            clinic_name: self.clinic_name.clone(),
        }
    }
}

/// The single clinic a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveClinic {
    pub clinic_id: String,
    pub clinic_name: String,
}

/// Find the membership for `clinic_id`, if the user has one.
#[must_use]
pub fn find_membership<'a>(
    memberships: &'a [ClinicMembership],
    clinic_id: &str,
) -> Option<&'a ClinicMembership> {
    memberships.iter().find(|m| m.clinic_id == clinic_id)
}
