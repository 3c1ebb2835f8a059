use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clinic::{ClinicMembership, ClinicRole};

/// Read-only projection of the authenticated user.
///
/// Produced by `odo-auth` after a successful sign-in, consumed by `odo-cli` and
/// any cache owner that needs to know who is signed in. `role` and `clinic_id`
/// are only set once an active clinic has been established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Identity provider user ID.
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<ClinicRole>,
    #[serde(default)]
    pub clinic_id: Option<String>,
}

impl Identity {
    /// Build an identity from provider data, deriving the display name.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        let email = email.into();
        let display_name = derive_display_name(first_name.as_deref(), last_name.as_deref(), &email);
        Self {
            id: id.into(),
            email,
            first_name,
            last_name,
            display_name,
            role: None,
            clinic_id: None,
        }
    }

    /// Copy of this identity scoped to `membership`.
    #[must_use]
    pub fn with_active_membership(&self, membership: &ClinicMembership) -> Self {
        Self {
            role: Some(membership.role),
            clinic_id: Some(membership.clinic_id.clone()),
            ..self.clone()
        }
    }

    /// Copy of this identity with no clinic scope.
    #[must_use]
    pub fn without_clinic(&self) -> Self {
        Self {
            role: None,
            clinic_id: None,
            ..self.clone()
        }
    }
}

/// `"First Last"`, whichever half exists, or the email when neither does.
fn derive_display_name(first: Option<&str>, last: Option<&str>, email: &str) -> String {
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        email.to_string()
    } else {
        parts.join(" ")
    }
}
