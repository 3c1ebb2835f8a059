use odo_auth::ControllerState;
use odo_core::SessionPhase;
use serde::Serialize;

use crate::output::{Tabular, field_rows};

/// What a command reports about the session after it ran.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub authenticated: bool,
    pub ready: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub clinic_id: Option<String>,
    pub clinic_name: Option<String>,
    pub needs_selection: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_credentials: Option<bool>,
}

impl SessionView {
    pub fn from_state(state: &ControllerState) -> Self {
        let identity = state.identity.as_ref();
        Self {
            phase: state.phase(),
            authenticated: state.is_authenticated(),
            ready: state.is_ready(),
            user_id: identity.map(|i| i.id.clone()),
            email: identity.map(|i| i.email.clone()),
            display_name: identity.map(|i| i.display_name.clone()),
            role: identity.and_then(|i| i.role).map(|role| role.to_string()),
            clinic_id: state.active.as_ref().map(|a| a.clinic_id.clone()),
            clinic_name: state.active.as_ref().map(|a| a.clinic_name.clone()),
            needs_selection: state.needs_selection,
            error: state.error.map(|kind| kind.to_string()),
            stored_credentials: None,
        }
    }

    #[must_use]
    pub fn with_stored_credentials(mut self, stored: bool) -> Self {
        self.stored_credentials = Some(stored);
        self
    }
}

impl Tabular for SessionView {
    fn headers(&self) -> Vec<&'static str> {
        vec!["field", "value"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let mut rows = field_rows(&[
            ("phase", Some(self.phase.to_string())),
            ("ready", Some(self.ready.to_string())),
            ("email", self.email.clone()),
            ("name", self.display_name.clone()),
            ("role", self.role.clone()),
            ("clinic_id", self.clinic_id.clone()),
            ("clinic_name", self.clinic_name.clone()),
        ]);
        if let Some(stored) = self.stored_credentials {
            rows.extend(field_rows(&[("stored_credentials", Some(stored.to_string()))]));
        }
        rows
    }

    fn footer(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(format!("error: {error}"));
        }
        match self.phase {
            SessionPhase::SignedOut => Some("run `odo auth login --email <email>` to sign in".into()),
            SessionPhase::NeedsClinicSelection => {
                Some("run `odo clinic list` then `odo clinic select <id>`".into())
            }
            SessionPhase::Authenticating | SessionPhase::Active => None,
        }
    }
}
