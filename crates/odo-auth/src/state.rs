//! Controller state and its transition function.
//!
//! Every mutation, whether it comes from a direct call or from an identity
//! provider push event, is a [`SessionEvent`] applied by [`apply`]. The
//! function is pure so transitions can be tested without a backend or storage.

use odo_core::{ActiveClinic, ClinicMembership, ErrorKind, Identity, SessionPhase};
use serde::Serialize;

use crate::session_store::PersistedSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    pub identity: Option<Identity>,
    /// `None` until fetched for the current identity.
    pub memberships: Option<Vec<ClinicMembership>>,
    pub active: Option<ActiveClinic>,
    pub needs_selection: bool,
    pub is_loading: bool,
    pub error: Option<ErrorKind>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl ControllerState {
    /// Unauthenticated rest state.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            identity: None,
            memberships: None,
            active: None,
            needs_selection: false,
            is_loading: false,
            error: None,
        }
    }

    /// State before the startup restore check has finished.
    #[must_use]
    pub fn booting() -> Self {
        Self {
            is_loading: true,
            ..Self::signed_out()
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match (&self.identity, &self.active) {
            (None, _) => SessionPhase::SignedOut,
            (Some(_), Some(_)) => SessionPhase::Active,
            (Some(_), None) if self.needs_selection => SessionPhase::NeedsClinicSelection,
            (Some(_), None) => SessionPhase::Authenticating,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Whether protected content may be rendered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.is_loading && self.phase().is_ready()
    }

    /// `needs_selection` implies no active clinic; an active clinic implies an identity.
    #[must_use]
    pub const fn invariants_hold(&self) -> bool {
        !(self.needs_selection && self.active.is_some())
            && !(self.active.is_some() && self.identity.is_none())
    }

    /// The subset written to durable storage.
    #[must_use]
    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            identity: self.identity.clone(),
            active_clinic_id: self.active.as_ref().map(|a| a.clinic_id.clone()),
            active_clinic_name: self.active.as_ref().map(|a| a.clinic_name.clone()),
            needs_clinic_selection: self.needs_selection,
            is_authenticated: self.is_authenticated(),
        }
    }
}

/// Result of a successful profile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub memberships: Vec<ClinicMembership>,
    /// Membership matching the backend's current clinic scope, if any.
    pub active: Option<ClinicMembership>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Restored(PersistedSession),
    SignInStarted,
    SignInSucceeded(Identity),
    SignInFailed(ErrorKind),
    ProfileLoaded(Profile),
    ProfileDegraded,
    ErrorRaised(ErrorKind),
    ErrorCleared,
    IdentityUpdated(Identity),
    LoadingFinished,
    SignedOut,
    SessionExpired,
}

/// Apply `event` to `state`, returning the next state.
#[must_use]
pub fn apply(state: &ControllerState, event: SessionEvent) -> ControllerState {
    let next = match event {
        SessionEvent::Restored(persisted) => restored(state, persisted),
        SessionEvent::SignInStarted => ControllerState {
            is_loading: true,
            error: None,
            ..state.clone()
        },
        SessionEvent::SignInSucceeded(identity) => ControllerState {
            identity: Some(identity.without_clinic()),
            memberships: None,
            active: None,
            needs_selection: false,
            is_loading: true,
            error: None,
        },
        SessionEvent::SignInFailed(kind) => ControllerState {
            is_loading: false,
            error: Some(kind),
            ..state.clone()
        },
        SessionEvent::ProfileLoaded(profile) => profile_loaded(state, profile),
        SessionEvent::ProfileDegraded => match &state.identity {
            Some(identity) => ControllerState {
                identity: Some(identity.without_clinic()),
                memberships: None,
                active: None,
                needs_selection: true,
                is_loading: false,
                error: state.error,
            },
            None => state.clone(),
        },
        SessionEvent::ErrorRaised(kind) => ControllerState {
            is_loading: false,
            error: Some(kind),
            ..state.clone()
        },
        SessionEvent::ErrorCleared => ControllerState {
            error: None,
            ..state.clone()
        },
        SessionEvent::IdentityUpdated(updated) => identity_updated(state, updated),
        SessionEvent::LoadingFinished => ControllerState {
            is_loading: false,
            ..state.clone()
        },
        SessionEvent::SignedOut => ControllerState::signed_out(),
        SessionEvent::SessionExpired => ControllerState {
            error: Some(ErrorKind::SessionExpired),
            ..ControllerState::signed_out()
        },
    };

    debug_assert!(next.invariants_hold(), "invariants violated: {next:?}");
    next
}

fn restored(state: &ControllerState, persisted: PersistedSession) -> ControllerState {
    let Some(identity) = persisted.identity.filter(|_| persisted.is_authenticated) else {
        return state.clone();
    };

    let active = match (persisted.active_clinic_id, persisted.active_clinic_name) {
        (Some(clinic_id), Some(clinic_name)) => Some(ActiveClinic {
            clinic_id,
            clinic_name,
        }),
        _ => None,
    };

    ControllerState {
        identity: Some(identity),
        memberships: None,
        needs_selection: persisted.needs_clinic_selection && active.is_none(),
        active,
        is_loading: state.is_loading,
        error: None,
    }
}

fn profile_loaded(state: &ControllerState, profile: Profile) -> ControllerState {
    let Some(identity) = &state.identity else {
        return state.clone();
    };

    match profile.active {
        Some(membership) => ControllerState {
            identity: Some(identity.with_active_membership(&membership)),
            active: Some(membership.to_active()),
            memberships: Some(profile.memberships),
            needs_selection: false,
            is_loading: false,
            error: state.error,
        },
        None => ControllerState {
            identity: Some(identity.without_clinic()),
            active: None,
            memberships: Some(profile.memberships),
            needs_selection: true,
            is_loading: false,
            error: state.error,
        },
    }
}

fn identity_updated(state: &ControllerState, updated: Identity) -> ControllerState {
    match &state.identity {
        Some(current) if current.id == updated.id => ControllerState {
            identity: Some(Identity {
                role: current.role,
                clinic_id: current.clinic_id.clone(),
                ..updated
            }),
            ..state.clone()
        },
        _ => state.clone(),
    }
}
