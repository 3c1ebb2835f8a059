//! In-memory `ClinicBackend` for controller tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use odo_auth::{AuthChange, AuthError, ClinicBackend, ScopeToken};
use odo_core::{ClinicMembership, ClinicRole, Identity};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Notify, broadcast};

pub const PASSWORD: &str = "correct horse";

/// Pauses a fake call until the test lets it continue.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Unauthorized,
}

impl Failure {
    fn to_error(self) -> AuthError {
        match self {
            Self::Network => AuthError::Network("connection refused".into()),
            Self::Unauthorized => AuthError::Unauthorized,
        }
    }
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, Identity>,
    memberships: HashMap<String, Vec<ClinicMembership>>,
    session_user: Option<String>,
    active: Option<String>,
    sign_in_failure: Option<Failure>,
    list_failure: Option<Failure>,
    establish_failure: Option<Failure>,
    current_failure: Option<Failure>,
    restore_failure: Option<Failure>,
    expire_failure: Option<Failure>,
    sign_out_failure: Option<Failure>,
    sign_in_gate: Option<Arc<Gate>>,
    list_gates: VecDeque<Arc<Gate>>,
    establish_gate: Option<Arc<Gate>>,
    calls: Vec<String>,
}

pub struct FakeBackend {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<AuthChange>,
}

pub fn membership(clinic_id: &str, clinic_name: &str) -> ClinicMembership {
    ClinicMembership {
        clinic_id: clinic_id.into(),
        clinic_name: clinic_name.into(),
        role: ClinicRole::Admin,
        provider_id: None,
    }
}

pub fn password() -> SecretString {
    SecretString::from(PASSWORD)
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            changes,
        })
    }

    /// Register `email` with the given clinics. Returns the user id.
    pub fn add_user(&self, email: &str, clinics: Vec<ClinicMembership>) -> String {
        let mut inner = self.inner.lock().expect("fake lock");
        let id = format!("user-{}", inner.users.len() + 1);
        let identity = Identity::new(id.clone(), email, Some("Ana".into()), Some("Ruiz".into()));
        inner.users.insert(email.to_string(), identity);
        inner.memberships.insert(id.clone(), clinics);
        id
    }

    pub fn identity_of(&self, email: &str) -> Identity {
        self.inner.lock().expect("fake lock").users[email].clone()
    }

    /// Pretend a session for `email` is already open remotely.
    pub fn open_session(&self, email: &str) {
        let mut inner = self.inner.lock().expect("fake lock");
        let id = inner.users[email].id.clone();
        inner.session_user = Some(id);
    }

    pub fn set_active(&self, clinic_id: Option<&str>) {
        self.inner.lock().expect("fake lock").active = clinic_id.map(String::from);
    }

    pub fn active(&self) -> Option<String> {
        self.inner.lock().expect("fake lock").active.clone()
    }

    pub fn set_memberships(&self, user_id: &str, clinics: Vec<ClinicMembership>) {
        self.inner
            .lock()
            .expect("fake lock")
            .memberships
            .insert(user_id.to_string(), clinics);
    }

    pub fn fail_sign_in(&self, failure: Option<Failure>) {
        self.inner.lock().expect("fake lock").sign_in_failure = failure;
    }

    pub fn fail_list(&self, failure: Option<Failure>) {
        self.inner.lock().expect("fake lock").list_failure = failure;
    }

    pub fn fail_establish(&self, failure: Option<Failure>) {
        self.inner.lock().expect("fake lock").establish_failure = failure;
    }

    pub fn fail_current(&self, failure: Option<Failure>) {
        self.inner.lock().expect("fake lock").current_failure = failure;
    }

    pub fn fail_restore(&self, failure: Option<Failure>) {
        self.inner.lock().expect("fake lock").restore_failure = failure;
    }

    pub fn fail_sign_out(&self, expire: Option<Failure>, sign_out: Option<Failure>) {
        let mut inner = self.inner.lock().expect("fake lock");
        inner.expire_failure = expire;
        inner.sign_out_failure = sign_out;
    }

    pub fn gate_sign_in(&self) -> Arc<Gate> {
        let gate = Gate::new();
        self.inner.lock().expect("fake lock").sign_in_gate = Some(gate.clone());
        gate
    }

    /// Gate the next clinic scope request.
    pub fn gate_establish(&self) -> Arc<Gate> {
        let gate = Gate::new();
        self.inner.lock().expect("fake lock").establish_gate = Some(gate.clone());
        gate
    }

    /// Gate the next membership listing.
    pub fn gate_next_list(&self) -> Arc<Gate> {
        let gate = Gate::new();
        self.inner
            .lock()
            .expect("fake lock")
            .list_gates
            .push_back(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().expect("fake lock").calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn push(&self, change: AuthChange) {
        let _ = self.changes.send(change);
    }

    fn record(&self, call: &str) {
        self.inner
            .lock()
            .expect("fake lock")
            .calls
            .push(call.to_string());
    }
}

impl FakeBackend {
    fn establish_locked(
        inner: &mut Inner,
        clinic_id: &str,
        duration_hours: u32,
    ) -> Result<ScopeToken, AuthError> {
        if let Some(failure) = inner.establish_failure {
            return Err(failure.to_error());
        }
        let user_id = inner.session_user.clone().ok_or(AuthError::Unauthorized)?;
        let member = inner
            .memberships
            .get(&user_id)
            .is_some_and(|clinics| clinics.iter().any(|m| m.clinic_id == clinic_id));
        if !member {
            return Err(AuthError::AccessDenied(format!(
                "not a member of clinic {clinic_id}"
            )));
        }
        inner.active = Some(clinic_id.to_string());
        Ok(ScopeToken(format!("scope-{clinic_id}-{duration_hours}h")))
    }
}

#[async_trait]
impl ClinicBackend for FakeBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        self.record("sign_in");
        let gate = self.inner.lock().expect("fake lock").sign_in_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut inner = self.inner.lock().expect("fake lock");
        if let Some(failure) = inner.sign_in_failure {
            return Err(failure.to_error());
        }
        let identity = inner
            .users
            .get(email)
            .filter(|_| password.expose_secret() == PASSWORD)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        inner.session_user = Some(identity.id.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.record("sign_out");
        let mut inner = self.inner.lock().expect("fake lock");
        inner.session_user = None;
        inner.active = None;
        match inner.sign_out_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    async fn restore_session(&self) -> Result<Option<Identity>, AuthError> {
        self.record("restore_session");
        let inner = self.inner.lock().expect("fake lock");
        if let Some(failure) = inner.restore_failure {
            return Err(failure.to_error());
        }
        Ok(inner
            .session_user
            .as_ref()
            .and_then(|id| inner.users.values().find(|u| &u.id == id))
            .cloned())
    }

    async fn get_current_active_clinic(&self) -> Result<Option<String>, AuthError> {
        self.record("get_current_active_clinic");
        let inner = self.inner.lock().expect("fake lock");
        match inner.current_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(inner.active.clone()),
        }
    }

    async fn list_memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClinicMembership>, AuthError> {
        self.record("list_memberships");
        let gate = self.inner.lock().expect("fake lock").list_gates.pop_front();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let inner = self.inner.lock().expect("fake lock");
        if let Some(failure) = inner.list_failure {
            return Err(failure.to_error());
        }
        Ok(inner.memberships.get(user_id).cloned().unwrap_or_default())
    }

    async fn establish_active_clinic(
        &self,
        clinic_id: &str,
        duration_hours: u32,
    ) -> Result<ScopeToken, AuthError> {
        self.record("establish");
        let (result, gate) = {
            let mut inner = self.inner.lock().expect("fake lock");
            let result = Self::establish_locked(&mut inner, clinic_id, duration_hours);
            (result, inner.establish_gate.take())
        };
        // The remote side has already granted (or refused) the scope; the
        // gate only delays the response.
        if let Some(gate) = gate {
            gate.pass().await;
        }
        result
    }

    async fn expire_session_records(&self, _user_id: &str) -> Result<(), AuthError> {
        self.record("expire");
        match self.inner.lock().expect("fake lock").expire_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}
