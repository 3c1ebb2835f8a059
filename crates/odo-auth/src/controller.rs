//! The clinic session controller.
//!
//! One [`SessionController`] per process owns the answer to "who is signed
//! in, within which clinic, and can protected content be shown". State is
//! published on a `watch` channel; every write goes through [`commit`], which
//! applies a [`SessionEvent`] under a guard:
//!
//! - the **epoch** is bumped by every local reset (logout, expiry, pushed
//!   sign-out) and invalidates results of calls started before it;
//! - the **profile sequence** is bumped by every `load_profile` call, and only
//!   the most recently issued fetch may publish its result.
//!
//! [`commit`]: SessionController::commit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use odo_core::clinic::find_membership;
use odo_core::{ClinicMembership, ErrorKind, SessionPhase};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::backend::{AuthChange, ClinicBackend, ScopeToken};
use crate::session_store::SessionStore;
use crate::state::{ControllerState, Profile, SessionEvent, apply};

const SIGNAL_CAPACITY: usize = 64;

/// Cache invalidation notices for owners of clinic-scoped data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SessionSignal {
    /// The signed-in user changed (including to nobody). Drop everything.
    IdentityChanged { user_id: Option<String> },
    /// The active clinic changed. Drop clinic-scoped data and refetch.
    ClinicChanged { clinic_id: Option<String> },
}

#[derive(Debug, Clone)]
enum Guard {
    Always,
    Epoch(u64),
    Profile { epoch: u64, seq: u64, user_id: String },
}

pub struct SessionController {
    backend: Arc<dyn ClinicBackend>,
    store: Arc<dyn SessionStore>,
    duration_hours: u32,
    state: watch::Sender<ControllerState>,
    signals: broadcast::Sender<SessionSignal>,
    epoch: AtomicU64,
    profile_seq: AtomicU64,
    select_lock: Mutex<()>,
    scope_token: StdMutex<Option<ScopeToken>>,
}

impl SessionController {
    /// New controller in the loading state. Call [`restore`](Self::restore)
    /// before relying on it.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        store: Arc<dyn SessionStore>,
        duration_hours: u32,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::booting());
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            backend,
            store,
            duration_hours,
            state,
            signals,
            epoch: AtomicU64::new(0),
            profile_seq: AtomicU64::new(0),
            select_lock: Mutex::new(()),
            scope_token: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    pub fn snapshot(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ClinicBackend> {
        &self.backend
    }

    /// Token returned by the last successful clinic selection in this process.
    pub fn scope_token(&self) -> Option<ScopeToken> {
        self.scope_token.lock().ok().and_then(|token| token.clone())
    }

    /// Password sign-in followed by profile discovery.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` or `NetworkError` when the provider rejects the
    /// attempt, `NotAuthenticated` when a logout overtook it. The same kind is
    /// recorded in the published state.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<(), ErrorKind> {
        let epoch = self.current_epoch();
        self.commit(SessionEvent::SignInStarted, &Guard::Epoch(epoch));

        let identity = match self.backend.sign_in_with_password(email, password).await {
            Ok(identity) => identity,
            Err(error) => {
                let kind = error.sign_in_kind();
                warn!(%error, kind = %kind, "sign-in failed");
                self.commit(SessionEvent::SignInFailed(kind), &Guard::Epoch(epoch));
                return Err(kind);
            }
        };

        let user_id = identity.id.clone();
        if !self.commit(SessionEvent::SignInSucceeded(identity), &Guard::Epoch(epoch)) {
            debug!(%user_id, "sign-in finished after logout; discarding remote session");
            if let Err(error) = self.backend.sign_out().await {
                warn!(%error, "failed to close discarded session");
            }
            return Err(ErrorKind::NotAuthenticated);
        }
        info!(%user_id, "signed in");

        let listed = self.auto_select_single_clinic(&user_id, epoch).await;
        if self.current_epoch() != epoch {
            return Err(ErrorKind::NotAuthenticated);
        }
        self.reconcile_profile(listed).await;
        Ok(())
    }

    /// Establish the scope on the user's behalf when there is exactly one
    /// clinic to choose from. Failures only mean the user picks manually.
    ///
    /// Returns the membership listing so the profile load that follows does
    /// not fetch it again.
    async fn auto_select_single_clinic(
        &self,
        user_id: &str,
        epoch: u64,
    ) -> Option<Vec<ClinicMembership>> {
        let memberships = match self.backend.list_memberships_for_user(user_id).await {
            Ok(memberships) => memberships,
            Err(error) => {
                warn!(%error, "could not list clinics for automatic selection");
                return None;
            }
        };
        let [only] = memberships.as_slice() else {
            debug!(count = memberships.len(), "no automatic clinic selection");
            return Some(memberships);
        };
        if self.current_epoch() != epoch {
            return None;
        }
        match self
            .backend
            .establish_active_clinic(&only.clinic_id, self.duration_hours)
            .await
        {
            Ok(_) if self.current_epoch() != epoch => {
                debug!(clinic_id = %only.clinic_id, "automatic selection finished after logout; dropping scope");
                return None;
            }
            Ok(token) => {
                debug!(clinic_id = %only.clinic_id, "single clinic selected automatically");
                self.set_scope_token(Some(token));
            }
            Err(error) => warn!(%error, clinic_id = %only.clinic_id, "automatic clinic selection failed"),
        }
        Some(memberships)
    }

    /// Reconcile memberships and the active clinic with the backend.
    ///
    /// No-op while signed out. Never surfaces an error: a failed membership
    /// listing degrades to "needs selection" with no membership list.
    pub async fn load_profile(&self) {
        self.reconcile_profile(None).await;
    }

    /// `load_profile` with an optional membership listing fetched earlier in
    /// the same operation.
    async fn reconcile_profile(&self, listed: Option<Vec<ClinicMembership>>) {
        let Some(user_id) = self.current_user_id() else {
            return;
        };
        let epoch = self.current_epoch();
        let seq = self.profile_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = Guard::Profile {
            epoch,
            seq,
            user_id: user_id.clone(),
        };

        let current = match self.backend.get_current_active_clinic().await {
            Ok(current) => current,
            Err(error) => {
                warn!(%error, "could not read active clinic; treating as none");
                None
            }
        };

        let memberships = match listed {
            Some(memberships) => Ok(memberships),
            None => self.backend.list_memberships_for_user(&user_id).await,
        };
        match memberships {
            Ok(memberships) => {
                let active = current.and_then(|clinic_id| {
                    let found = find_membership(&memberships, &clinic_id).cloned();
                    if found.is_none() {
                        warn!(%clinic_id, "active clinic is not among memberships");
                    }
                    found
                });
                self.commit(
                    SessionEvent::ProfileLoaded(Profile {
                        memberships,
                        active,
                    }),
                    &guard,
                );
            }
            Err(error) if error.is_session_expired() => {
                self.expire_since(epoch).await;
            }
            Err(error) => {
                warn!(%error, kind = %ErrorKind::ProfileFetchDegraded, "membership listing failed");
                self.commit(SessionEvent::ProfileDegraded, &guard);
            }
        }
    }

    /// Make `clinic_id` the active clinic. Calls are serialized.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a signed-in user, `ClinicAccessDenied` when
    /// the backend refuses the clinic, `NetworkError` on transport failure,
    /// `SessionExpired` when the remote session is gone, `NotAuthenticated`
    /// when a logout overtook the selection.
    pub async fn select_clinic(&self, clinic_id: &str) -> Result<(), ErrorKind> {
        let _serialized = self.select_lock.lock().await;
        let epoch = self.current_epoch();
        if self.current_user_id().is_none() {
            return Err(ErrorKind::NotAuthenticated);
        }

        match self
            .backend
            .establish_active_clinic(clinic_id, self.duration_hours)
            .await
        {
            _ if self.current_epoch() != epoch => {
                debug!(%clinic_id, "clinic selection finished after logout; dropping scope");
                Err(ErrorKind::NotAuthenticated)
            }
            Ok(token) => {
                self.set_scope_token(Some(token));
                self.load_profile().await;
                self.commit(SessionEvent::ErrorCleared, &Guard::Epoch(epoch));
                Ok(())
            }
            Err(error) if error.is_session_expired() => {
                self.expire_since(epoch).await;
                Err(ErrorKind::SessionExpired)
            }
            Err(error) => {
                let kind = error.selection_kind();
                warn!(%error, %clinic_id, kind = %kind, "clinic selection failed");
                self.commit(SessionEvent::ErrorRaised(kind), &Guard::Epoch(epoch));
                Err(kind)
            }
        }
    }

    /// Sign out. Remote cleanup is best effort; the local reset always happens
    /// and overrides anything still in flight.
    pub async fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(user_id) = self.current_user_id()
            && let Err(error) = self.backend.expire_session_records(&user_id).await
        {
            warn!(%error, "failed to expire clinic session records");
        }
        if let Err(error) = self.backend.sign_out().await {
            warn!(%error, "remote sign-out failed");
        }

        self.reset(SessionEvent::SignedOut);
        info!("signed out");
    }

    pub fn clear_error(&self) {
        self.commit(SessionEvent::ErrorCleared, &Guard::Always);
    }

    /// Startup check: rehydrate the persisted session, then confirm it with
    /// the backend. The controller stays loading until this returns.
    pub async fn restore(&self) {
        let epoch = self.current_epoch();
        match self.store.load() {
            Ok(Some(persisted)) => {
                self.commit(SessionEvent::Restored(persisted), &Guard::Epoch(epoch));
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "ignoring unreadable persisted session"),
        }

        match self.backend.restore_session().await {
            Ok(Some(identity)) => {
                let known = self.current_user_id().as_deref() == Some(identity.id.as_str());
                let event = if known {
                    SessionEvent::IdentityUpdated(identity)
                } else {
                    SessionEvent::SignInSucceeded(identity)
                };
                if self.commit(event, &Guard::Epoch(epoch)) {
                    self.load_profile().await;
                }
            }
            Ok(None) => {
                if self.current_user_id().is_some() {
                    info!("stored session is no longer valid");
                }
                self.reset(SessionEvent::SignedOut);
            }
            Err(error) => {
                warn!(%error, "could not confirm session with backend; using persisted state");
            }
        }

        self.commit(SessionEvent::LoadingFinished, &Guard::Always);
    }

    /// A downstream request was rejected as unauthenticated.
    pub async fn report_auth_failure(&self) {
        if self.current_user_id().is_none() {
            return;
        }
        self.reset(SessionEvent::SessionExpired);
        if let Err(error) = self.backend.sign_out().await {
            debug!(%error, "sign-out after auth failure");
        }
    }

    /// Route an identity provider push event through the same transitions as
    /// direct calls.
    pub async fn handle_auth_change(&self, change: AuthChange) {
        debug!(?change, "auth change");
        match change {
            AuthChange::SignedIn(identity) => {
                if self.current_user_id().as_deref() == Some(identity.id.as_str()) {
                    return;
                }
                let epoch = self.current_epoch();
                if self.commit(SessionEvent::SignInSucceeded(identity), &Guard::Epoch(epoch)) {
                    self.load_profile().await;
                }
            }
            AuthChange::SignedOut => {
                if self.current_user_id().is_some() {
                    self.reset(SessionEvent::SignedOut);
                }
            }
            AuthChange::TokenRefreshed => self.load_profile().await,
            AuthChange::UserUpdated(identity) => {
                self.commit(SessionEvent::IdentityUpdated(identity), &Guard::Always);
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn current_user_id(&self) -> Option<String> {
        self.state.borrow().identity.as_ref().map(|i| i.id.clone())
    }

    fn set_scope_token(&self, token: Option<ScopeToken>) {
        if let Ok(mut slot) = self.scope_token.lock() {
            *slot = token;
        }
    }

    /// Invalidate everything in flight and apply a resetting event.
    fn reset(&self, event: SessionEvent) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_scope_token(None);
        self.commit(event, &Guard::Always);
    }

    /// Remote session expired during a call started in `epoch`. Only the first
    /// caller to notice resets.
    async fn expire_since(&self, epoch: u64) {
        if self.current_epoch() != epoch {
            return;
        }
        warn!("remote session expired");
        self.reset(SessionEvent::SessionExpired);
        if let Err(error) = self.backend.sign_out().await {
            debug!(%error, "sign-out after expiry");
        }
    }

    fn admits(&self, guard: &Guard, state: &ControllerState) -> bool {
        match guard {
            Guard::Always => true,
            Guard::Epoch(epoch) => *epoch == self.current_epoch(),
            Guard::Profile {
                epoch,
                seq,
                user_id,
            } => {
                *epoch == self.current_epoch()
                    && *seq == self.profile_seq.load(Ordering::SeqCst)
                    && state.identity.as_ref().map(|i| i.id.as_str()) == Some(user_id.as_str())
            }
        }
    }

    /// Apply `event` if `guard` still admits it. Returns whether it was
    /// admitted (an admitted event may still leave the state unchanged).
    fn commit(&self, event: SessionEvent, guard: &Guard) -> bool {
        let mut admitted = false;
        let mut notices = Vec::new();
        let rehydrating = matches!(event, SessionEvent::Restored(_));

        self.state.send_if_modified(|state| {
            if !self.admits(guard, state) {
                debug!(?event, "discarding stale session event");
                return false;
            }
            admitted = true;

            let next = apply(state, event);
            if next == *state {
                return false;
            }

            let (from, to): (SessionPhase, SessionPhase) = (state.phase(), next.phase());
            if let Err(error) = from.check_transition(to)
                && !rehydrating
            {
                warn!(%error, "unexpected session transition");
            }
            if from != to {
                debug!(%from, %to, "session phase changed");
            }

            let user_of = |s: &ControllerState| s.identity.as_ref().map(|i| i.id.clone());
            let clinic_of = |s: &ControllerState| s.active.as_ref().map(|a| a.clinic_id.clone());
            if user_of(state) != user_of(&next) {
                notices.push(SessionSignal::IdentityChanged {
                    user_id: user_of(&next),
                });
            }
            if clinic_of(state) != clinic_of(&next) {
                notices.push(SessionSignal::ClinicChanged {
                    clinic_id: clinic_of(&next),
                });
            }

            *state = next;
            true
        });

        for notice in notices {
            // Nobody subscribed is fine.
            let _ = self.signals.send(notice);
        }
        admitted
    }
}
