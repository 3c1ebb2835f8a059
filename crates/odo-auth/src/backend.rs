//! The seam between the session controller and the hosted backend.
//!
//! The controller never talks HTTP itself. Everything it needs from the
//! identity provider and the clinic database goes through [`ClinicBackend`],
//! so tests can substitute an in-memory fake.

use async_trait::async_trait;
use odo_core::{ClinicMembership, Identity};
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::error::AuthError;

/// Identity provider notifications raised outside of a direct controller call
/// (token refresh, expiry, another client signing out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed,
    UserUpdated(Identity),
}

/// Opaque token returned when an active clinic scope is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeToken(pub String);

#[async_trait]
pub trait ClinicBackend: Send + Sync {
    /// Verify credentials and open a remote session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    /// End the remote session. Local credentials are dropped even on failure.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Check whether stored credentials still describe a live session.
    ///
    /// `Ok(None)` means there is no session to restore.
    async fn restore_session(&self) -> Result<Option<Identity>, AuthError>;

    /// Clinic scope the backend already holds for this session, if any.
    async fn get_current_active_clinic(&self) -> Result<Option<String>, AuthError>;

    async fn list_memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClinicMembership>, AuthError>;

    /// Set or replace the session's clinic scope. The backend rejects clinics the
    /// user is not a member of.
    async fn establish_active_clinic(
        &self,
        clinic_id: &str,
        duration_hours: u32,
    ) -> Result<ScopeToken, AuthError>;

    /// Best-effort revocation of server-side session rows before sign-out.
    async fn expire_session_records(&self, user_id: &str) -> Result<(), AuthError>;

    /// Subscribe to out-of-band identity provider events.
    fn auth_changes(&self) -> broadcast::Receiver<AuthChange>;
}
