//! [`ClinicBackend`] over the hosted backend's REST surface.
//!
//! Identity calls go to the auth service (`/auth/v1/*`), clinic scope calls are
//! database RPCs (`/rest/v1/rpc/*`). Every request carries the project's
//! anonymous key as `apikey`; authenticated calls add the user's access token,
//! refreshing it first when it is about to expire.

use std::time::Duration;

use async_trait::async_trait;
use odo_config::BackendConfig;
use odo_core::{ClinicMembership, ClinicRole, Identity};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tracing::{Instrument, debug, info_span, warn};

use crate::backend::{AuthChange, ClinicBackend, ScopeToken};
use crate::error::AuthError;
use crate::jwt::{EXPIRY_BUFFER_SECS, is_near_expiry};
use crate::token_store::{Credentials, TokenStore};

const USER_AGENT: &str = concat!("odonto/", env!("CARGO_PKG_VERSION"));
const AUTH_CHANGE_CAPACITY: usize = 16;

/// Postgres error codes the clinic RPCs raise for scope violations.
const ACCESS_DENIED_CODES: [&str; 2] = ["42501", "P0001"];

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserRecord,
}

#[derive(Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(user: UserRecord) -> Self {
        Self::new(
            user.id,
            user.email.unwrap_or_default(),
            user.user_metadata.first_name,
            user.user_metadata.last_name,
        )
    }
}

#[derive(Deserialize)]
struct MembershipRow {
    clinic_id: String,
    clinic_name: String,
    role: String,
    #[serde(default)]
    provider_id: Option<String>,
}

pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    tokens: TokenStore,
    session: RwLock<Option<Credentials>>,
    changes: broadcast::Sender<AuthChange>,
}

impl RestBackend {
    /// Build an adapter for the configured project, picking up any credentials
    /// left in `tokens` by a previous run.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the backend section is incomplete and
    /// `AuthError::Network` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, tokens: TokenStore) -> Result<Self, AuthError> {
        let base_url = config.base_url()?.to_string();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AuthError::Network(format!("build HTTP client: {e}")))?;
        let (changes, _) = broadcast::channel(AUTH_CHANGE_CAPACITY);
        let session = RwLock::new(tokens.load());

        Ok(Self {
            client,
            base_url,
            anon_key: SecretString::from(config.anon_key.clone()),
            tokens,
            session,
            changes,
        })
    }

    /// Whether credentials are currently held, without contacting the backend.
    pub async fn has_credentials(&self) -> bool {
        self.session.read().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.anon_key.expose_secret())
    }

    fn notify(&self, change: AuthChange) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(change);
    }

    async fn remember(&self, credentials: Credentials) {
        if let Err(error) = self.tokens.store(&credentials) {
            warn!(%error, "could not persist backend credentials; session lasts for this run only");
        }
        *self.session.write().await = Some(credentials);
    }

    async fn forget(&self) {
        *self.session.write().await = None;
        if let Err(error) = self.tokens.delete() {
            warn!(%error, "could not remove stored backend credentials");
        }
    }

    /// Current access token, refreshed first when it is about to expire.
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        let current = self.session.read().await.clone();
        let Some(credentials) = current else {
            return Err(AuthError::Unauthorized);
        };
        if !is_near_expiry(credentials.access_token.expose_secret(), EXPIRY_BUFFER_SECS) {
            return Ok(credentials.access_token);
        }
        self.refresh(&credentials).await
    }

    async fn refresh(&self, stale: &Credentials) -> Result<SecretString, AuthError> {
        let mut session = self.session.write().await;
        match session.as_ref() {
            None => return Err(AuthError::Unauthorized),
            // Another caller refreshed while we waited for the lock.
            Some(current)
                if current.refresh_token.expose_secret() != stale.refresh_token.expose_secret() =>
            {
                return Ok(current.access_token.clone());
            }
            Some(_) => {}
        }

        let url = self.url("/auth/v1/token?grant_type=refresh_token");
        let span = info_span!("backend.refresh", http.method = "POST");
        let result = self
            .request(self.client.post(&url))
            .json(&json!({ "refresh_token": stale.refresh_token.expose_secret() }))
            .send()
            .instrument(span)
            .await;

        let response = result.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;

        if !(200..300).contains(&status) {
            let error = map_status(status, &body, Grant::Refresh);
            if matches!(error, AuthError::Unauthorized) {
                warn!(status, "token refresh rejected; signing out");
                *session = None;
                drop(session);
                if let Err(error) = self.tokens.delete() {
                    warn!(%error, "could not remove stored backend credentials");
                }
                self.notify(AuthChange::SignedOut);
            }
            return Err(error);
        }

        let grant: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Decode(format!("refresh response: {e}")))?;
        let credentials = Credentials {
            access_token: SecretString::from(grant.access_token),
            refresh_token: SecretString::from(grant.refresh_token),
        };
        if let Err(error) = self.tokens.store(&credentials) {
            warn!(%error, "could not persist refreshed credentials");
        }
        let access_token = credentials.access_token.clone();
        *session = Some(credentials);
        drop(session);

        debug!("access token refreshed");
        self.notify(AuthChange::TokenRefreshed);
        Ok(access_token)
    }

    async fn rpc(&self, function: &str, params: Value) -> Result<Value, AuthError> {
        let token = self.access_token().await?;
        let url = self.url(&format!("/rest/v1/rpc/{function}"));
        let span = info_span!("backend.rpc", http.method = "POST", rpc = function);

        let response = self
            .request(self.client.post(&url))
            .bearer_auth(token.expose_secret())
            .json(&params)
            .send()
            .instrument(span)
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;
        if !(200..300).contains(&status) {
            return Err(map_status(status, &body, Grant::Session));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| AuthError::Decode(format!("{function}: {e}")))
    }
}

#[async_trait]
impl ClinicBackend for RestBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let url = self.url("/auth/v1/token?grant_type=password");
        let span = info_span!("backend.sign_in", http.method = "POST");

        let response = self
            .request(self.client.post(&url))
            .json(&json!({ "email": email, "password": password.expose_secret() }))
            .send()
            .instrument(span)
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;
        if !(200..300).contains(&status) {
            return Err(map_status(status, &body, Grant::Password));
        }

        let grant: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Decode(format!("sign-in response: {e}")))?;
        self.remember(Credentials {
            access_token: SecretString::from(grant.access_token),
            refresh_token: SecretString::from(grant.refresh_token),
        })
        .await;

        Ok(grant.user.into())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let current = self.session.read().await.clone();
        let Some(credentials) = current else {
            return Ok(());
        };

        let url = self.url("/auth/v1/logout");
        let span = info_span!("backend.sign_out", http.method = "POST");
        let result = self
            .request(self.client.post(&url))
            .bearer_auth(credentials.access_token.expose_secret())
            .send()
            .instrument(span)
            .await;

        self.forget().await;

        let response = result.map_err(network)?;
        let status = response.status().as_u16();
        // An already-invalid token means the remote session is gone anyway.
        if (200..300).contains(&status) || status == 401 || status == 403 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body, Grant::Session))
    }

    async fn restore_session(&self) -> Result<Option<Identity>, AuthError> {
        if !self.has_credentials().await {
            return Ok(None);
        }
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(AuthError::Unauthorized) => return Ok(None),
            Err(error) => return Err(error),
        };

        let url = self.url("/auth/v1/user");
        let span = info_span!("backend.restore", http.method = "GET");
        let response = self
            .request(self.client.get(&url))
            .bearer_auth(token.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;
        if status == 401 || status == 403 {
            debug!(status, "stored session no longer valid");
            self.forget().await;
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            return Err(map_status(status, &body, Grant::Session));
        }

        let user: UserRecord = serde_json::from_str(&body)
            .map_err(|e| AuthError::Decode(format!("user response: {e}")))?;
        Ok(Some(user.into()))
    }

    async fn get_current_active_clinic(&self) -> Result<Option<String>, AuthError> {
        let value = self.rpc("get_current_clinic_id", json!({})).await?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from))
    }

    async fn list_memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClinicMembership>, AuthError> {
        let value = self
            .rpc("list_user_clinics", json!({ "p_user_id": user_id }))
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let rows: Vec<MembershipRow> = serde_json::from_value(value)
            .map_err(|e| AuthError::Decode(format!("list_user_clinics: {e}")))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match ClinicRole::parse(&row.role) {
                Ok(role) => Some(ClinicMembership {
                    clinic_id: row.clinic_id,
                    clinic_name: row.clinic_name,
                    role,
                    provider_id: row.provider_id,
                }),
                Err(error) => {
                    warn!(clinic_id = %row.clinic_id, %error, "skipping membership");
                    None
                }
            })
            .collect())
    }

    async fn establish_active_clinic(
        &self,
        clinic_id: &str,
        duration_hours: u32,
    ) -> Result<ScopeToken, AuthError> {
        let value = self
            .rpc(
                "establish_clinic_session",
                json!({ "p_clinic_id": clinic_id, "p_duration_hours": duration_hours }),
            )
            .await?;
        let token = value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string);
        Ok(ScopeToken(token))
    }

    async fn expire_session_records(&self, user_id: &str) -> Result<(), AuthError> {
        self.rpc("expire_user_sessions", json!({ "p_user_id": user_id }))
            .await
            .map(|_| ())
    }

    fn auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Password,
    Refresh,
    Session,
}

fn network(error: reqwest::Error) -> AuthError {
    AuthError::Network(error.to_string())
}

/// Translate a non-2xx response into an [`AuthError`].
fn map_status(status: u16, body: &str, grant: Grant) -> AuthError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = error_message(&parsed).unwrap_or_else(|| body.trim().to_string());
    let code = parsed.get("code").and_then(Value::as_str);

    match (status, grant) {
        (400 | 401 | 422, Grant::Password) => AuthError::InvalidCredentials,
        (400 | 401, Grant::Refresh) | (401, Grant::Session) => AuthError::Unauthorized,
        (403, _) => AuthError::AccessDenied(message),
        _ if code.is_some_and(|c| ACCESS_DENIED_CODES.contains(&c)) => {
            AuthError::AccessDenied(message)
        }
        _ => AuthError::Http { status, message },
    }
}

/// Auth service errors use `error_description`/`msg`, database errors `message`.
fn error_message(body: &Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(String::from)
}
