//! # odo-auth
//!
//! Clinic session management for Odonto.
//!
//! - [`SessionController`]: sign-in, clinic discovery and selection, logout,
//!   published as a `watch` channel of [`ControllerState`]
//! - [`ClinicBackend`]: the seam to the hosted identity provider and clinic
//!   RPCs, implemented over HTTP by [`RestBackend`]
//! - [`SessionStore`]: durable copy of the session, kept current by
//!   [`PersistenceTask`]
//! - [`TokenStore`]: provider credentials in the OS keyring with a file fallback
//!
//! ## Wiring
//!
//! ```ignore
//! let backend = Arc::new(RestBackend::new(&config.backend, TokenStore::new("odonto"))?);
//! let store = Arc::new(FileSessionStore::new(path));
//! let controller = Arc::new(SessionController::new(backend, store.clone(), 8));
//! let persistence = PersistenceTask::spawn(controller.subscribe(), store);
//! let _listener = spawn_auth_listener(&controller);
//! controller.restore().await;
//! ```

pub mod backend;
pub mod controller;
pub mod error;
pub mod jwt;
pub mod listener;
pub mod persist;
pub mod rest;
pub mod session_store;
pub mod state;
pub mod token_store;

pub use backend::{AuthChange, ClinicBackend, ScopeToken};
pub use controller::{SessionController, SessionSignal};
pub use error::AuthError;
pub use listener::spawn_auth_listener;
pub use persist::PersistenceTask;
pub use rest::RestBackend;
pub use session_store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore};
pub use state::{ControllerState, Profile, SessionEvent, apply};
pub use token_store::{Credentials, TokenStore};
