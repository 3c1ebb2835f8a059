use std::sync::Arc;

use anyhow::Context;
use odo_auth::{
    FileSessionStore, PersistenceTask, RestBackend, SessionController, TokenStore,
    spawn_auth_listener,
};
use odo_config::OdoConfig;
use tokio::task::JoinHandle;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub controller: Arc<SessionController>,
    pub backend: Arc<RestBackend>,
    persistence: PersistenceTask,
    listener: JoinHandle<()>,
}

impl AppContext {
    /// Build the backend, storage and controller, then run the startup
    /// restore check so commands see the reconciled session.
    pub async fn init(config: &OdoConfig) -> anyhow::Result<Self> {
        let state_path = config
            .session
            .resolved_state_path()
            .context("could not resolve the session state path (no home directory)")?;

        let tokens = TokenStore::new(&config.session.keyring_service);
        let backend = Arc::new(RestBackend::new(&config.backend, tokens).context(
            "backend is not configured; set ODONTO_BACKEND__URL and ODONTO_BACKEND__ANON_KEY",
        )?);
        let store = Arc::new(FileSessionStore::new(state_path));

        let controller = Arc::new(SessionController::new(
            backend.clone(),
            store.clone(),
            config.session.duration_hours,
        ));

        let persistence = PersistenceTask::spawn(controller.subscribe(), store);
        let listener = spawn_auth_listener(&controller);

        controller.restore().await;
        tracing::debug!(phase = ?controller.snapshot().phase(), "session restored");

        Ok(Self {
            controller,
            backend,
            persistence,
            listener,
        })
    }

    /// Stop background tasks and flush the last state to disk.
    pub async fn finish(self) {
        self.listener.abort();
        let _ = self.listener.await;
        drop(self.controller);
        self.persistence.finish().await;
    }
}
