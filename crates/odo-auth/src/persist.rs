use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session_store::{PersistedSession, SessionStore};
use crate::state::ControllerState;

/// Background writer keeping the [`SessionStore`] in step with the controller.
///
/// The task exits once every state sender is gone; [`finish`](Self::finish)
/// waits for the final write.
pub struct PersistenceTask {
    handle: JoinHandle<()>,
}

impl PersistenceTask {
    /// Start watching `states`. The current value is treated as already
    /// persisted, so startup does not rewrite what was just loaded.
    #[must_use]
    pub fn spawn(mut states: watch::Receiver<ControllerState>, store: Arc<dyn SessionStore>) -> Self {
        let last = states.borrow_and_update().persisted();
        Self {
            handle: tokio::spawn(run(states, store, last)),
        }
    }

    /// Wait for pending writes after the controller has been dropped.
    pub async fn finish(self) {
        if let Err(error) = self.handle.await {
            tracing::warn!(%error, "session persistence task failed");
        }
    }
}

async fn run(
    mut states: watch::Receiver<ControllerState>,
    store: Arc<dyn SessionStore>,
    mut last: PersistedSession,
) {
    while states.changed().await.is_ok() {
        let next = states.borrow_and_update().persisted();
        if next == last {
            continue;
        }
        write(store.as_ref(), &next);
        last = next;
    }

    // Sender dropped: catch a change published right before it went away.
    let last_seen = states.borrow().persisted();
    if last_seen != last {
        write(store.as_ref(), &last_seen);
    }
}

fn write(store: &dyn SessionStore, session: &PersistedSession) {
    let result = if session.is_authenticated {
        store.save(session)
    } else {
        store.clear()
    };
    match result {
        Ok(()) => tracing::debug!(
            authenticated = session.is_authenticated,
            clinic = session.active_clinic_id.as_deref().unwrap_or("-"),
            "session persisted"
        ),
        Err(error) => tracing::warn!(%error, "failed to persist session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::MemorySessionStore;
    use crate::state::{SessionEvent, apply};
    use odo_core::Identity;

    #[tokio::test]
    async fn writes_authenticated_state_and_clears_on_sign_out() {
        let store = Arc::new(MemorySessionStore::default());
        let (tx, rx) = watch::channel(ControllerState::signed_out());
        let task = PersistenceTask::spawn(rx, store.clone());

        let identity = Identity::new("u1", "ana@example.com", None, None);
        let signed_in = apply(
            &ControllerState::signed_out(),
            SessionEvent::SignInSucceeded(identity.clone()),
        );
        tx.send_replace(signed_in);
        tokio::task::yield_now().await;

        drop(tx);
        task.finish().await;

        let saved = store.current().expect("session saved");
        assert!(saved.is_authenticated);
        assert_eq!(saved.identity.map(|i| i.id), Some(identity.id));
    }

    #[tokio::test]
    async fn sign_out_clears_store() {
        let identity = Identity::new("u1", "ana@example.com", None, None);
        let signed_in = apply(
            &ControllerState::signed_out(),
            SessionEvent::SignInSucceeded(identity),
        );
        let store = Arc::new(MemorySessionStore::with_session(signed_in.persisted()));
        let (tx, rx) = watch::channel(signed_in);
        let task = PersistenceTask::spawn(rx, store.clone());

        tx.send_replace(ControllerState::signed_out());
        drop(tx);
        task.finish().await;

        assert_eq!(store.current(), None);
    }
}
