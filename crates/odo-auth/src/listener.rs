use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::controller::SessionController;

/// Forward the backend's auth-change stream into `controller`.
///
/// The task holds a weak reference and stops once the controller is dropped
/// or the backend closes the stream.
pub fn spawn_auth_listener(controller: &Arc<SessionController>) -> JoinHandle<()> {
    let mut changes = controller.backend().auth_changes();
    let controller: Weak<SessionController> = Arc::downgrade(controller);

    tokio::spawn(async move {
        loop {
            let received = changes.recv().await;
            let Some(controller) = controller.upgrade() else {
                break;
            };
            match received {
                Ok(change) => controller.handle_auth_change(change).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth changes lagged; reloading profile");
                    controller.load_profile().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("auth change listener stopped");
    })
}
