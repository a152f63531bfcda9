//! Read side for display consumers.

use std::sync::Arc;
use tokio::sync::watch;

use super::store::{SessionStore, StoreSnapshot};
use super::types::Session;

/// Resolves the selected session of a snapshot.
///
/// Returns `None` when nothing is selected, or when the selected id is not in
/// the snapshot.
pub fn current_session(snapshot: &StoreSnapshot) -> Option<&Session> {
    snapshot
        .selected
        .and_then(|id| snapshot.sessions.get(&id))
}

/// Follows the store's selected session.
///
/// The current session is recomputed from the store on every call, never
/// cached, so a selection change or a newly committed hop is visible on the
/// next read.
pub struct SessionView {
    store: Arc<SessionStore>,
    changes: watch::Receiver<u64>,
}

impl SessionView {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let changes = store.subscribe();
        Self { store, changes }
    }

    /// The selected session as of now.
    pub fn current(&self) -> Option<Session> {
        self.store.selected_session()
    }

    /// Waits until the store changes after the last call.
    ///
    /// Returns `false` if the change channel has closed.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }
}
