use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use vreuse_types::events::GatewayEvent;

/// Sending half of one live connection. Identity is the connection id, not
/// the user: the same user reconnecting gets a new handle.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// New handle plus the receiver the connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event for the connection. Returns false if it has gone away.
    pub fn push(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Which connection each online user is reachable on, in both directions.
///
/// One handle per user, last register wins. Process-lifetime only: a restart
/// starts empty and clients re-identify.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<PresenceMaps>>,
}

#[derive(Default)]
struct PresenceMaps {
    by_user: HashMap<Uuid, ConnectionHandle>,
    by_connection: HashMap<Uuid, Uuid>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `handle`. A previous handle for the user is replaced
    /// but not closed; its id is returned so the caller can log it.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<Uuid> {
        let mut maps = self.inner.write().await;

        maps.by_connection.insert(handle.id, user_id);
        let superseded = maps.by_user.insert(user_id, handle).map(|old| old.id);

        // The old connection is no longer how this user is reached.
        if let Some(old_id) = superseded {
            maps.by_connection.remove(&old_id);
        }

        superseded
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.read().await.by_user.get(&user_id).cloned()
    }

    #[cfg(test)]
    async fn user_for(&self, connection_id: Uuid) -> Option<Uuid> {
        self.inner.read().await.by_connection.get(&connection_id).copied()
    }

    /// Forget `handle`. The user entry is only removed if it still points at
    /// this exact connection, so a late disconnect from a superseded socket
    /// cannot evict the user's newer registration.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let mut maps = self.inner.write().await;

        let Some(user_id) = maps.by_connection.remove(&handle.id) else {
            return false;
        };

        let is_current = maps
            .by_user
            .get(&user_id)
            .is_some_and(|current| current.id == handle.id);
        if is_current {
            maps.by_user.remove(&user_id);
        }

        is_current
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }
}
