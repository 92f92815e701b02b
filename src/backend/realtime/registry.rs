//! Connection Registry
//!
//! Maps user identities to their single live `ConnectionHandle`. This is the
//! only answer to "is user X reachable right now" and the only shared map in
//! the realtime subsystem; every mutation goes through `register` and
//! `deregister`.
//!
//! # Invariants
//!
//! - At most one handle per user. Registering a new handle closes and
//!   replaces the previous one.
//! - `deregister` removes the entry only when the stored handle is the one
//!   being removed, so a stale monitor or session cannot evict a newer
//!   connection for the same user.
//! - Removal and close happen under the same write lock, so a lookup never
//!   returns a handle that a deregistration has already closed.
//!
//! State is process-local and lost on restart; clients re-register when they
//! reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::connection::ConnectionHandle;
use crate::shared::UserId;

/// Concurrent user → connection map
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for its user, replacing any previous connection
    ///
    /// The replaced handle (if any) is closed before it is returned.
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let user_id = handle.user_id();
        let connection_id = handle.id();
        let mut connections = self.connections.write().await;
        let previous = connections.insert(user_id, handle);
        if let Some(ref old) = previous {
            old.close();
            info!(
                user_id,
                old_connection = %old.id(),
                new_connection = %connection_id,
                "replaced existing connection"
            );
        } else {
            info!(user_id, connection_id = %connection_id, "registered connection");
        }
        previous
    }

    /// Current connection for `user_id`
    pub async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user_id).cloned()
    }

    /// Remove and close `handle`
    ///
    /// The entry is removed only if it still refers to this exact connection.
    /// The handle itself is closed either way. Returns whether an entry was
    /// removed.
    pub async fn deregister(&self, handle: &ConnectionHandle) -> bool {
        let user_id = handle.user_id();
        let mut connections = self.connections.write().await;
        let is_current = connections
            .get(&user_id)
            .is_some_and(|current| current.id() == handle.id());
        if is_current {
            connections.remove(&user_id);
        }
        handle.close();
        drop(connections);

        if is_current {
            info!(user_id, connection_id = %handle.id(), "deregistered connection");
        } else {
            debug!(
                user_id,
                connection_id = %handle.id(),
                "connection already replaced or removed"
            );
        }
        is_current
    }

    /// Number of registered users
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
