//! Connection Registry
//!
//! Process-local mapping from client identity to the live message channel
//! feeding its socket writer. Entries exist only while the connection
//! does; nothing here is persisted or visible to other processes. The
//! registry holds no session state; whether a client is in a game lives
//! in the shared store.

use std::collections::BTreeMap;
use tokio::sync::{mpsc, RwLock};

use crate::game::state::ClientId;
use crate::network::protocol::ServerMessage;

/// Process-local map of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<BTreeMap<ClientId, mpsc::Sender<ServerMessage>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the channel for a newly connected client.
    ///
    /// Ids are generated fresh per connection, so an existing entry is
    /// stale and gets overwritten.
    pub async fn register(&self, client: ClientId, sender: mpsc::Sender<ServerMessage>) {
        self.entries.write().await.insert(client, sender);
    }

    /// Channel for `client`, when its connection lives on this process.
    pub async fn lookup(&self, client: ClientId) -> Option<mpsc::Sender<ServerMessage>> {
        self.entries.read().await.get(&client).cloned()
    }

    /// Remove the entry on disconnect.
    ///
    /// The caller runs session cleanup for the client before removal, so
    /// the id is still resolvable while cleanup messages go out.
    pub async fn unregister(&self, client: ClientId) {
        self.entries.write().await.remove(&client);
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True iff no connections are registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
