//! Session Persistence
//!
//! Canonical serialized form of game sessions and client bindings over
//! the shared key-value backend. Session records carry a version stamp
//! and saves are compare-and-swap against the serialized form read at
//! load, so two processes cannot interleave a read-modify-write on the
//! same session: the loser of the race fails with
//! [`StoreError::VersionConflict`] and mutates nothing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::state::{ClientId, GameSession, SessionId};
use crate::store::backend::{KeyValueStore, StoreError};

const SESSION_PREFIX: &str = "game:";
const BINDING_PREFIX: &str = "client:";

/// A persisted session record: the payload plus its version stamp.
///
/// The version increases by exactly one on every successful save.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Monotonic version stamp.
    pub version: u64,
    /// The session payload.
    pub session: GameSession,
}

/// A session loaded from the store, pinned to the serialized form it was
/// read as so a later save can compare-and-swap against it.
#[derive(Clone, Debug)]
pub struct LoadedSession {
    /// The deserialized session, free to mutate in place.
    pub session: GameSession,
    version: u64,
    raw: String,
}

impl LoadedSession {
    /// Version stamp this copy was read at.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Typed persistence layer for sessions and client bindings.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Wrap a backend handle.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    fn session_key(id: SessionId) -> String {
        format!("{}{}", SESSION_PREFIX, id)
    }

    fn binding_key(client: ClientId) -> String {
        format!("{}{}", BINDING_PREFIX, client)
    }

    /// Create and persist a fresh session, returning its id.
    ///
    /// Ids are random; the write is conditional on absence anyway, so a
    /// collision retries with a new id instead of clobbering a live game.
    pub async fn create_session(&self) -> Result<SessionId, StoreError> {
        loop {
            let id = SessionId::generate();
            let record = SessionRecord {
                version: 0,
                session: GameSession::new(id),
            };
            let raw = serde_json::to_string(&record)?;
            if self.backend.put_if_absent(&Self::session_key(id), raw).await? {
                return Ok(id);
            }
        }
    }

    /// Load a session together with its version pin.
    pub async fn load_session(&self, id: SessionId) -> Result<LoadedSession, StoreError> {
        let key = Self::session_key(id);
        let raw = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let record: SessionRecord = serde_json::from_str(&raw)?;
        Ok(LoadedSession {
            session: record.session,
            version: record.version,
            raw,
        })
    }

    /// Persist a mutated session.
    ///
    /// Fails with [`StoreError::VersionConflict`] when another writer
    /// saved (or deleted) the session since this copy was loaded.
    pub async fn save_session(&self, loaded: &LoadedSession) -> Result<(), StoreError> {
        let key = Self::session_key(loaded.session.id);
        let record = SessionRecord {
            version: loaded.version + 1,
            session: loaded.session.clone(),
        };
        let raw = serde_json::to_string(&record)?;
        if self.backend.compare_and_swap(&key, &loaded.raw, raw).await? {
            Ok(())
        } else {
            Err(StoreError::VersionConflict(key))
        }
    }

    /// Remove a session from the store.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), StoreError> {
        self.backend.delete(&Self::session_key(id)).await
    }

    /// Ids of all stored sessions, in key order.
    ///
    /// Scans only the session prefix, never the whole key space.
    pub async fn list_session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let keys = self.backend.scan_prefix(SESSION_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(SESSION_PREFIX))
            .filter_map(SessionId::parse)
            .collect())
    }

    /// Durably associate `client` with `session`.
    pub async fn bind_client(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> Result<(), StoreError> {
        self.backend
            .put(&Self::binding_key(client), session.to_string())
            .await
    }

    /// Session the client currently occupies.
    pub async fn load_binding(&self, client: ClientId) -> Result<SessionId, StoreError> {
        let key = Self::binding_key(client);
        let raw = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        SessionId::parse(&raw)
            .ok_or_else(|| StoreError::Backend(format!("corrupt binding at {}", key)))
    }

    /// Drop the client's binding.
    pub async fn unbind_client(&self, client: ClientId) -> Result<(), StoreError> {
        self.backend.delete(&Self::binding_key(client)).await
    }
}
