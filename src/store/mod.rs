//! Persistence: the shared key-value backend and the typed session layer.

pub mod backend;
pub mod memory;
pub mod sessions;

pub use backend::{KeyValueStore, StoreError};
pub use memory::MemoryStore;
pub use sessions::{LoadedSession, SessionRecord, SessionStore};
