//! # Noughts Session Server
//!
//! Session coordination for two-player tic-tac-toe over persistent
//! WebSocket connections. Game state lives in a store shared by every
//! server process, so either player's connection (possibly terminated
//! on a different process) can be told about state changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      NOUGHTS SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/            - Pure game logic                          │
//! │  ├── board.rs     - 3x3 grid, move validity, win/draw rules  │
//! │  └── state.rs     - GameSession entity and transitions       │
//! │                                                              │
//! │  store/           - Shared persistence                       │
//! │  ├── backend.rs   - Key-value store interface                │
//! │  ├── memory.rs    - In-process backend                       │
//! │  └── sessions.rs  - Versioned session + binding records      │
//! │                                                              │
//! │  network/         - Connections and delivery                 │
//! │  ├── protocol.rs  - JSON type/payload envelope               │
//! │  ├── registry.rs  - Process-local client -> socket map       │
//! │  ├── notifier.rs  - Cross-process publish/subscribe          │
//! │  ├── router.rs    - Validation, persistence, fan-out         │
//! │  └── server.rs    - WebSocket accept loop                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! A move is a read-modify-write against the shared store. Session
//! records carry a version stamp and every save is a compare-and-swap
//! against the form read at load, so concurrent writers (including ones
//! on other processes) cannot interleave: the loser fails cleanly and
//! nothing of its write survives. Connection handles never leave their
//! process; messages for remote clients travel the notifier channel and
//! are forwarded by whichever process owns the target's registry entry.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use game::board::{Board, Mark};
pub use game::state::{ClientId, GameSession, MoveOutcome, SessionId, SessionPhase};
pub use network::notifier::{ChannelNotifier, Envelope, Notifier};
pub use network::protocol::{ClientRequest, ErrorReason, JoinStatus, ServerMessage};
pub use network::registry::ConnectionRegistry;
pub use network::router::{Router, RouterError};
pub use network::server::{GameServer, GameServerError, ServerConfig};
pub use store::backend::{KeyValueStore, StoreError};
pub use store::memory::MemoryStore;
pub use store::sessions::SessionStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
