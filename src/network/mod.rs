//! Networking: wire protocol, connection registry, cross-process
//! notifier, message router, and the WebSocket server loop.

pub mod notifier;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;

pub use notifier::{ChannelNotifier, Envelope, Notifier, NotifyError};
pub use protocol::{ClientRequest, ErrorReason, JoinStatus, ServerMessage};
pub use registry::ConnectionRegistry;
pub use router::{Router, RouterError};
pub use server::{GameServer, GameServerError, ServerConfig};
