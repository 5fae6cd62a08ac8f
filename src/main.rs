//! Noughts Session Server
//!
//! Coordinates two-player tic-tac-toe sessions over WebSocket, with game
//! state in a store shared across server processes.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use noughts::{ChannelNotifier, GameServer, KeyValueStore, MemoryStore, Notifier, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = ServerConfig::from_env();
    info!("noughts server v{}", VERSION);

    // Single-node wiring: one in-process store and one in-process
    // channel. A multi-process deployment hands every server the same
    // external store and bus through these two seams instead.
    let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(256));

    let server = GameServer::new(config, backend, notifier);
    server.run().await.context("server terminated")?;

    Ok(())
}
