//! Cross-Process Notifier
//!
//! Publish/subscribe channel that lets a process deliver a message to a
//! client connection it does not own. Every process subscribes once at
//! startup and forwards envelopes addressed to clients in its local
//! registry; everything else is dropped, because at most one process
//! holds the matching registry entry at any time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::game::state::ClientId;
use crate::network::protocol::ServerMessage;
use crate::network::registry::ConnectionRegistry;

/// A published notification: the target client and its message.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Client the message is addressed to.
    pub target: ClientId,
    /// Message to forward to the target's connection.
    pub message: ServerMessage,
}

/// Errors from publishing on the shared channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No live subscriber; the channel is effectively down.
    #[error("notification channel closed")]
    ChannelClosed,
}

/// The publish/subscribe seam between server processes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Broadcast `message` for `target` to every subscribed process.
    async fn publish(&self, target: ClientId, message: ServerMessage) -> Result<(), NotifyError>;

    /// Subscribe to the shared channel.
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

/// Notifier over a process-shared broadcast channel.
///
/// Cloned handles publish into the same channel, the way each process in
/// a deployment holds a connection to the same broker. Tests hand one
/// clone per simulated process.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelNotifier {
    /// Create a channel buffering up to `capacity` undelivered envelopes
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn publish(&self, target: ClientId, message: ServerMessage) -> Result<(), NotifyError> {
        self.tx
            .send(Envelope { target, message })
            .map(|_| ())
            .map_err(|_| NotifyError::ChannelClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

/// Spawn the per-process forward task.
///
/// Envelopes whose target is registered locally go to that connection;
/// the rest are dropped silently, since the owning process (if any)
/// received the same broadcast.
pub fn spawn_forwarder(
    notifier: Arc<dyn Notifier>,
    registry: Arc<ConnectionRegistry>,
) -> JoinHandle<()> {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    let Some(sender) = registry.lookup(envelope.target).await else {
                        continue;
                    };
                    if sender.send(envelope.message).await.is_err() {
                        debug!(client = %envelope.target, "dropping notification for closed connection");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notifier subscriber lagged; events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
