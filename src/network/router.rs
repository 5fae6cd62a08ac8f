//! Message Router
//!
//! Receives inbound requests, validates turn ownership and move
//! legality, persists results through the session store, and decides
//! which connections must be told: locally through the registry, or
//! through the cross-process notifier when another process owns the
//! target's socket.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::game::board::{Board, Mark};
use crate::game::state::{ClientId, GameSession, MoveOutcome, SessionId, SessionPhase};
use crate::network::notifier::Notifier;
use crate::network::protocol::{ClientRequest, ErrorReason, JoinStatus, ServerMessage};
use crate::network::registry::ConnectionRegistry;
use crate::store::backend::StoreError;
use crate::store::sessions::{LoadedSession, SessionStore};

/// Rejections produced while handling a request.
///
/// Every variant maps to an error response on the requesting connection;
/// none is fatal to it.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Move coordinates are off the board.
    #[error("cell out of bounds")]
    OutOfBounds,

    /// Target cell already holds a mark.
    #[error("cell already occupied")]
    Occupied,

    /// The requesting client does not hold the turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The session is not running (still waiting for an opponent).
    #[error("game not in progress")]
    NotInProgress,

    /// The client has no current session binding.
    #[error("not in a game")]
    NotJoined,

    /// The bound session no longer exists.
    #[error("game not found")]
    NotFound,

    /// Store failure; the request may be retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RouterError {
    /// Wire-level rejection reason for this error.
    fn reason(&self) -> ErrorReason {
        match self {
            RouterError::OutOfBounds => ErrorReason::OutOfBounds,
            RouterError::Occupied => ErrorReason::Occupied,
            RouterError::NotYourTurn => ErrorReason::NotYourTurn,
            RouterError::NotInProgress => ErrorReason::NotInProgress,
            RouterError::NotJoined | RouterError::NotFound => ErrorReason::NotFound,
            RouterError::Store(StoreError::NotFound(_)) => ErrorReason::NotFound,
            RouterError::Store(_) => ErrorReason::Store,
        }
    }
}

/// Routes inbound protocol messages against the shared session state.
///
/// Constructed once per process with handles onto the process-local
/// registry and the process-spanning store and notifier.
pub struct Router {
    store: SessionStore,
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl Router {
    /// Create a router over the given store, registry, and notifier.
    pub fn new(
        store: SessionStore,
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Handle one inbound request, delivering every resulting message.
    ///
    /// Rejections are answered on the requesting connection and never
    /// escape to the caller.
    pub async fn handle(&self, request: ClientRequest) {
        let client = request.client_id();
        let result = match request {
            ClientRequest::NewGame { .. } => self.new_game(client).await,
            ClientRequest::JoinGame { session_id, .. } => self.join_game(client, session_id).await,
            ClientRequest::ShowGames { .. } => self.show_games(client).await,
            ClientRequest::Move { row, col, .. } => self.make_move(client, row, col).await,
            ClientRequest::Exit { .. } => self.exit_game(client).await,
        };

        if let Err(err) = result {
            debug!(%client, %err, "request rejected");
            self.deliver(client, ServerMessage::error(err.reason(), err.to_string()))
                .await;
        }
    }

    /// Disconnect teardown: the same cleanup as an explicit exit, keyed
    /// by the registry's last-known client id. Runs before the registry
    /// entry is removed.
    pub async fn handle_disconnect(&self, client: ClientId) {
        match self.leave_session(client).await {
            Ok(()) | Err(RouterError::NotJoined) => {}
            Err(err) => warn!(%client, %err, "disconnect cleanup failed"),
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    async fn new_game(&self, client: ClientId) -> Result<(), RouterError> {
        let session_id = self.store.create_session().await?;
        info!(%client, %session_id, "session created");

        self.deliver(
            client,
            ServerMessage::GameCreated {
                session_id,
                provoke_request: true,
            },
        )
        .await;
        Ok(())
    }

    async fn show_games(&self, client: ClientId) -> Result<(), RouterError> {
        let session_ids = self.store.list_session_ids().await?;
        self.deliver(
            client,
            ServerMessage::GameList {
                session_ids,
                provoke_request: true,
            },
        )
        .await;
        Ok(())
    }

    async fn join_game(&self, client: ClientId, session_id: SessionId) -> Result<(), RouterError> {
        let mut loaded = match self.store.load_session(session_id).await {
            Ok(loaded) => loaded,
            Err(StoreError::NotFound(_)) => return Err(RouterError::NotFound),
            Err(err) => return Err(err.into()),
        };

        let Some(mark) = loaded.session.join(client) else {
            // Both slots occupied: explicit refusal, nothing mutated.
            self.deliver(
                client,
                ServerMessage::GameJoined {
                    status: JoinStatus::Full,
                    mark: None,
                    provoke_request: true,
                },
            )
            .await;
            return Ok(());
        };

        self.store.save_session(&loaded).await?;
        self.store.bind_client(client, session_id).await?;
        info!(%client, %session_id, %mark, "joined session");

        self.deliver(
            client,
            ServerMessage::GameJoined {
                status: JoinStatus::Ok,
                mark: Some(mark),
                provoke_request: false,
            },
        )
        .await;

        // The second join starts the game; the first-bound client moves.
        if loaded.session.phase() == SessionPhase::InProgress {
            self.prompt_turn(&loaded.session).await;
        }
        Ok(())
    }

    async fn make_move(&self, client: ClientId, row: i32, col: i32) -> Result<(), RouterError> {
        let session_id = self.binding_of(client).await?;
        let mut loaded = match self.store.load_session(session_id).await {
            Ok(loaded) => loaded,
            Err(StoreError::NotFound(_)) => {
                // Stale binding left behind by a concluded session.
                let _ = self.store.unbind_client(client).await;
                return Err(RouterError::NotFound);
            }
            Err(err) => return Err(err.into()),
        };

        match loaded.session.phase() {
            SessionPhase::InProgress => {}
            SessionPhase::Open | SessionPhase::Concluded => {
                return Err(RouterError::NotInProgress);
            }
        }
        if loaded.session.players.mark_of(client) != Some(loaded.session.turn) {
            return Err(RouterError::NotYourTurn);
        }
        if !Board::in_bounds(row, col) {
            return Err(RouterError::OutOfBounds);
        }
        if !loaded.session.board.is_valid_move(row, col) {
            return Err(RouterError::Occupied);
        }

        match loaded.session.apply_move(row as usize, col as usize) {
            MoveOutcome::Continuing => {
                self.store.save_session(&loaded).await?;
                self.prompt_turn(&loaded.session).await;
            }
            MoveOutcome::Won(mark) => {
                info!(%session_id, winner = %mark, "game won");
                self.conclude(&loaded).await?;

                let session = &loaded.session;
                if let Some(winner) = session.players.get(mark) {
                    self.deliver(
                        winner,
                        ServerMessage::GameWon {
                            content: "you won!".to_string(),
                            provoke_request: true,
                        },
                    )
                    .await;
                }
                if let Some(loser) = session.players.get(mark.opponent()) {
                    self.deliver(
                        loser,
                        ServerMessage::GameLost {
                            content: "you lost!".to_string(),
                            provoke_request: true,
                        },
                    )
                    .await;
                }
            }
            MoveOutcome::Drawn => {
                info!(%session_id, "game drawn");
                self.conclude(&loaded).await?;

                for mark in [Mark::X, Mark::O] {
                    if let Some(player) = loaded.session.players.get(mark) {
                        self.deliver(
                            player,
                            ServerMessage::GameDrawn {
                                content: "draw - the board is full".to_string(),
                                provoke_request: true,
                            },
                        )
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn exit_game(&self, client: ClientId) -> Result<(), RouterError> {
        self.leave_session(client).await?;
        self.deliver(
            client,
            ServerMessage::GameLeft {
                content: "left game!".to_string(),
                provoke_request: true,
            },
        )
        .await;
        Ok(())
    }

    // =========================================================================
    // SHARED PATHS
    // =========================================================================

    /// Remove `client` from its bound session.
    ///
    /// A running game concludes in the remaining player's favor; an open
    /// session just frees the slot and stays joinable, or is deleted once
    /// both slots are empty. The client's binding is always dropped.
    async fn leave_session(&self, client: ClientId) -> Result<(), RouterError> {
        let session_id = self.binding_of(client).await?;
        let _ = self.store.unbind_client(client).await;

        let mut loaded = match self.store.load_session(session_id).await {
            Ok(loaded) => loaded,
            // Session already concluded under this client.
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        if loaded.session.phase() == SessionPhase::InProgress {
            let Some(mark) = loaded.session.players.mark_of(client) else {
                return Ok(());
            };
            let winner_mark = loaded.session.forfeit(mark);
            let winner = loaded.session.players.get(winner_mark);
            info!(%client, %session_id, winner = %winner_mark, "player left running game");

            self.conclude(&loaded).await?;
            if let Some(winner) = winner {
                self.deliver(
                    winner,
                    ServerMessage::GameWon {
                        content: "opponent left, you won!".to_string(),
                        provoke_request: true,
                    },
                )
                .await;
            }
        } else {
            loaded.session.leave(client);
            if loaded.session.players.is_empty() {
                info!(%client, %session_id, "last player left, deleting session");
                self.store.delete_session(session_id).await?;
            } else {
                self.store.save_session(&loaded).await?;
            }
        }
        Ok(())
    }

    /// Persist the final state, drop the session from the store, and
    /// release both client bindings.
    ///
    /// The save is the compare-and-swap fence: of two processes racing to
    /// conclude, the loser fails here before any notification goes out.
    async fn conclude(&self, loaded: &LoadedSession) -> Result<(), RouterError> {
        self.store.save_session(loaded).await?;
        self.store.delete_session(loaded.session.id).await?;

        for mark in [Mark::X, Mark::O] {
            if let Some(player) = loaded.session.players.get(mark) {
                let _ = self.store.unbind_client(player).await;
            }
        }
        Ok(())
    }

    /// Tell the on-turn client to move and the other to wait, each with
    /// the current board snapshot.
    async fn prompt_turn(&self, session: &GameSession) {
        let boardrepr = session.board.render();

        if let Some(active) = session.players.get(session.turn) {
            self.deliver(
                active,
                ServerMessage::YourTurn {
                    boardrepr: boardrepr.clone(),
                    provoke_request: true,
                },
            )
            .await;
        }
        if let Some(waiting) = session.players.get(session.turn.opponent()) {
            self.deliver(
                waiting,
                ServerMessage::OpponentTurn {
                    content: "opponent's turn!".to_string(),
                    boardrepr,
                    provoke_request: false,
                },
            )
            .await;
        }
    }

    /// Send to a local connection when this process owns it, otherwise
    /// publish for whichever process does.
    async fn deliver(&self, target: ClientId, message: ServerMessage) {
        if let Some(sender) = self.registry.lookup(target).await {
            if sender.send(message).await.is_err() {
                debug!(client = %target, "local connection closed mid-delivery");
            }
        } else if let Err(err) = self.notifier.publish(target, message).await {
            warn!(client = %target, %err, "failed to publish notification");
        }
    }

    async fn binding_of(&self, client: ClientId) -> Result<SessionId, RouterError> {
        match self.store.load_binding(client).await {
            Ok(session_id) => Ok(session_id),
            Err(StoreError::NotFound(_)) => Err(RouterError::NotJoined),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::network::notifier::{spawn_forwarder, ChannelNotifier};
    use crate::store::memory::MemoryStore;
    use crate::store::sessions::SessionStore;

    struct Harness {
        router: Router,
        registry: Arc<ConnectionRegistry>,
        store: SessionStore,
        backend: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryStore::new());
        let store = SessionStore::new(backend.clone());
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Arc::new(ChannelNotifier::new(64));
        let router = Router::new(store.clone(), registry.clone(), notifier);
        Harness {
            router,
            registry,
            store,
            backend,
        }
    }

    async fn connect(harness: &Harness) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let client = ClientId::generate();
        let (tx, rx) = mpsc::channel(32);
        harness.registry.register(client, tx).await;
        (client, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no message within timeout")
            .expect("connection channel closed")
    }

    /// Drive a session up to the point where both players are bound and
    /// the opening prompts have been consumed.
    async fn start_game(
        harness: &Harness,
        a: ClientId,
        rx_a: &mut mpsc::Receiver<ServerMessage>,
        b: ClientId,
        rx_b: &mut mpsc::Receiver<ServerMessage>,
    ) -> SessionId {
        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        let ServerMessage::GameCreated { session_id, .. } = recv(rx_a).await else {
            panic!("expected game_created");
        };

        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: a, session_id })
            .await;
        assert!(matches!(
            recv(rx_a).await,
            ServerMessage::GameJoined { status: JoinStatus::Ok, mark: Some(Mark::X), .. }
        ));

        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: b, session_id })
            .await;
        assert!(matches!(
            recv(rx_b).await,
            ServerMessage::GameJoined { status: JoinStatus::Ok, mark: Some(Mark::O), .. }
        ));

        // Game on: x is prompted, o waits.
        assert!(matches!(recv(rx_a).await, ServerMessage::YourTurn { .. }));
        assert!(matches!(recv(rx_b).await, ServerMessage::OpponentTurn { .. }));

        session_id
    }

    #[tokio::test]
    async fn test_new_game_creates_open_session() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;

        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;

        let ServerMessage::GameCreated { session_id, provoke_request } = recv(&mut rx_a).await
        else {
            panic!("expected game_created");
        };
        assert!(provoke_request);

        let loaded = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(loaded.session.phase(), SessionPhase::Open);
        assert_eq!(loaded.session.turn, Mark::X);
        assert!(loaded.session.players.is_empty());
        assert_eq!(loaded.session.winner, None);
    }

    #[tokio::test]
    async fn test_show_games_lists_sessions() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;

        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        recv(&mut rx_a).await;
        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        recv(&mut rx_a).await;

        harness.router.handle(ClientRequest::ShowGames { client_id: a }).await;
        let ServerMessage::GameList { session_ids, .. } = recv(&mut rx_a).await else {
            panic!("expected game_list");
        };
        assert_eq!(session_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_join_assigns_marks_and_starts_game() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;

        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        let loaded = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(loaded.session.phase(), SessionPhase::InProgress);
        assert_eq!(loaded.session.players.x, Some(a));
        assert_eq!(loaded.session.players.o, Some(b));
        assert_eq!(harness.store.load_binding(a).await.unwrap(), session_id);
        assert_eq!(harness.store.load_binding(b).await.unwrap(), session_id);
    }

    #[tokio::test]
    async fn test_third_join_is_rejected_full() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let (c, mut rx_c) = connect(&harness).await;

        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: c, session_id })
            .await;
        assert!(matches!(
            recv(&mut rx_c).await,
            ServerMessage::GameJoined { status: JoinStatus::Full, mark: None, .. }
        ));

        // The players mapping is untouched and c holds no binding.
        let loaded = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(loaded.session.players.x, Some(a));
        assert_eq!(loaded.session.players.o, Some(b));
        assert!(matches!(
            harness.store.load_binding(c).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_join_missing_session_is_not_found() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;

        harness
            .router
            .handle(ClientRequest::JoinGame {
                client_id: a,
                session_id: SessionId::generate(),
            })
            .await;
        assert!(matches!(
            recv(&mut rx_a).await,
            ServerMessage::Error { reason: ErrorReason::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_move_out_of_turn_is_rejected() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        harness
            .router
            .handle(ClientRequest::Move { client_id: b, row: 0, col: 0 })
            .await;
        assert!(matches!(
            recv(&mut rx_b).await,
            ServerMessage::Error { reason: ErrorReason::NotYourTurn, .. }
        ));

        // The grid is unchanged.
        let loaded = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(loaded.session.board, Board::new());
    }

    #[tokio::test]
    async fn test_move_out_of_bounds_is_rejected() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        for (row, col) in [(-1, 0), (0, 3), (3, 3), (-2, -2)] {
            harness
                .router
                .handle(ClientRequest::Move { client_id: a, row, col })
                .await;
            assert!(matches!(
                recv(&mut rx_a).await,
                ServerMessage::Error { reason: ErrorReason::OutOfBounds, .. }
            ));
        }

        let loaded = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(loaded.session.board, Board::new());
        assert_eq!(loaded.session.turn, Mark::X);
    }

    #[tokio::test]
    async fn test_move_on_occupied_cell_is_rejected() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 1, col: 1 })
            .await;
        assert!(matches!(recv(&mut rx_b).await, ServerMessage::YourTurn { .. }));
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::OpponentTurn { .. }));

        harness
            .router
            .handle(ClientRequest::Move { client_id: b, row: 1, col: 1 })
            .await;
        assert!(matches!(
            recv(&mut rx_b).await,
            ServerMessage::Error { reason: ErrorReason::Occupied, .. }
        ));
    }

    #[tokio::test]
    async fn test_move_in_open_session_is_rejected() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;

        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        let ServerMessage::GameCreated { session_id, .. } = recv(&mut rx_a).await else {
            panic!("expected game_created");
        };
        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: a, session_id })
            .await;
        recv(&mut rx_a).await;

        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 0, col: 0 })
            .await;
        assert!(matches!(
            recv(&mut rx_a).await,
            ServerMessage::Error { reason: ErrorReason::NotInProgress, .. }
        ));
    }

    #[tokio::test]
    async fn test_move_without_binding_is_rejected() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;

        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 0, col: 0 })
            .await;
        assert!(matches!(
            recv(&mut rx_a).await,
            ServerMessage::Error { reason: ErrorReason::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_full_game_to_win() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        // a takes the top row while b fills the middle.
        let script = [
            (a, 0, 0),
            (b, 1, 1),
            (a, 0, 1),
            (b, 1, 0),
        ];
        for (client, row, col) in script {
            harness
                .router
                .handle(ClientRequest::Move { client_id: client, row, col })
                .await;
            // Each accepted move prompts the next player and notifies the
            // mover of the wait.
            let (active_rx, waiting_rx) = if client == a {
                (&mut rx_b, &mut rx_a)
            } else {
                (&mut rx_a, &mut rx_b)
            };
            assert!(matches!(recv(active_rx).await, ServerMessage::YourTurn { .. }));
            assert!(matches!(recv(waiting_rx).await, ServerMessage::OpponentTurn { .. }));
        }

        // The winning move.
        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 0, col: 2 })
            .await;
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::GameWon { .. }));
        assert!(matches!(recv(&mut rx_b).await, ServerMessage::GameLost { .. }));

        // Session and bindings are gone.
        assert!(matches!(
            harness.store.load_session(session_id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            harness.store.load_binding(a).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            harness.store.load_binding(b).await,
            Err(StoreError::NotFound(_))
        ));

        // A later move on the dead session is a not-found rejection.
        harness
            .router
            .handle(ClientRequest::Move { client_id: b, row: 2, col: 2 })
            .await;
        assert!(matches!(
            recv(&mut rx_b).await,
            ServerMessage::Error { reason: ErrorReason::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_full_game_to_draw() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        // x | o | x
        // x | o | o
        // o | x | x
        let script = [
            (a, 0, 0),
            (b, 0, 1),
            (a, 0, 2),
            (b, 1, 1),
            (a, 1, 0),
            (b, 1, 2),
            (a, 2, 1),
            (b, 2, 0),
        ];
        for (client, row, col) in script {
            harness
                .router
                .handle(ClientRequest::Move { client_id: client, row, col })
                .await;
            let (active_rx, waiting_rx) = if client == a {
                (&mut rx_b, &mut rx_a)
            } else {
                (&mut rx_a, &mut rx_b)
            };
            assert!(matches!(recv(active_rx).await, ServerMessage::YourTurn { .. }));
            assert!(matches!(recv(waiting_rx).await, ServerMessage::OpponentTurn { .. }));
        }

        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 2, col: 2 })
            .await;
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::GameDrawn { .. }));
        assert!(matches!(recv(&mut rx_b).await, ServerMessage::GameDrawn { .. }));

        assert!(matches!(
            harness.store.load_session(session_id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exit_from_running_game_awards_opponent() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        harness.router.handle(ClientRequest::Exit { client_id: b }).await;

        assert!(matches!(recv(&mut rx_b).await, ServerMessage::GameLeft { .. }));
        let ServerMessage::GameWon { content, .. } = recv(&mut rx_a).await else {
            panic!("expected game_won");
        };
        assert!(content.contains("opponent left"));

        assert!(matches!(
            harness.store.load_session(session_id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            harness.store.load_binding(a).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exit_from_open_session_frees_slot() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;

        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        let ServerMessage::GameCreated { session_id, .. } = recv(&mut rx_a).await else {
            panic!("expected game_created");
        };
        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: a, session_id })
            .await;
        recv(&mut rx_a).await;

        harness.router.handle(ClientRequest::Exit { client_id: a }).await;
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::GameLeft { .. }));

        // Nobody left: the session is gone, not orphaned.
        assert!(matches!(
            harness.store.load_session(session_id).await,
            Err(StoreError::NotFound(_))
        ));

        // A second game: the departure of a mid-game concludes it for b,
        // whose stale exit afterwards is answered with not-found.
        harness.router.handle(ClientRequest::NewGame { client_id: a }).await;
        let ServerMessage::GameCreated { session_id, .. } = recv(&mut rx_a).await else {
            panic!("expected game_created");
        };
        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: a, session_id })
            .await;
        recv(&mut rx_a).await;
        harness
            .router
            .handle(ClientRequest::JoinGame { client_id: b, session_id })
            .await;
        recv(&mut rx_b).await;
        recv(&mut rx_a).await; // your_turn
        recv(&mut rx_b).await; // opponent_turn

        harness.router.handle(ClientRequest::Exit { client_id: a }).await;
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::GameLeft { .. }));
        recv(&mut rx_b).await; // b is told it won

        harness.router.handle(ClientRequest::Exit { client_id: b }).await;
        // b's binding was already dropped by the conclusion.
        assert!(matches!(
            recv(&mut rx_b).await,
            ServerMessage::Error { reason: ErrorReason::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_runs_exit_cleanup() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        // b's socket drops.
        harness.router.handle_disconnect(b).await;
        harness.registry.unregister(b).await;

        let ServerMessage::GameWon { .. } = recv(&mut rx_a).await else {
            panic!("expected game_won");
        };
        assert!(matches!(
            harness.store.load_session(session_id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            harness.store.load_binding(b).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_silent() {
        let harness = harness();
        let (a, _rx_a) = connect(&harness).await;
        // Must not error or panic.
        harness.router.handle_disconnect(a).await;
        assert_eq!(harness.backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_cross_process_notification() {
        // Two routers with separate registries over one shared store and
        // one shared channel: a move handled by process one must reach
        // the opponent connected to process two.
        let backend = Arc::new(MemoryStore::new());
        let notifier = Arc::new(ChannelNotifier::new(64));

        let registry_one = Arc::new(ConnectionRegistry::new());
        let registry_two = Arc::new(ConnectionRegistry::new());
        let router_one = Router::new(
            SessionStore::new(backend.clone()),
            registry_one.clone(),
            notifier.clone(),
        );
        let _router_two = Router::new(
            SessionStore::new(backend.clone()),
            registry_two.clone(),
            notifier.clone(),
        );

        let fwd_one = spawn_forwarder(notifier.clone(), registry_one.clone());
        let fwd_two = spawn_forwarder(notifier.clone(), registry_two.clone());

        let a = ClientId::generate();
        let b = ClientId::generate();
        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        registry_one.register(a, tx_a).await;
        registry_two.register(b, tx_b).await;

        // a creates and joins on process one.
        router_one.handle(ClientRequest::NewGame { client_id: a }).await;
        let ServerMessage::GameCreated { session_id, .. } = recv(&mut rx_a).await else {
            panic!("expected game_created");
        };
        router_one
            .handle(ClientRequest::JoinGame { client_id: a, session_id })
            .await;
        recv(&mut rx_a).await;

        // b joins through process one too (its socket lives on process
        // two, so the join response and start prompt travel the channel).
        router_one
            .handle(ClientRequest::JoinGame { client_id: b, session_id })
            .await;
        assert!(matches!(
            recv(&mut rx_b).await,
            ServerMessage::GameJoined { status: JoinStatus::Ok, mark: Some(Mark::O), .. }
        ));
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::YourTurn { .. }));
        assert!(matches!(recv(&mut rx_b).await, ServerMessage::OpponentTurn { .. }));

        // a moves on process one; b hears about it on process two.
        router_one
            .handle(ClientRequest::Move { client_id: a, row: 0, col: 0 })
            .await;
        assert!(matches!(recv(&mut rx_b).await, ServerMessage::YourTurn { .. }));
        assert!(matches!(recv(&mut rx_a).await, ServerMessage::OpponentTurn { .. }));

        fwd_one.abort();
        fwd_two.abort();
    }

    #[tokio::test]
    async fn test_interleaved_write_cannot_double_apply() {
        let harness = harness();
        let (a, mut rx_a) = connect(&harness).await;
        let (b, mut rx_b) = connect(&harness).await;
        let session_id = start_game(&harness, a, &mut rx_a, b, &mut rx_b).await;

        // Another writer lands a save before a's move is processed.
        let mut interfering = harness.store.load_session(session_id).await.unwrap();
        interfering.session.apply_move(2, 2);
        harness.store.save_session(&interfering).await.unwrap();

        harness
            .router
            .handle(ClientRequest::Move { client_id: a, row: 0, col: 0 })
            .await;

        // The interfering write placed x at (2,2) and flipped the turn,
        // so a's move now fails turn validation - the race shows up as a
        // rejection rather than a double-apply.
        assert!(matches!(
            recv(&mut rx_a).await,
            ServerMessage::Error { .. }
        ));
        let current = harness.store.load_session(session_id).await.unwrap();
        assert_eq!(current.session.board.cell(0, 0), None);
    }
}
