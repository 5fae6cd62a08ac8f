//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket: JSON text
//! frames with a closed `type`/`payload` envelope. Every inbound action
//! is one enum variant, so adding an action is a compile-time-checked
//! change rather than a fallthrough in a string switch.

use serde::{Deserialize, Serialize};

use crate::game::board::Mark;
use crate::game::state::{ClientId, SessionId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// Each payload carries the sender's `client_id`; the server treats the
/// id assigned to the connection as authoritative and rejects a payload
/// naming any other client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Create a new session to be joined.
    NewGame {
        /// Requesting client.
        client_id: ClientId,
    },

    /// Join an existing session by id.
    JoinGame {
        /// Requesting client.
        client_id: ClientId,
        /// Session to join.
        session_id: SessionId,
    },

    /// List joinable session ids.
    ShowGames {
        /// Requesting client.
        client_id: ClientId,
    },

    /// Place the requesting player's mark.
    Move {
        /// Requesting client.
        client_id: ClientId,
        /// Target row, 0-based. Out-of-range values are rejected, not
        /// truncated.
        row: i32,
        /// Target column, 0-based.
        col: i32,
    },

    /// Leave the current session and return to the lobby.
    Exit {
        /// Requesting client.
        client_id: ClientId,
    },
}

impl ClientRequest {
    /// The client identity carried in the payload.
    pub fn client_id(&self) -> ClientId {
        match self {
            ClientRequest::NewGame { client_id }
            | ClientRequest::JoinGame { client_id, .. }
            | ClientRequest::ShowGames { client_id }
            | ClientRequest::Move { client_id, .. }
            | ClientRequest::Exit { client_id } => *client_id,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Join request outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinStatus {
    /// A slot was assigned.
    Ok,
    /// Both slots were already occupied; nothing changed.
    Full,
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Cell coordinates fall outside the grid.
    OutOfBounds,
    /// Target cell already holds a mark.
    Occupied,
    /// Requesting client does not hold the turn.
    NotYourTurn,
    /// The game has not started or is no longer running.
    NotInProgress,
    /// Session or client binding is missing; usually a stale client
    /// after its game concluded.
    NotFound,
    /// Inbound frame did not parse into a known request.
    Malformed,
    /// The shared store rejected or could not complete the operation;
    /// the request may be retried.
    Store,
}

/// Messages sent from server to client.
///
/// `provoke_request` signals that the peer should immediately prompt its
/// next action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted; carries the identity assigned to this socket.
    Welcome {
        /// Identity the server will route by for this connection.
        client_id: ClientId,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// A new session was created.
    GameCreated {
        /// Id of the created session.
        session_id: SessionId,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// Outcome of a join request.
    GameJoined {
        /// Whether a slot was assigned.
        status: JoinStatus,
        /// Assigned mark on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        mark: Option<Mark>,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// Joinable session ids, in store order.
    GameList {
        /// Ids of every stored session.
        session_ids: Vec<SessionId>,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// It is the receiving client's turn to move.
    YourTurn {
        /// Current board rendering.
        boardrepr: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// The opponent is on turn; carries the current board snapshot.
    OpponentTurn {
        /// Human-readable notice.
        content: String,
        /// Current board rendering.
        boardrepr: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// The receiving client won.
    GameWon {
        /// Human-readable notice.
        content: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// The receiving client lost.
    GameLost {
        /// Human-readable notice.
        content: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// The game ended with a full board and no winner.
    GameDrawn {
        /// Human-readable notice.
        content: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// Acknowledges leaving; the client is back in the lobby.
    GameLeft {
        /// Human-readable notice.
        content: String,
        /// Prompt flag.
        provoke_request: bool,
    },

    /// A request was rejected; no state changed.
    Error {
        /// Machine-readable rejection reason.
        reason: ErrorReason,
        /// Human-readable notice.
        content: String,
        /// Prompt flag.
        provoke_request: bool,
    },
}

impl ServerMessage {
    /// Error response with the prompt flag set, so the client retries.
    pub fn error(reason: ErrorReason, content: impl Into<String>) -> Self {
        ServerMessage::Error {
            reason,
            content: content.into(),
            provoke_request: true,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
