//! Game Session State
//!
//! The authoritative, persisted session entity: board, turn, player slot
//! bindings, and outcome. This module knows the legal transitions; the
//! router decides when to apply them and the store decides how they are
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::game::board::{Board, Mark};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque unique session identifier.
///
/// Serializes as the hyphenated UUID string, which is also the form it
/// takes inside store keys and on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque client identity, generated fresh for every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Session lifecycle phase, derived from the stored data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Fewer than two players bound; joinable.
    Open,
    /// Both marks bound, no winner yet.
    InProgress,
    /// Winner decided; the session is about to leave the store.
    Concluded,
}

/// Player slot bindings for a session: which client holds which mark.
///
/// A mark's slot is bound to at most one client at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlots {
    /// Client bound to [`Mark::X`], if any.
    pub x: Option<ClientId>,
    /// Client bound to [`Mark::O`], if any.
    pub o: Option<ClientId>,
}

impl PlayerSlots {
    /// Client bound to `mark`.
    pub fn get(&self, mark: Mark) -> Option<ClientId> {
        match mark {
            Mark::X => self.x,
            Mark::O => self.o,
        }
    }

    /// Mark the given client is bound to, if any.
    pub fn mark_of(&self, client: ClientId) -> Option<Mark> {
        if self.x == Some(client) {
            Some(Mark::X)
        } else if self.o == Some(client) {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// True iff both slots are bound.
    pub fn is_full(&self) -> bool {
        self.x.is_some() && self.o.is_some()
    }

    /// True iff neither slot is bound.
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.o.is_none()
    }
}

/// A single game session: the unit of persisted, shared state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Opaque unique identifier, generated at creation.
    pub id: SessionId,
    /// The 3x3 grid.
    pub board: Board,
    /// Mark to move next.
    pub turn: Mark,
    /// Player slot bindings.
    pub players: PlayerSlots,
    /// Winning mark. Set at most once, never unset; a session with a
    /// winner accepts no further moves.
    pub winner: Option<Mark>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// Create a fresh session: empty board, `x` to move, no players.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            board: Board::new(),
            turn: Mark::X,
            players: PlayerSlots::default(),
            winner: None,
            created_at: Utc::now(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        if self.winner.is_some() {
            SessionPhase::Concluded
        } else if self.players.is_full() {
            SessionPhase::InProgress
        } else {
            SessionPhase::Open
        }
    }

    /// Bind `client` to the first free slot, `x` before `o`.
    ///
    /// Returns the assigned mark, or `None` when both slots are occupied.
    pub fn join(&mut self, client: ClientId) -> Option<Mark> {
        if self.players.x.is_none() {
            self.players.x = Some(client);
            Some(Mark::X)
        } else if self.players.o.is_none() {
            self.players.o = Some(client);
            Some(Mark::O)
        } else {
            None
        }
    }

    /// Clear the slot `client` is bound to. Returns the freed mark.
    pub fn leave(&mut self, client: ClientId) -> Option<Mark> {
        match self.players.mark_of(client)? {
            Mark::X => {
                self.players.x = None;
                Some(Mark::X)
            }
            Mark::O => {
                self.players.o = None;
                Some(Mark::O)
            }
        }
    }

    /// Apply a validated move for the mark currently on turn and evaluate
    /// the outcome. Flips the turn only when the game continues.
    pub fn apply_move(&mut self, row: usize, col: usize) -> MoveOutcome {
        let mark = self.turn;
        self.board.place(mark, row, col);

        if self.board.is_winner(mark) {
            self.winner = Some(mark);
            MoveOutcome::Won(mark)
        } else if self.board.is_full() {
            MoveOutcome::Drawn
        } else {
            self.turn = mark.opponent();
            MoveOutcome::Continuing
        }
    }

    /// Conclude the game by forfeit of `mark`; the opponent takes the win.
    pub fn forfeit(&mut self, mark: Mark) -> Mark {
        let opponent = mark.opponent();
        self.winner = Some(opponent);
        opponent
    }
}

/// Result of applying one move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Game continues; the turn has flipped to the opponent.
    Continuing,
    /// The moving mark completed a line.
    Won(Mark),
    /// The board filled with no line for either mark.
    Drawn,
}
