//! Game logic: board rules and the persisted session entity.
//!
//! Everything in this module is pure and deterministic. The board knows
//! tic-tac-toe; the session knows whose turn it is and who is bound to
//! which mark. Persistence and delivery live elsewhere.

pub mod board;
pub mod state;

pub use board::{Board, Mark, BOARD_SIZE};
pub use state::{ClientId, GameSession, MoveOutcome, PlayerSlots, SessionId, SessionPhase};
