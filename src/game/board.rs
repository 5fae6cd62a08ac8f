//! Board and Move Rules
//!
//! Pure tic-tac-toe rules over a fixed 3x3 grid: move validity, win and
//! draw detection, cell mutation, and the textual rendering sent to
//! clients. No I/O, no knowledge of sessions or connections.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Board dimension (the grid is `BOARD_SIZE` x `BOARD_SIZE`).
pub const BOARD_SIZE: usize = 3;

/// One of the two turn-taking marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    /// The cross mark; moves first in every game.
    X,
    /// The nought mark.
    O,
}

impl Mark {
    /// The mark that moves after this one.
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "x"),
            Mark::O => write!(f, "o"),
        }
    }
}

/// The 3x3 grid. Cells hold the mark placed on them, `None` while empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Mark>; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff both coordinates fall within the grid.
    pub fn in_bounds(row: i32, col: i32) -> bool {
        let limit = BOARD_SIZE as i32;
        (0..limit).contains(&row) && (0..limit).contains(&col)
    }

    /// True iff `(row, col)` is on the board and the cell is empty.
    ///
    /// Out-of-range coordinates are reported invalid, never indexed.
    pub fn is_valid_move(&self, row: i32, col: i32) -> bool {
        if !Self::in_bounds(row, col) {
            return false;
        }
        self.cells[row as usize][col as usize].is_none()
    }

    /// Write `mark` into `(row, col)`.
    ///
    /// The caller must have validated the move first; this is pure
    /// mutation with no re-validation.
    pub fn place(&mut self, mark: Mark, row: usize, col: usize) {
        self.cells[row][col] = Some(mark);
    }

    /// Value of the cell at `(row, col)`.
    pub fn cell(&self, row: usize, col: usize) -> Option<Mark> {
        self.cells[row][col]
    }

    /// True iff `mark` occupies an entire row, column, or diagonal.
    pub fn is_winner(&self, mark: Mark) -> bool {
        let owns = |r: usize, c: usize| self.cells[r][c] == Some(mark);

        for i in 0..BOARD_SIZE {
            if (0..BOARD_SIZE).all(|j| owns(i, j)) {
                return true;
            }
            if (0..BOARD_SIZE).all(|j| owns(j, i)) {
                return true;
            }
        }

        (0..BOARD_SIZE).all(|i| owns(i, i))
            || (0..BOARD_SIZE).all(|i| owns(i, BOARD_SIZE - 1 - i))
    }

    /// True iff no cell is empty.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|cell| cell.is_some())
    }

    /// True iff the board is full and neither mark has a winning line.
    pub fn is_draw(&self) -> bool {
        self.is_full() && !self.is_winner(Mark::X) && !self.is_winner(Mark::O)
    }

    /// Fixed textual rendering carried to clients as `boardrepr`:
    /// cells joined by `|` separators, rows by `---+---+---` rules.
    pub fn render(&self) -> String {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or_else(|| " ".to_string(), |m| m.to_string()))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n---+---+---\n")
    }
}
