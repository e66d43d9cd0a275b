use thiserror::Error;

use crate::bits::{MAX_ALIVE, MAX_CELLS};

/// Problems in level text. Raised by the loader before any board exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelError {
    #[error("level is empty")]
    Empty,
    #[error("level has no agent")]
    NoAgent,
    #[error("level has more than one agent (second at row {row}, col {col})")]
    MultipleAgents { row: usize, col: usize },
    #[error("unexpected character {ch:?} at row {row}, col {col}")]
    BadChar { ch: char, row: usize, col: usize },
}

/// Structural rejection: the board can never reach the search driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("{0} walkable cells exceed the supported maximum of {MAX_CELLS}")]
    TooManyCells(usize),
    #[error("{0} alive cells exceed the supported maximum of {MAX_ALIVE}")]
    TooManyAliveCells(usize),
    #[error("level has no boxes")]
    NoBoxes,
    #[error("{boxes} boxes but {goals} goals")]
    CountMismatch { boxes: usize, goals: usize },
    #[error("box at row {row}, col {col} is outside the agent's region")]
    UnreachableBox { row: usize, col: usize },
    #[error("goal at row {row}, col {col} is outside the agent's region")]
    UnreachableGoal { row: usize, col: usize },
    #[error("box at row {row}, col {col} can never reach a goal")]
    DeadBox { row: usize, col: usize },
    #[error("boxes cannot be matched to goals ({matched} of {boxes} matched)")]
    Unmatchable { matched: usize, boxes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Growth failed and the table has no free slot left.
    #[error("state table is full ({len} entries) and could not grow")]
    Full { len: usize },
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to build resize worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
