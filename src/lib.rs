//! Push-optimal Sokoban search.
//!
//! [`solve`] is the one-call entry point. For finer control build a
//! [`SolverContext`] and drive a [`Search`] step by step.

pub mod bits;
pub mod board;
pub mod config;
pub mod context;
pub mod deadlock;
pub mod error;
pub mod heuristic;
pub mod level;
pub mod matching;
pub mod pattern;
pub mod search;
pub mod solution;
pub mod state;
pub mod store;
pub mod subsearch;

pub use board::Board;
pub use config::SolverConfig;
pub use context::SolverContext;
pub use error::{BoardError, LevelError, SolveError, StoreError};
pub use level::Level;
pub use search::{solve, Outcome, Search, SearchStats, SearchStatus};
pub use solution::Solution;
