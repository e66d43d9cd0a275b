//! Everything a solver component needs that is fixed for one puzzle: the
//! board, the configuration and the worker pool used for table growth.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::board::Board;
use crate::config::SolverConfig;
use crate::error::SolveError;
use crate::store::Growth;

pub struct SolverContext {
    pub board: Board,
    pub config: SolverConfig,
    pool: Arc<ThreadPool>,
}

impl SolverContext {
    pub fn new(board: Board, mut config: SolverConfig) -> Result<Self, SolveError> {
        config.validate();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.resize_threads)
            .thread_name(|i| format!("sokosearch-resize-{i}"))
            .build()?;
        Ok(SolverContext {
            board,
            config,
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Growth policy for the long-lived open and closed stores.
    pub fn growth(&self) -> Growth {
        Growth {
            pool: Some(Arc::clone(&self.pool)),
            parallel_min: self.config.parallel_resize_min_slots,
        }
    }
}
