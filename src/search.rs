//! Best-first push search.
//!
//! Open is ordered by `dist + h`; every popped state goes to Closed before
//! its expensive deadlock checks so repeated generations of a dead state
//! stop at the duplicate test. Keys in both stores are canonical under the
//! board's automorphisms and payloads are kept in the key's frame.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, DIRECTIONS};
use crate::config::SolverConfig;
use crate::context::SolverContext;
use crate::deadlock::{DeadlockCounts, DeadlockDetector};
use crate::error::{SolveError, StoreError};
use crate::level::Level;
use crate::solution::{reconstruct, Solution};
use crate::state::{canonical, normalize, push, Payload, StateKey};
use crate::store::{OpenSet, PackedMap, StateStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SearchStatus {
    /// Start state seeded, nothing expanded yet.
    Initialized,
    Searching,
    Solved,
    /// Open ran dry: no solution exists.
    Exhausted,
    /// The time budget ran out first.
    Expired,
    /// A state table could neither grow nor take another entry.
    OutOfResources,
}

impl SearchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SearchStatus::Initialized | SearchStatus::Searching)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchStatus::Initialized => "initialized",
            SearchStatus::Searching => "searching",
            SearchStatus::Solved => "solved",
            SearchStatus::Exhausted => "no solution",
            SearchStatus::Expired => "time limit reached",
            SearchStatus::OutOfResources => "out of memory",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchStats {
    pub expanded: u64,
    pub generated: u64,
    pub duplicates: u64,
    pub reopened: u64,
    /// Children dropped because they could not beat the best solution.
    pub cut_off: u64,
    /// Expansions limited to a PI-corral.
    pub corral_restricted: u64,
    pub unstuck_runs: u64,
    pub unstuck_hits: u64,
    /// States purged from Open and Closed by freshly learned patterns.
    pub swept: u64,
    pub elapsed: Duration,
}

pub struct Search<'c> {
    ctx: &'c SolverContext,
    open: OpenSet,
    closed: PackedMap,
    detector: DeadlockDetector,
    status: SearchStatus,
    stats: SearchStats,
    best: Option<(StateKey, Payload)>,
    upper: u32,
    last_boxes: Option<BoxSet>,
    next_tick: u64,
    started: Instant,
    deadline: Option<Instant>,
}

impl<'c> Search<'c> {
    /// Seeds Open with the start state.
    pub fn new(ctx: &'c SolverContext) -> Result<Self, StoreError> {
        let board = &ctx.board;
        let cells = board.cell_count();
        let words = board.box_words();
        let mut search = Search {
            ctx,
            open: OpenSet::new(cells, words, ctx.growth()),
            closed: PackedMap::new(cells, words, ctx.growth()),
            detector: DeadlockDetector::new(board, &ctx.config),
            status: SearchStatus::Initialized,
            stats: SearchStats::default(),
            best: None,
            upper: u32::MAX,
            last_boxes: None,
            next_tick: 0,
            started: Instant::now(),
            deadline: None,
        };

        let (key, reach) = normalize(board, board.start_agent(), *board.start_boxes());
        let (start, _) = canonical(board, key, &reach);
        match search.detector.heuristic().lower_bound(board, &start.boxes) {
            Some(h) => {
                let total = search.detector.heuristic().scaled(h);
                search.open.add(&start, Payload::start(start.agent, total))?;
            }
            None => search.status = SearchStatus::Exhausted,
        }
        Ok(search)
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            elapsed: self.started.elapsed(),
            ..self.stats
        }
    }

    pub fn deadlocks(&self) -> DeadlockCounts {
        self.detector.counts()
    }

    pub fn pattern_count(&self) -> usize {
        self.detector.patterns().len()
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }

    /// Best solved state found so far, with its push count.
    pub fn best(&self) -> Option<(StateKey, u32)> {
        self.best.map(|(k, p)| (k, p.dist))
    }

    /// Runs until a terminal status.
    pub fn run(&mut self) -> SearchStatus {
        while !self.step().is_terminal() {}
        let stats = self.stats();
        info!(
            status = %self.status,
            expanded = stats.expanded,
            generated = stats.generated,
            open = self.open.len(),
            closed = self.closed.len(),
            patterns = self.detector.patterns().len(),
            deadlocks = ?self.detector.counts(),
            subsearch_nodes = self.detector.subsearch_nodes(),
            goal_zone_cache = self.detector.goal_zone_cache(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "search finished"
        );
        self.status
    }

    /// Pushes a running deadline back by `extra`. An expired search picks
    /// up where it stopped on the next `step`; nothing was popped when the
    /// budget ran out.
    pub fn extend_deadline(&mut self, extra: Duration) {
        if let Some(deadline) = self.deadline {
            self.deadline = Some(deadline.max(Instant::now()) + extra);
        }
        if self.status == SearchStatus::Expired {
            self.status = SearchStatus::Searching;
        }
    }

    /// One expansion. Terminal statuses other than `Expired` are final;
    /// see [`Search::extend_deadline`].
    pub fn step(&mut self) -> SearchStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        if self.status == SearchStatus::Initialized {
            self.started = Instant::now();
            self.deadline = self.ctx.config.time_limit().map(|t| self.started + t);
            self.status = SearchStatus::Searching;
        }
        self.status = match self.expand_next() {
            Ok(status) => status,
            Err(err) => {
                warn!(%err, "state store exhausted");
                SearchStatus::OutOfResources
            }
        };
        self.status
    }

    fn expand_next(&mut self) -> Result<SearchStatus, StoreError> {
        let ctx = self.ctx;
        let board = &ctx.board;
        let config = &ctx.config;

        if self.stats.expanded >= self.next_tick {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(SearchStatus::Expired);
            }
            if self.stats.expanded > 0 {
                self.report();
            }
            self.next_tick = self.stats.expanded + config.report_interval;
        }

        let Some((key, payload)) = self.open.pop_min() else {
            return Ok(match self.best {
                Some(_) => SearchStatus::Solved,
                None => SearchStatus::Exhausted,
            });
        };
        if payload.total >= self.upper && self.best.is_some() {
            return Ok(SearchStatus::Solved);
        }
        if key.is_solved(board) {
            if self.best.map_or(true, |(_, b)| payload.dist <= b.dist) {
                self.best = Some((key, payload));
            }
            return Ok(SearchStatus::Solved);
        }

        match self.closed.get(&key) {
            Some(old) if old.dist <= payload.dist => {
                self.stats.duplicates += 1;
                return Ok(SearchStatus::Searching);
            }
            Some(_) => {
                self.closed.update(&key, payload);
                self.stats.reopened += 1;
            }
            None => self.closed.insert_unchecked(&key, payload)?,
        }
        self.stats.expanded += 1;

        let reach = board.reach(key.agent, &key.boxes);
        let mut candidates = key.boxes;
        if !payload.is_start() {
            let full = self.detector.check_full(board, &key, &reach);
            if full.dead.is_some() {
                return Ok(SearchStatus::Searching);
            }
            if let Some(pi) = full.pi_boxes {
                self.stats.corral_restricted += 1;
                candidates = pi;
            }
        }

        if self.expand(board, config, &key, &payload, &reach, &candidates)? {
            return Ok(SearchStatus::Solved);
        }

        if config.unstuck_interval > 0 && self.stats.expanded % config.unstuck_interval == 0 {
            self.unstuck(board, config, &key);
        }
        self.last_boxes = Some(key.boxes);
        if self.stats.expanded % config.sweep_interval == 0 && self.detector.patterns().has_fresh() {
            self.sweep();
        }
        Ok(SearchStatus::Searching)
    }

    /// Generates and files every child of `key`. Returns true when a
    /// solution should end the search right away.
    fn expand(
        &mut self,
        board: &Board,
        config: &SolverConfig,
        key: &StateKey,
        payload: &Payload,
        reach: &CellSet,
        candidates: &BoxSet,
    ) -> Result<bool, StoreError> {
        for bx in candidates.iter() {
            let bx = bx as Cell;
            for dir in DIRECTIONS {
                let Some(stand) = board.neighbor(bx, dir.reverse()) else {
                    continue;
                };
                if !reach.contains(stand as usize) {
                    continue;
                }
                let Some(to) = board.neighbor(bx, dir) else {
                    continue;
                };
                if key.has_box(to) || self.detector.simple_push_deadlock(board, &key.boxes, bx, to) {
                    continue;
                }
                let Some(succ) = push(board, &key.boxes, bx, dir, config.tunnel_macros) else {
                    continue;
                };
                self.stats.generated += 1;

                let (child, child_reach) = normalize(board, succ.agent, succ.boxes);
                let Ok(h) = self
                    .detector
                    .check_incremental(board, reach, stand, dir, &succ, &child, &child_reach)
                else {
                    continue;
                };
                let dist = payload.dist + succ.pushes as u32;
                let total = dist.saturating_add(self.detector.heuristic().scaled(h));
                if total >= self.upper {
                    self.stats.cut_off += 1;
                    continue;
                }

                let step = Payload {
                    dist,
                    total,
                    dir,
                    pushes: succ.pushes,
                    prev_agent: stand,
                    box_cell: succ.box_to,
                };
                let (canon, which) = canonical(board, child, &child_reach);
                let step = match which {
                    Some(i) => step.transformed(board.symmetries().get(i)),
                    None => step,
                };

                if self.closed.get(&canon).is_some_and(|old| old.dist <= dist) {
                    self.stats.duplicates += 1;
                    continue;
                }
                if canon.is_solved(board) {
                    debug!(pushes = dist, "solution found");
                    self.best = Some((canon, step));
                    self.upper = dist;
                    if !config.optimal {
                        return Ok(true);
                    }
                }
                if self.open.contains(&canon) {
                    if !self.open.decrease(&canon, step) {
                        self.stats.duplicates += 1;
                    }
                } else {
                    self.open.add(&canon, step)?;
                }
            }
        }
        Ok(false)
    }

    /// Tries to prove the boxes shared with the previous expansion dead on
    /// their own.
    fn unstuck(&mut self, board: &Board, config: &SolverConfig, key: &StateKey) {
        let Some(last) = self.last_boxes else {
            return;
        };
        let shared = last.intersection(&key.boxes);
        if shared.len() < 2 || shared == key.boxes {
            return;
        }
        self.stats.unstuck_runs += 1;
        if self
            .detector
            .prove_and_learn(board, key.agent, shared, config.unstuck_node_limit)
        {
            self.stats.unstuck_hits += 1;
            debug!(boxes = shared.len(), "unstuck pass proved a shared core dead");
        }
    }

    /// Purges Open and Closed of states caught by patterns learned since the
    /// last sweep.
    fn sweep(&mut self) {
        let fresh = self.detector.patterns_mut().take_fresh();
        let mut dead = |key: &StateKey, _: Payload| fresh.iter().any(|p| p.matches(key));
        let from_open = self.open.remove_if(&mut dead);
        let from_closed = self.closed.remove_if(&mut dead);
        self.stats.swept += (from_open + from_closed) as u64;
        debug!(
            patterns = fresh.len(),
            open = from_open,
            closed = from_closed,
            "swept stores with new patterns"
        );
    }

    fn report(&self) {
        info!(
            expanded = self.stats.expanded,
            open = self.open.len(),
            closed = self.closed.len(),
            patterns = self.detector.patterns().len(),
            min_cost = self.open.min_cost(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "searching"
        );
    }

    /// Concrete push sequence of the best solution.
    pub fn solution(&self) -> Option<Solution> {
        let (key, payload) = self.best?;
        reconstruct(
            &self.ctx.board,
            &self.closed,
            key,
            payload,
            self.ctx.config.tunnel_macros,
        )
    }
}

/// Everything one `solve` call produced.
#[derive(Debug)]
pub struct Outcome {
    pub status: SearchStatus,
    pub solution: Option<Solution>,
    pub stats: SearchStats,
    pub deadlocks: DeadlockCounts,
    pub patterns: usize,
}

/// Parses `text`, builds the board and searches it to a terminal status.
pub fn solve(text: &str, config: SolverConfig) -> Result<Outcome, SolveError> {
    let level = Level::parse(text)?;
    let board = Board::new(&level)?;
    let ctx = SolverContext::new(board, config)?;
    let mut search = Search::new(&ctx)?;
    let status = search.run();
    let solution = match status {
        SearchStatus::Solved => {
            let sol = search.solution();
            if sol.is_none() {
                warn!("solved state could not be traced back to the start");
            }
            sol
        }
        _ => None,
    };
    Ok(Outcome {
        status,
        solution,
        stats: search.stats(),
        deadlocks: search.deadlocks(),
        patterns: search.pattern_count(),
    })
}
