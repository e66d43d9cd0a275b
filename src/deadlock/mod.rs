//! Composite deadlock oracle.
//!
//! Cheap checks run when a successor is generated, the expensive ones when a
//! state is popped for expansion. Every positive verdict is permanent for
//! the state. Verdicts that generalise are folded into the pattern database,
//! together with their images under the board's automorphisms.

pub mod corral;
pub mod frozen;
pub mod goal_zone;
pub mod simple;

use std::fmt;

use tracing::debug;

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, Direction};
use crate::config::SolverConfig;
use crate::heuristic::Heuristic;
use crate::pattern::PatternDb;
use crate::state::{StateKey, Successor};
use crate::subsearch::{SubSearch, Verdict};

use self::corral::Corral;
use self::goal_zone::GoalZone;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum DeadlockKind {
    Simple,
    Pattern,
    Frozen,
    Matching,
    GoalZone,
    Corral,
}

impl DeadlockKind {
    pub const ALL: [DeadlockKind; 6] = [
        DeadlockKind::Simple,
        DeadlockKind::Pattern,
        DeadlockKind::Frozen,
        DeadlockKind::Matching,
        DeadlockKind::GoalZone,
        DeadlockKind::Corral,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            DeadlockKind::Simple => "simple",
            DeadlockKind::Pattern => "pattern",
            DeadlockKind::Frozen => "frozen",
            DeadlockKind::Matching => "matching",
            DeadlockKind::GoalZone => "goal_zone",
            DeadlockKind::Corral => "corral",
        }
    }
}

/// Deadlocks found so far, by the check that found them.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadlockCounts([u64; 6]);

impl DeadlockCounts {
    pub fn get(&self, kind: DeadlockKind) -> u64 {
        self.0[kind.index()]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    fn bump(&mut self, kind: DeadlockKind) {
        self.0[kind.index()] += 1;
    }
}

impl fmt::Debug for DeadlockCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for kind in DeadlockKind::ALL {
            m.entry(&kind.name(), &self.get(kind));
        }
        m.finish()
    }
}

/// Result of the expansion-time checks.
pub struct FullCheck {
    pub dead: Option<DeadlockKind>,
    /// Fence boxes of the PI-corral branching may be limited to.
    pub pi_boxes: Option<BoxSet>,
}

#[derive(Clone, Copy)]
struct Limits {
    corral: usize,
    goal_zone: usize,
    generalize: usize,
}

pub struct DeadlockDetector {
    patterns: PatternDb,
    heuristic: Heuristic,
    goal_zone: GoalZone,
    sub: SubSearch,
    counts: DeadlockCounts,
    limits: Limits,
    corral_pruning: bool,
}

impl DeadlockDetector {
    pub fn new(board: &Board, config: &SolverConfig) -> Self {
        DeadlockDetector {
            patterns: PatternDb::new(board.cell_count(), config.max_pattern_boxes),
            heuristic: Heuristic::new(config.effective_weight()),
            goal_zone: GoalZone::new(),
            sub: SubSearch::new(board),
            counts: DeadlockCounts::default(),
            limits: Limits {
                corral: config.corral_node_limit,
                goal_zone: config.goal_zone_node_limit,
                generalize: config.generalize_node_limit,
            },
            corral_pruning: config.corral_pruning,
        }
    }

    pub fn patterns(&self) -> &PatternDb {
        &self.patterns
    }

    pub fn patterns_mut(&mut self) -> &mut PatternDb {
        &mut self.patterns
    }

    pub fn heuristic(&mut self) -> &mut Heuristic {
        &mut self.heuristic
    }

    pub fn counts(&self) -> DeadlockCounts {
        self.counts
    }

    /// Nodes spent in bounded sub-searches so far.
    pub fn subsearch_nodes(&self) -> u64 {
        self.sub.expanded
    }

    pub fn goal_zone_cache(&self) -> usize {
        self.goal_zone.cached()
    }

    /// Static check before a push is even simulated; counts a hit.
    pub fn simple_push_deadlock(&mut self, board: &Board, boxes: &BoxSet, from: Cell, to: Cell) -> bool {
        let dead = simple::push_is_dead(board, boxes, from, to);
        if dead {
            self.counts.bump(DeadlockKind::Simple);
        }
        dead
    }

    /// Generation-time checks on a fresh successor of `parent`. Returns the
    /// raw (unweighted) lower bound when nothing was found.
    ///
    /// `stand` is where the agent stood for the first push of the step,
    /// `parent_reach` the parent's agent region and `child` the normalised
    /// successor key.
    #[allow(clippy::too_many_arguments)]
    pub fn check_incremental(
        &mut self,
        board: &Board,
        parent_reach: &CellSet,
        stand: Cell,
        dir: Direction,
        succ: &Successor,
        child: &StateKey,
        child_reach: &CellSet,
    ) -> Result<u32, DeadlockKind> {
        if !reversible(board, parent_reach, stand, dir, succ, child_reach) {
            if let Some(kind) = self.fresh_box_checks(board, dir, succ, child) {
                self.counts.bump(kind);
                return Err(kind);
            }
        }
        match self.heuristic.lower_bound(board, &child.boxes) {
            Some(h) => Ok(h),
            None => {
                self.counts.bump(DeadlockKind::Matching);
                Err(DeadlockKind::Matching)
            }
        }
    }

    fn fresh_box_checks(
        &mut self,
        board: &Board,
        dir: Direction,
        succ: &Successor,
        child: &StateKey,
    ) -> Option<DeadlockKind> {
        if self.patterns.matches_near(succ.agent, dir, &succ.boxes) {
            return Some(DeadlockKind::Pattern);
        }
        let freeze = frozen::examine(board, &succ.boxes, succ.box_to);
        if freeze.is_deadlock(board) {
            self.learn(board, child.agent, freeze.involved);
            return Some(DeadlockKind::Frozen);
        }
        if freeze.frozen && board.is_goal(succ.box_to) {
            let fixed = frozen::all_frozen(board, &succ.boxes);
            if !frozen::matchable_around(board, &succ.boxes, &fixed) {
                return Some(DeadlockKind::Matching);
            }
        }
        None
    }

    /// Expansion-time checks on a popped state.
    pub fn check_full(&mut self, board: &Board, key: &StateKey, reach: &CellSet) -> FullCheck {
        let mut out = FullCheck {
            dead: None,
            pi_boxes: None,
        };
        if key.is_solved(board) {
            return out;
        }
        if self.patterns.matches(key) {
            self.counts.bump(DeadlockKind::Pattern);
            out.dead = Some(DeadlockKind::Pattern);
            return out;
        }
        if self.goal_zone.is_dead(board, key, self.limits.goal_zone) {
            // The verdict covers this box set only: a superset may already
            // fill the goals the zone shuts off. Every reduction is re-proved.
            self.learn(board, key.agent, key.boxes);
            self.counts.bump(DeadlockKind::GoalZone);
            out.dead = Some(DeadlockKind::GoalZone);
            return out;
        }

        let corrals = corral::find(board, key, reach);
        if let Some(c) = corral::proof_candidate(&corrals) {
            if self.corral_is_dead(board, key, c) {
                self.counts.bump(DeadlockKind::Corral);
                out.dead = Some(DeadlockKind::Corral);
                return out;
            }
        }
        if self.corral_pruning {
            out.pi_boxes = corral::smallest_pi(&corrals).map(|c| c.boxes);
        }
        out
    }

    fn corral_is_dead(&mut self, board: &Board, key: &StateKey, c: &Corral) -> bool {
        if c.boxes.len() >= key.boxes.len() || c.boxes.len() > self.patterns.max_boxes() {
            return false;
        }
        let verdict = self
            .sub
            .prove(board, Some(&self.patterns), key.agent, c.boxes, self.limits.corral);
        if verdict != Verdict::Dead {
            return false;
        }
        self.learn(board, key.agent, c.boxes);
        true
    }

    /// Tries to show that `boxes` alone, agent on `agent`, is already dead.
    /// On success the (generalised) configuration is learned.
    pub fn prove_and_learn(&mut self, board: &Board, agent: Cell, boxes: BoxSet, limit: usize) -> bool {
        if boxes.is_empty() || boxes.len() > 2 * self.patterns.max_boxes() {
            return false;
        }
        let probe = StateKey::normalized(board, agent, boxes);
        if self.patterns.matches(&probe) {
            return false;
        }
        if self.sub.prove(board, Some(&self.patterns), agent, boxes, limit) != Verdict::Dead {
            return false;
        }
        self.learn(board, agent, boxes)
    }

    /// Shrinks a known-dead configuration one box at a time while it stays
    /// provably dead, then stores it.
    fn learn(&mut self, board: &Board, agent: Cell, boxes: BoxSet) -> bool {
        let mut kept = boxes;
        for b in boxes.iter() {
            if kept.len() <= 1 {
                break;
            }
            let mut trial = kept;
            trial.remove(b);
            if self.reduced_is_dead(board, agent, trial) {
                kept = trial;
            }
        }
        self.store(board, agent, kept)
    }

    fn reduced_is_dead(&mut self, board: &Board, agent: Cell, boxes: BoxSet) -> bool {
        let key = StateKey::normalized(board, agent, boxes);
        if self.patterns.matches(&key) || self.heuristic.lower_bound(board, &boxes).is_none() {
            return true;
        }
        if boxes
            .iter()
            .any(|b| frozen::examine(board, &boxes, b as Cell).is_deadlock(board))
        {
            return true;
        }
        self.sub
            .prove(board, Some(&self.patterns), agent, boxes, self.limits.generalize)
            == Verdict::Dead
    }

    /// Inserts `(boxes, reach)` and its symmetric images.
    fn store(&mut self, board: &Board, agent: Cell, boxes: BoxSet) -> bool {
        let reach = board.reach(agent, &boxes);
        if !self.patterns.insert(board, boxes, reach) {
            return false;
        }
        let syms = board.symmetries();
        for i in 0..syms.len() {
            let sym = syms.get(i);
            let image = sym.map_boxes(&boxes);
            let image_reach: CellSet = reach.iter().map(|c| sym.map_cell(c as Cell) as usize).collect();
            self.patterns.insert(board, image, image_reach);
        }
        debug!(patterns = self.patterns.len(), "pattern database grew");
        true
    }
}

/// The step can be taken straight back: the agent can get round to the far
/// side of the box and the parent region already contained the box's new
/// square. Parent and child are then mutually reachable, so the child is
/// dead only if the parent is.
fn reversible(
    board: &Board,
    parent_reach: &CellSet,
    stand: Cell,
    dir: Direction,
    succ: &Successor,
    child_reach: &CellSet,
) -> bool {
    if succ.pushes != 1 || !parent_reach.contains(stand as usize) {
        return false;
    }
    let Some(beyond) = board.neighbor(succ.box_to, dir) else {
        return false;
    };
    child_reach.contains(beyond as usize) && parent_reach.contains(succ.box_to as usize)
}
