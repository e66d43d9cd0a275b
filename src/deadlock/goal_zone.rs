//! Goal-zone check: can the boxes already parked on goals get out of each
//! other's way for the goals that are still empty?
//!
//! Only the on-goal boxes are kept. A bounded breadth-first search moves them
//! around, and each empty goal must, in at least one reached position, either
//! hold one of those boxes or be fillable from outside: the goal and the cell
//! before it free, with the agent able to stand one further back. If the
//! search runs to completion and some goal never qualifies, no box can ever
//! be put there and the state is dead.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, DIRECTIONS};
use crate::state::{normalize, push, StateKey};

pub struct GoalZone {
    memo: FxHashMap<StateKey, bool>,
    queue: VecDeque<StateKey>,
    seen: FxHashSet<StateKey>,
    pub hits: u64,
}

impl GoalZone {
    pub fn new() -> Self {
        GoalZone {
            memo: FxHashMap::default(),
            queue: VecDeque::new(),
            seen: FxHashSet::default(),
            hits: 0,
        }
    }

    pub fn cached(&self) -> usize {
        self.memo.len()
    }

    /// The on-goal boxes of `key`, or `None` when the check has nothing to
    /// say (no box on a goal, or no goal left empty).
    pub fn zone(board: &Board, key: &StateKey) -> Option<BoxSet> {
        let on_goal = key.boxes.intersection(board.goal_set());
        if on_goal.is_empty() || on_goal.len() == board.goals().len() {
            return None;
        }
        Some(on_goal)
    }

    /// True when the boxes on goals, with the agent in `key`'s region, rule
    /// out filling the remaining goals.
    pub fn is_dead(&mut self, board: &Board, key: &StateKey, limit: usize) -> bool {
        let Some(zone) = Self::zone(board, key) else {
            return false;
        };
        let start = StateKey::normalized(board, key.agent, zone);
        if let Some(&dead) = self.memo.get(&start) {
            self.hits += 1;
            return dead;
        }
        let dead = self.search(board, start, limit);
        self.memo.insert(start, dead);
        dead
    }

    fn search(&mut self, board: &Board, start: StateKey, limit: usize) -> bool {
        let goals = *board.goal_set();
        let mut pending = goals.difference(&start.boxes);

        self.queue.clear();
        self.seen.clear();
        self.seen.insert(start);
        self.queue.push_back(start);
        let mut budget = limit;

        while let Some(key) = self.queue.pop_front() {
            if budget == 0 {
                return false;
            }
            budget -= 1;

            let reach = board.reach(key.agent, &key.boxes);
            pending = pending.difference(&key.boxes);
            pending = pending.difference(&fillable(board, &key.boxes, &reach, &pending));
            if pending.is_empty() {
                return false;
            }

            for bx in key.boxes.iter() {
                let bx = bx as Cell;
                for dir in DIRECTIONS {
                    let Some(stand) = board.neighbor(bx, dir.reverse()) else {
                        continue;
                    };
                    if !reach.contains(stand as usize) {
                        continue;
                    }
                    let Some(succ) = push(board, &key.boxes, bx, dir, false) else {
                        continue;
                    };
                    let (child, _) = normalize(board, succ.agent, succ.boxes);
                    if self.seen.insert(child) {
                        self.queue.push_back(child);
                    }
                }
            }
        }
        true
    }
}

impl Default for GoalZone {
    fn default() -> Self {
        Self::new()
    }
}

/// Goals among `pending` that a box from outside could be pushed onto now.
fn fillable(board: &Board, boxes: &BoxSet, reach: &CellSet, pending: &BoxSet) -> BoxSet {
    let mut out = BoxSet::new();
    for goal in pending.iter() {
        let goal = goal as Cell;
        if boxes.contains(goal as usize) {
            continue;
        }
        let ok = DIRECTIONS.iter().any(|&dir| {
            let back = dir.reverse();
            let Some(before) = board.neighbor(goal, back) else {
                return false;
            };
            let Some(stand) = board.neighbor(before, back) else {
                return false;
            };
            board.is_alive(before) && !boxes.contains(before as usize) && reach.contains(stand as usize)
        });
        if ok {
            out.insert(goal as usize);
        }
    }
    out
}
