//! Learned deadlock patterns.
//!
//! A pattern `(B, R)` says: any state whose boxes include `B` and whose agent
//! stands inside `R` is dead. `R` is the agent region around `B` alone, so
//! extra boxes can only shrink the real region and the verdict still holds.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, Direction, DIRECTIONS};
use crate::state::StateKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub boxes: BoxSet,
    pub reach: CellSet,
}

impl Pattern {
    #[inline]
    pub fn matches(&self, key: &StateKey) -> bool {
        self.reach.contains(key.agent as usize) && self.boxes.is_subset(&key.boxes)
    }
}

pub struct PatternDb {
    patterns: Vec<Pattern>,
    // [agent cell][box count] -> box masks of patterns whose region holds the cell
    buckets: Vec<Vec<Vec<BoxSet>>>,
    // (agent cell * 4 + dir) -> ids of patterns with a box one step away in dir
    near: FxHashMap<u32, SmallVec<[u32; 4]>>,
    fresh: Vec<u32>,
    max_boxes: usize,
}

impl PatternDb {
    pub fn new(cells: usize, max_boxes: usize) -> Self {
        PatternDb {
            patterns: Vec::new(),
            buckets: vec![Vec::new(); cells],
            near: FxHashMap::default(),
            fresh: Vec::new(),
            max_boxes,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn max_boxes(&self) -> usize {
        self.max_boxes
    }

    /// Stores a pattern unless it is too large or already implied by one we
    /// have. `reach` must be the agent region computed with `boxes` only.
    pub fn insert(&mut self, board: &Board, boxes: BoxSet, reach: CellSet) -> bool {
        let count = boxes.len();
        if count == 0 || count > self.max_boxes {
            return false;
        }
        let Some(anchor) = reach.first() else {
            return false;
        };
        let probe = StateKey {
            agent: anchor as Cell,
            boxes,
        };
        if self.matches(&probe) {
            return false;
        }

        let id = self.patterns.len() as u32;
        for cell in reach.iter() {
            let per_count = &mut self.buckets[cell];
            if per_count.len() <= count {
                per_count.resize_with(count + 1, Vec::new);
            }
            per_count[count].push(boxes);
            for dir in DIRECTIONS {
                if let Some(next) = board.neighbor(cell as Cell, dir) {
                    if boxes.contains(next as usize) {
                        self.near
                            .entry(near_slot(cell as Cell, dir))
                            .or_default()
                            .push(id);
                    }
                }
            }
        }
        debug!(id, boxes = count, region = reach.len(), "deadlock pattern learned");
        self.patterns.push(Pattern { boxes, reach });
        self.fresh.push(id);
        true
    }

    /// Any pattern matching the state, agent taken as `key.agent`.
    pub fn matches(&self, key: &StateKey) -> bool {
        let Some(per_count) = self.buckets.get(key.agent as usize) else {
            return false;
        };
        let have = key.boxes.len();
        per_count
            .iter()
            .take(have + 1)
            .flatten()
            .any(|b| b.is_subset(&key.boxes))
    }

    /// Patterns involving the box the agent at `agent` just pushed in `dir`.
    pub fn matches_near(&self, agent: Cell, dir: Direction, boxes: &BoxSet) -> bool {
        self.near.get(&near_slot(agent, dir)).is_some_and(|ids| {
            ids.iter()
                .any(|&id| self.patterns[id as usize].boxes.is_subset(boxes))
        })
    }

    /// Patterns learned since the last call.
    pub fn take_fresh(&mut self) -> Vec<Pattern> {
        self.fresh
            .drain(..)
            .map(|id| self.patterns[id as usize].clone())
            .collect()
    }

    pub fn has_fresh(&self) -> bool {
        !self.fresh.is_empty()
    }
}

#[inline(always)]
fn near_slot(cell: Cell, dir: Direction) -> u32 {
    cell as u32 * 4 + dir.index() as u32
}
