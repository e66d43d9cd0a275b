//! Bounded exhaustive search over a reduced box configuration.
//!
//! Shared proof engine for corral, unstuck and pattern generalisation probes.
//! The configuration may hold fewer boxes than there are goals; it counts as
//! solved once every box stands on a goal. If no such position is reachable
//! the configuration, and every superset of it with the agent in the same
//! region, is dead.

use std::collections::VecDeque;

use crate::bits::BoxSet;
use crate::board::{Board, Cell, DIRECTIONS};
use crate::deadlock::simple;
use crate::heuristic::Heuristic;
use crate::pattern::PatternDb;
use crate::state::{push, StateKey};
use crate::store::{Growth, PackedSet, StateStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
    /// Exhausted without reaching a solved position.
    Dead,
    /// Reached a position with every box on a goal.
    Alive,
    /// Ran out of node budget first.
    Unknown,
}

pub struct SubSearch {
    visited: PackedSet,
    queue: VecDeque<StateKey>,
    heuristic: Heuristic,
    /// Nodes expanded over the lifetime of this engine.
    pub expanded: u64,
}

impl SubSearch {
    pub fn new(board: &Board) -> Self {
        SubSearch {
            visited: PackedSet::new(board.cell_count(), board.box_words(), Growth::sequential()),
            queue: VecDeque::new(),
            heuristic: Heuristic::new(1.0),
            expanded: 0,
        }
    }

    /// Breadth-first over pushes of `boxes` starting with the agent on
    /// `agent`, expanding at most `limit` positions.
    pub fn prove(
        &mut self,
        board: &Board,
        patterns: Option<&PatternDb>,
        agent: Cell,
        boxes: BoxSet,
        limit: usize,
    ) -> Verdict {
        let start = StateKey::normalized(board, agent, boxes);
        if start.is_solved(board) {
            return Verdict::Alive;
        }
        if self.pruned(board, patterns, &start) {
            return Verdict::Dead;
        }
        self.visited.clear();
        self.queue.clear();
        if self.visited.insert(&start, ()).is_err() {
            return Verdict::Unknown;
        }
        self.queue.push_back(start);

        let mut budget = limit;
        while let Some(key) = self.queue.pop_front() {
            if budget == 0 {
                return Verdict::Unknown;
            }
            budget -= 1;
            self.expanded += 1;

            let reach = board.reach(key.agent, &key.boxes);
            for bx in key.boxes.iter() {
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
                    if key.boxes.contains(to as usize) || simple::push_is_dead(board, &key.boxes, bx, to) {
                        continue;
                    }
                    let Some(succ) = push(board, &key.boxes, bx, dir, false) else {
                        continue;
                    };
                    let child = StateKey::normalized(board, succ.agent, succ.boxes);
                    if child.is_solved(board) {
                        return Verdict::Alive;
                    }
                    match self.visited.insert(&child, ()) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(_) => return Verdict::Unknown,
                    }
                    if !self.pruned(board, patterns, &child) {
                        self.queue.push_back(child);
                    }
                }
            }
        }
        Verdict::Dead
    }

    fn pruned(&mut self, board: &Board, patterns: Option<&PatternDb>, key: &StateKey) -> bool {
        if patterns.is_some_and(|db| db.matches(key)) {
            return true;
        }
        self.heuristic.lower_bound(board, &key.boxes).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;

    #[test]
    fn finds_a_solution_when_one_exists() {
        let b = board(
            "#######\n\
             #     #\n\
             # $$  #\n\
             #  .. #\n\
             #  @  #\n\
             #######",
        );
        let mut sub = SubSearch::new(&b);
        let v = sub.prove(&b, None, b.start_agent(), *b.start_boxes(), 10_000);
        assert_eq!(v, Verdict::Alive);
    }

    #[test]
    fn proves_a_sealed_pocket_dead() {
        // With the agent shut in the top-left pocket, the two upper boxes can
        // only go right and nothing can ever reach the goal at (3,4).
        let b = board(
            "######\n\
             #  $.#\n\
             #  $.#\n\
             ##$#.#\n\
             # @  #\n\
             ######",
        );
        let pocket = b.cell_at(Point::new(1, 1)).unwrap();
        let mut sub = SubSearch::new(&b);
        let v = sub.prove(&b, None, pocket, *b.start_boxes(), 10_000);
        assert_eq!(v, Verdict::Dead);
        assert!(sub.expanded >= 3);
    }

    #[test]
    fn budget_exhaustion_is_unknown() {
        let b = board(
            "#########\n\
             #       #\n\
             # $ $ $ #\n\
             #  ...  #\n\
             #   @   #\n\
             #########",
        );
        let mut sub = SubSearch::new(&b);
        let v = sub.prove(&b, None, b.start_agent(), *b.start_boxes(), 1);
        assert_eq!(v, Verdict::Unknown);
    }
}
