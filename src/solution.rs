//! Turning a solved search back into moves.
//!
//! Closed stores canonical keys, so the chain found by walking payloads
//! backwards is a chain of symmetry classes. The concrete solution is then
//! replayed forward from the real start: at each step the push whose result
//! falls in the next class is taken, and the agent walk to it is filled in.

use std::fmt;

use smallvec::SmallVec;

use crate::bits::BoxSet;
use crate::board::{Board, Cell, Direction, DIRECTIONS};
use crate::state::{canonical_of, push, undo, Payload, StateKey};
use crate::store::{PackedMap, StateStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushStep {
    /// Agent moves before the push, not touching any box.
    pub walk: SmallVec<[Direction; 32]>,
    pub box_from: Cell,
    pub dir: Direction,
    /// More than one for a tunnel macro.
    pub pushes: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Solution {
    pub steps: Vec<PushStep>,
    pub pushes: u32,
}

impl Solution {
    pub fn moves(&self) -> usize {
        self.steps
            .iter()
            .map(|s| s.walk.len() + s.pushes as usize)
            .sum()
    }

    /// LURD text: lowercase for walking, uppercase for pushing.
    pub fn lurd(&self) -> String {
        let mut out = String::with_capacity(self.moves());
        for step in &self.steps {
            out.extend(step.walk.iter().map(|d| d.to_char(false)));
            for _ in 0..step.pushes {
                out.push(step.dir.to_char(true));
            }
        }
        out
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lurd())
    }
}

/// Canonical keys from the start class to `goal`, read off Closed.
pub fn backtrack(board: &Board, closed: &PackedMap, goal: StateKey, payload: Payload) -> Option<Vec<StateKey>> {
    let mut chain = vec![goal];
    let (mut key, mut payload) = (goal, payload);
    while !payload.is_start() {
        let parent = undo(board, &key, &payload)?;
        let canon = canonical_of(board, parent.agent, parent.boxes);
        let prev = closed.get(&canon)?;
        // Distances strictly fall along the chain, so this terminates.
        debug_assert!(prev.dist < payload.dist);
        key = canon;
        payload = prev;
        chain.push(key);
    }
    chain.reverse();
    Some(chain)
}

/// Concrete pushes from the board's start through the classes in `chain`.
pub fn replay(board: &Board, chain: &[StateKey], tunnels: bool) -> Option<Solution> {
    let mut agent = board.start_agent();
    let mut boxes = *board.start_boxes();
    if chain.first() != Some(&canonical_of(board, agent, boxes)) {
        return None;
    }

    let mut solution = Solution::default();
    for target in &chain[1..] {
        let (step, next_agent, next_boxes) = step_into(board, agent, &boxes, target, tunnels)?;
        solution.pushes += step.pushes as u32;
        solution.steps.push(step);
        agent = next_agent;
        boxes = next_boxes;
    }
    Some(solution)
}

fn step_into(
    board: &Board,
    agent: Cell,
    boxes: &BoxSet,
    target: &StateKey,
    tunnels: bool,
) -> Option<(PushStep, Cell, BoxSet)> {
    let reach = board.reach(agent, boxes);
    for bx in boxes.iter() {
        let bx = bx as Cell;
        for dir in DIRECTIONS {
            let Some(stand) = board.neighbor(bx, dir.reverse()) else {
                continue;
            };
            if !reach.contains(stand as usize) {
                continue;
            }
            let Some(succ) = push(board, boxes, bx, dir, tunnels) else {
                continue;
            };
            if canonical_of(board, succ.agent, succ.boxes) != *target {
                continue;
            }
            let walk = board.walk(agent, stand, boxes)?;
            let step = PushStep {
                walk,
                box_from: bx,
                dir,
                pushes: succ.pushes,
            };
            return Some((step, succ.agent, succ.boxes));
        }
    }
    None
}

/// Backtrack then replay.
pub fn reconstruct(
    board: &Board,
    closed: &PackedMap,
    goal: StateKey,
    payload: Payload,
    tunnels: bool,
) -> Option<Solution> {
    let chain = backtrack(board, closed, goal, payload)?;
    replay(board, &chain, tunnels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;

    #[test]
    fn lurd_marks_pushes_in_uppercase() {
        let sol = Solution {
            steps: vec![
                PushStep {
                    walk: SmallVec::from_slice(&[Direction::Down, Direction::Right]),
                    box_from: 0,
                    dir: Direction::Up,
                    pushes: 2,
                },
                PushStep {
                    walk: SmallVec::new(),
                    box_from: 1,
                    dir: Direction::Left,
                    pushes: 1,
                },
            ],
            pushes: 3,
        };
        assert_eq!(sol.lurd(), "drUUL");
        assert_eq!(sol.moves(), 5);
        assert_eq!(sol.to_string(), "drUUL");
    }

    #[test]
    fn replay_follows_a_chain_of_classes() {
        let b = board("#######\n#@ $ .#\n#######");
        let from = b.cell_at(Point::new(1, 3)).unwrap();
        let start = canonical_of(&b, b.start_agent(), *b.start_boxes());
        let succ = push(&b, b.start_boxes(), from, Direction::Right, false).unwrap();
        let mid = canonical_of(&b, succ.agent, succ.boxes);
        let last = push(&b, &succ.boxes, succ.box_to, Direction::Right, false).unwrap();
        let goal = canonical_of(&b, last.agent, last.boxes);

        let sol = replay(&b, &[start, mid, goal], false).unwrap();
        assert_eq!(sol.pushes, 2);
        assert_eq!(sol.lurd(), "rRR");

        // Start class mismatch.
        assert!(replay(&b, &[mid, goal], false).is_none());
    }
}
