//! Corrals: floor the agent cannot reach without first pushing a box.
//!
//! Each connected piece of unreached free floor is fenced by the boxes next
//! to it; pieces sharing a fence box are merged. A corral is a PI-corral when
//! every push the agent can make on its fence goes into it (I) and the agent
//! can already make every push into it (P). Such a corral has to be dealt
//! with before anything else matters, so branching may be limited to its
//! fence boxes without losing solutions.

use smallvec::SmallVec;

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, DIRECTIONS};
use crate::state::StateKey;

#[derive(Clone, Debug)]
pub struct Corral {
    pub cells: CellSet,
    pub boxes: BoxSet,
    pub pi: bool,
    /// All fence boxes on goals and no goal inside: nothing left to do here.
    pub solved: bool,
    /// Pushes available right now on fence boxes.
    pub pushes: usize,
}

pub fn find(board: &Board, key: &StateKey, reach: &CellSet) -> SmallVec<[Corral; 4]> {
    let mut assigned = *reach;
    for b in key.boxes.iter() {
        assigned.insert(b);
    }

    let mut pieces: SmallVec<[(CellSet, BoxSet); 4]> = SmallVec::new();
    let mut stack: SmallVec<[Cell; 64]> = SmallVec::new();
    for start in 0..board.cell_count() {
        if assigned.contains(start) {
            continue;
        }
        let mut cells = CellSet::new();
        let mut fence = BoxSet::new();
        assigned.insert(start);
        cells.insert(start);
        stack.push(start as Cell);
        while let Some(cur) = stack.pop() {
            for dir in DIRECTIONS {
                let Some(next) = board.neighbor(cur, dir) else {
                    continue;
                };
                let n = next as usize;
                if key.boxes.contains(n) {
                    fence.insert(n);
                } else if !assigned.contains(n) {
                    assigned.insert(n);
                    cells.insert(n);
                    stack.push(next);
                }
            }
        }
        pieces.push((cells, fence));
    }

    // Merge pieces that share a fence box.
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..pieces.len() {
            for j in i + 1..pieces.len() {
                if pieces[i].1.intersects(&pieces[j].1) {
                    let (cells, fence) = pieces.swap_remove(j);
                    pieces[i].0 = pieces[i].0.union(&cells);
                    pieces[i].1 = pieces[i].1.union(&fence);
                    merged = true;
                    break 'outer;
                }
            }
        }
    }

    pieces
        .into_iter()
        .filter(|(_, fence)| !fence.is_empty())
        .map(|(cells, boxes)| classify(board, key, reach, cells, boxes))
        .collect()
}

fn classify(board: &Board, key: &StateKey, reach: &CellSet, cells: CellSet, boxes: BoxSet) -> Corral {
    let mut inward_only = true;
    let mut all_reachable = true;
    let mut pushes = 0;
    for b in boxes.iter() {
        let b = b as Cell;
        for dir in DIRECTIONS {
            let (Some(stand), Some(to)) = (board.neighbor(b, dir.reverse()), board.neighbor(b, dir)) else {
                continue;
            };
            if key.boxes.contains(to as usize) || !board.is_alive(to) {
                continue;
            }
            let into = cells.contains(to as usize);
            let can = reach.contains(stand as usize);
            if can {
                pushes += 1;
                if !into {
                    inward_only = false;
                }
            } else if into {
                all_reachable = false;
            }
        }
    }
    let goal_inside = board.goals().iter().any(|&g| cells.contains(g as usize));
    let solved = boxes.is_subset(board.goal_set()) && !goal_inside;
    Corral {
        cells,
        boxes,
        pi: inward_only && all_reachable && pushes > 0,
        solved,
        pushes,
    }
}

/// The unsolved PI-corral with the fewest fence boxes.
pub fn smallest_pi(corrals: &[Corral]) -> Option<&Corral> {
    corrals
        .iter()
        .filter(|c| c.pi && !c.solved)
        .min_by_key(|c| c.boxes.len())
}

/// Best candidate for a dead-corral proof: the smallest unsolved corral,
/// PI-corrals first.
pub fn proof_candidate(corrals: &[Corral]) -> Option<&Corral> {
    smallest_pi(corrals).or_else(|| {
        corrals
            .iter()
            .filter(|c| !c.solved)
            .min_by_key(|c| c.boxes.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;
    use crate::state::normalize;

    #[test]
    fn open_board_has_no_corral() {
        let b = board(
            "#######\n\
             #     #\n\
             # $ . #\n\
             #  @  #\n\
             #######",
        );
        let (key, reach) = normalize(&b, b.start_agent(), *b.start_boxes());
        assert!(find(&b, &key, &reach).is_empty());
    }

    #[test]
    fn fenced_pocket_is_a_pi_corral() {
        // The box fences off the right end of the corridor, and the agent
        // can push it in from the left.
        let b = board("#######\n#@ $ .#\n#######");
        let (key, reach) = normalize(&b, b.start_agent(), *b.start_boxes());
        let corrals = find(&b, &key, &reach);
        let pi = smallest_pi(&corrals).expect("pi corral");
        let fence = b.cell_at(Point::new(1, 3)).unwrap() as usize;
        assert!(pi.boxes.contains(fence));
        assert!(pi.cells.contains(b.cell_at(Point::new(1, 5)).unwrap() as usize));
        assert_eq!(pi.pushes, 1);
        assert!(!pi.solved);
        assert!(proof_candidate(&corrals).is_some());
    }
}
