//! Freeze analysis: boxes that can never move again.
//!
//! A box is blocked along an axis when a wall sits on either side, when both
//! sides are dead squares, or when a neighbouring box on that axis is itself
//! frozen. Boxes already under examination count as walls, which bounds the
//! recursion by the number of boxes.

use smallvec::SmallVec;

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, Direction, DIRECTIONS};
use crate::matching::max_matching;

/// Outcome of examining one box.
pub struct Freeze {
    pub frozen: bool,
    /// Boxes whose state the verdict depends on.
    pub involved: BoxSet,
    /// Boxes proved frozen along the way.
    pub stuck: BoxSet,
}

impl Freeze {
    /// Some frozen box in the group is off its goal.
    pub fn is_deadlock(&self, board: &Board) -> bool {
        self.frozen && !self.stuck.is_subset(board.goal_set())
    }
}

pub fn examine(board: &Board, boxes: &BoxSet, cell: Cell) -> Freeze {
    let mut involved = BoxSet::new();
    let mut stuck = BoxSet::new();
    let frozen = is_frozen(board, boxes, cell, &mut involved, &mut stuck);
    Freeze {
        frozen,
        involved,
        stuck,
    }
}

/// Every box frozen on the board right now.
pub fn all_frozen(board: &Board, boxes: &BoxSet) -> BoxSet {
    let mut out = BoxSet::new();
    for cell in boxes.iter() {
        if out.contains(cell) {
            continue;
        }
        let f = examine(board, boxes, cell as Cell);
        if f.frozen {
            out = out.union(&f.stuck);
        }
    }
    out
}

fn is_frozen(board: &Board, boxes: &BoxSet, cell: Cell, involved: &mut BoxSet, stuck: &mut BoxSet) -> bool {
    involved.insert(cell as usize);
    let frozen = axis_blocked(board, boxes, cell, Direction::Up, involved, stuck)
        && axis_blocked(board, boxes, cell, Direction::Left, involved, stuck);
    if frozen {
        stuck.insert(cell as usize);
    }
    frozen
}

fn axis_blocked(
    board: &Board,
    boxes: &BoxSet,
    cell: Cell,
    dir: Direction,
    involved: &mut BoxSet,
    stuck: &mut BoxSet,
) -> bool {
    let (Some(a), Some(b)) = (board.neighbor(cell, dir), board.neighbor(cell, dir.reverse())) else {
        return true;
    };
    if !board.is_alive(a) && !board.is_alive(b) {
        return true;
    }
    for side in [a, b] {
        if !boxes.contains(side as usize) {
            continue;
        }
        if involved.contains(side as usize) || is_frozen(board, boxes, side, involved, stuck) {
            return true;
        }
    }
    false
}

/// Can the movable boxes still be matched to distinct free goals once the
/// boxes in `fixed` are treated as walls?
pub fn matchable_around(board: &Board, boxes: &BoxSet, fixed: &BoxSet) -> bool {
    let movable: SmallVec<[Cell; 32]> = boxes.difference(fixed).iter().map(|c| c as Cell).collect();
    let goals: SmallVec<[Cell; 32]> = board
        .goals()
        .iter()
        .copied()
        .filter(|g| !fixed.contains(*g as usize))
        .collect();
    if movable.len() > goals.len() {
        return false;
    }
    let reachable: Vec<CellSet> = movable
        .iter()
        .map(|&c| push_closure(board, c, fixed))
        .collect();
    let matched = max_matching(movable.len(), goals.len(), |b, g| {
        reachable[b].contains(goals[g] as usize)
    });
    matched == movable.len()
}

/// Cells a lone box on `from` can be pushed to with `walls` added.
fn push_closure(board: &Board, from: Cell, walls: &BoxSet) -> CellSet {
    let free = |c: Cell| !walls.contains(c as usize);
    let mut seen = CellSet::new();
    let mut stack: SmallVec<[Cell; 64]> = SmallVec::new();
    seen.insert(from as usize);
    stack.push(from);
    while let Some(cur) = stack.pop() {
        for dir in DIRECTIONS {
            let Some(to) = board.neighbor(cur, dir) else { continue };
            let Some(stand) = board.neighbor(cur, dir.reverse()) else { continue };
            if board.is_alive(to) && free(to) && free(stand) && !seen.contains(to as usize) {
                seen.insert(to as usize);
                stack.push(to);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;

    #[test]
    fn boxes_along_a_wall_freeze_each_other() {
        let b = board(
            "#######\n\
             #     #\n\
             # $$  #\n\
             #  .. #\n\
             #  @  #\n\
             #######",
        );
        let cell = |r, c| b.cell_at(Point::new(r, c)).unwrap() as usize;
        let boxes: BoxSet = [cell(1, 2), cell(1, 3)].into_iter().collect();
        let f = examine(&b, &boxes, cell(1, 2) as Cell);
        assert!(f.frozen);
        assert!(f.is_deadlock(&b));
        assert!(f.stuck.contains(cell(1, 2)));

        // In open floor nothing is frozen.
        let f = examine(&b, b.start_boxes(), cell(2, 2) as Cell);
        assert!(!f.frozen);
        assert!(all_frozen(&b, b.start_boxes()).is_empty());
    }

    #[test]
    fn box_frozen_on_goal_is_not_a_deadlock_alone() {
        let b = board(
            "######\n\
             #*   #\n\
             # $ .#\n\
             #@   #\n\
             ######",
        );
        let corner = b.cell_at(Point::new(1, 1)).unwrap();
        let f = examine(&b, b.start_boxes(), corner);
        assert!(f.frozen);
        assert!(!f.is_deadlock(&b));
        let fixed = all_frozen(&b, b.start_boxes());
        assert!(fixed.contains(corner as usize));
        assert!(matchable_around(&b, b.start_boxes(), &fixed));
    }

    #[test]
    fn goal_sealed_by_a_frozen_box_breaks_matching() {
        // With the box on (1,2) fixed in place, nothing can be pushed into
        // the corner goal at (1,1) any more.
        let b = board(
            "######\n\
             #.*  #\n\
             ##   #\n\
             # $  #\n\
             #  @ #\n\
             ######",
        );
        let cell = |r, c| b.cell_at(Point::new(r, c)).unwrap() as usize;
        let fixed: BoxSet = [cell(1, 2)].into_iter().collect();
        assert!(!matchable_around(&b, b.start_boxes(), &fixed));
        assert!(matchable_around(&b, b.start_boxes(), &BoxSet::new()));
    }
}
