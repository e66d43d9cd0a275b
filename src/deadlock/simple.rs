//! Static-table checks: dead squares and 2x2 blocks of boxes and walls.

use crate::bits::BoxSet;
use crate::board::{Board, Cell, Direction};

/// Pushing a box onto `to` leaves it stuck for good: either no goal can be
/// reached from there, or it closes a 2x2 block with a box off its goal.
pub fn push_is_dead(board: &Board, boxes: &BoxSet, from: Cell, to: Cell) -> bool {
    if !board.is_alive(to) {
        return true;
    }
    let mut after = *boxes;
    after.remove(from as usize);
    after.insert(to as usize);
    frozen_square(board, &after, to)
}

/// Some 2x2 block around the box on `cell` is made only of walls and boxes,
/// and at least one of those boxes is off goal.
pub fn frozen_square(board: &Board, boxes: &BoxSet, cell: Cell) -> bool {
    let blocked = |c: Option<Cell>| c.map_or(true, |c| boxes.contains(c as usize));
    let off_goal = |c: Option<Cell>| c.is_some_and(|c| boxes.contains(c as usize) && !board.is_goal(c));

    for v in [Direction::Up, Direction::Down] {
        for h in [Direction::Left, Direction::Right] {
            let a = board.neighbor(cell, v);
            let b = board.neighbor(cell, h);
            if !blocked(a) || !blocked(b) {
                continue;
            }
            let diag = match (a, b) {
                (Some(a), _) => board.neighbor(a, h),
                (None, Some(b)) => board.neighbor(b, v),
                // Corner: the box cannot move at all.
                (None, None) => None,
            };
            if !blocked(diag) {
                continue;
            }
            if [Some(cell), a, b, diag].into_iter().any(off_goal) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;

    #[test]
    fn corner_is_dead() {
        let b = board(
            "######\n\
             #    #\n\
             # $ .#\n\
             #@   #\n\
             ######",
        );
        let cell = |r, c| b.cell_at(Point::new(r, c)).unwrap();
        // (2,1) hugs the left wall and never reaches the goal row's end.
        assert!(push_is_dead(&b, b.start_boxes(), cell(2, 2), cell(2, 1)));
        assert!(!push_is_dead(&b, b.start_boxes(), cell(2, 2), cell(2, 3)));
    }

    #[test]
    fn two_boxes_on_a_wall_freeze() {
        let b = board(
            "#######\n\
             #     #\n\
             # $$  #\n\
             #  .. #\n\
             #  @  #\n\
             #######",
        );
        let cell = |r, c| b.cell_at(Point::new(r, c)).unwrap() as usize;
        let mut boxes = BoxSet::new();
        boxes.insert(cell(1, 2));
        boxes.insert(cell(1, 3));
        // Side by side against the top wall.
        assert!(frozen_square(&b, &boxes, cell(1, 2) as Cell));
        let apart: BoxSet = [cell(2, 2), cell(2, 4)].into_iter().collect();
        assert!(!frozen_square(&b, &apart, cell(2, 2) as Cell));
    }
}
