//! Static board model.
//!
//! Built once per puzzle and never mutated afterwards. Cells are the squares
//! the agent can walk on; alive cells (those from which some goal can still be
//! reached by pushing) are numbered first so box sets index by cell id.

mod graph;
pub mod symmetry;

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::info;

use crate::bits::{BoxSet, CellSet, MAX_ALIVE, MAX_CELLS};
use crate::error::BoardError;
use crate::level::{Level, Point, TILE_GOAL};
use crate::matching::max_matching;

pub use symmetry::{Symmetries, Symmetry};

pub type Cell = u16;

pub const NO_ROOM: u16 = u16::MAX;
pub const INF_DIST: u16 = u16::MAX;

const DIR_OFFSETS: [(i16, i16); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const DIR_CHARS: [char; 4] = ['u', 'd', 'l', 'r'];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

pub const DIRECTIONS: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

impl Direction {
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub fn from_index(idx: usize) -> Direction {
        DIRECTIONS[idx & 3]
    }

    #[inline(always)]
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// The two directions at right angles to this one.
    #[inline(always)]
    pub fn perpendicular(self) -> [Direction; 2] {
        match self {
            Direction::Up | Direction::Down => [Direction::Left, Direction::Right],
            Direction::Left | Direction::Right => [Direction::Up, Direction::Down],
        }
    }

    #[inline(always)]
    pub fn offset(self) -> (i16, i16) {
        DIR_OFFSETS[self.index()]
    }

    pub fn from_offset(offset: (i16, i16)) -> Option<Direction> {
        DIR_OFFSETS
            .iter()
            .position(|&o| o == offset)
            .map(Direction::from_index)
    }

    /// LURD letter: lowercase for a walk, uppercase for a push.
    pub fn to_char(self, push: bool) -> char {
        let ch = DIR_CHARS[self.index()];
        if push {
            ch.to_ascii_uppercase()
        } else {
            ch
        }
    }
}

#[derive(Debug)]
pub struct Board {
    width: i16,
    height: i16,
    coords: Vec<Point>,
    cell_of: Vec<Option<Cell>>,
    neighbors: Vec<[Option<Cell>; 4]>,
    alive_count: usize,
    goals: Vec<Cell>,
    goal_set: BoxSet,
    goal_index: Vec<Option<u16>>,
    articulation: CellSet,
    rooms: Vec<u16>,
    room_count: usize,
    // goal-major: push_dist[g * alive_count + cell]
    push_dist: Vec<u16>,
    symmetries: Symmetries,
    start_agent: Cell,
    start_boxes: BoxSet,
}

impl Board {
    pub fn new(level: &Level) -> Result<Self, BoardError> {
        let size = level.width as usize * level.height as usize;

        let walkable = flood_walkable(level);
        let walk_count = walkable.iter().filter(|&&w| w).count();
        if walk_count > MAX_CELLS {
            return Err(BoardError::TooManyCells(walk_count));
        }

        for b in &level.boxes {
            if !walkable[level.to_idx(b.row, b.col)] {
                return Err(BoardError::UnreachableBox {
                    row: b.row as usize,
                    col: b.col as usize,
                });
            }
        }
        for g in &level.goals {
            if !walkable[level.to_idx(g.row, g.col)] {
                return Err(BoardError::UnreachableGoal {
                    row: g.row as usize,
                    col: g.col as usize,
                });
            }
        }
        if level.boxes.is_empty() {
            return Err(BoardError::NoBoxes);
        }
        if level.boxes.len() != level.goals.len() {
            return Err(BoardError::CountMismatch {
                boxes: level.boxes.len(),
                goals: level.goals.len(),
            });
        }

        let live = live_squares(level, &walkable);
        let alive_count = live.iter().filter(|&&l| l).count();
        if alive_count > MAX_ALIVE {
            return Err(BoardError::TooManyAliveCells(alive_count));
        }

        // Alive cells first, then the remaining walkable cells, row-major in each group.
        let mut coords = Vec::with_capacity(walk_count);
        let mut cell_of = vec![None; size];
        for pass_alive in [true, false] {
            for idx in 0..size {
                if walkable[idx] && live[idx] == pass_alive {
                    cell_of[idx] = Some(coords.len() as Cell);
                    let row = (idx / level.width as usize) as i16;
                    let col = (idx % level.width as usize) as i16;
                    coords.push(Point::new(row, col));
                }
            }
        }

        let cell_at = |p: Point| -> Option<Cell> {
            if level.is_valid(p.row, p.col) {
                cell_of[level.to_idx(p.row, p.col)]
            } else {
                None
            }
        };

        let neighbors: Vec<[Option<Cell>; 4]> = coords
            .iter()
            .map(|p| {
                let mut out = [None; 4];
                for dir in DIRECTIONS {
                    let (dr, dc) = dir.offset();
                    out[dir.index()] = cell_at(Point::new(p.row + dr, p.col + dc));
                }
                out
            })
            .collect();

        let mut goals: Vec<Cell> = Vec::with_capacity(level.goals.len());
        let mut goal_set = BoxSet::new();
        let mut goal_index = vec![None; walk_count];
        for (gi, g) in level.goals.iter().enumerate() {
            // Goals are pull roots, so always alive and always mapped.
            let Some(cell) = cell_at(*g) else {
                return Err(BoardError::UnreachableGoal {
                    row: g.row as usize,
                    col: g.col as usize,
                });
            };
            goals.push(cell);
            goal_set.insert(cell as usize);
            goal_index[cell as usize] = Some(gi as u16);
        }

        let mut start_boxes = BoxSet::new();
        for b in &level.boxes {
            match cell_at(*b) {
                Some(cell) if (cell as usize) < alive_count => start_boxes.insert(cell as usize),
                _ => {
                    return Err(BoardError::DeadBox {
                        row: b.row as usize,
                        col: b.col as usize,
                    })
                }
            }
        }
        let start_agent = cell_at(level.agent).ok_or(BoardError::UnreachableBox {
            row: level.agent.row as usize,
            col: level.agent.col as usize,
        })?;

        let push_dist = graph::push_distances(&neighbors, &goals, alive_count);
        let articulation = graph::articulation_cells(&neighbors);
        let (rooms, room_count) = graph::rooms(&neighbors, &articulation);
        let symmetries = Symmetries::detect(&coords, &cell_at, &goal_set);

        let board = Board {
            width: level.width,
            height: level.height,
            coords,
            cell_of,
            neighbors,
            alive_count,
            goals,
            goal_set,
            goal_index,
            articulation,
            rooms,
            room_count,
            push_dist,
            symmetries,
            start_agent,
            start_boxes,
        };

        // Every box must have a goal of its own, or the puzzle is dead on arrival.
        let boxes: SmallVec<[Cell; 32]> = board.start_boxes.iter().map(|c| c as Cell).collect();
        let matched = max_matching(boxes.len(), board.goals.len(), |b, g| {
            board.push_distance(g, boxes[b]) != INF_DIST
        });
        if matched < boxes.len() {
            return Err(BoardError::Unmatchable {
                matched,
                boxes: boxes.len(),
            });
        }

        info!(
            cells = board.cell_count(),
            alive = board.alive_count,
            boxes = board.goals.len(),
            symmetries = board.symmetries.len(),
            articulation = board.articulation.len(),
            rooms = board.room_count,
            "board ready"
        );
        Ok(board)
    }

    #[inline(always)]
    pub fn cell_count(&self) -> usize {
        self.coords.len()
    }

    #[inline(always)]
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Machine words needed to hold a box set for this board.
    #[inline(always)]
    pub fn box_words(&self) -> usize {
        self.alive_count.div_ceil(64).max(1)
    }

    #[inline(always)]
    pub fn width(&self) -> i16 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> i16 {
        self.height
    }

    #[inline(always)]
    pub fn is_alive(&self, cell: Cell) -> bool {
        (cell as usize) < self.alive_count
    }

    #[inline(always)]
    pub fn is_goal(&self, cell: Cell) -> bool {
        self.goal_set.contains(cell as usize)
    }

    #[inline(always)]
    pub fn neighbor(&self, cell: Cell, dir: Direction) -> Option<Cell> {
        self.neighbors[cell as usize][dir.index()]
    }

    #[inline(always)]
    pub fn point(&self, cell: Cell) -> Point {
        self.coords[cell as usize]
    }

    pub fn cell_at(&self, p: Point) -> Option<Cell> {
        if p.row < 0 || p.col < 0 || p.row >= self.height || p.col >= self.width {
            return None;
        }
        self.cell_of[p.row as usize * self.width as usize + p.col as usize]
    }

    pub fn goals(&self) -> &[Cell] {
        &self.goals
    }

    pub fn goal_set(&self) -> &BoxSet {
        &self.goal_set
    }

    pub fn goal_index(&self, cell: Cell) -> Option<usize> {
        self.goal_index[cell as usize].map(usize::from)
    }

    pub fn box_count(&self) -> usize {
        self.goals.len()
    }

    /// Fewest pushes that move a lone box from `cell` onto goal number `goal`.
    #[inline(always)]
    pub fn push_distance(&self, goal: usize, cell: Cell) -> u16 {
        if !self.is_alive(cell) {
            return INF_DIST;
        }
        self.push_dist[goal * self.alive_count + cell as usize]
    }

    #[inline(always)]
    pub fn is_articulation(&self, cell: Cell) -> bool {
        self.articulation.contains(cell as usize)
    }

    /// Room id, or `NO_ROOM` for articulation cells.
    #[inline(always)]
    pub fn room(&self, cell: Cell) -> u16 {
        self.rooms[cell as usize]
    }

    pub fn room_count(&self) -> usize {
        self.room_count
    }

    pub fn symmetries(&self) -> &Symmetries {
        &self.symmetries
    }

    pub fn start_agent(&self) -> Cell {
        self.start_agent
    }

    pub fn start_boxes(&self) -> &BoxSet {
        &self.start_boxes
    }

    /// True when the cell's two neighbours at right angles to `dir` are walls.
    #[inline]
    pub fn is_tunnel(&self, cell: Cell, dir: Direction) -> bool {
        dir.perpendicular()
            .iter()
            .all(|&p| self.neighbor(cell, p).is_none())
    }

    /// Cells the agent can walk to from `from` without pushing.
    pub fn reach(&self, from: Cell, boxes: &BoxSet) -> CellSet {
        let mut seen = CellSet::new();
        let mut stack: SmallVec<[Cell; 64]> = SmallVec::new();
        seen.insert(from as usize);
        stack.push(from);
        while let Some(cur) = stack.pop() {
            for next in self.neighbors[cur as usize].iter().flatten() {
                let n = *next as usize;
                if !seen.contains(n) && !boxes.contains(n) {
                    seen.insert(n);
                    stack.push(*next);
                }
            }
        }
        seen
    }

    /// Shortest agent walk from `from` to `to` avoiding boxes.
    pub fn walk(&self, from: Cell, to: Cell, boxes: &BoxSet) -> Option<SmallVec<[Direction; 32]>> {
        if from == to {
            return Some(SmallVec::new());
        }
        let mut came: Vec<Option<(Cell, Direction)>> = vec![None; self.cell_count()];
        let mut seen = CellSet::new();
        let mut queue = VecDeque::with_capacity(64);
        seen.insert(from as usize);
        queue.push_back(from);
        while let Some(cur) = queue.pop_front() {
            for dir in DIRECTIONS {
                let Some(next) = self.neighbor(cur, dir) else {
                    continue;
                };
                let n = next as usize;
                if seen.contains(n) || boxes.contains(n) {
                    continue;
                }
                seen.insert(n);
                came[n] = Some((cur, dir));
                if next == to {
                    let mut path = SmallVec::new();
                    let mut at = to;
                    while let Some((prev, d)) = came[at as usize] {
                        path.push(d);
                        at = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

fn flood_walkable(level: &Level) -> Vec<bool> {
    let size = level.width as usize * level.height as usize;
    let mut walkable = vec![false; size];
    let mut queue = VecDeque::with_capacity(100);
    let start = level.to_idx(level.agent.row, level.agent.col);
    walkable[start] = true;
    queue.push_back(level.agent);

    while let Some(current) = queue.pop_front() {
        for &(drow, dcol) in &DIR_OFFSETS {
            let new_row = current.row + drow;
            let new_col = current.col + dcol;
            if level.is_wall(new_row, new_col) {
                continue;
            }
            let new_idx = level.to_idx(new_row, new_col);
            if !walkable[new_idx] {
                walkable[new_idx] = true;
                queue.push_back(Point::new(new_row, new_col));
            }
        }
    }
    walkable
}

/// Squares a box can be pulled to from some goal; every other square is dead.
fn live_squares(level: &Level, walkable: &[bool]) -> Vec<bool> {
    let size = walkable.len();
    let mut live_squares = vec![false; size];
    let mut queue = VecDeque::with_capacity(level.goals.len() * 4);

    for &goal in &level.goals {
        let idx = level.to_idx(goal.row, goal.col);
        if walkable[idx] && level.tiles[idx] == TILE_GOAL {
            live_squares[idx] = true;
            queue.push_back(goal);
        }
    }

    while let Some(pull_target) = queue.pop_front() {
        for &(drow, dcol) in &DIR_OFFSETS {
            let pull_origin_row = pull_target.row + drow;
            let pull_origin_col = pull_target.col + dcol;
            let player_row = pull_origin_row + drow;
            let player_col = pull_origin_col + dcol;

            if level.is_valid(pull_origin_row, pull_origin_col)
                && level.is_valid(player_row, player_col)
            {
                let po_idx = level.to_idx(pull_origin_row, pull_origin_col);
                let p_idx = level.to_idx(player_row, player_col);

                if walkable[po_idx] && walkable[p_idx] && !live_squares[po_idx] {
                    live_squares[po_idx] = true;
                    queue.push_back(Point::new(pull_origin_row, pull_origin_col));
                }
            }
        }
    }
    live_squares
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn board(text: &str) -> Board {
        Board::new(&Level::parse(text).unwrap()).unwrap()
    }

    #[test]
    fn alive_cells_come_first() {
        let b = board(
            "######\n\
             #@   #\n\
             # $ .#\n\
             #    #\n\
             ######",
        );
        // Only the goal row away from the left wall can ever lead a box home.
        for c in 0..b.cell_count() as Cell {
            let p = b.point(c);
            let live = p.row == 2 && p.col >= 2;
            assert_eq!(b.is_alive(c), live, "cell {c} at {p:?}");
        }
        assert_eq!(b.alive_count(), 3);
        assert_eq!(b.cell_count(), 12);
        assert_eq!(b.box_words(), 1);
    }

    #[test]
    fn push_distance_counts_pushes() {
        let b = board("#######\n#@$  .#\n#######");
        let box_cell = b.cell_at(Point::new(1, 2)).unwrap();
        assert_eq!(b.push_distance(0, box_cell), 3);
        let goal = b.goals()[0];
        assert_eq!(b.push_distance(0, goal), 0);
    }

    #[test]
    fn corridor_cells_are_articulation_points() {
        let b = board("#######\n#@$  .#\n#######");
        let mid = b.cell_at(Point::new(1, 3)).unwrap();
        assert!(b.is_articulation(mid));
        let end = b.cell_at(Point::new(1, 1)).unwrap();
        assert!(!b.is_articulation(end));
        assert_eq!(b.room(mid), NO_ROOM);
    }

    #[test]
    fn rejects_structural_problems() {
        let parse = |t: &str| Board::new(&Level::parse(t).unwrap()).unwrap_err();
        assert_eq!(parse("#####\n#@ .#\n#####"), BoardError::NoBoxes);
        assert!(matches!(
            parse("######\n#@$$.#\n######"),
            BoardError::CountMismatch { boxes: 2, goals: 1 }
        ));
        // Box tucked in a corner with no goal there.
        assert!(matches!(
            parse("#####\n#$ .#\n#@  #\n#####"),
            BoardError::DeadBox { row: 1, col: 1 }
        ));
        // Goal sealed off from the agent.
        assert!(matches!(
            parse("#######\n#@$ #.#\n#######"),
            BoardError::UnreachableGoal { .. }
        ));
    }

    #[test]
    fn rejects_mutually_unreachable_boxes_and_goals() {
        // Both boxes can only ever reach the left goal's column.
        let err = Board::new(
            &Level::parse(
                "#######\n\
                 #.   .#\n\
                 #$## ##\n\
                 #$## ##\n\
                 # @  ##\n\
                 #######",
            )
            .unwrap(),
        );
        assert_eq!(
            err.unwrap_err(),
            BoardError::Unmatchable {
                matched: 1,
                boxes: 2
            }
        );
    }

    #[test]
    fn walk_finds_shortest_path() {
        let b = board("######\n#@   #\n# $ .#\n#    #\n######");
        let from = b.cell_at(Point::new(1, 1)).unwrap();
        let to = b.cell_at(Point::new(2, 3)).unwrap();
        let path = b.walk(from, to, b.start_boxes()).unwrap();
        assert_eq!(path.len(), 3);
    }
}
