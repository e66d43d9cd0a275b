//! Board automorphisms and state canonicalization.
//!
//! Only the eight dihedral transforms of the walkable bounding box are
//! considered. A transform is kept when it maps walkable cells onto walkable
//! cells and goals onto goals; alive cells then follow automatically because
//! they are derived from those two alone.

use arrayvec::ArrayVec;

use super::{Cell, Direction, DIRECTIONS};
use crate::bits::{BoxSet, CellSet};
use crate::level::Point;
use crate::state::StateKey;

// Linear part [a, b, c, d]: row' = a*row + b*col, col' = c*row + d*col.
const DIHEDRAL: [[i16; 4]; 7] = [
    [-1, 0, 0, -1], // rotate 180
    [1, 0, 0, -1],  // mirror columns
    [-1, 0, 0, 1],  // mirror rows
    [0, 1, 1, 0],   // transpose
    [0, -1, -1, 0], // anti-transpose
    [0, 1, -1, 0],  // rotate 90
    [0, -1, 1, 0],  // rotate 270
];

#[derive(Debug, Clone)]
pub struct Symmetry {
    cells: Vec<Cell>,
    dirs: [Direction; 4],
}

impl Symmetry {
    #[inline(always)]
    pub fn map_cell(&self, cell: Cell) -> Cell {
        self.cells[cell as usize]
    }

    #[inline(always)]
    pub fn map_dir(&self, dir: Direction) -> Direction {
        self.dirs[dir.index()]
    }

    pub fn map_boxes(&self, boxes: &BoxSet) -> BoxSet {
        boxes.iter().map(|c| self.cells[c] as usize).collect()
    }

    /// Image of a state; the agent is re-normalised to the smallest cell of
    /// the mapped reach region.
    pub fn map_key(&self, key: &StateKey, reach: &CellSet) -> StateKey {
        let agent = reach
            .iter()
            .map(|c| self.cells[c])
            .min()
            .unwrap_or_else(|| self.map_cell(key.agent));
        StateKey {
            agent,
            boxes: self.map_boxes(&key.boxes),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Symmetries {
    list: ArrayVec<Symmetry, 7>,
}

impl Symmetries {
    pub(crate) fn detect(
        coords: &[Point],
        cell_at: &impl Fn(Point) -> Option<Cell>,
        goals: &BoxSet,
    ) -> Self {
        let mut list = ArrayVec::new();
        if coords.is_empty() {
            return Symmetries { list };
        }
        let r0 = coords.iter().map(|p| p.row).min().unwrap_or(0);
        let r1 = coords.iter().map(|p| p.row).max().unwrap_or(0);
        let c0 = coords.iter().map(|p| p.col).min().unwrap_or(0);
        let c1 = coords.iter().map(|p| p.col).max().unwrap_or(0);
        let (h, w) = (r1 - r0 + 1, c1 - c0 + 1);

        'transform: for &[a, b, c, d] in &DIHEDRAL {
            if b != 0 && h != w {
                continue;
            }
            let off_r = -((a * (h - 1)).min(0) + (b * (w - 1)).min(0));
            let off_c = -((c * (h - 1)).min(0) + (d * (w - 1)).min(0));

            let mut cells = Vec::with_capacity(coords.len());
            for (idx, p) in coords.iter().enumerate() {
                let (lr, lc) = (p.row - r0, p.col - c0);
                let image = Point::new(a * lr + b * lc + off_r + r0, c * lr + d * lc + off_c + c0);
                let Some(mapped) = cell_at(image) else {
                    continue 'transform;
                };
                if goals.contains(idx) != goals.contains(mapped as usize) {
                    continue 'transform;
                }
                cells.push(mapped);
            }

            let mut dirs = DIRECTIONS;
            for dir in DIRECTIONS {
                let (dr, dc) = dir.offset();
                match Direction::from_offset((a * dr + b * dc, c * dr + d * dc)) {
                    Some(m) => dirs[dir.index()] = m,
                    None => continue 'transform,
                }
            }
            // Thin boards make some transforms act as the identity or repeat another.
            let identity = cells.iter().enumerate().all(|(i, &m)| i == m as usize);
            if identity || list.iter().any(|s: &Symmetry| s.cells == cells) {
                continue;
            }
            list.push(Symmetry { cells, dirs });
        }
        Symmetries { list }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Symmetry {
        &self.list[idx]
    }

    /// Smallest image of `key` over the identity and every automorphism,
    /// together with the index of the automorphism that produced it
    /// (`None` for the identity). `reach` is the agent region of `key`.
    pub fn canonicalize(&self, key: StateKey, reach: &CellSet) -> (StateKey, Option<usize>) {
        let mut best = key;
        let mut which = None;
        for (i, sym) in self.list.iter().enumerate() {
            let image = sym.map_key(&key, reach);
            if image < best {
                best = image;
                which = Some(i);
            }
        }
        (best, which)
    }
}

#[cfg(test)]
mod tests {
    use crate::board::tests::board;
    use crate::state::StateKey;

    #[test]
    fn symmetric_room_has_all_eight() {
        // Square room, goals on the centre only.
        let b = board(
            "#####\n\
             #   #\n\
             # * #\n\
             #@  #\n\
             #####",
        );
        assert_eq!(b.symmetries().len(), 7);
    }

    #[test]
    fn goals_break_symmetry() {
        let b = board("######\n#@$ .#\n######");
        // Mirroring the single row is the identity; the rest move the goal.
        assert!(b.symmetries().is_empty());
    }

    #[test]
    fn canonicalize_is_idempotent_and_collapses_mirrors() {
        let b = board(
            "#######\n\
             #  .  #\n\
             # $@$ #\n\
             #  .  #\n\
             #######",
        );
        assert!(!b.symmetries().is_empty());
        let syms = b.symmetries();
        let start = StateKey::normalized(&b, b.start_agent(), *b.start_boxes());
        let reach = b.reach(start.agent, &start.boxes);
        let (canon, _) = syms.canonicalize(start, &reach);
        let canon_reach = b.reach(canon.agent, &canon.boxes);
        assert_eq!(syms.canonicalize(canon, &canon_reach).0, canon);

        for i in 0..syms.len() {
            let image = syms.get(i).map_key(&start, &reach);
            let image_reach = b.reach(image.agent, &image.boxes);
            assert_eq!(syms.canonicalize(image, &image_reach).0, canon);
        }
    }
}
