//! Admissible push lower bound: min-cost assignment of boxes to goals over
//! precomputed push distances, solved with the Hungarian algorithm.

use smallvec::SmallVec;

use crate::bits::BoxSet;
use crate::board::{Board, Cell, INF_DIST};
use crate::config::MAX_WEIGHT;

// Stand-in cost for "this box can never reach that goal".
const UNREACHABLE: i64 = 1 << 24;
const INF: i64 = i64::MAX / 4;

pub struct Heuristic {
    weight: f64,
    cost: Vec<i64>,
    u: Vec<i64>,
    v: Vec<i64>,
    p: Vec<usize>,
    way: Vec<usize>,
    minv: Vec<i64>,
    used: Vec<bool>,
}

impl Heuristic {
    /// `weight` of 1.0 keeps the bound admissible.
    pub fn new(weight: f64) -> Self {
        Heuristic {
            weight: if weight.is_finite() {
                weight.clamp(1.0, MAX_WEIGHT)
            } else {
                1.0
            },
            cost: Vec::new(),
            u: Vec::new(),
            v: Vec::new(),
            p: Vec::new(),
            way: Vec::new(),
            minv: Vec::new(),
            used: Vec::new(),
        }
    }

    pub fn is_admissible(&self) -> bool {
        self.weight <= 1.0
    }

    /// Sum of push distances under the cheapest box→goal assignment, or
    /// `None` when some box cannot be given a reachable goal (a deadlock).
    pub fn lower_bound(&mut self, board: &Board, boxes: &BoxSet) -> Option<u32> {
        let cells: SmallVec<[Cell; 32]> = boxes.iter().map(|c| c as Cell).collect();
        let n = cells.len();
        let m = board.goals().len();
        if n == 0 {
            return Some(0);
        }
        debug_assert!(n <= m, "more boxes than goals");

        // 1-indexed (n+1) x (m+1) matrix, row 0 / column 0 unused.
        self.cost.clear();
        self.cost.resize((n + 1) * (m + 1), 0);
        for (i, &cell) in cells.iter().enumerate() {
            let mut any = false;
            for g in 0..m {
                let d = board.push_distance(g, cell);
                let c = if d == INF_DIST {
                    UNREACHABLE
                } else {
                    any = true;
                    d as i64
                };
                self.cost[(i + 1) * (m + 1) + g + 1] = c;
            }
            if !any {
                return None;
            }
        }

        let total = self.solve(n, m);
        if total >= UNREACHABLE {
            return None;
        }
        Some(total as u32)
    }

    /// Apply the search weight to a raw bound.
    #[inline]
    pub fn scaled(&self, h: u32) -> u32 {
        if self.weight <= 1.0 {
            h
        } else {
            (h as f64 * self.weight).round() as u32
        }
    }

    fn solve(&mut self, n: usize, m: usize) -> i64 {
        let w = m + 1;
        self.u.clear();
        self.u.resize(n + 1, 0);
        self.v.clear();
        self.v.resize(m + 1, 0);
        self.p.clear();
        self.p.resize(m + 1, 0);
        self.way.clear();
        self.way.resize(m + 1, 0);

        for i in 1..=n {
            self.p[0] = i;
            let mut j0 = 0;
            self.minv.clear();
            self.minv.resize(m + 1, INF);
            self.used.clear();
            self.used.resize(m + 1, false);
            loop {
                self.used[j0] = true;
                let i0 = self.p[j0];
                let mut delta = INF;
                let mut j1 = 0;
                for j in 1..=m {
                    if self.used[j] {
                        continue;
                    }
                    let cur = self.cost[i0 * w + j] - self.u[i0] - self.v[j];
                    if cur < self.minv[j] {
                        self.minv[j] = cur;
                        self.way[j] = j0;
                    }
                    if self.minv[j] < delta {
                        delta = self.minv[j];
                        j1 = j;
                    }
                }
                for j in 0..=m {
                    if self.used[j] {
                        self.u[self.p[j]] += delta;
                        self.v[j] -= delta;
                    } else {
                        self.minv[j] -= delta;
                    }
                }
                j0 = j1;
                if self.p[j0] == 0 {
                    break;
                }
            }
            loop {
                let j1 = self.way[j0];
                self.p[j0] = self.p[j1];
                j0 = j1;
                if j0 == 0 {
                    break;
                }
            }
        }

        (1..=m)
            .filter(|&j| self.p[j] != 0)
            .map(|j| self.cost[self.p[j] * w + j])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::level::Point;

    #[test]
    fn single_box_equals_push_distance() {
        let b = board("#######\n#@$  .#\n#######");
        let mut h = Heuristic::new(1.0);
        assert_eq!(h.lower_bound(&b, b.start_boxes()), Some(3));
        assert!(h.is_admissible());
    }

    #[test]
    fn assignment_beats_greedy() {
        // Both boxes sit nearest the right goal, but only one can take it.
        let b = board(
            "#######\n\
             #     #\n\
             # $$ .#\n\
             #.    #\n\
             #@    #\n\
             #######",
        );
        let mut h = Heuristic::new(1.0);
        let bound = h.lower_bound(&b, b.start_boxes()).unwrap();
        let left = b.cell_at(Point::new(2, 2)).unwrap();
        let right = b.cell_at(Point::new(2, 3)).unwrap();
        let g_right = b.goal_index(b.cell_at(Point::new(2, 5)).unwrap()).unwrap();
        let g_left = b.goal_index(b.cell_at(Point::new(3, 1)).unwrap()).unwrap();
        let a = b.push_distance(g_right, right) + b.push_distance(g_left, left);
        let c = b.push_distance(g_right, left) + b.push_distance(g_left, right);
        assert_eq!(bound, a.min(c) as u32);
    }

    #[test]
    fn weight_scales_and_rounds() {
        let h = Heuristic::new(1.5);
        assert_eq!(h.scaled(3), 5);
        assert!(!h.is_admissible());
        assert_eq!(Heuristic::new(0.5).scaled(3), 3);
        assert_eq!(Heuristic::new(1e9).scaled(3), 30);
        assert_eq!(Heuristic::new(f64::NAN).scaled(3), 3);
    }

    #[test]
    fn unreachable_goal_is_a_deadlock() {
        let b = board("#######\n#@$  .#\n#######");
        let mut h = Heuristic::new(1.0);
        let mut boxes = BoxSet::new();
        // A box on the dead end behind the start has no goal at all.
        boxes.insert(b.cell_at(Point::new(1, 1)).unwrap() as usize);
        assert_eq!(h.lower_bound(&b, &boxes), None);
    }
}
