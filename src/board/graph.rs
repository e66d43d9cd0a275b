//! Graph precomputation over walkable cells.

use std::collections::VecDeque;

use super::{Cell, DIRECTIONS, INF_DIST, NO_ROOM};
use crate::bits::CellSet;

/// Per-goal pull BFS: the fewest pushes that bring a lone box from each alive
/// cell onto that goal, ignoring where the agent starts.
pub(super) fn push_distances(
    neighbors: &[[Option<Cell>; 4]],
    goals: &[Cell],
    alive_count: usize,
) -> Vec<u16> {
    let mut dist = vec![INF_DIST; goals.len() * alive_count];
    let mut queue = VecDeque::with_capacity(alive_count);
    for (gi, &goal) in goals.iter().enumerate() {
        let row = &mut dist[gi * alive_count..(gi + 1) * alive_count];
        row[goal as usize] = 0;
        queue.clear();
        queue.push_back(goal);
        while let Some(cur) = queue.pop_front() {
            let d = row[cur as usize];
            for dir in DIRECTIONS {
                // Box came from `from`, pushed by an agent one cell further along.
                let Some(from) = neighbors[cur as usize][dir.index()] else {
                    continue;
                };
                if neighbors[from as usize][dir.index()].is_none() {
                    continue;
                }
                let f = from as usize;
                if f < alive_count && row[f] == INF_DIST {
                    row[f] = d + 1;
                    queue.push_back(from);
                }
            }
        }
    }
    dist
}

/// Articulation cells of the walkable graph (Tarjan lowlink, explicit stack).
pub(super) fn articulation_cells(neighbors: &[[Option<Cell>; 4]]) -> CellSet {
    let n = neighbors.len();
    let mut out = CellSet::new();
    if n == 0 {
        return out;
    }
    let mut disc = vec![u32::MAX; n];
    let mut low = vec![0u32; n];
    let mut parent = vec![usize::MAX; n];
    let mut children = vec![0u32; n];
    let mut timer = 0u32;

    // Frame: (cell, next direction to try)
    let mut stack: Vec<(usize, usize)> = Vec::with_capacity(n);
    for root in 0..n {
        if disc[root] != u32::MAX {
            continue;
        }
        disc[root] = timer;
        low[root] = timer;
        timer += 1;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let v = top.0;
            if top.1 < 4 {
                let d = top.1;
                top.1 += 1;
                let Some(w) = neighbors[v][d] else {
                    continue;
                };
                let w = w as usize;
                if disc[w] == u32::MAX {
                    parent[w] = v;
                    children[v] += 1;
                    disc[w] = timer;
                    low[w] = timer;
                    timer += 1;
                    stack.push((w, 0));
                } else if w != parent[v] {
                    low[v] = low[v].min(disc[w]);
                }
            } else {
                stack.pop();
                let p = parent[v];
                if p != usize::MAX {
                    low[p] = low[p].min(low[v]);
                    if parent[p] != usize::MAX && low[v] >= disc[p] {
                        out.insert(p);
                    }
                }
            }
        }
        if children[root] > 1 {
            out.insert(root);
        }
    }
    out
}

/// Rooms are the connected pieces left after removing articulation cells.
pub(super) fn rooms(neighbors: &[[Option<Cell>; 4]], articulation: &CellSet) -> (Vec<u16>, usize) {
    let n = neighbors.len();
    let mut room = vec![NO_ROOM; n];
    let mut count = 0u16;
    let mut stack = Vec::new();
    for start in 0..n {
        if room[start] != NO_ROOM || articulation.contains(start) {
            continue;
        }
        room[start] = count;
        stack.push(start);
        while let Some(cur) = stack.pop() {
            for next in neighbors[cur].iter().flatten() {
                let nx = *next as usize;
                if room[nx] == NO_ROOM && !articulation.contains(nx) {
                    room[nx] = count;
                    stack.push(nx);
                }
            }
        }
        count += 1;
    }
    (room, count as usize)
}
