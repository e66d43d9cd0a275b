//! Maximum bipartite matching by augmenting paths (Kuhn).
//!
//! Used as a feasibility oracle: can every box be given a goal of its own
//! that it can still reach? The search recurses once per box on the
//! augmenting path, so depth never exceeds the number of boxes.

use smallvec::SmallVec;

/// Size of a maximum matching between `left` and `right` vertices, where
/// `edge(l, r)` says whether left vertex `l` may pair with right vertex `r`.
pub fn max_matching(left: usize, right: usize, edge: impl Fn(usize, usize) -> bool) -> usize {
    let adj: Vec<SmallVec<[u16; 16]>> = (0..left)
        .map(|l| (0..right).filter(|&r| edge(l, r)).map(|r| r as u16).collect())
        .collect();
    let mut owner = vec![usize::MAX; right];
    let mut seen = vec![0u32; right];
    let mut matched = 0;
    for l in 0..left {
        if adj[l].is_empty() {
            // No goal at all: the matching cannot be perfect, but keep
            // counting so callers can report how far it got.
            continue;
        }
        if augment(l, &adj, &mut owner, &mut seen, l as u32 + 1) {
            matched += 1;
        }
    }
    matched
}

fn augment(
    l: usize,
    adj: &[SmallVec<[u16; 16]>],
    owner: &mut [usize],
    seen: &mut [u32],
    stamp: u32,
) -> bool {
    for &r in &adj[l] {
        let r = r as usize;
        if seen[r] == stamp {
            continue;
        }
        seen[r] = stamp;
        if owner[r] == usize::MAX || augment(owner[r], adj, owner, seen, stamp) {
            owner[r] = l;
            return true;
        }
    }
    false
}
