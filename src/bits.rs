//! Fixed-width bitsets over cell ids.
//!
//! Boxes live on alive cells only, and alive cells are numbered first, so a
//! box set indexes directly by cell id. Agent reach covers every walkable cell
//! and needs the wider set.

use std::fmt;

pub const BOX_WORDS: usize = 4;
pub const CELL_WORDS: usize = 8;

/// Most alive cells a board may have.
pub const MAX_ALIVE: usize = BOX_WORDS * 64;
/// Most walkable cells a board may have.
pub const MAX_CELLS: usize = CELL_WORDS * 64;

pub type BoxSet = Bitset<BOX_WORDS>;
pub type CellSet = Bitset<CELL_WORDS>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bitset<const W: usize>(pub [u64; W]);

impl<const W: usize> Bitset<W> {
    pub const BITS: usize = W * 64;

    #[inline(always)]
    pub const fn new() -> Self {
        Bitset([0; W])
    }

    #[inline(always)]
    pub fn insert(&mut self, i: usize) {
        self.0[i / 64] |= 1u64 << (i % 64);
    }

    #[inline(always)]
    pub fn remove(&mut self, i: usize) {
        self.0[i / 64] &= !(1u64 << (i % 64));
    }

    #[inline(always)]
    pub fn contains(&self, i: usize) -> bool {
        i < Self::BITS && (self.0[i / 64] & (1u64 << (i % 64))) != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// `self ⊆ other`, tested as `self | other == other` word by word.
    #[inline]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(&a, &b)| a | b == b)
    }

    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(&a, &b)| a & b != 0)
    }

    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
        out
    }

    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a &= *b;
        }
        out
    }

    #[inline]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a &= !*b;
        }
        out
    }

    /// Lowest set bit.
    #[inline]
    pub fn first(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, &w)| w != 0)
            .map(|(i, &w)| i * 64 + w.trailing_zeros() as usize)
    }

    #[inline]
    pub fn words(&self) -> &[u64; W] {
        &self.0
    }

    /// Rebuild from a prefix of words; the rest stay zero.
    #[inline]
    pub fn from_words(words: &[u64]) -> Self {
        let mut out = Self::new();
        out.0[..words.len()].copy_from_slice(words);
        out
    }

    pub fn iter(&self) -> Ones<'_, W> {
        Ones {
            words: &self.0,
            idx: 0,
            cur: self.0[0],
        }
    }
}

impl<const W: usize> Default for Bitset<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> FromIterator<usize> for Bitset<W> {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.insert(i);
        }
        set
    }
}

impl<const W: usize> fmt::Debug for Bitset<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct Ones<'a, const W: usize> {
    words: &'a [u64; W],
    idx: usize,
    cur: u64,
}

impl<const W: usize> Iterator for Ones<'_, W> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        loop {
            if self.cur != 0 {
                let bit = self.cur.trailing_zeros() as usize;
                self.cur &= self.cur - 1;
                return Some(self.idx * 64 + bit);
            }
            self.idx += 1;
            if self.idx >= W {
                return None;
            }
            self.cur = self.words[self.idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_and_iteration() {
        let a: BoxSet = [3, 64, 200].into_iter().collect();
        let mut b = a;
        b.insert(7);
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![3, 7, 64, 200]);
        assert_eq!(b.len(), 4);
        assert_eq!(b.difference(&a).first(), Some(7));
    }

    #[test]
    fn empty_set_has_no_first() {
        let s = CellSet::new();
        assert!(s.is_empty());
        assert_eq!(s.first(), None);
        assert!(!s.contains(CellSet::BITS + 3));
    }
}
