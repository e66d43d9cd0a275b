//! One shard of a packed open-addressing table.
//!
//! Slots are laid out flat in a `Vec<u64>`: `key_words` words of box bitset
//! followed by `V` value words. An all-zero key marks an empty slot, which
//! is safe because every stored box set holds at least one box. Linear
//! probing, load capped at 5/8, backward-shift deletion, no tombstones.
//!
//! The home slot is taken from the *top* bits of the hash. When the table
//! doubles, an entry homed at `i` moves home to `2i` or `2i + 1` depending on
//! the next hash bit, so a run of old slots between two empty slots lands in
//! its own disjoint region of the new table. That lets resize workers rehash
//! separate runs in parallel without coordination.

use parking_lot::Mutex;
use rayon::ThreadPool;

use crate::error::StoreError;

const MIN_BITS: u32 = 4;
const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// Murmur3-style word mixing folded through the 64-bit finaliser.
#[inline(always)]
pub fn hash_words(words: &[u64]) -> u64 {
    let mut h: u64 = 0x9e37_79b9_7f4a_7c15;
    for &w in words {
        let mut k = w.wrapping_mul(C1);
        k = k.rotate_left(31);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(27).wrapping_mul(5).wrapping_add(0x52dc_e729);
    }
    h ^= words.len() as u64;
    fmix64(h)
}

#[inline(always)]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[inline(always)]
fn home(hash: u64, bits: u32) -> usize {
    (hash >> (64 - bits)) as usize
}

#[derive(Debug, Clone)]
pub struct PackedTable<const V: usize> {
    key_words: usize,
    bits: u32,
    len: usize,
    slots: Vec<u64>,
    grow_failed: bool,
}

impl<const V: usize> PackedTable<V> {
    pub fn new(key_words: usize) -> Self {
        PackedTable {
            key_words,
            bits: 0,
            len: 0,
            slots: Vec::new(),
            grow_failed: false,
        }
    }

    #[inline(always)]
    fn stride(&self) -> usize {
        self.key_words + V
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        if self.bits == 0 {
            0
        } else {
            1 << self.bits
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    #[inline(always)]
    fn key_at(&self, idx: usize) -> &[u64] {
        let s = idx * self.stride();
        &self.slots[s..s + self.key_words]
    }

    #[inline(always)]
    fn is_free(&self, idx: usize) -> bool {
        self.key_at(idx).iter().all(|&w| w == 0)
    }

    #[inline(always)]
    fn value_at(&self, idx: usize) -> [u64; V] {
        let s = idx * self.stride() + self.key_words;
        let mut out = [0u64; V];
        out.copy_from_slice(&self.slots[s..s + V]);
        out
    }

    #[inline(always)]
    fn write(&mut self, idx: usize, key: &[u64], value: &[u64; V]) {
        let stride = self.stride();
        let s = idx * stride;
        self.slots[s..s + self.key_words].copy_from_slice(key);
        self.slots[s + self.key_words..s + stride].copy_from_slice(value);
    }

    fn find(&self, key: &[u64]) -> Option<usize> {
        if self.bits == 0 {
            return None;
        }
        let mask = self.mask();
        let mut idx = home(hash_words(key), self.bits);
        loop {
            if self.is_free(idx) {
                return None;
            }
            if self.key_at(idx) == key {
                return Some(idx);
            }
            idx = (idx + 1) & mask;
        }
    }

    pub fn contains(&self, key: &[u64]) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &[u64]) -> Option<[u64; V]> {
        self.find(key).map(|idx| self.value_at(idx))
    }

    /// Inserts a new key. `Ok(false)` when the key was already present
    /// (the stored value is left untouched).
    pub fn insert(
        &mut self,
        key: &[u64],
        value: &[u64; V],
        pool: Option<&ThreadPool>,
        parallel_min: usize,
    ) -> Result<bool, StoreError> {
        debug_assert_eq!(key.len(), self.key_words);
        debug_assert!(key.iter().any(|&w| w != 0), "empty box set used as a key");
        self.reserve_one(pool, parallel_min)?;
        let mask = self.mask();
        let mut idx = home(hash_words(key), self.bits);
        loop {
            if self.is_free(idx) {
                self.write(idx, key, value);
                self.len += 1;
                return Ok(true);
            }
            if self.key_at(idx) == key {
                return Ok(false);
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Inserts a key the caller knows to be absent, skipping the equality
    /// checks along the probe run.
    pub fn insert_unique(
        &mut self,
        key: &[u64],
        value: &[u64; V],
        pool: Option<&ThreadPool>,
        parallel_min: usize,
    ) -> Result<(), StoreError> {
        debug_assert!(!self.contains(key), "unique insert of a present key");
        self.reserve_one(pool, parallel_min)?;
        let mask = self.mask();
        let mut idx = home(hash_words(key), self.bits);
        while !self.is_free(idx) {
            idx = (idx + 1) & mask;
        }
        self.write(idx, key, value);
        self.len += 1;
        Ok(())
    }

    /// Replaces the value of a present key; `false` when absent.
    pub fn update(&mut self, key: &[u64], value: &[u64; V]) -> bool {
        match self.find(key) {
            Some(idx) => {
                let s = idx * self.stride() + self.key_words;
                self.slots[s..s + V].copy_from_slice(value);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &[u64]) -> bool {
        match self.find(key) {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Drops every entry for which `pred` holds; returns how many went.
    pub fn remove_if(&mut self, mut pred: impl FnMut(&[u64], [u64; V]) -> bool) -> usize {
        let mut removed = 0;
        let mut idx = 0;
        let cap = self.capacity();
        while idx < cap {
            // A removal may shift a later entry into `idx`; look again.
            if !self.is_free(idx) && pred(self.key_at(idx), self.value_at(idx)) {
                self.remove_at(idx);
                removed += 1;
            } else {
                idx += 1;
            }
        }
        removed
    }

    pub fn for_each(&self, mut f: impl FnMut(&[u64], [u64; V])) {
        for idx in 0..self.capacity() {
            if !self.is_free(idx) {
                f(self.key_at(idx), self.value_at(idx));
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.fill(0);
        self.len = 0;
    }

    fn remove_at(&mut self, mut hole: usize) {
        let mask = self.mask();
        let stride = self.stride();
        let mut j = hole;
        loop {
            j = (j + 1) & mask;
            if self.is_free(j) {
                break;
            }
            let k = home(hash_words(self.key_at(j)), self.bits);
            // The entry at j may fill the hole iff the hole lies cyclically in [k, j).
            if (j.wrapping_sub(k) & mask) >= (j.wrapping_sub(hole) & mask) {
                self.slots.copy_within(j * stride..(j + 1) * stride, hole * stride);
                hole = j;
            }
        }
        self.slots[hole * stride..(hole + 1) * stride].fill(0);
        self.len -= 1;
    }

    fn reserve_one(&mut self, pool: Option<&ThreadPool>, parallel_min: usize) -> Result<(), StoreError> {
        let cap = self.capacity();
        if (self.len + 1) * 8 <= cap * 5 {
            return Ok(());
        }
        if !self.grow_failed {
            let new_bits = if self.bits == 0 { MIN_BITS } else { self.bits + 1 };
            match self.grow(new_bits, pool, parallel_min) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        len = self.len,
                        capacity = cap,
                        error = %err,
                        "state table growth failed; continuing above load limit"
                    );
                    self.grow_failed = true;
                }
            }
        }
        // Keep one slot free so probe loops always terminate.
        if self.len + 1 >= cap {
            return Err(StoreError::Full { len: self.len });
        }
        Ok(())
    }

    fn grow(
        &mut self,
        new_bits: u32,
        pool: Option<&ThreadPool>,
        parallel_min: usize,
    ) -> Result<(), std::collections::TryReserveError> {
        let stride = self.stride();
        let new_cap = 1usize << new_bits;
        let mut fresh: Vec<u64> = Vec::new();
        fresh.try_reserve_exact(new_cap * stride)?;
        fresh.resize(new_cap * stride, 0);

        if self.len > 0 {
            match pool {
                Some(pool) if new_bits == self.bits + 1 && new_cap >= parallel_min => {
                    self.rehash_parallel(&mut fresh, new_bits, pool);
                }
                _ => {
                    let old_cap = self.capacity();
                    for idx in 0..old_cap {
                        if !self.is_free(idx) {
                            let s = idx * stride;
                            place(&mut fresh, 0, new_bits, self.key_words, &self.slots[s..s + stride], true);
                        }
                    }
                }
            }
        }
        self.slots = fresh;
        self.bits = new_bits;
        Ok(())
    }

    /// Doubling rehash on the worker pool. Old runs between empty slots map
    /// to disjoint new regions `[2a, 2b)`; the run that wraps past the end of
    /// the old table is handled afterwards on the calling thread.
    fn rehash_parallel(&self, fresh: &mut [u64], new_bits: u32, pool: &ThreadPool) {
        let stride = self.stride();
        let old_cap = self.capacity();
        let key_words = self.key_words;

        let workers = pool.current_num_threads().max(1) * 4;
        let step = (old_cap / workers).max(1);
        let mut cuts: Vec<usize> = Vec::with_capacity(workers + 1);
        let mut at = 0;
        while at < old_cap {
            match (at..old_cap).find(|&i| self.is_free(i)) {
                Some(e) => {
                    if cuts.last() != Some(&e) {
                        cuts.push(e);
                    }
                    at = e + step;
                }
                None => break,
            }
        }
        debug_assert!(!cuts.is_empty(), "table over its load limit has no free slot");

        // Split the new table into [head | region per run | tail].
        let mut regions: Vec<(usize, usize, &mut [u64])> = Vec::with_capacity(cuts.len());
        let (_head, mut rest) = fresh.split_at_mut(2 * cuts[0] * stride);
        for pair in cuts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (region, tail) = std::mem::take(&mut rest).split_at_mut(2 * (b - a) * stride);
            regions.push((a, b, region));
            rest = tail;
        }

        let spill: Mutex<Vec<u64>> = Mutex::new(Vec::new());
        let old = &self.slots;
        pool.scope(|s| {
            for (a, b, region) in regions {
                let spill = &spill;
                s.spawn(move |_| {
                    for idx in a..b {
                        let slot = &old[idx * stride..(idx + 1) * stride];
                        if slot[..key_words].iter().all(|&w| w == 0) {
                            continue;
                        }
                        if !place(region, 2 * a, new_bits, key_words, slot, false) {
                            spill.lock().extend_from_slice(slot);
                        }
                    }
                });
            }
        });

        // Wrapping run: [last cut, old_cap) then [0, first cut).
        let last = cuts[cuts.len() - 1];
        for idx in (last..old_cap).chain(0..cuts[0]) {
            let slot = &old[idx * stride..(idx + 1) * stride];
            if !slot[..key_words].iter().all(|&w| w == 0) {
                place(fresh, 0, new_bits, key_words, slot, true);
            }
        }
        let spill = spill.into_inner();
        if !spill.is_empty() {
            tracing::debug!(entries = spill.len() / stride, "resize region overflow handled inline");
        }
        for slot in spill.chunks_exact(stride) {
            place(fresh, 0, new_bits, key_words, slot, true);
        }
    }
}

/// Writes one raw slot into `region`, which starts at absolute slot `base`
/// of a table with `2^bits` slots. With `wrap` the region must be the whole
/// table; without it, returns `false` if the probe would run off the end.
fn place(region: &mut [u64], base: usize, bits: u32, key_words: usize, slot: &[u64], wrap: bool) -> bool {
    let stride = slot.len();
    let len = region.len() / stride;
    let Some(mut idx) = home(hash_words(&slot[..key_words]), bits).checked_sub(base) else {
        return false;
    };
    loop {
        if idx >= len {
            if !wrap {
                return false;
            }
            idx = 0;
        }
        let s = idx * stride;
        if region[s..s + key_words].iter().all(|&w| w == 0) {
            region[s..s + stride].copy_from_slice(slot);
            return true;
        }
        idx += 1;
    }
}
