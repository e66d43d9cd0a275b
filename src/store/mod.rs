//! Deduplicating state stores.
//!
//! Every store is sharded by agent cell: one [`PackedTable`] per cell,
//! created the first time a key with that agent arrives. Keys inside a shard
//! are just the box words, trimmed to the board's width.

mod open;
mod table;

use std::sync::Arc;

use rayon::ThreadPool;

use crate::bits::BoxSet;
use crate::board::Cell;
use crate::error::StoreError;
use crate::state::{Payload, StateKey};

pub use open::OpenSet;
pub use table::{hash_words, PackedTable};

/// Common surface of the state stores, so the driver does not care which
/// backend it runs on.
pub trait StateStore {
    type Value: Copy;

    fn contains(&self, key: &StateKey) -> bool;
    fn get(&self, key: &StateKey) -> Option<Self::Value>;
    /// `Ok(false)` if the key is already present; the old value is kept.
    fn insert(&mut self, key: &StateKey, value: Self::Value) -> Result<bool, StoreError>;
    /// The caller guarantees the key is absent.
    fn insert_unchecked(&mut self, key: &StateKey, value: Self::Value) -> Result<(), StoreError>;
    /// `false` if the key is absent.
    fn update(&mut self, key: &StateKey, value: Self::Value) -> bool;
    fn remove(&mut self, key: &StateKey) -> bool;
    fn remove_if(&mut self, pred: &mut dyn FnMut(&StateKey, Self::Value) -> bool) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How tables in a store grow.
#[derive(Clone, Default)]
pub struct Growth {
    pub pool: Option<Arc<ThreadPool>>,
    /// Tables below this many slots rehash on the calling thread.
    pub parallel_min: usize,
}

impl Growth {
    pub fn sequential() -> Self {
        Growth {
            pool: None,
            parallel_min: usize::MAX,
        }
    }
}

struct Sharded<const V: usize> {
    key_words: usize,
    shards: Vec<Option<PackedTable<V>>>,
    len: usize,
    growth: Growth,
}

impl<const V: usize> Sharded<V> {
    fn new(cells: usize, key_words: usize, growth: Growth) -> Self {
        Sharded {
            key_words,
            shards: (0..cells).map(|_| None).collect(),
            len: 0,
            growth,
        }
    }

    #[inline(always)]
    fn words<'k>(&self, key: &'k StateKey) -> &'k [u64] {
        &key.boxes.words()[..self.key_words]
    }

    #[inline]
    fn shard(&self, key: &StateKey) -> Option<&PackedTable<V>> {
        self.shards.get(key.agent as usize)?.as_ref()
    }

    fn shard_mut(&mut self, agent: Cell) -> &mut PackedTable<V> {
        let key_words = self.key_words;
        self.shards[agent as usize].get_or_insert_with(|| PackedTable::new(key_words))
    }

    fn get(&self, key: &StateKey) -> Option<[u64; V]> {
        self.shard(key)?.get(self.words(key))
    }

    fn insert(&mut self, key: &StateKey, value: &[u64; V]) -> Result<bool, StoreError> {
        let words = &key.boxes.words()[..self.key_words];
        let pool = self.growth.pool.clone();
        let parallel_min = self.growth.parallel_min;
        let fresh = self
            .shard_mut(key.agent)
            .insert(words, value, pool.as_deref(), parallel_min)?;
        if fresh {
            self.len += 1;
        }
        Ok(fresh)
    }

    fn insert_unchecked(&mut self, key: &StateKey, value: &[u64; V]) -> Result<(), StoreError> {
        let words = &key.boxes.words()[..self.key_words];
        let pool = self.growth.pool.clone();
        let parallel_min = self.growth.parallel_min;
        self.shard_mut(key.agent)
            .insert_unique(words, value, pool.as_deref(), parallel_min)?;
        self.len += 1;
        Ok(())
    }

    fn update(&mut self, key: &StateKey, value: &[u64; V]) -> bool {
        let words = &key.boxes.words()[..self.key_words];
        match self.shards.get_mut(key.agent as usize) {
            Some(Some(shard)) => shard.update(words, value),
            _ => false,
        }
    }

    fn remove(&mut self, key: &StateKey) -> bool {
        let words = &key.boxes.words()[..self.key_words];
        let removed = match self.shards.get_mut(key.agent as usize) {
            Some(Some(shard)) => shard.remove(words),
            _ => false,
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn remove_if(&mut self, pred: &mut dyn FnMut(&StateKey, [u64; V]) -> bool) -> usize {
        let mut removed = 0;
        for (agent, shard) in self.shards.iter_mut().enumerate() {
            let Some(shard) = shard else { continue };
            removed += shard.remove_if(|words, value| {
                let key = StateKey {
                    agent: agent as Cell,
                    boxes: BoxSet::from_words(words),
                };
                pred(&key, value)
            });
        }
        self.len -= removed;
        removed
    }

    fn clear(&mut self) {
        for shard in self.shards.iter_mut().flatten() {
            shard.clear();
        }
        self.len = 0;
    }

    fn for_each(&self, f: &mut dyn FnMut(&StateKey, [u64; V])) {
        for (agent, shard) in self.shards.iter().enumerate() {
            let Some(shard) = shard else { continue };
            shard.for_each(|words, value| {
                let key = StateKey {
                    agent: agent as Cell,
                    boxes: BoxSet::from_words(words),
                };
                f(&key, value)
            });
        }
    }
}

/// Presence-only store. Backs the visited sets of bounded sub-searches.
pub struct PackedSet {
    inner: Sharded<0>,
}

impl PackedSet {
    pub fn new(cells: usize, key_words: usize, growth: Growth) -> Self {
        PackedSet {
            inner: Sharded::new(cells, key_words, growth),
        }
    }

    /// Empties every shard but keeps the allocations for the next run.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl StateStore for PackedSet {
    type Value = ();

    fn contains(&self, key: &StateKey) -> bool {
        self.inner.get(key).is_some()
    }

    fn get(&self, key: &StateKey) -> Option<()> {
        self.inner.get(key).map(|_| ())
    }

    fn insert(&mut self, key: &StateKey, _: ()) -> Result<bool, StoreError> {
        self.inner.insert(key, &[])
    }

    fn insert_unchecked(&mut self, key: &StateKey, _: ()) -> Result<(), StoreError> {
        self.inner.insert_unchecked(key, &[])
    }

    fn update(&mut self, key: &StateKey, _: ()) -> bool {
        self.contains(key)
    }

    fn remove(&mut self, key: &StateKey) -> bool {
        self.inner.remove(key)
    }

    fn remove_if(&mut self, pred: &mut dyn FnMut(&StateKey, ()) -> bool) -> usize {
        self.inner.remove_if(&mut |key, _| pred(key, ()))
    }

    fn len(&self) -> usize {
        self.inner.len
    }
}

/// Key to [`Payload`] store, used for the open and closed sets.
pub struct PackedMap {
    inner: Sharded<2>,
}

impl PackedMap {
    pub fn new(cells: usize, key_words: usize, growth: Growth) -> Self {
        PackedMap {
            inner: Sharded::new(cells, key_words, growth),
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&StateKey, Payload)) {
        self.inner
            .for_each(&mut |key, words| f(key, Payload::unpack(words)));
    }
}

impl StateStore for PackedMap {
    type Value = Payload;

    fn contains(&self, key: &StateKey) -> bool {
        self.inner.get(key).is_some()
    }

    fn get(&self, key: &StateKey) -> Option<Payload> {
        self.inner.get(key).map(Payload::unpack)
    }

    fn insert(&mut self, key: &StateKey, value: Payload) -> Result<bool, StoreError> {
        self.inner.insert(key, &value.pack())
    }

    fn insert_unchecked(&mut self, key: &StateKey, value: Payload) -> Result<(), StoreError> {
        self.inner.insert_unchecked(key, &value.pack())
    }

    fn update(&mut self, key: &StateKey, value: Payload) -> bool {
        self.inner.update(key, &value.pack())
    }

    fn remove(&mut self, key: &StateKey) -> bool {
        self.inner.remove(key)
    }

    fn remove_if(&mut self, pred: &mut dyn FnMut(&StateKey, Payload) -> bool) -> usize {
        self.inner
            .remove_if(&mut |key, words| pred(key, Payload::unpack(words)))
    }

    fn len(&self) -> usize {
        self.inner.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Direction;

    fn key(agent: Cell, cells: &[usize]) -> StateKey {
        StateKey {
            agent,
            boxes: cells.iter().copied().collect(),
        }
    }

    fn payload(dist: u32) -> Payload {
        Payload {
            dist,
            total: dist + 1,
            dir: Direction::Right,
            pushes: 1,
            prev_agent: 3,
            box_cell: 9,
        }
    }

    #[test]
    fn shards_keep_agents_apart() {
        let mut set = PackedSet::new(16, 1, Growth::sequential());
        assert!(set.insert(&key(1, &[5, 7]), ()).unwrap());
        assert!(set.insert(&key(2, &[5, 7]), ()).unwrap());
        assert!(!set.insert(&key(1, &[5, 7]), ()).unwrap());
        assert_eq!(set.len(), 2);
        assert!(set.remove(&key(1, &[5, 7])));
        assert!(!set.contains(&key(1, &[5, 7])));
        assert!(set.contains(&key(2, &[5, 7])));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn map_updates_and_sweeps_payloads() {
        let mut map = PackedMap::new(8, 2, Growth::sequential());
        for a in 0..8u16 {
            map.insert(&key(a, &[70, a as usize]), payload(a as u32)).unwrap();
        }
        assert!(map.update(&key(3, &[70, 3]), payload(42)));
        assert_eq!(map.get(&key(3, &[70, 3])).map(|p| p.dist), Some(42));
        assert!(!map.update(&key(3, &[70, 4]), payload(1)));

        let gone = map.remove_if(&mut |k, _| k.boxes.contains(5));
        assert_eq!(gone, 1);
        assert_eq!(map.len(), 7);
        assert!(!map.contains(&key(5, &[70, 5])));

        let mut seen = 0;
        map.for_each(|k, p| {
            assert!(k.boxes.contains(70));
            assert_eq!(p.box_cell, 9);
            seen += 1;
        });
        assert_eq!(seen, 7);
    }
}
