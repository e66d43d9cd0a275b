//! Open set: a packed map for payloads plus cost buckets for ordering.
//!
//! Bucket `c` holds the keys whose total cost was `c` when they were pushed.
//! Lowering a key's cost pushes it again into the cheaper bucket and leaves
//! the old entry behind; stale entries are recognised at pop time because
//! the map no longer agrees on their cost.

use super::{Growth, PackedMap, StateStore};
use crate::bits::BoxSet;
use crate::error::StoreError;
use crate::state::{Payload, StateKey};

pub struct OpenSet {
    map: PackedMap,
    key_words: usize,
    // Flat per bucket: agent word, then `key_words` box words.
    buckets: Vec<Vec<u64>>,
    min_bucket: usize,
}

impl OpenSet {
    pub fn new(cells: usize, key_words: usize, growth: Growth) -> Self {
        OpenSet {
            map: PackedMap::new(cells, key_words, growth),
            key_words,
            buckets: Vec::new(),
            min_bucket: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn get(&self, key: &StateKey) -> Option<Payload> {
        self.map.get(key)
    }

    #[inline]
    pub fn contains(&self, key: &StateKey) -> bool {
        self.map.contains(key)
    }

    /// Adds a key that is not yet open. `Ok(false)` if it already was.
    pub fn add(&mut self, key: &StateKey, payload: Payload) -> Result<bool, StoreError> {
        if !self.map.insert(key, payload)? {
            return Ok(false);
        }
        self.enqueue(key, payload.total);
        Ok(true)
    }

    /// Replaces the payload of an open key if the new one is cheaper.
    pub fn decrease(&mut self, key: &StateKey, payload: Payload) -> bool {
        match self.map.get(key) {
            Some(old) if payload.total < old.total || (payload.total == old.total && payload.dist < old.dist) => {
                self.map.update(key, payload);
                if payload.total != old.total {
                    self.enqueue(key, payload.total);
                }
                true
            }
            _ => false,
        }
    }

    /// Cheapest live entry, removed from the set. Ties pop most recent first.
    pub fn pop_min(&mut self) -> Option<(StateKey, Payload)> {
        let stride = 1 + self.key_words;
        while self.min_bucket < self.buckets.len() {
            let cost = self.min_bucket;
            let bucket = &mut self.buckets[cost];
            if bucket.len() < stride {
                bucket.clear();
                bucket.shrink_to_fit();
                self.min_bucket += 1;
                continue;
            }
            let at = bucket.len() - stride;
            let key = StateKey {
                agent: bucket[at] as u16,
                boxes: BoxSet::from_words(&bucket[at + 1..]),
            };
            bucket.truncate(at);
            match self.map.get(&key) {
                Some(payload) if payload.total as usize == cost => {
                    self.map.remove(&key);
                    return Some((key, payload));
                }
                _ => continue,
            }
        }
        None
    }

    /// Lowest bucket that may still hold a live entry.
    pub fn min_cost(&self) -> usize {
        self.min_bucket
    }

    /// Drops every open key matching `pred`. Their bucket entries go stale.
    pub fn remove_if(&mut self, pred: &mut dyn FnMut(&StateKey, Payload) -> bool) -> usize {
        self.map.remove_if(pred)
    }

    fn enqueue(&mut self, key: &StateKey, total: u32) {
        let cost = total as usize;
        if cost >= self.buckets.len() {
            self.buckets.resize_with(cost + 1, Vec::new);
        }
        let bucket = &mut self.buckets[cost];
        bucket.push(key.agent as u64);
        bucket.extend_from_slice(&key.boxes.words()[..self.key_words]);
        if cost < self.min_bucket {
            self.min_bucket = cost;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Direction;

    fn key(agent: u16, cell: usize) -> StateKey {
        let mut boxes = BoxSet::new();
        boxes.insert(cell);
        StateKey { agent, boxes }
    }

    fn payload(dist: u32, total: u32) -> Payload {
        Payload {
            dist,
            total,
            dir: Direction::Up,
            pushes: 1,
            prev_agent: 0,
            box_cell: 0,
        }
    }

    #[test]
    fn pops_in_cost_order() {
        let mut open = OpenSet::new(4, 1, Growth::sequential());
        open.add(&key(0, 1), payload(1, 7)).unwrap();
        open.add(&key(1, 2), payload(1, 3)).unwrap();
        open.add(&key(2, 3), payload(1, 5)).unwrap();
        assert!(!open.add(&key(2, 3), payload(0, 1)).unwrap());
        let costs: Vec<u32> = std::iter::from_fn(|| open.pop_min()).map(|(_, p)| p.total).collect();
        assert_eq!(costs, vec![3, 5, 7]);
        assert!(open.is_empty());
    }

    #[test]
    fn decrease_leaves_a_stale_entry_behind() {
        let mut open = OpenSet::new(4, 1, Growth::sequential());
        open.add(&key(0, 1), payload(4, 9)).unwrap();
        open.add(&key(1, 2), payload(4, 6)).unwrap();
        assert!(open.decrease(&key(0, 1), payload(2, 5)));
        assert!(!open.decrease(&key(0, 1), payload(3, 8)));

        let (k, p) = open.pop_min().unwrap();
        assert_eq!((k, p.total, p.dist), (key(0, 1), 5, 2));
        let (k, _) = open.pop_min().unwrap();
        assert_eq!(k, key(1, 2));
        // The cost-9 entry for key(0, 1) is stale and must not resurface.
        assert!(open.pop_min().is_none());
    }

    #[test]
    fn adding_below_the_minimum_rewinds() {
        let mut open = OpenSet::new(4, 1, Growth::sequential());
        open.add(&key(0, 1), payload(0, 4)).unwrap();
        open.add(&key(0, 2), payload(0, 6)).unwrap();
        open.pop_min().unwrap();
        assert_eq!(open.min_cost(), 4);
        open.add(&key(1, 3), payload(0, 2)).unwrap();
        assert_eq!(open.pop_min().map(|(_, p)| p.total), Some(2));
        assert_eq!(open.pop_min().map(|(_, p)| p.total), Some(6));
    }

    #[test]
    fn purged_keys_never_pop() {
        let mut open = OpenSet::new(4, 1, Growth::sequential());
        open.add(&key(0, 1), payload(0, 1)).unwrap();
        open.add(&key(0, 2), payload(0, 1)).unwrap();
        assert_eq!(open.remove_if(&mut |k, _| k.boxes.contains(2)), 1);
        assert_eq!(open.pop_min().map(|(k, _)| k), Some(key(0, 1)));
        assert!(open.pop_min().is_none());
    }
}
