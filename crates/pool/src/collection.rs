//! Per-sender nonce-ordered collection.

use crate::object::PoolObject;
use std::collections::BTreeMap;
use std::time::Instant;

/// One pooled object plus pool-local metadata.
#[derive(Debug, Clone)]
pub(crate) struct PoolItem {
    pub object: PoolObject,
    /// Monotonic insertion sequence; the earlier-insertion tie-break key.
    pub seq: u64,
    /// Wall-clock arrival, used for age-based expiry only.
    pub added_at: Instant,
}

impl PoolItem {
    pub fn new(object: PoolObject, seq: u64) -> PoolItem {
        PoolItem {
            object,
            seq,
            added_at: Instant::now(),
        }
    }
}

/// The nonce-sorted objects of one sender.
///
/// Every entry of the map is reachable through `peek`/`pop` in ascending
/// nonce order; `peek` returns the lowest outstanding nonce.
#[derive(Debug, Default)]
pub struct NonceCollection {
    items: BTreeMap<u64, PoolItem>,
}

impl NonceCollection {
    pub(crate) fn new() -> NonceCollection {
        NonceCollection {
            items: BTreeMap::new(),
        }
    }

    /// Insert an item. An existing entry at the same nonce is replaced in
    /// place (the caller has already decided the replacement wins); returns
    /// false for a replacement, true for a fresh nonce.
    pub(crate) fn add(&mut self, item: PoolItem) -> bool {
        self.items.insert(item.object.nonce(), item).is_none()
    }

    pub(crate) fn get(&self, nonce: u64) -> Option<&PoolItem> {
        self.items.get(&nonce)
    }

    pub(crate) fn remove(&mut self, nonce: u64) -> bool {
        self.items.remove(&nonce).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The lowest-nonce item.
    pub(crate) fn peek(&self) -> Option<&PoolItem> {
        self.items.first_key_value().map(|(_, item)| item)
    }

    /// Remove and return the lowest-nonce item.
    pub(crate) fn pop(&mut self) -> Option<PoolItem> {
        self.items.pop_first().map(|(_, item)| item)
    }

    /// All objects, nonce-sorted.
    pub fn list(&self) -> Vec<PoolObject> {
        self.items.values().map(|item| item.object.clone()).collect()
    }

    /// Hashes of every object in the collection.
    pub(crate) fn hashes(&self) -> Vec<lattice_types::Hash> {
        self.items.values().map(|item| item.object.hash()).collect()
    }

    /// Ranking key of the head: price first, then earlier insertion.
    pub(crate) fn head_key(&self) -> Option<(u128, u64)> {
        self.peek().map(|item| (item.object.price(), item.seq))
    }
}
