//! Cross-sender priority queue.
//!
//! Two levels: each sender owns a nonce-ordered [`NonceCollection`]; the
//! senders themselves are ranked by the price of their head item (earlier
//! insertion wins ties). Heads of senders are the only globally orderable
//! objects — a nonce gap inside one sender only blocks that sender — so this
//! keeps pack and evict cost logarithmic.

use crate::collection::{NonceCollection, PoolItem};
use crate::object::PoolObject;
use lattice_types::Address;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Ranking key for one sender's head item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadKey {
    price: u128,
    seq: u64,
    sender: Address,
}

impl Ord for HeadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher price ranks later (set max = best); among equal prices the
        // earlier insertion ranks later. Sender breaks exact ties.
        self.price
            .cmp(&other.price)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| self.sender.cmp(&other.sender))
    }
}

impl PartialOrd for HeadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Price-ranked queue of per-sender nonce collections.
#[derive(Debug, Default)]
pub struct PendingQueue {
    collections: HashMap<Address, NonceCollection>,
    order: BTreeSet<HeadKey>,
    len: usize,
}

impl PendingQueue {
    pub fn new() -> PendingQueue {
        PendingQueue::default()
    }

    fn key_for(&self, sender: Address) -> Option<HeadKey> {
        self.collections
            .get(&sender)
            .and_then(|c| c.head_key())
            .map(|(price, seq)| HeadKey { price, seq, sender })
    }

    /// Insert an item, replacing any existing entry at the same
    /// (sender, nonce). The caller decides whether a replacement is allowed.
    pub(crate) fn add(&mut self, item: PoolItem) {
        let sender = item.object.from_account();
        let old_key = self.key_for(sender);

        let collection = self
            .collections
            .entry(sender)
            .or_insert_with(NonceCollection::new);
        if collection.add(item) {
            self.len += 1;
        }

        let new_key = self.key_for(sender);
        if old_key != new_key {
            if let Some(k) = old_key {
                self.order.remove(&k);
            }
            if let Some(k) = new_key {
                self.order.insert(k);
            }
        }
    }

    /// Look up the object at (sender, nonce).
    pub(crate) fn get(&self, sender: Address, nonce: u64) -> Option<&PoolObject> {
        self.collections
            .get(&sender)
            .and_then(|c| c.get(nonce))
            .map(|item| &item.object)
    }

    /// Remove the object at (sender, nonce).
    pub(crate) fn remove(&mut self, sender: Address, nonce: u64) -> bool {
        let old_key = self.key_for(sender);
        let Some(collection) = self.collections.get_mut(&sender) else {
            return false;
        };
        if !collection.remove(nonce) {
            return false;
        }
        self.len -= 1;

        if collection.is_empty() {
            self.collections.remove(&sender);
        }
        if let Some(k) = old_key {
            self.order.remove(&k);
        }
        if let Some(k) = self.key_for(sender) {
            self.order.insert(k);
        }
        true
    }

    /// The globally best next-processable item: highest head price, earlier
    /// insertion on ties.
    pub(crate) fn peek(&self) -> Option<&PoolItem> {
        let best = self.order.last()?;
        self.collections.get(&best.sender)?.peek()
    }

    /// Remove and return the best item.
    pub(crate) fn pop(&mut self) -> Option<PoolItem> {
        let best = *self.order.last()?;
        self.order.remove(&best);

        let collection = self.collections.get_mut(&best.sender)?;
        let item = collection.pop()?;
        self.len -= 1;

        if collection.is_empty() {
            self.collections.remove(&best.sender);
        } else if let Some(k) = self.key_for(best.sender) {
            self.order.insert(k);
        }
        Some(item)
    }

    /// Under capacity pressure: detach and return the lowest-priced sender
    /// whose head is strictly below `min_price`.
    pub(crate) fn discard(&mut self, min_price: u128) -> Option<NonceCollection> {
        let worst = *self.order.first()?;
        if worst.price >= min_price {
            return None;
        }

        self.order.remove(&worst);
        let collection = self.collections.remove(&worst.sender)?;
        self.len -= collection.len();
        Some(collection)
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All queued objects, sender order unspecified, nonces ascending per
    /// sender.
    pub fn list(&self) -> Vec<PoolObject> {
        self.collections.values().flat_map(|c| c.list()).collect()
    }
}
