//! Bounded dedup window over recently mined transactions.
//!
//! The window stops duplicate gossip from re-populating the pool with
//! already-mined transactions. Perfect fidelity is not required: on overflow
//! a random slice of entries is dropped, which keeps the bound without
//! ordering the set. Even if a recently mined hash is evicted early, the
//! pool's own dedup and admission checks still reject a replay that makes it
//! through.

use lattice_core::{ChainError, ChainStore};
use lattice_types::Hash;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

/// How many canonical blocks the window is sized to cover.
pub const CACHED_BLOCKS: u64 = 24_000;

/// On overflow, 1/EVICT_DENOM of the entries are evicted at random.
pub const EVICT_DENOM: usize = 20;

/// Default capacity: window blocks times an average of 500 txs per block.
const DEFAULT_CAPACITY: usize = CACHED_BLOCKS as usize * 500;

/// Bounded set of recently packed transaction hashes.
pub struct CachedTxWindow {
    capacity: usize,
    content: RwLock<HashSet<Hash>>,
}

impl CachedTxWindow {
    /// A window with the given capacity; zero selects the default.
    pub fn new(capacity: usize) -> CachedTxWindow {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        CachedTxWindow {
            capacity,
            content: RwLock::new(HashSet::new()),
        }
    }

    /// Seed the window from canonical history, walking back up to
    /// [`CACHED_BLOCKS`] blocks from the head. The reward transaction at
    /// index 0 of each block is skipped.
    pub fn init_from_chain(&self, store: &dyn ChainStore) -> Result<(), ChainError> {
        let head = store.block(&store.head_hash()?)?;
        let height = head.height();
        let start = height.saturating_sub(CACHED_BLOCKS);

        let mut cached = 0usize;
        let mut duplicates = 0usize;
        for h in start..=height {
            let block = store.block_by_height(h)?;
            for tx in block.user_transactions() {
                if self.add(tx.hash()) {
                    cached += 1;
                } else {
                    duplicates += 1;
                }
            }
        }

        tracing::info!(
            blocks = height - start + 1,
            cached,
            duplicates,
            "seeded duplicate-tx window from canonical history"
        );
        Ok(())
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.content.read().contains(hash)
    }

    /// Insert a hash; returns false if it was already present. Overflow
    /// evicts a random 1/[`EVICT_DENOM`] of the window first.
    pub fn add(&self, hash: Hash) -> bool {
        let mut content = self.content.write();
        if content.len() >= self.capacity {
            let evict = content.len() / EVICT_DENOM;
            tracing::warn!(
                len = content.len(),
                evict,
                "duplicate-tx window full, dropping random entries"
            );
            let victims: Vec<Hash> = content
                .iter()
                .copied()
                .choose_multiple(&mut rand::thread_rng(), evict);
            for victim in victims {
                content.remove(&victim);
            }
        }
        content.insert(hash)
    }

    pub fn remove(&self, hash: &Hash) {
        self.content.write().remove(hash);
    }

    pub fn len(&self) -> usize {
        self.content.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u64) -> Hash {
        Hash::of(&n)
    }

    #[test]
    fn add_has_remove() {
        let window = CachedTxWindow::new(100);
        assert!(window.add(h(1)));
        assert!(!window.add(h(1)));
        assert!(window.has(&h(1)));
        window.remove(&h(1));
        assert!(!window.has(&h(1)));
    }

    #[test]
    fn overflow_evicts_a_slice() {
        let window = CachedTxWindow::new(100);
        for n in 0..100 {
            window.add(h(n));
        }
        assert_eq!(window.len(), 100);

        // The next insert trims 100/EVICT_DENOM entries, then adds one.
        window.add(h(1000));
        assert_eq!(window.len(), 100 - 100 / EVICT_DENOM + 1);
        assert!(window.has(&h(1000)));
    }

    #[test]
    fn zero_capacity_selects_default() {
        let window = CachedTxWindow::new(0);
        assert_eq!(window.capacity, CACHED_BLOCKS as usize * 500);
    }
}
