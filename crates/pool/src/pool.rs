//! Generic object pool over transactions and debts.
//!
//! Thread-safe container for objects received from the network or submitted
//! locally. An object leaves the pool once it is packed into a canonical
//! block or has waited longer than the configured timeout. A single
//! readers-writer lock guards the pool; the background sweep snapshots under
//! a read lock and mutates under the write lock.

use crate::cached_txs::CachedTxWindow;
use crate::collection::PoolItem;
use crate::object::PoolObject;
use crate::pending_queue::PendingQueue;
use lattice_core::{AdmissionError, Chain, ChainError, ChainStore, StateDb};
use lattice_types::{Block, DebtValidationError, Hash};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why the pool refused an object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("object hash already exists")]
    HashExists,

    #[error("object pool is full")]
    PoolFull,

    #[error("object nonce already used, wait or use a higher price")]
    NonceAlreadyUsed,

    #[error("transaction was packed in a recent block")]
    DuplicateTx,

    #[error("to-confirm debt map is full")]
    ToConfirmFull,

    #[error("reward transactions are not poolable")]
    RewardNotPoolable,

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Verifier(#[from] lattice_core::VerifierError),

    #[error(transparent)]
    Debt(#[from] DebtValidationError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Variant-specific behavior plugged into the generic pool.
pub trait PoolHooks: Send + Sync {
    /// The poolable objects a block carries (for reinjection walks).
    fn objects_from_block(&self, block: &Block) -> Vec<PoolObject>;

    /// Whether the sweep may drop the object from the pool and from the
    /// duplicate window: `(drop_from_pool, drop_from_cache)`.
    fn can_remove(
        &self,
        store: &dyn ChainStore,
        state: &dyn StateDb,
        object: &PoolObject,
        age: Duration,
    ) -> (bool, bool);

    /// Admission validation against a state snapshot.
    fn validate(&self, state: &dyn StateDb, object: &PoolObject) -> Result<(), PoolError>;

    /// Fired after a successful add (event-bus notification).
    fn after_add(&self, object: &PoolObject);
}

struct StoredItem {
    object: PoolObject,
    seq: u64,
    added_at: Instant,
}

struct PoolInner {
    items: HashMap<Hash, StoredItem>,
    queue: PendingQueue,
    processing: HashSet<Hash>,
}

/// Nonce-ordered, price-ranked, capacity-bounded pool.
pub struct ObjectPool {
    capacity: usize,
    chain: Arc<dyn Chain>,
    hooks: Box<dyn PoolHooks>,
    cached_txs: Arc<CachedTxWindow>,
    inner: RwLock<PoolInner>,
    seq: AtomicU64,
}

impl ObjectPool {
    pub fn new(
        capacity: usize,
        chain: Arc<dyn Chain>,
        hooks: Box<dyn PoolHooks>,
        cached_txs: Arc<CachedTxWindow>,
    ) -> ObjectPool {
        ObjectPool {
            capacity,
            chain,
            hooks,
            cached_txs,
            inner: RwLock::new(PoolInner {
                items: HashMap::new(),
                queue: PendingQueue::new(),
                processing: HashSet::new(),
            }),
            seq: AtomicU64::new(0),
        }
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.inner.read().items.contains_key(hash)
    }

    pub fn get_object(&self, hash: &Hash) -> Option<PoolObject> {
        self.inner.read().items.get(hash).map(|i| i.object.clone())
    }

    /// Add one object: dedupe, validate against the current state, honor the
    /// per-(sender, nonce) replacement rule and the capacity bound.
    pub fn add_object(&self, object: PoolObject) -> Result<(), PoolError> {
        if self.has(&object.hash()) {
            return Err(PoolError::HashExists);
        }

        let state = self.chain.current_state()?;
        self.hooks.validate(state.as_ref(), &object)?;

        {
            let mut inner = self.inner.write();
            if inner.items.contains_key(&object.hash()) {
                return Err(PoolError::HashExists);
            }

            // Replace only with a strictly higher price.
            let sender = object.from_account();
            if let Some(existing) = inner.queue.get(sender, object.nonce()) {
                if object.price() > existing.price() {
                    let old_hash = existing.hash();
                    tracing::debug!(
                        new = %object.hash(),
                        old = %old_hash,
                        "replacing pooled object with higher-priced duplicate nonce"
                    );
                    Self::do_remove(&mut inner, &old_hash);
                } else {
                    return Err(PoolError::NonceAlreadyUsed);
                }
            }

            // Capacity pressure: evict the cheapest sender strictly below the
            // newcomer's price, or refuse.
            if inner.items.len() >= self.capacity {
                let Some(discarded) = inner.queue.discard(object.price()) else {
                    return Err(PoolError::PoolFull);
                };
                let victim = discarded
                    .peek()
                    .map(|item| item.object.from_account())
                    .unwrap_or_default();
                tracing::info!(
                    account = %victim,
                    count = discarded.len(),
                    "pool full, discarded cheapest sender"
                );
                for hash in discarded.hashes() {
                    inner.items.remove(&hash);
                    inner.processing.remove(&hash);
                }
            }

            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let item = PoolItem::new(object.clone(), seq);
            inner.items.insert(
                object.hash(),
                StoredItem {
                    object: object.clone(),
                    seq,
                    added_at: item.added_at,
                },
            );
            inner.queue.add(item);
        }

        self.hooks.after_add(&object);
        Ok(())
    }

    /// Add a batch, returning how many were accepted.
    pub fn add_objects(&self, objects: Vec<PoolObject>) -> usize {
        let mut count = 0;
        for object in objects {
            match self.add_object(object) {
                Ok(()) => count += 1,
                Err(err) => tracing::debug!(%err, "batch add skipped an object"),
            }
        }
        count
    }

    pub fn remove_object(&self, hash: &Hash) {
        Self::do_remove(&mut *self.inner.write(), hash);
    }

    fn do_remove(inner: &mut PoolInner, hash: &Hash) {
        if let Some(item) = inner.items.remove(hash) {
            inner
                .queue
                .remove(item.object.from_account(), item.object.nonce());
            inner.processing.remove(hash);
        }
    }

    /// Drain heads in priority order until the byte budget is spent.
    /// Selected objects move from pending to processing; the previous
    /// round's processing marks are cleared first.
    pub fn take_processable(&self, byte_budget: usize) -> (Vec<PoolObject>, usize) {
        let mut inner = self.inner.write();
        inner.processing.clear();

        let mut taken = Vec::new();
        let mut total = 0usize;
        loop {
            let size = match inner.queue.peek() {
                Some(head) => head.object.size(),
                None => break,
            };
            if total.saturating_add(size) > byte_budget {
                break;
            }
            let item = inner.queue.pop().expect("peeked queue pops");
            total += size;
            inner.processing.insert(item.object.hash());
            taken.push(item.object);
        }

        (taken, total)
    }

    /// Reinject objects orphaned by a fork-choice change, then sweep.
    pub fn on_chain_head_change(&self, new_head: Hash, old_head: Hash) {
        let reinject = self.reinjectable(new_head, old_head);
        let count = self.add_objects(reinject);
        if count > 0 {
            tracing::info!(count, "reinjected objects after head change");
        }

        self.sweep();
    }

    /// Treat every object of a reverted block as a reinjection candidate.
    pub fn on_chain_reversed(&self, block: &Block) {
        let count = self.add_objects(self.hooks.objects_from_block(block));
        if count > 0 {
            tracing::info!(count, "reinjected objects from reverted block");
        }

        self.sweep();
    }

    /// Objects committed on the old branch but absent from the new one.
    fn reinjectable(&self, new_head: Hash, old_head: Hash) -> Vec<PoolObject> {
        let store = self.chain.store();

        let mut new_block = match store.block(&new_head) {
            Ok(b) => b,
            Err(err) => {
                tracing::error!(%err, "failed to load new head");
                return Vec::new();
            }
        };

        if new_block.header.previous_hash == old_head {
            // Plain extension, nothing was orphaned.
            return Vec::new();
        }

        let mut old_block = match store.block(&old_head) {
            Ok(b) => b,
            Err(err) => {
                tracing::debug!(%err, "failed to load old head");
                return Vec::new();
            }
        };

        tracing::debug!(
            old_height = old_block.height(),
            new_height = new_block.height(),
            "walking forked branches back to the common ancestor"
        );

        let mut to_delete: HashMap<Hash, PoolObject> = HashMap::new();
        let mut to_add: HashMap<Hash, PoolObject> = HashMap::new();

        let step = |block: &Arc<Block>| -> Result<Arc<Block>, ChainError> {
            store.block(&block.header.previous_hash)
        };

        let walk = |block: &Arc<Block>, into: &mut HashMap<Hash, PoolObject>, hooks: &dyn PoolHooks| {
            for obj in hooks.objects_from_block(block) {
                into.insert(obj.hash(), obj);
            }
        };

        loop {
            if new_block.height() > old_block.height() {
                walk(&new_block, &mut to_delete, self.hooks.as_ref());
                new_block = match step(&new_block) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::error!(%err, "branch walk failed");
                        return Vec::new();
                    }
                };
            } else if old_block.height() > new_block.height() {
                walk(&old_block, &mut to_add, self.hooks.as_ref());
                old_block = match step(&old_block) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::error!(%err, "branch walk failed");
                        return Vec::new();
                    }
                };
            } else if old_block.hash() != new_block.hash() {
                walk(&old_block, &mut to_add, self.hooks.as_ref());
                walk(&new_block, &mut to_delete, self.hooks.as_ref());
                old_block = match step(&old_block) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::error!(%err, "branch walk failed");
                        return Vec::new();
                    }
                };
                new_block = match step(&new_block) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::error!(%err, "branch walk failed");
                        return Vec::new();
                    }
                };
            } else {
                break;
            }
        }

        let reinject: Vec<PoolObject> = to_add
            .into_iter()
            .filter(|(hash, _)| !to_delete.contains_key(hash))
            .map(|(_, obj)| obj)
            .collect();

        tracing::debug!(
            deleted = to_delete.len(),
            reinject = reinject.len(),
            "computed reinjection set"
        );
        reinject
    }

    /// Drop objects the hooks consider finished (packed on the canonical
    /// chain, expired, or stale against current state).
    pub fn sweep(&self) {
        let state = match self.chain.current_state() {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(%err, "sweep skipped, state unavailable");
                return;
            }
        };

        let snapshot: Vec<(Hash, PoolObject, Instant)> = {
            let inner = self.inner.read();
            inner
                .items
                .iter()
                .map(|(hash, item)| (*hash, item.object.clone(), item.added_at))
                .collect()
        };

        for (hash, object, added_at) in snapshot {
            let (drop_pool, drop_cache) = self.hooks.can_remove(
                self.chain.store(),
                state.as_ref(),
                &object,
                added_at.elapsed(),
            );
            if drop_pool {
                if drop_cache {
                    self.cached_txs.remove(&hash);
                }
                self.remove_object(&hash);
            }
        }
    }

    /// One background maintenance round; returns how long to sleep before
    /// the next. With pending work queued the pool leaves everything alone;
    /// on an empty queue it sweeps and rotates unpacked objects back to
    /// pending.
    pub fn maintenance_tick(&self) -> Duration {
        if self.pending_count() > 0 {
            return Duration::from_secs(10);
        }

        self.sweep();

        let requeued: Vec<PoolObject> = {
            let mut inner = self.inner.write();
            let missing: Vec<PoolItem> = inner
                .items
                .iter()
                .filter(|(hash, item)| {
                    !inner.processing.contains(*hash)
                        && inner
                            .queue
                            .get(item.object.from_account(), item.object.nonce())
                            .is_none()
                })
                .map(|(_, item)| PoolItem {
                    object: item.object.clone(),
                    seq: item.seq,
                    added_at: item.added_at,
                })
                .collect();

            let objects: Vec<PoolObject> = missing.iter().map(|i| i.object.clone()).collect();
            for item in missing {
                inner.queue.add(item);
            }
            objects
        };

        for object in &requeued {
            self.hooks.after_add(object);
        }

        Duration::from_secs(5)
    }

    /// Background maintenance loop. Abort the task to stop it.
    pub async fn run_maintenance(self: Arc<Self>) {
        loop {
            let delay = self.maintenance_tick();
            tokio::time::sleep(delay).await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().queue.count()
    }

    /// Total objects across the selected states.
    pub fn object_count(&self, processing: bool, pending: bool) -> usize {
        let inner = self.inner.read();
        let mut count = 0;
        if processing {
            count += inner.processing.len();
        }
        if pending {
            count += inner.queue.count();
        }
        count
    }

    /// Objects across the selected states.
    pub fn objects(&self, processing: bool, pending: bool) -> Vec<PoolObject> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        if processing {
            for hash in &inner.processing {
                if let Some(item) = inner.items.get(hash) {
                    out.push(item.object.clone());
                }
            }
        }
        if pending {
            out.extend(inner.queue.list());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub(crate) fn cached_txs(&self) -> &Arc<CachedTxWindow> {
        &self.cached_txs
    }

    pub(crate) fn chain(&self) -> &Arc<dyn Chain> {
        &self.chain
    }
}
