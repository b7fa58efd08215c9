//! Transaction pool: admission validation plus the duplicate-tx window.

use crate::cached_txs::CachedTxWindow;
use crate::config::TxPoolConfig;
use crate::object::PoolObject;
use crate::pool::{ObjectPool, PoolError, PoolHooks};
use lattice_core::{validate_for_admission, Chain, ChainStore, Event, EventBus, StateDb};
use lattice_types::{Block, Hash, Transaction};
use std::sync::Arc;
use std::time::Duration;

struct TxHooks {
    shard: u16,
    bus: EventBus,
    timeout: Duration,
}

impl PoolHooks for TxHooks {
    fn objects_from_block(&self, block: &Block) -> Vec<PoolObject> {
        block
            .user_transactions()
            .iter()
            .map(|tx| PoolObject::Transaction(Arc::clone(tx)))
            .collect()
    }

    fn can_remove(
        &self,
        store: &dyn ChainStore,
        state: &dyn StateDb,
        object: &PoolObject,
        age: Duration,
    ) -> (bool, bool) {
        let hash = object.hash();

        if age > self.timeout {
            tracing::debug!(tx = %hash, "dropping transaction unpacked for too long");
            return (true, true);
        }

        // Packed on the canonical chain: done, but keep the window entry so
        // late gossip of the same transaction still bounces.
        if matches!(store.tx_index(&hash), Ok(Some(_))) {
            return (true, false);
        }

        // The account moved past this nonce on another transaction; this one
        // can never apply again.
        if state.nonce(&object.from_account()) > object.nonce() {
            return (true, true);
        }

        (false, false)
    }

    fn validate(&self, state: &dyn StateDb, object: &PoolObject) -> Result<(), PoolError> {
        let tx = object.as_transaction().expect("tx pool holds transactions");
        if tx.is_reward() {
            return Err(PoolError::RewardNotPoolable);
        }
        validate_for_admission(state, tx, self.shard)?;
        Ok(())
    }

    fn after_add(&self, object: &PoolObject) {
        if let Some(tx) = object.as_transaction() {
            tracing::debug!(tx = %tx.hash(), "transaction entered the pending pool");
            self.bus.publish(Event::TransactionInserted(Arc::clone(tx)));
        }
    }
}

/// Pool of pending transactions for the local shard.
pub struct TransactionPool {
    pool: Arc<ObjectPool>,
}

impl TransactionPool {
    pub fn new(
        config: TxPoolConfig,
        shard: u16,
        chain: Arc<dyn Chain>,
        bus: EventBus,
        cached_txs: Arc<CachedTxWindow>,
    ) -> TransactionPool {
        let hooks = TxHooks {
            shard,
            bus,
            timeout: config.timeout,
        };
        TransactionPool {
            pool: Arc::new(ObjectPool::new(
                config.capacity,
                chain,
                Box::new(hooks),
                cached_txs,
            )),
        }
    }

    /// Admit one transaction. A window hit means it was already mined
    /// recently and is refused without touching the pool.
    pub fn add_transaction(&self, tx: Arc<Transaction>) -> Result<(), PoolError> {
        if self.pool.cached_txs().has(&tx.hash()) {
            return Err(PoolError::DuplicateTx);
        }
        self.pool.add_object(PoolObject::Transaction(tx))
    }

    pub fn get_transaction(&self, hash: &Hash) -> Option<Arc<Transaction>> {
        self.pool.get_object(hash).and_then(|o| o.into_transaction())
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.pool.has(hash)
    }

    pub fn remove_transaction(&self, hash: &Hash) {
        self.pool.remove_object(hash);
    }

    /// Drain pending transactions in priority order under a byte budget.
    pub fn get_processable_transactions(
        &self,
        byte_budget: usize,
    ) -> (Vec<Arc<Transaction>>, usize) {
        let (objects, size) = self.pool.take_processable(byte_budget);
        let txs = objects
            .into_iter()
            .filter_map(|o| o.into_transaction())
            .collect();
        (txs, size)
    }

    /// React to a fork-choice change: reinject orphaned transactions, sweep
    /// the rest, and record the new head block's transactions in the window.
    pub fn handle_chain_header_changed(&self, new_head: Hash, old_head: Hash) {
        self.pool.on_chain_head_change(new_head, old_head);
        if let Ok(block) = self.pool.chain().store().block(&new_head) {
            self.cache_block_txs(&block);
        }
    }

    pub fn handle_chain_reversed(&self, block: &Block) {
        self.pool.on_chain_reversed(block);
    }

    /// Record a committed block's non-reward transactions in the duplicate
    /// window.
    pub fn cache_block_txs(&self, block: &Block) {
        for tx in block.user_transactions() {
            self.pool.cached_txs().add(tx.hash());
        }
    }

    pub fn transaction_count(&self, processing: bool, pending: bool) -> usize {
        self.pool.object_count(processing, pending)
    }

    pub fn get_transactions(&self, processing: bool, pending: bool) -> Vec<Arc<Transaction>> {
        self.pool
            .objects(processing, pending)
            .into_iter()
            .filter_map(|o| o.into_transaction())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pool.pending_count()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// The shared generic pool, for maintenance spawning.
    pub fn inner(&self) -> &Arc<ObjectPool> {
        &self.pool
    }
}
