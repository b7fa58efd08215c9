//! Two-stage debt pool.
//!
//! Incoming debts land in the to-confirm map. A background worker verifies
//! them against the source shard with `min(cpu/2, len)` threads and promotes
//! confirmed debts into the pending pool, where the miner packs them. Debts
//! that cannot be proven within the configured timeout are dropped.

use crate::cached_txs::CachedTxWindow;
use crate::config::DebtPoolConfig;
use crate::object::PoolObject;
use crate::pool::{ObjectPool, PoolError, PoolHooks};
use dashmap::DashMap;
use lattice_core::{Chain, ChainStore, DebtVerifier, Event, EventBus, StateDb};
use lattice_types::{Block, Debt, Hash};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct DebtHooks {
    bus: EventBus,
    timeout: Duration,
}

impl PoolHooks for DebtHooks {
    fn objects_from_block(&self, block: &Block) -> Vec<PoolObject> {
        block
            .debts
            .iter()
            .map(|d| PoolObject::Debt(Arc::clone(d)))
            .collect()
    }

    fn can_remove(
        &self,
        store: &dyn ChainStore,
        _state: &dyn StateDb,
        object: &PoolObject,
        age: Duration,
    ) -> (bool, bool) {
        let hash = object.hash();
        if age > self.timeout {
            tracing::debug!(debt = %hash, "dropping debt unpacked for too long");
            return (true, true);
        }

        if matches!(store.debt_index(&hash), Ok(Some(_))) {
            return (true, false);
        }

        (false, false)
    }

    fn validate(&self, _state: &dyn StateDb, _object: &PoolObject) -> Result<(), PoolError> {
        // Shape and verifier checks already ran before promotion.
        Ok(())
    }

    fn after_add(&self, object: &PoolObject) {
        if let Some(debt) = object.as_debt() {
            tracing::debug!(debt = %debt.hash(), "debt entered the pending pool");
            self.bus.publish(Event::DebtsInserted(Arc::clone(debt)));
        }
    }
}

struct ToConfirmEntry {
    debt: Arc<Debt>,
    added_at: Instant,
}

/// Pool of cross-shard debts destined for the local shard.
pub struct DebtPool {
    pool: Arc<ObjectPool>,
    verifier: Option<Arc<dyn DebtVerifier>>,
    to_confirm: DashMap<Hash, ToConfirmEntry>,
    to_confirm_capacity: usize,
    debt_timeout: Duration,
    shard: u16,
}

impl DebtPool {
    pub fn new(
        config: DebtPoolConfig,
        shard: u16,
        chain: Arc<dyn Chain>,
        bus: EventBus,
        verifier: Option<Arc<dyn DebtVerifier>>,
    ) -> DebtPool {
        let hooks = DebtHooks {
            bus,
            timeout: config.debt_timeout,
        };
        // The debt pool keeps no duplicate-tx window of its own.
        let cached = Arc::new(CachedTxWindow::new(1));
        DebtPool {
            pool: Arc::new(ObjectPool::new(
                config.capacity,
                chain,
                Box::new(hooks),
                cached,
            )),
            verifier,
            to_confirm: DashMap::new(),
            to_confirm_capacity: config.to_confirm_capacity,
            debt_timeout: config.debt_timeout,
            shard,
        }
    }

    /// Queue a debt for confirmation. Debts already known to either stage
    /// are ignored.
    pub fn add_debt(&self, debt: Arc<Debt>) -> Result<(), PoolError> {
        let hash = debt.hash();
        if self.to_confirm.contains_key(&hash) || self.pool.has(&hash) {
            return Ok(());
        }

        if self.to_confirm.len() >= self.to_confirm_capacity {
            tracing::warn!(debt = %hash, "to-confirm map full, debt refused");
            return Err(PoolError::ToConfirmFull);
        }

        self.to_confirm.insert(
            hash,
            ToConfirmEntry {
                debt,
                added_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn add_debts(&self, debts: Vec<Arc<Debt>>) {
        let count = debts.len();
        for debt in debts {
            if let Err(err) = self.add_debt(debt) {
                tracing::warn!(%err, "failed to queue debt for confirmation");
            }
        }
        tracing::debug!(
            count,
            total = self.debt_count(true, true),
            "queued incoming debts"
        );
    }

    /// One verification round over a snapshot of the to-confirm map, using
    /// `min(cpu/2, len)` worker threads. The first error stops every worker
    /// (fail-fast) and is returned.
    pub fn check_debts_once(&self) -> Result<(), PoolError> {
        self.purge_expired();

        let snapshot: Vec<Arc<Debt>> = self
            .to_confirm
            .iter()
            .map(|entry| Arc::clone(&entry.debt))
            .collect();
        if snapshot.is_empty() {
            return Ok(());
        }

        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = (cpus / 2).min(snapshot.len());
        tracing::debug!(threads, debts = snapshot.len(), "validating queued debts");

        // Single thread for few cores or few debts.
        if threads <= 1 {
            for debt in &snapshot {
                self.process_debt(debt)?;
            }
            return Ok(());
        }

        let has_err = AtomicBool::new(false);
        let first_err: Mutex<Option<PoolError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for offset in 0..threads {
                let snapshot = &snapshot;
                let has_err = &has_err;
                let first_err = &first_err;
                scope.spawn(move || {
                    let mut j = offset;
                    while j < snapshot.len() && !has_err.load(Ordering::Acquire) {
                        if let Err(err) = self.process_debt(&snapshot[j]) {
                            if !has_err.swap(true, Ordering::AcqRel) {
                                *first_err.lock() = Some(err);
                            }
                            break;
                        }
                        j += threads;
                    }
                });
            }
        });

        match first_err.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Verify one debt and act on the verdict:
    /// confirmed → promote to the pending pool;
    /// error without packing → unrecoverable, drop;
    /// error while packed → keep (not yet at confirm depth);
    /// unconfirmed without error → keep for the next round.
    fn process_debt(&self, debt: &Arc<Debt>) -> Result<(), PoolError> {
        if let Err(err) = debt.validate_shape(self.shard) {
            tracing::info!(debt = %debt.hash(), %err, "dropping malformed debt");
            self.to_confirm.remove(&debt.hash());
            return Err(err.into());
        }

        let Some(verifier) = &self.verifier else {
            return Ok(());
        };

        let verdict = verifier.validate_debt(debt);
        if verdict.confirmed {
            self.pool.add_object(PoolObject::Debt(Arc::clone(debt)))?;
            self.to_confirm.remove(&debt.hash());
            return Ok(());
        }

        match verdict.error {
            Some(err) if verdict.packed => {
                tracing::debug!(debt = %debt.hash(), %err, "debt packed but not yet confirmed");
                Err(err.into())
            }
            Some(err) => {
                tracing::info!(debt = %debt.hash(), %err, "dropping unprovable debt");
                self.to_confirm.remove(&debt.hash());
                Err(err.into())
            }
            None => Ok(()),
        }
    }

    /// Drop to-confirm entries older than the debt timeout.
    fn purge_expired(&self) {
        self.to_confirm
            .retain(|_, entry| entry.added_at.elapsed() <= self.debt_timeout);
    }

    /// Background confirmation loop. Exits immediately without a verifier;
    /// otherwise runs rounds until `stop` is raised, sleeping 10 s when idle
    /// and 5 s after a failed or partial round.
    pub fn run_verification(&self, stop: &AtomicBool) {
        if self.verifier.is_none() {
            tracing::info!("exit debt checking, no verifier configured");
            return;
        }

        while !stop.load(Ordering::Acquire) {
            let delay = if self.to_confirm.is_empty() {
                Duration::from_secs(10)
            } else {
                match self.check_debts_once() {
                    Ok(()) => Duration::from_secs(5),
                    Err(err) => {
                        tracing::warn!(%err, "debt verification round stopped early");
                        Duration::from_secs(5)
                    }
                }
            };
            std::thread::sleep(delay);
        }
    }

    /// Spawn the confirmation loop on its own thread.
    pub fn spawn_verification(
        self: &Arc<Self>,
        stop: Arc<AtomicBool>,
    ) -> std::thread::JoinHandle<()> {
        let pool = Arc::clone(self);
        std::thread::Builder::new()
            .name("debt-verifier".into())
            .spawn(move || pool.run_verification(&stop))
            .expect("spawn debt verifier thread")
    }

    /// Drain pending (confirmed) debts in priority order under a byte
    /// budget.
    pub fn get_processable_debts(&self, byte_budget: usize) -> (Vec<Arc<Debt>>, usize) {
        let (objects, size) = self.pool.take_processable(byte_budget);
        let debts = objects.into_iter().filter_map(|o| o.into_debt()).collect();
        (debts, size)
    }

    /// Look a debt up in either stage.
    pub fn get_debt(&self, hash: &Hash) -> Option<Arc<Debt>> {
        if let Some(entry) = self.to_confirm.get(hash) {
            return Some(Arc::clone(&entry.debt));
        }
        self.pool.get_object(hash).and_then(|o| o.into_debt())
    }

    /// Remove a debt from both stages.
    pub fn remove_debt(&self, hash: &Hash) {
        self.to_confirm.remove(hash);
        self.pool.remove_object(hash);
    }

    pub fn get_debts(&self, processing: bool, pending: bool) -> Vec<Arc<Debt>> {
        let mut debts: Vec<Arc<Debt>> = self
            .pool
            .objects(processing, pending)
            .into_iter()
            .filter_map(|o| o.into_debt())
            .collect();
        if pending {
            debts.extend(self.to_confirm.iter().map(|e| Arc::clone(&e.debt)));
        }
        debts
    }

    pub fn debt_count(&self, processing: bool, pending: bool) -> usize {
        let mut count = self.pool.object_count(processing, pending);
        if pending {
            count += self.to_confirm.len();
        }
        count
    }

    pub fn to_confirm_count(&self) -> usize {
        self.to_confirm.len()
    }

    pub fn handle_chain_header_changed(&self, new_head: Hash, old_head: Hash) {
        self.pool.on_chain_head_change(new_head, old_head);
    }

    pub fn handle_chain_reversed(&self, block: &Block) {
        self.pool.on_chain_reversed(block);
    }

    /// The shared generic pool, for maintenance spawning.
    pub fn inner(&self) -> &Arc<ObjectPool> {
        &self.pool
    }
}
