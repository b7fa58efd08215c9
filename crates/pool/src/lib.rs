//! Transaction and debt pools.
//!
//! The pool layer turns gossip and local submissions into nonce-ordered,
//! price-ranked, capacity-bounded pending sets the miner packs from:
//!
//! - [`ObjectPool`]: generic pool over transactions and debts — dedupe,
//!   eviction, pending/processing sets, fork reinjection
//! - [`TransactionPool`]: admission validation plus the duplicate-tx window
//! - [`DebtPool`]: two-stage pool (to-confirm → confirmed) with a
//!   multi-threaded verifier
//! - [`CachedTxWindow`]: bounded dedup set over recently mined transactions
//! - [`DebtPropagator`]: confirmed-depth debt relay to destination shards

mod cached_txs;
mod collection;
mod config;
mod debt_pool;
mod events;
mod object;
mod pending_queue;
mod pool;
mod propagate;
mod tx_pool;

pub use cached_txs::{CachedTxWindow, CACHED_BLOCKS, EVICT_DENOM};
pub use collection::NonceCollection;
pub use config::{DebtPoolConfig, TxPoolConfig};
pub use debt_pool::DebtPool;
pub use events::run_pool_events;
pub use object::PoolObject;
pub use pending_queue::PendingQueue;
pub use pool::{ObjectPool, PoolError, PoolHooks};
pub use propagate::{DebtPropagator, MAX_DEBT_PEERS};
pub use tx_pool::TransactionPool;
