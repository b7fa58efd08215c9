//! Shard-aware propagation of transactions and debts.
//!
//! Debts travel once their block is at confirmed depth: on every committed
//! block the confirmed block `CONFIRMED_DEPTH` below it is walked, its debt
//! map derived, and each destination shard's slice sent to a bounded random
//! sample of that shard's peers.

use lattice_core::{Chain, EventBus, EventReceiver, HeadStatus, ShardRelay};
use lattice_core::Event;
use lattice_types::{debt_map, Block, Debt, DebtMap, Transaction, CONFIRMED_DEPTH, SHARD_COUNT};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Upper bound on peers per destination shard for one debt batch.
pub const MAX_DEBT_PEERS: usize = 7;

/// Relays pool and chain events to peers through the transport boundary.
pub struct DebtPropagator {
    chain: Arc<dyn Chain>,
    relay: Arc<dyn ShardRelay>,
    shard: u16,
}

impl DebtPropagator {
    pub fn new(chain: Arc<dyn Chain>, relay: Arc<dyn ShardRelay>, shard: u16) -> DebtPropagator {
        DebtPropagator {
            chain,
            relay,
            shard,
        }
    }

    /// Handle a locally mined block: announce the head and propagate the
    /// debts of the block that just reached confirmed depth.
    pub fn on_block_mined(&self, block: &Block) {
        self.broadcast_head(block);

        let height = block.height();
        if height <= CONFIRMED_DEPTH {
            return;
        }

        let confirmed_height = height - CONFIRMED_DEPTH;
        let confirmed = match self.chain.store().block_by_height(confirmed_height) {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(
                    height = confirmed_height,
                    %err,
                    "failed to load confirmed block for debt propagation"
                );
                return;
            }
        };

        let map = debt_map(&confirmed.transactions);
        let total: usize = map.iter().map(Vec::len).sum();
        tracing::debug!(total, height = confirmed_height, "propagating debt map");
        if total > 0 {
            self.propagate_debt_map(&map, true);
        }
    }

    /// Forward a single gossiped debt toward its destination shard.
    pub fn on_debt_received(&self, debt: &Arc<Debt>) {
        let mut map: DebtMap = vec![Vec::new(); SHARD_COUNT as usize + 1];
        map[debt.destination_shard() as usize].push(Arc::clone(debt));
        self.propagate_debt_map(&map, true);
    }

    /// Send each shard's slice of the map to a bounded random peer sample.
    pub fn propagate_debt_map(&self, map: &DebtMap, filter_known: bool) {
        for shard in 1..=SHARD_COUNT {
            let debts = &map[shard as usize];
            if debts.is_empty() || shard == self.shard {
                continue;
            }

            let mut peers = self.relay.peers_by_shard(shard);
            peers.shuffle(&mut rand::thread_rng());
            peers.truncate(MAX_DEBT_PEERS);

            for peer in peers {
                if let Err(err) = self.relay.send_debts(&peer.id, debts, filter_known) {
                    tracing::warn!(peer = ?peer.id, %err, "failed to send debts to peer");
                }
            }
        }
    }

    /// Relay a freshly pooled transaction to peers of its processing shard.
    pub fn on_tx_inserted(&self, tx: &Arc<Transaction>) {
        let shard = tx.body.from.shard();
        for peer in self.relay.peers_by_shard(shard) {
            if let Err(err) = self.relay.send_transaction(&peer.id, tx) {
                tracing::warn!(peer = ?peer.id, %err, "failed to send transaction to peer");
            }
        }
    }

    fn broadcast_head(&self, block: &Block) {
        let status = HeadStatus {
            hash: block.hash(),
            height: block.height(),
            total_difficulty: block.header.difficulty,
        };
        if let Err(err) = self.relay.broadcast_head(&status) {
            tracing::warn!(%err, "failed to broadcast chain head");
        }
    }

    /// Event-driven loop: reacts to mined blocks and pool insertions until
    /// the bus closes.
    pub async fn run(self: Arc<Self>, bus: EventBus) {
        let mut events: EventReceiver = bus.subscribe();
        loop {
            match events.recv().await {
                Ok(Event::BlockMined(block)) => self.on_block_mined(&block),
                Ok(Event::TransactionInserted(tx)) => self.on_tx_inserted(&tx),
                Ok(Event::DebtsInserted(debt)) => self.on_debt_received(&debt),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "propagator lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}
