//! Event-bus glue for the pools.

use crate::{DebtPool, TransactionPool};
use lattice_core::{Event, EventBus};
use std::sync::Arc;

/// Subscribe both pools to chain events: fork-choice changes trigger
/// reinjection and sweeping. Runs until the bus closes.
pub async fn run_pool_events(
    tx_pool: Arc<TransactionPool>,
    debt_pool: Arc<DebtPool>,
    bus: EventBus,
) {
    let mut events = bus.subscribe();
    loop {
        match events.recv().await {
            Ok(Event::ChainHeaderChanged { new_head, old_head }) => {
                tx_pool.handle_chain_header_changed(new_head, old_head);
                debt_pool.handle_chain_header_changed(new_head, old_head);
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "pool event pump lagged behind the bus");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}
