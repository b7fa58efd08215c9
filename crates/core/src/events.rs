//! Node-internal event bus.
//!
//! Asynchronous fan-out, at-least-once within the process. Consumers must be
//! idempotent; a lagging subscriber drops the oldest events rather than
//! blocking producers.

use lattice_types::{Block, Debt, Hash, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default bus depth. Bounded: a slow consumer lags, it never backpressures
/// the miner or the pools.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Everything the core announces to the rest of the node.
#[derive(Debug, Clone)]
pub enum Event {
    /// A transaction entered the pending pool.
    TransactionInserted(Arc<Transaction>),

    /// A debt entered the pending pool (verification passed).
    DebtsInserted(Arc<Debt>),

    /// The local miner sealed and committed a block.
    BlockMined(Arc<Block>),

    /// Fork choice moved the canonical head.
    ChainHeaderChanged { new_head: Hash, old_head: Hash },

    /// Block sync started; mining must pause.
    DownloaderStart,

    /// Block sync finished.
    DownloaderDone,

    /// Block sync aborted.
    DownloaderFailed,
}

/// Receiver half of the bus.
pub type EventReceiver = broadcast::Receiver<Event>;

/// Fan-out event bus shared by the pools, the miner and the relay glue.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> EventBus {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. A bus with no subscribers simply
    /// drops the event.
    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::trace!("event published with no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_fan_out_to_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Event::DownloaderStart);

        assert!(matches!(a.recv().await, Ok(Event::DownloaderStart)));
        assert!(matches!(b.recv().await, Ok(Event::DownloaderStart)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.publish(Event::DownloaderDone);
    }
}
