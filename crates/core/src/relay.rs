//! Peer relay boundary.
//!
//! Wire transport and discovery live outside the core; this seam is what the
//! pools and the propagation glue call into.

use crate::RelayError;
use lattice_types::{Debt, Hash, Transaction};
use std::sync::Arc;

/// Opaque peer identity assigned by the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

/// What the core needs to know about a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub shard: u16,
}

/// Canonical head announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadStatus {
    pub hash: Hash,
    pub height: u64,
    pub total_difficulty: u128,
}

/// Shard-scoped broadcast of transactions, debts and head status.
pub trait ShardRelay: Send + Sync {
    /// Send one transaction to a peer that does not know it yet.
    fn send_transaction(&self, peer: &PeerId, tx: &Arc<Transaction>) -> Result<(), RelayError>;

    /// Send a batch of debts to a peer. `filter_known` lets the transport
    /// skip debts the peer has already seen.
    fn send_debts(
        &self,
        peer: &PeerId,
        debts: &[Arc<Debt>],
        filter_known: bool,
    ) -> Result<(), RelayError>;

    /// Announce the canonical head to all peers.
    fn broadcast_head(&self, status: &HeadStatus) -> Result<(), RelayError>;

    /// Connected peers serving the given shard.
    fn peers_by_shard(&self, shard: u16) -> Vec<PeerInfo>;
}
