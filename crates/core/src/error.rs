//! Error taxonomy for the chain, verifier and relay boundaries.

use lattice_types::{Address, Hash};
use thiserror::Error;

/// Errors surfaced by the chain and state boundaries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {0} not found")]
    BlockNotFound(Hash),

    #[error("header {0} not found")]
    HeaderNotFound(Hash),

    #[error("no block at height {0}")]
    HeightNotFound(u64),

    #[error("nonce too low for {account}: tx nonce {tx_nonce}, account nonce {account_nonce}")]
    NonceTooLow {
        account: Address,
        tx_nonce: u64,
        account_nonce: u64,
    },

    #[error("nonce mismatch for {account}: tx nonce {tx_nonce}, account nonce {account_nonce}")]
    NonceMismatch {
        account: Address,
        tx_nonce: u64,
        account_nonce: u64,
    },

    #[error("insufficient balance for {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: Address,
        have: u128,
        need: u128,
    },

    #[error("state unavailable: {0}")]
    State(String),

    /// Unrecoverable storage fault. Callers surface this upward instead of
    /// retrying.
    #[error("storage corrupted: {0}")]
    Fatal(String),
}

impl ChainError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::Fatal(_))
    }
}

/// Errors from debt verification against the source shard.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifierError {
    /// Peer request deadline expired; the debt stays queued for retry.
    #[error("peer request timed out")]
    Timeout,

    /// The peer had no data for the request; retryable.
    #[error("missing data from peer: {0}")]
    MissingData(String),

    /// Positive disproof: the source shard rejects the debt.
    #[error("debt disproved by source shard: {0}")]
    Disproved(String),
}

impl VerifierError {
    /// Transient errors keep the debt queued; disproof drops it.
    pub fn is_transient(&self) -> bool {
        !matches!(self, VerifierError::Disproved(_))
    }
}

/// Errors from the peer relay boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("peer disconnected")]
    PeerGone,

    #[error("send timed out")]
    Timeout,
}
