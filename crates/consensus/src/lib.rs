//! Pluggable consensus engines.
//!
//! Every sealer satisfies the same [`Engine`] contract: prepare a header
//! (difficulty retarget), verify a header, and run a cancelable seal search
//! that publishes at most one solved block per task. Two proof-of-work
//! engines live here — the difficulty-adjusted random-matrix engine and a
//! plain sha256 engine. A BFT sealer would plug into the same seam.

mod det_stream;
mod difficulty;
mod header;
mod matrix;
mod mpow;
mod reward;
mod search;
mod sha_pow;

pub use difficulty::compute_difficulty;
pub use header::verify_header_common;
pub use matrix::{determinant, generate_matrix, MATRIX_DIM};
pub use mpow::{mining_target, MatrixEngine, MAX_DETERMINANT, TARGET_MULTIPLIER};
pub use reward::block_reward;
pub use search::StopToken;
pub use sha_pow::Sha256Engine;

use crossbeam_channel::Sender;
use lattice_core::{ChainError, ChainStore};
use lattice_types::{Block, BlockHeader, ConsensusTag};
use thiserror::Error;

/// Consensus-level verification failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("parent block not found")]
    InvalidParent,

    #[error("block height {height} does not follow parent height {parent_height}")]
    InvalidHeight { height: u64, parent_height: u64 },

    #[error("block timestamp precedes its parent")]
    TimestampTooOld,

    #[error("block difficulty {actual} does not match retarget {expected}")]
    InvalidDifficulty { actual: u128, expected: u128 },

    #[error("block nonce does not satisfy the mining target")]
    InvalidNonce,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// A consensus engine.
///
/// `seal` returns immediately after spawning its workers; the solved block
/// (or `None` on nonce-space exhaustion) arrives on the results channel.
pub trait Engine: Send + Sync {
    /// Fill in the derived header fields before sealing (difficulty).
    fn prepare(&self, store: &dyn ChainStore, header: &mut BlockHeader)
        -> Result<(), ConsensusError>;

    /// Full header verification: parent linkage, common checks and the
    /// engine's own proof.
    fn verify_header(
        &self,
        store: &dyn ChainStore,
        header: &BlockHeader,
    ) -> Result<(), ConsensusError>;

    /// Start the seal search. Workers observe `abort` and exit early when it
    /// trips; exactly one message is published per search.
    fn seal(
        &self,
        store: &dyn ChainStore,
        block: Block,
        abort: StopToken,
        results: Sender<Option<Block>>,
    ) -> Result<(), ConsensusError>;

    /// Set the worker count; zero selects the number of CPUs.
    fn set_threads(&self, threads: usize);

    /// The tag this engine stamps into sealed headers.
    fn consensus_tag(&self) -> ConsensusTag;
}
