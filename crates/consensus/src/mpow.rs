//! Difficulty-adjusted random-matrix proof of work.
//!
//! A candidate nonce is written into the header witness, the header is
//! hashed, a 30×30 matrix is seeded deterministically from the hash, and
//! the block is sealed when the matrix determinant reaches the mining
//! target. Validators recompute the determinant from the header as shipped.

use crate::search::{run_seal_workers, StopToken};
use crate::{
    determinant, generate_matrix, verify_header_common, ConsensusError, Engine, MATRIX_DIM,
};
use crossbeam_channel::Sender;
use lattice_core::ChainStore;
use lattice_types::{Block, BlockHeader};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Mining target multiplier applied to the difficulty.
pub const TARGET_MULTIPLIER: u128 = 3_000_000_000;

/// Upper bound on the target: 2 × 10³⁰, near the determinant ceiling of a
/// 30×30 matrix with entries in `[0, 3)`.
pub const MAX_DETERMINANT: u128 = 2 * 10u128.pow(30);

/// The mining target for a difficulty.
pub fn mining_target(difficulty: u128) -> u128 {
    difficulty
        .saturating_mul(TARGET_MULTIPLIER)
        .min(MAX_DETERMINANT)
}

/// The random-matrix engine.
pub struct MatrixEngine {
    threads: AtomicUsize,
    attempts: Arc<AtomicU64>,
}

impl MatrixEngine {
    /// Zero threads selects the number of CPUs at seal time.
    pub fn new(threads: usize) -> MatrixEngine {
        MatrixEngine {
            threads: AtomicUsize::new(threads),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total determinant evaluations across all seal tasks.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn worker_count(&self) -> usize {
        let configured = self.threads.load(Ordering::Relaxed);
        if configured == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            configured
        }
    }

    fn verify_target(header: &BlockHeader) -> Result<(), ConsensusError> {
        let hash = header.hash();
        let matrix = generate_matrix(&hash, MATRIX_DIM, header.height);
        let det = determinant(&matrix, MATRIX_DIM);
        let target = mining_target(header.difficulty) as f64;
        if det < target {
            return Err(ConsensusError::InvalidNonce);
        }
        Ok(())
    }
}

impl Engine for MatrixEngine {
    fn prepare(
        &self,
        store: &dyn ChainStore,
        header: &mut BlockHeader,
    ) -> Result<(), ConsensusError> {
        let parent = store
            .header(&header.previous_hash)
            .map_err(|_| ConsensusError::InvalidParent)?;
        header.difficulty = crate::compute_difficulty(header.timestamp, &parent);
        Ok(())
    }

    fn verify_header(
        &self,
        store: &dyn ChainStore,
        header: &BlockHeader,
    ) -> Result<(), ConsensusError> {
        let parent = store
            .header(&header.previous_hash)
            .map_err(|_| ConsensusError::InvalidParent)?;
        verify_header_common(header, &parent)?;
        Self::verify_target(header)
    }

    fn seal(
        &self,
        _store: &dyn ChainStore,
        block: Block,
        abort: StopToken,
        results: Sender<Option<Block>>,
    ) -> Result<(), ConsensusError> {
        let threads = self.worker_count();
        let target = mining_target(block.header.difficulty) as f64;
        tracing::debug!(
            threads,
            difficulty = block.header.difficulty,
            "starting matrix seal"
        );

        run_seal_workers(
            &block,
            threads,
            abort,
            results,
            Arc::clone(&self.attempts),
            move |header: &BlockHeader| {
                let hash = header.hash();
                let matrix = generate_matrix(&hash, MATRIX_DIM, header.height);
                determinant(&matrix, MATRIX_DIM) >= target
            },
        );
        Ok(())
    }

    fn set_threads(&self, threads: usize) {
        self.threads.store(threads, Ordering::Relaxed);
    }

    fn consensus_tag(&self) -> lattice_types::ConsensusTag {
        lattice_types::ConsensusTag::MatrixPow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_scales_with_difficulty_up_to_the_cap() {
        assert_eq!(mining_target(1), TARGET_MULTIPLIER);
        assert_eq!(mining_target(100), 100 * TARGET_MULTIPLIER);
        assert_eq!(mining_target(u128::MAX / 2), MAX_DETERMINANT);
    }

    #[test]
    fn zero_threads_selects_cpu_count() {
        let engine = MatrixEngine::new(0);
        assert!(engine.worker_count() >= 1);
        engine.set_threads(3);
        assert_eq!(engine.worker_count(), 3);
    }
}
