//! Plain sha256 proof of work.
//!
//! The header (witness included) is hashed with sha256 and interpreted as a
//! 256-bit big-endian integer; the block is valid when that integer does not
//! exceed `2^256 / difficulty`.

use crate::search::{run_seal_workers, StopToken};
use crate::{verify_header_common, ConsensusError, Engine};
use crossbeam_channel::Sender;
use lattice_core::ChainStore;
use lattice_types::{Block, BlockHeader};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// The sha256 engine.
pub struct Sha256Engine {
    threads: AtomicUsize,
    attempts: Arc<AtomicU64>,
}

impl Sha256Engine {
    pub fn new(threads: usize) -> Sha256Engine {
        Sha256Engine {
            threads: AtomicUsize::new(threads),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

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

    fn pow_hash(header: &BlockHeader) -> [u8; 32] {
        let bytes = borsh::to_vec(header).expect("header encodes");
        Sha256::digest(&bytes).into()
    }

    fn verify_target(header: &BlockHeader) -> Result<(), ConsensusError> {
        if meets_target(&Self::pow_hash(header), header.difficulty) {
            Ok(())
        } else {
            Err(ConsensusError::InvalidNonce)
        }
    }
}

/// Whether `hash`, read as a 256-bit big-endian integer `h`, satisfies
/// `h <= 2^256 / difficulty`; checked as `h * difficulty <= 2^256` with
/// 64-bit limb arithmetic.
fn meets_target(hash: &[u8; 32], difficulty: u128) -> bool {
    if difficulty <= 1 {
        return true;
    }

    // h as little-endian limbs.
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let start = 32 - (i + 1) * 8;
        *limb = u64::from_be_bytes(hash[start..start + 8].try_into().expect("8-byte limb"));
    }

    let d_lo = difficulty as u64 as u128;
    let d_hi = (difficulty >> 64) as u64 as u128;

    // Schoolbook multiply: product fits in 6 limbs.
    let mut product = [0u64; 6];
    for (i, &limb) in limbs.iter().enumerate() {
        let mut carry: u128 = 0;
        for (j, &d) in [d_lo, d_hi].iter().enumerate() {
            let idx = i + j;
            let acc = product[idx] as u128 + limb as u128 * d + carry;
            product[idx] = acc as u64;
            carry = acc >> 64;
        }
        let mut idx = i + 2;
        while carry > 0 {
            let acc = product[idx] as u128 + carry;
            product[idx] = acc as u64;
            carry = acc >> 64;
            idx += 1;
        }
    }

    let overflow = product[4] as u128 | ((product[5] as u128) << 64);
    match overflow {
        0 => true,
        // Exactly 2^256: the low limbs must all be zero.
        1 => product[..4].iter().all(|&l| l == 0),
        _ => false,
    }
}

impl Engine for Sha256Engine {
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
        let difficulty = block.header.difficulty;
        tracing::debug!(threads, difficulty, "starting sha256 seal");

        run_seal_workers(
            &block,
            threads,
            abort,
            results,
            Arc::clone(&self.attempts),
            move |header: &BlockHeader| meets_target(&Self::pow_hash(header), difficulty),
        );
        Ok(())
    }

    fn set_threads(&self, threads: usize) {
        self.threads.store(threads, Ordering::Relaxed);
    }

    fn consensus_tag(&self) -> lattice_types::ConsensusTag {
        lattice_types::ConsensusTag::Sha256Pow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_accepts_everything() {
        assert!(meets_target(&[0xFF; 32], 1));
    }

    #[test]
    fn zero_hash_meets_any_target() {
        assert!(meets_target(&[0u8; 32], u128::MAX));
    }

    #[test]
    fn max_hash_fails_high_difficulty() {
        assert!(!meets_target(&[0xFF; 32], 2));
    }

    #[test]
    fn boundary_at_half_the_space() {
        // difficulty 2 → target 2^255. h = 2^255 passes, 2^255 + 1 fails.
        let mut at = [0u8; 32];
        at[0] = 0x80;
        assert!(meets_target(&at, 2));

        let mut above = at;
        above[31] = 1;
        assert!(!meets_target(&above, 2));
    }
}
