//! Threaded nonce search shared by the proof-of-work engines.

use crossbeam_channel::Sender;
use lattice_types::{Block, BlockHeader};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Cancellation token for a seal task. Cloned into every worker; each checks
/// it in its inner loop.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> StopToken {
        StopToken::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Split the nonce space `[0, 2^64)` into `threads` disjoint intervals and
/// search each on its own worker. Every worker starts at a random seed in
/// its interval and walks cyclically; exactly one message is published per
/// search: the first solved block, or `None` when a worker exhausts its
/// range without a solution.
pub(crate) fn run_seal_workers<P>(
    block: &Block,
    threads: usize,
    abort: StopToken,
    results: Sender<Option<Block>>,
    attempts: Arc<AtomicU64>,
    predicate: P,
) where
    P: Fn(&BlockHeader) -> bool + Send + Sync + Clone + 'static,
{
    let threads = threads.max(1);
    let step = u64::MAX / threads as u64;
    let found = Arc::new(AtomicBool::new(false));
    let mut rng = rand::thread_rng();

    for i in 0..threads as u64 {
        let lo = i * step;
        let hi = if i == threads as u64 - 1 {
            u64::MAX
        } else {
            lo + step - 1
        };
        let seed = if threads == 1 {
            rng.gen::<u64>()
        } else {
            lo + rng.gen_range(0..step)
        };

        let block = block.clone();
        let abort = abort.clone();
        let results = results.clone();
        let found = Arc::clone(&found);
        let attempts = Arc::clone(&attempts);
        let predicate = predicate.clone();

        std::thread::Builder::new()
            .name(format!("seal-{i}"))
            .spawn(move || {
                search_range(
                    block, seed, lo, hi, abort, results, found, attempts, predicate,
                )
            })
            .expect("spawn seal worker");
    }
}

#[allow(clippy::too_many_arguments)]
fn search_range<P>(
    mut block: Block,
    seed: u64,
    lo: u64,
    hi: u64,
    abort: StopToken,
    results: Sender<Option<Block>>,
    found: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
    predicate: P,
) where
    P: Fn(&BlockHeader) -> bool,
{
    let mut header = block.header.clone();
    let mut nonce = seed;
    let mut tried = 0u64;

    loop {
        if abort.is_stopped() {
            tracing::info!("nonce finding aborted");
            break;
        }
        if found.load(Ordering::Acquire) {
            tracing::debug!("exit mining, nonce found by a sibling worker");
            break;
        }

        tried += 1;
        header.set_nonce(nonce);

        if predicate(&header) {
            // Single-shot publication gate across all workers.
            if !found.swap(true, Ordering::AcqRel) {
                block.header = header;
                tracing::debug!(nonce, tried, "seal found");
                let _ = results.send(Some(block));
            }
            break;
        }

        // Wrap from the top of the interval, stop after a full cycle.
        if nonce == hi {
            if seed == lo {
                tracing::warn!(lo, hi, "nonce range exhausted without a solution");
                let _ = results.send(None);
                break;
            }
            nonce = lo;
            continue;
        }
        if nonce.wrapping_add(1) == seed {
            tracing::warn!(lo, hi, "nonce range exhausted without a solution");
            let _ = results.send(None);
            break;
        }
        nonce += 1;
    }

    attempts.fetch_add(tried, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_token_trips_once() {
        let token = StopToken::new();
        assert!(!token.is_stopped());
        token.stop();
        assert!(token.is_stopped());
        token.stop();
        assert!(token.is_stopped());
    }
}
