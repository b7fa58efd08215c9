//! Per-block difficulty retarget.

use lattice_types::{BlockHeader, BLOCK_INTERVAL_SECS, FORK_HEIGHT};

/// Compute the difficulty of a block created at `timestamp` on top of
/// `parent`.
///
/// ```text
/// diff = parent_diff + parent_diff / divisor * max(1 - (time - parent_time) / 20, -99)
/// ```
///
/// The divisor halved at the fork (2048 before, 1024 after); the target
/// block time is 20 seconds. Genesis difficulty is carried forward
/// unchanged. Pure: equal inputs always yield equal outputs.
pub fn compute_difficulty(timestamp: u64, parent: &BlockHeader) -> u128 {
    if parent.height == 0 {
        return parent.difficulty;
    }

    let interval = timestamp.saturating_sub(parent.timestamp) / BLOCK_INTERVAL_SECS;
    let x = (1i128 - interval as i128).max(-99);

    let divisor: u128 = if parent.height < FORK_HEIGHT { 2048 } else { 1024 };
    let y = (parent.difficulty / divisor) as i128;

    let result = parent.difficulty as i128 + x * y;
    result.max(0) as u128
}
