//! Miner reward issuance schedule.

use lattice_types::{BLOCKS_PER_ERA, COIN, SHARD_COUNT};

/// Yearly issuance per block, in whole coins, before the shard split.
const REWARD_TABLE: [u128; 8] = [24, 16, 12, 10, 8, 8, 6, 6];

/// Flat reward for the first era past the table.
const TAIL_REWARD: u128 = 6;

/// Reward for the block at the given height, already divided across shards.
///
/// The era advances every [`BLOCKS_PER_ERA`] blocks; the table covers the
/// first eight eras, one tail era follows, then issuance stops.
pub fn block_reward(height: u64) -> u128 {
    let era = (height / BLOCKS_PER_ERA) as usize;

    let coins = if era < REWARD_TABLE.len() {
        REWARD_TABLE[era]
    } else if era == REWARD_TABLE.len() {
        TAIL_REWARD
    } else {
        0
    };

    coins * COIN / SHARD_COUNT as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_era_pays_from_the_table_head() {
        assert_eq!(block_reward(0), 24 * COIN / SHARD_COUNT as u128);
        assert_eq!(
            block_reward(BLOCKS_PER_ERA - 1),
            24 * COIN / SHARD_COUNT as u128
        );
    }

    #[test]
    fn era_boundaries_step_down_the_table() {
        assert_eq!(block_reward(BLOCKS_PER_ERA), 16 * COIN / SHARD_COUNT as u128);
        assert_eq!(
            block_reward(7 * BLOCKS_PER_ERA),
            6 * COIN / SHARD_COUNT as u128
        );
    }

    #[test]
    fn tail_era_pays_flat() {
        assert_eq!(
            block_reward(8 * BLOCKS_PER_ERA),
            TAIL_REWARD * COIN / SHARD_COUNT as u128
        );
    }

    #[test]
    fn issuance_ends_after_the_tail() {
        assert_eq!(block_reward(9 * BLOCKS_PER_ERA), 0);
        assert_eq!(block_reward(100 * BLOCKS_PER_ERA), 0);
    }
}
