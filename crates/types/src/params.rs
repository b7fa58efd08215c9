//! Consensus parameters.
//!
//! These values must match bit-for-bit across every node of the network;
//! changing any of them is a hard fork.

/// Total number of shards in the network.
pub const SHARD_COUNT: u16 = 4;

/// Number of leading address bytes carrying the shard number.
pub const SHARD_BYTES: usize = 1;

/// Blocks between a transaction and the head before its debt may be
/// propagated to the destination shard.
pub const CONFIRMED_DEPTH: u64 = 120;

/// Target block interval in seconds.
pub const BLOCK_INTERVAL_SECS: u64 = 20;

/// Height of the hard fork that changed the matrix generator and the
/// difficulty retarget divisor.
pub const FORK_HEIGHT: u64 = 2_979_594;

/// Minimum gas price accepted into the pool.
pub const MIN_GAS_PRICE: u128 = 1;

/// Smallest coin unit per whole coin.
pub const COIN: u128 = 100_000_000;

/// Approximate number of blocks mined per reward era (about one year).
pub const BLOCKS_PER_ERA: u64 = 3_150_000;
