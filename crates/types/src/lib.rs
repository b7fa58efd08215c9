//! Core types for the lattice sharded chain.
//!
//! This crate provides the foundational types used throughout the node:
//!
//! - **Primitives**: Hash, shard-encoded addresses, signing
//! - **Chain objects**: Transaction, Debt, Block, BlockHeader, Receipt
//! - **Consensus parameters**: shard count, confirmed depth, fork height
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod address;
mod block;
mod debt;
mod hash;
mod params;
mod receipt;
mod transaction;

pub use address::{Address, AddressError, AddressType, ADDRESS_LEN};
pub use block::{Block, BlockHeader, ConsensusTag, WitnessError};
pub use debt::{
    debt_map, debts_from_txs, Debt, DebtData, DebtMap, DebtValidationError, DEBT_BASE_SIZE,
};
pub use hash::{Hash, HASH_LEN};
pub use params::{
    BLOCKS_PER_ERA, BLOCK_INTERVAL_SECS, COIN, CONFIRMED_DEPTH, FORK_HEIGHT, MIN_GAS_PRICE,
    SHARD_BYTES, SHARD_COUNT,
};
pub use receipt::Receipt;
pub use transaction::{Transaction, TransactionBody, TransactionError, TX_BASE_SIZE};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use ed25519_dalek::SigningKey;

    /// Deterministic signing key from a seed byte.
    pub fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    /// External address on the given shard derived from a seeded key.
    pub fn test_address(shard: u16, seed: u8) -> Address {
        Address::from_public_key(&test_key(seed).verifying_key(), shard).expect("valid test shard")
    }

    /// A signed transfer from the seeded key's account.
    pub fn test_transfer(
        shard: u16,
        seed: u8,
        to: Address,
        amount: u128,
        gas_price: u128,
        nonce: u64,
    ) -> Transaction {
        let key = test_key(seed);
        let from = Address::from_public_key(&key.verifying_key(), shard).expect("valid test shard");
        Transaction::transfer(from, to, amount, gas_price, 21_000, nonce, 1_700_000_000).signed(&key)
    }
}
