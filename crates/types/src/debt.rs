//! Cross-shard debts.
//!
//! A debt is the settlement half of a cross-shard transfer: the source
//! shard's block deducts balance and fee; the destination shard's block
//! credits the recipient when the debt is packed there.

use crate::{Address, Hash, Transaction, SHARD_COUNT};
use borsh::{BorshDeserialize, BorshSerialize};
use std::sync::Arc;
use thiserror::Error;

/// Serialized size of a debt without contract code.
pub const DEBT_BASE_SIZE: usize = 118;

/// Debts grouped by destination shard. Index 0 is unused; shard numbers
/// start at 1.
pub type DebtMap = Vec<Vec<Arc<Debt>>>;

/// Errors from debt self-checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DebtValidationError {
    #[error("debt originates on the local shard {0}")]
    WrongSourceShard(u16),

    #[error("debt destination is shard {actual}, local shard is {expected}")]
    WrongDestinationShard { actual: u16, expected: u16 },

    #[error("debt hash does not match its data")]
    HashMismatch,

    #[error("debt price must be positive")]
    InvalidPrice,
}

/// The hashed portion of a debt.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DebtData {
    /// Hash of the transaction this debt settles.
    pub tx_hash: Hash,
    pub from: Address,
    pub nonce: u64,
    /// The account to credit on the destination shard.
    pub to: Address,
    pub amount: u128,
    pub price: u128,
    /// Contract code carried along when the target is a contract account.
    pub code: Vec<u8>,
}

/// A cross-shard settlement record with cached hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Debt {
    hash: Hash,
    pub data: DebtData,
}

impl Debt {
    /// Derive the debt a cross-shard transaction creates, if any.
    ///
    /// Returns `None` for reward transactions, empty or reserved recipients,
    /// and same-shard transfers.
    pub fn from_tx(tx: &Transaction) -> Option<Debt> {
        if tx.is_reward() || tx.body.to.is_empty() || tx.body.to.is_reserved() {
            return None;
        }

        if tx.body.from.shard() == tx.body.to.shard() {
            return None;
        }

        let code = if tx.body.to.is_contract() {
            tx.body.payload.clone()
        } else {
            Vec::new()
        };

        let data = DebtData {
            tx_hash: tx.hash(),
            from: tx.body.from,
            nonce: tx.body.nonce,
            to: tx.body.to,
            amount: tx.body.amount,
            price: tx.body.gas_price,
            code,
        };

        Some(Debt {
            hash: Hash::of(&data),
            data,
        })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The shard that must pack this debt.
    pub fn destination_shard(&self) -> u16 {
        self.data.to.shard()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        DEBT_BASE_SIZE + self.data.code.len()
    }

    /// Fee credited to the packing miner.
    pub fn fee(&self) -> u128 {
        const DEBT_GAS: u128 = 5_000;
        self.data.price.saturating_mul(DEBT_GAS)
    }

    /// Structural checks run before any peer lookup: shard routing, hash
    /// integrity and a positive price.
    pub fn validate_shape(&self, local_shard: u16) -> Result<(), DebtValidationError> {
        if self.data.from.shard() == local_shard {
            return Err(DebtValidationError::WrongSourceShard(local_shard));
        }

        let to_shard = self.data.to.shard();
        if to_shard != local_shard {
            return Err(DebtValidationError::WrongDestinationShard {
                actual: to_shard,
                expected: local_shard,
            });
        }

        if self.hash != Hash::of(&self.data) {
            return Err(DebtValidationError::HashMismatch);
        }

        if self.data.price == 0 {
            return Err(DebtValidationError::InvalidPrice);
        }

        Ok(())
    }
}

/// Derive all debts created by a block's transactions.
pub fn debts_from_txs(txs: &[Arc<Transaction>]) -> Vec<Arc<Debt>> {
    txs.iter()
        .filter_map(|tx| Debt::from_tx(tx))
        .map(Arc::new)
        .collect()
}

/// Group the debts created by the given transactions by destination shard.
pub fn debt_map(txs: &[Arc<Transaction>]) -> DebtMap {
    let mut map: DebtMap = vec![Vec::new(); SHARD_COUNT as usize + 1];
    for tx in txs {
        if let Some(debt) = Debt::from_tx(tx) {
            let shard = debt.destination_shard() as usize;
            map[shard].push(Arc::new(debt));
        }
    }
    map
}
