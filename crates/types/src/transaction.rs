//! Transactions.

use crate::{Address, Hash, MIN_GAS_PRICE};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use thiserror::Error;

/// Serialized size of a transaction without payload.
pub const TX_BASE_SIZE: usize = 152;

/// Errors from stateless transaction checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction hash does not match its body")]
    HashMismatch,

    #[error("transaction is unsigned")]
    Unsigned,

    #[error("bad signature")]
    BadSignature,

    #[error("signer does not own the sender address")]
    WrongSigner,

    #[error("gas price {0} below minimum {MIN_GAS_PRICE}")]
    PriceTooLow(u128),

    #[error("sender is on shard {actual}, local shard is {expected}")]
    WrongShard { actual: u16, expected: u16 },
}

/// The signed portion of a transaction.
///
/// Field order is consensus-critical: the hash is computed over the canonical
/// encoding of this struct.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransactionBody {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub nonce: u64,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

/// An immutable transaction with cached hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub body: TransactionBody,
    /// Absent for system-issued (reward) transactions.
    pub public_key: Option<[u8; 32]>,
    pub signature: Option<[u8; 64]>,
    hash: Hash,
}

impl Transaction {
    /// Build an unsigned value transfer.
    pub fn transfer(
        from: Address,
        to: Address,
        amount: u128,
        gas_price: u128,
        gas_limit: u64,
        nonce: u64,
        timestamp: u64,
    ) -> Transaction {
        Self::from_body(TransactionBody {
            from,
            to,
            amount,
            gas_price,
            gas_limit,
            nonce,
            payload: Vec::new(),
            timestamp,
        })
    }

    /// Build a transaction from a prepared body.
    pub fn from_body(body: TransactionBody) -> Transaction {
        let hash = Hash::of(&body);
        Transaction {
            body,
            public_key: None,
            signature: None,
            hash,
        }
    }

    /// System-issued miner reward. Always the first transaction of a block,
    /// sent from the empty address and never signed.
    pub fn reward(coinbase: Address, amount: u128, timestamp: u64) -> Transaction {
        Self::from_body(TransactionBody {
            from: Address::EMPTY,
            to: coinbase,
            amount,
            gas_price: 0,
            gas_limit: 0,
            nonce: 0,
            payload: Vec::new(),
            timestamp,
        })
    }

    /// Sign with the sender's key, consuming and returning the transaction.
    pub fn signed(mut self, key: &SigningKey) -> Transaction {
        let sig: Signature = key.sign(self.hash.as_bytes());
        self.public_key = Some(key.verifying_key().to_bytes());
        self.signature = Some(sig.to_bytes());
        self
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn is_reward(&self) -> bool {
        self.body.from.is_empty()
    }

    /// True when sender and recipient live on different shards.
    pub fn is_cross_shard(&self) -> bool {
        !self.is_reward() && self.body.from.shard() != self.body.to.shard()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        TX_BASE_SIZE + self.body.payload.len()
    }

    /// Total the sender account must cover: amount plus the fee ceiling.
    pub fn max_cost(&self) -> u128 {
        self.body
            .amount
            .saturating_add(self.body.gas_price.saturating_mul(self.body.gas_limit as u128))
    }

    /// Stateless admission checks: hash integrity, local-shard sender,
    /// minimum price and a signature recoverable to the sender address.
    pub fn validate_stateless(&self, local_shard: u16) -> Result<(), TransactionError> {
        if self.hash != Hash::of(&self.body) {
            return Err(TransactionError::HashMismatch);
        }

        if self.body.gas_price < MIN_GAS_PRICE {
            return Err(TransactionError::PriceTooLow(self.body.gas_price));
        }

        let from_shard = self.body.from.shard();
        if from_shard != local_shard {
            return Err(TransactionError::WrongShard {
                actual: from_shard,
                expected: local_shard,
            });
        }

        self.verify_signature()
    }

    /// Verify the signature and that the signer owns the sender address.
    pub fn verify_signature(&self) -> Result<(), TransactionError> {
        let (pk, sig) = match (&self.public_key, &self.signature) {
            (Some(pk), Some(sig)) => (pk, sig),
            _ => return Err(TransactionError::Unsigned),
        };

        let key = VerifyingKey::from_bytes(pk).map_err(|_| TransactionError::BadSignature)?;
        key.verify_strict(self.hash.as_bytes(), &Signature::from_bytes(sig))
            .map_err(|_| TransactionError::BadSignature)?;

        let derived = Address::from_public_key(&key, self.body.from.shard())
            .map_err(|_| TransactionError::WrongSigner)?;
        if derived != self.body.from {
            return Err(TransactionError::WrongSigner);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_address, test_key, test_transfer};

    #[test]
    fn signed_transfer_validates() {
        let to = test_address(2, 9);
        let tx = test_transfer(1, 1, to, 100, 2, 0);
        assert!(tx.validate_stateless(1).is_ok());
        assert!(tx.is_cross_shard());
    }

    #[test]
    fn unsigned_rejected() {
        let from = test_address(1, 1);
        let to = test_address(1, 2);
        let tx = Transaction::transfer(from, to, 1, 1, 21_000, 0, 0);
        assert_eq!(tx.validate_stateless(1), Err(TransactionError::Unsigned));
    }

    #[test]
    fn wrong_signer_rejected() {
        let from = test_address(1, 1);
        let to = test_address(1, 2);
        // Signed by a key that does not own `from`.
        let tx = Transaction::transfer(from, to, 1, 1, 21_000, 0, 0).signed(&test_key(3));
        assert_eq!(
            tx.validate_stateless(1),
            Err(TransactionError::WrongSigner)
        );
    }

    #[test]
    fn zero_price_rejected() {
        let to = test_address(1, 2);
        let key = test_key(1);
        let from = Address::from_public_key(&key.verifying_key(), 1).unwrap();
        let tx = Transaction::transfer(from, to, 1, 0, 21_000, 0, 0).signed(&key);
        assert_eq!(tx.validate_stateless(1), Err(TransactionError::PriceTooLow(0)));
    }

    #[test]
    fn foreign_shard_sender_rejected() {
        let to = test_address(1, 2);
        let tx = test_transfer(2, 1, to, 1, 1, 0);
        assert!(matches!(
            tx.validate_stateless(1),
            Err(TransactionError::WrongShard {
                actual: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn reward_tx_shape() {
        let coinbase = test_address(1, 5);
        let tx = Transaction::reward(coinbase, 600, 1234);
        assert!(tx.is_reward());
        assert!(!tx.is_cross_shard());
        assert_eq!(tx.body.to, coinbase);
        assert!(tx.public_key.is_none());
    }

    #[test]
    fn hash_covers_body_only() {
        let to = test_address(2, 9);
        let unsigned = test_transfer(1, 1, to, 100, 2, 0);
        let mut resigned = unsigned.clone();
        resigned.signature = None;
        resigned.public_key = None;
        assert_eq!(unsigned.hash(), resigned.hash());
    }

    #[test]
    fn max_cost_saturates() {
        let from = test_address(1, 1);
        let to = test_address(1, 2);
        let tx = Transaction::transfer(from, to, u128::MAX, u128::MAX, u64::MAX, 0, 0);
        assert_eq!(tx.max_cost(), u128::MAX);
    }
}
