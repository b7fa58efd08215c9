//! Blocks and block headers.

use crate::{Debt, Hash, Receipt, Transaction};
use borsh::{BorshDeserialize, BorshSerialize};
use std::sync::Arc;
use thiserror::Error;

/// Which engine sealed a block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ConsensusTag {
    Sha256Pow,
    MatrixPow,
    Bft,
}

/// Errors from witness decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WitnessError {
    #[error("witness is not an ASCII-decimal nonce")]
    NotDecimal,
}

/// Block header.
///
/// Field order is consensus-critical: the header hash is computed over the
/// canonical encoding of this struct in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub previous_hash: Hash,
    pub creator: crate::Address,
    pub height: u64,
    pub timestamp: u64,
    pub difficulty: u128,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub debt_root: Hash,
    pub receipt_root: Hash,
    pub consensus: ConsensusTag,
    /// PoW nonce as an ASCII-decimal byte string, kept for wire compatibility
    /// with the existing chain.
    pub witness: Vec<u8>,
    pub extra: Vec<u8>,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        Hash::of(self)
    }

    /// Store a nonce in the witness field.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.witness = nonce.to_string().into_bytes();
    }

    /// Decode the witness back into a nonce.
    pub fn nonce(&self) -> Result<u64, WitnessError> {
        std::str::from_utf8(&self.witness)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(WitnessError::NotDecimal)
    }
}

/// A block: header plus transaction and debt bodies.
///
/// The first transaction is always the miner reward.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Arc<Transaction>>,
    pub debts: Vec<Arc<Debt>>,
}

impl Block {
    /// Assemble a block, filling the header's tx/debt/receipt roots from the
    /// bodies.
    pub fn new(
        mut header: BlockHeader,
        transactions: Vec<Arc<Transaction>>,
        receipts: &[Receipt],
        debts: Vec<Arc<Debt>>,
    ) -> Block {
        header.tx_root = tx_root(&transactions);
        header.debt_root = debt_root(&debts);
        header.receipt_root = receipt_root(receipts);
        Block {
            header,
            transactions,
            debts,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// The block's transactions excluding the index-0 reward.
    pub fn user_transactions(&self) -> &[Arc<Transaction>] {
        if self.transactions.is_empty() {
            &[]
        } else {
            &self.transactions[1..]
        }
    }
}

/// Deterministic root over the sorted transaction hashes.
pub fn tx_root(txs: &[Arc<Transaction>]) -> Hash {
    if txs.is_empty() {
        return Hash::ZERO;
    }
    let mut hashes: Vec<Hash> = txs.iter().map(|tx| tx.hash()).collect();
    hashes.sort();
    Hash::of(&hashes)
}

/// Deterministic root over the sorted debt hashes.
pub fn debt_root(debts: &[Arc<Debt>]) -> Hash {
    if debts.is_empty() {
        return Hash::ZERO;
    }
    let mut hashes: Vec<Hash> = debts.iter().map(|d| d.hash()).collect();
    hashes.sort();
    Hash::of(&hashes)
}

/// Deterministic root over the receipts.
pub fn receipt_root(receipts: &[Receipt]) -> Hash {
    if receipts.is_empty() {
        return Hash::ZERO;
    }
    Hash::of(&receipts.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_address, test_transfer};

    fn header() -> BlockHeader {
        BlockHeader {
            previous_hash: Hash::ZERO,
            creator: test_address(1, 1),
            height: 1,
            timestamp: 100,
            difficulty: 256,
            state_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            debt_root: Hash::ZERO,
            receipt_root: Hash::ZERO,
            consensus: ConsensusTag::MatrixPow,
            witness: Vec::new(),
            extra: Vec::new(),
        }
    }

    #[test]
    fn witness_round_trip() {
        let mut h = header();
        h.set_nonce(18_446_744_073_709_551_615);
        assert_eq!(h.witness, b"18446744073709551615");
        assert_eq!(h.nonce(), Ok(u64::MAX));
    }

    #[test]
    fn bad_witness_rejected() {
        let mut h = header();
        h.witness = b"not-a-nonce".to_vec();
        assert_eq!(h.nonce(), Err(WitnessError::NotDecimal));
    }

    #[test]
    fn header_hash_changes_with_witness() {
        let mut h = header();
        let before = h.hash();
        h.set_nonce(42);
        assert_ne!(before, h.hash());
    }

    #[test]
    fn roots_filled_on_assembly() {
        let reward = Arc::new(Transaction::reward(test_address(1, 1), 600, 100));
        let tx = Arc::new(test_transfer(1, 2, test_address(2, 9), 10, 1, 0));
        let debts = crate::debts_from_txs(&[tx.clone()]);

        let block = Block::new(header(), vec![reward, tx], &[], debts);
        assert_ne!(block.header.tx_root, Hash::ZERO);
        assert_ne!(block.header.debt_root, Hash::ZERO);
        assert_eq!(block.header.receipt_root, Hash::ZERO);
        assert_eq!(block.user_transactions().len(), 1);
    }

    #[test]
    fn roots_are_independent_of_body_order() {
        let a = Arc::new(test_transfer(1, 1, test_address(2, 9), 10, 1, 0));
        let b = Arc::new(test_transfer(1, 2, test_address(2, 8), 20, 1, 0));

        assert_eq!(
            tx_root(&[a.clone(), b.clone()]),
            tx_root(&[b.clone(), a.clone()])
        );

        let debts_ab = crate::debts_from_txs(&[a.clone(), b.clone()]);
        let debts_ba = crate::debts_from_txs(&[b, a]);
        assert_eq!(debt_root(&debts_ab), debt_root(&debts_ba));
    }

    #[test]
    fn empty_bodies_have_zero_roots() {
        let block = Block::new(header(), Vec::new(), &[], Vec::new());
        assert_eq!(block.header.tx_root, Hash::ZERO);
        assert_eq!(block.header.debt_root, Hash::ZERO);
        assert!(block.user_transactions().is_empty());
    }
}
