//! Execution receipts, produced by the VM boundary.

use crate::Hash;
use borsh::{BorshDeserialize, BorshSerialize};

/// The outcome of applying one transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub failed: bool,
    pub used_gas: u64,
    /// State root after this transaction was applied.
    pub post_state: Hash,
    /// VM return value, empty for plain transfers.
    pub result: Vec<u8>,
    pub logs: Vec<Vec<u8>>,
}

impl Receipt {
    /// A successful transfer receipt with no VM output.
    pub fn transfer(tx_hash: Hash, used_gas: u64, post_state: Hash) -> Receipt {
        Receipt {
            tx_hash,
            failed: false,
            used_gas,
            post_state,
            result: Vec::new(),
            logs: Vec::new(),
        }
    }
}
