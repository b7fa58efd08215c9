//! Admission checks shared by the pool and the packer.

use crate::StateDb;
use lattice_types::{Transaction, TransactionError};
use thiserror::Error;

/// Why a transaction was refused admission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error(transparent)]
    Stateless(#[from] TransactionError),

    #[error("nonce too low: tx {tx_nonce}, account {account_nonce}")]
    NonceTooLow { tx_nonce: u64, account_nonce: u64 },

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
}

/// Validate a transaction against a state snapshot before pool admission:
/// stateless checks, then nonce and balance against the account.
pub fn validate_for_admission(
    state: &dyn StateDb,
    tx: &Transaction,
    local_shard: u16,
) -> Result<(), AdmissionError> {
    tx.validate_stateless(local_shard)?;

    let account_nonce = state.nonce(&tx.body.from);
    if tx.body.nonce < account_nonce {
        return Err(AdmissionError::NonceTooLow {
            tx_nonce: tx.body.nonce,
            account_nonce,
        });
    }

    let have = state.balance(&tx.body.from);
    let need = tx.max_cost();
    if have < need {
        return Err(AdmissionError::InsufficientBalance { have, need });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryState;
    use lattice_types::test_utils::{test_address, test_transfer};

    #[test]
    fn funded_account_passes() {
        let tx = test_transfer(1, 1, test_address(2, 9), 100, 2, 0);
        let mut state = MemoryState::default();
        state.fund(tx.body.from, 1_000_000);
        assert!(validate_for_admission(&state, &tx, 1).is_ok());
    }

    #[test]
    fn poor_account_rejected() {
        let tx = test_transfer(1, 1, test_address(2, 9), 100, 2, 0);
        let state = MemoryState::default();
        assert!(matches!(
            validate_for_admission(&state, &tx, 1),
            Err(AdmissionError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn stale_nonce_rejected() {
        let tx = test_transfer(1, 1, test_address(2, 9), 100, 2, 3);
        let mut state = MemoryState::default();
        state.fund(tx.body.from, 1_000_000);
        state.set_nonce(&tx.body.from, 5);
        assert!(matches!(
            validate_for_admission(&state, &tx, 1),
            Err(AdmissionError::NonceTooLow {
                tx_nonce: 3,
                account_nonce: 5
            })
        ));
    }

    #[test]
    fn future_nonce_is_admissible() {
        // Nonce gaps are allowed into the pool; ordering happens at pack time.
        let tx = test_transfer(1, 1, test_address(2, 9), 100, 2, 9);
        let mut state = MemoryState::default();
        state.fund(tx.body.from, 1_000_000);
        assert!(validate_for_admission(&state, &tx, 1).is_ok());
    }
}
