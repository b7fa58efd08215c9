//! Debt verification boundary.

use crate::VerifierError;
use lattice_types::Debt;

/// Outcome of checking a debt against its source shard.
///
/// `packed` means the source shard has accepted the originating transaction
/// into some block; `confirmed` means that block is at least the confirmed
/// depth below the source head. The two flags are independent of `error`:
/// a lookup may know the transaction is packed and still fail while probing
/// the confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtVerdict {
    pub packed: bool,
    pub confirmed: bool,
    pub error: Option<VerifierError>,
}

impl DebtVerdict {
    pub fn confirmed() -> DebtVerdict {
        DebtVerdict {
            packed: true,
            confirmed: true,
            error: None,
        }
    }

    pub fn pending(packed: bool) -> DebtVerdict {
        DebtVerdict {
            packed,
            confirmed: false,
            error: None,
        }
    }

    pub fn failed(packed: bool, error: VerifierError) -> DebtVerdict {
        DebtVerdict {
            packed,
            confirmed: false,
            error: Some(error),
        }
    }
}

/// Proves a debt corresponds to a packed transaction in the source shard.
///
/// Implementations are idempotent and side-effect-free apart from caches.
pub trait DebtVerifier: Send + Sync {
    fn validate_debt(&self, debt: &Debt) -> DebtVerdict;
}
