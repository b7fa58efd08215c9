//! Contract execution boundary.

use crate::{ChainError, StateDb};
use lattice_types::{BlockHeader, Receipt, Transaction};

/// Executes a transaction against a state view.
///
/// The EVM-compatible engine lives behind this seam; the core never inspects
/// execution internals, only the receipt.
pub trait Vm: Send + Sync {
    fn execute(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDb,
        header: &BlockHeader,
    ) -> Result<Receipt, ChainError>;
}
