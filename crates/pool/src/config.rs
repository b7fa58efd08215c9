//! Pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction pool configuration.
///
/// A simple transaction is about 152 bytes, so the default capacity of
/// 200 000 pending transactions costs roughly 200 MB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxPoolConfig {
    /// Hard bound on pending transactions.
    pub capacity: usize,

    /// Drop a transaction that has waited unpacked for this long.
    pub timeout: Duration,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        TxPoolConfig {
            capacity: 200_000,
            timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// Debt pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPoolConfig {
    /// Hard bound on verified pending debts.
    pub capacity: usize,

    /// Hard bound on the to-confirm stage.
    pub to_confirm_capacity: usize,

    /// Drop a debt that has waited unpacked (or unconfirmed) for this long.
    pub debt_timeout: Duration,
}

impl Default for DebtPoolConfig {
    fn default() -> Self {
        DebtPoolConfig {
            capacity: 100_000,
            to_confirm_capacity: 100_000,
            debt_timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}
