//! The sum type the generic pool ranges over.

use lattice_types::{Address, Debt, Hash, Transaction};
use std::sync::Arc;

/// A poolable object: a transaction or a debt.
///
/// Both variants expose the capability set the pool needs — sender,
/// recipient, nonce, price, hash and size. Operations branch on the variant
/// only where semantics genuinely differ.
#[derive(Debug, Clone)]
pub enum PoolObject {
    Transaction(Arc<Transaction>),
    Debt(Arc<Debt>),
}

impl PoolObject {
    pub fn from_account(&self) -> Address {
        match self {
            PoolObject::Transaction(tx) => tx.body.from,
            PoolObject::Debt(d) => d.data.from,
        }
    }

    pub fn to_account(&self) -> Address {
        match self {
            PoolObject::Transaction(tx) => tx.body.to,
            PoolObject::Debt(d) => d.data.to,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            PoolObject::Transaction(tx) => tx.body.nonce,
            PoolObject::Debt(d) => d.data.nonce,
        }
    }

    pub fn price(&self) -> u128 {
        match self {
            PoolObject::Transaction(tx) => tx.body.gas_price,
            PoolObject::Debt(d) => d.data.price,
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            PoolObject::Transaction(tx) => tx.hash(),
            PoolObject::Debt(d) => d.hash(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            PoolObject::Transaction(tx) => tx.size(),
            PoolObject::Debt(d) => d.size(),
        }
    }

    pub fn as_transaction(&self) -> Option<&Arc<Transaction>> {
        match self {
            PoolObject::Transaction(tx) => Some(tx),
            PoolObject::Debt(_) => None,
        }
    }

    pub fn as_debt(&self) -> Option<&Arc<Debt>> {
        match self {
            PoolObject::Debt(d) => Some(d),
            PoolObject::Transaction(_) => None,
        }
    }

    pub fn into_transaction(self) -> Option<Arc<Transaction>> {
        match self {
            PoolObject::Transaction(tx) => Some(tx),
            PoolObject::Debt(_) => None,
        }
    }

    pub fn into_debt(self) -> Option<Arc<Debt>> {
        match self {
            PoolObject::Debt(d) => Some(d),
            PoolObject::Transaction(_) => None,
        }
    }
}

impl From<Arc<Transaction>> for PoolObject {
    fn from(tx: Arc<Transaction>) -> Self {
        PoolObject::Transaction(tx)
    }
}

impl From<Arc<Debt>> for PoolObject {
    fn from(debt: Arc<Debt>) -> Self {
        PoolObject::Debt(debt)
    }
}
