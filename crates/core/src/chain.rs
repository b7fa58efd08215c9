//! Chain and state boundary traits.

use crate::ChainError;
use lattice_types::{Address, Block, BlockHeader, Debt, Hash, Receipt, Transaction};
use std::sync::Arc;

/// Mutable view of account state at some root.
///
/// Backed by the state trie in production; tests use an in-memory map.
pub trait StateDb: Send {
    fn nonce(&self, account: &Address) -> u64;
    fn balance(&self, account: &Address) -> u128;
    fn set_nonce(&mut self, account: &Address, nonce: u64);
    fn add_balance(&mut self, account: &Address, amount: u128);
    fn sub_balance(&mut self, account: &Address, amount: u128) -> Result<(), ChainError>;

    /// Flush pending writes and return the new state root.
    fn commit(&mut self) -> Hash;
}

/// Read access to stored blocks and body indices.
pub trait ChainStore: Send + Sync {
    fn head_hash(&self) -> Result<Hash, ChainError>;
    fn block(&self, hash: &Hash) -> Result<Arc<Block>, ChainError>;
    fn block_by_height(&self, height: u64) -> Result<Arc<Block>, ChainError>;
    fn header(&self, hash: &Hash) -> Result<BlockHeader, ChainError>;

    /// Where a transaction was packed on the canonical chain, if anywhere.
    fn tx_index(&self, hash: &Hash) -> Result<Option<(Hash, usize)>, ChainError>;

    /// Where a debt was packed on the canonical chain, if anywhere.
    fn debt_index(&self, hash: &Hash) -> Result<Option<(Hash, usize)>, ChainError>;
}

/// The canonical chain: head tracking, block application and fork choice.
pub trait Chain: Send + Sync {
    /// Current head block plus a mutable state view at its root.
    fn current_info(&self) -> Result<(Arc<Block>, Box<dyn StateDb>), ChainError>;

    /// A state view at the current head, for pool admission checks.
    fn current_state(&self) -> Result<Box<dyn StateDb>, ChainError>;

    fn store(&self) -> &dyn ChainStore;

    /// Apply one user transaction at the given body index.
    fn apply_tx(
        &self,
        tx: &Transaction,
        index: usize,
        coinbase: &Address,
        state: &mut dyn StateDb,
        header: &BlockHeader,
    ) -> Result<Receipt, ChainError>;

    /// Credit a debt that was already verified against its source shard.
    fn apply_debt_without_verify(
        &self,
        state: &mut dyn StateDb,
        debt: &Debt,
        coinbase: &Address,
        parent: &BlockHeader,
        common_ancestor: &BlockHeader,
    ) -> Result<(), ChainError>;

    /// Persist a sealed block and run fork choice. Emits
    /// [`crate::Event::ChainHeaderChanged`] when the head moves.
    fn write_block(&self, block: &Block) -> Result<(), ChainError>;

    /// Walk two headers back to their closest shared ancestor.
    fn find_common_ancestor(
        &self,
        a: &BlockHeader,
        b: &BlockHeader,
    ) -> Result<BlockHeader, ChainError>;
}
