//! In-memory doubles for the chain, state and verifier boundaries.
//!
//! `TestChain` is a deliberately small stand-in: it keeps every block in a
//! map, tracks the canonical branch by height, applies plain transfer
//! semantics and runs longest-chain fork choice. On a reorg the canonical
//! state is rebuilt from the genesis allocation by replaying the new branch.

use crate::{
    Chain, ChainError, ChainStore, DebtVerdict, DebtVerifier, Event, EventBus, StateDb,
    VerifierError, Vm,
};
use lattice_types::{Address, Block, BlockHeader, ConsensusTag, Debt, Hash, Receipt, Transaction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory account state.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    accounts: HashMap<Address, (u64, u128)>,
}

impl MemoryState {
    /// Credit an account out of thin air (genesis allocation).
    pub fn fund(&mut self, account: Address, amount: u128) {
        self.accounts.entry(account).or_insert((0, 0)).1 += amount;
    }
}

impl StateDb for MemoryState {
    fn nonce(&self, account: &Address) -> u64 {
        self.accounts.get(account).map(|a| a.0).unwrap_or(0)
    }

    fn balance(&self, account: &Address) -> u128 {
        self.accounts.get(account).map(|a| a.1).unwrap_or(0)
    }

    fn set_nonce(&mut self, account: &Address, nonce: u64) {
        self.accounts.entry(*account).or_insert((0, 0)).0 = nonce;
    }

    fn add_balance(&mut self, account: &Address, amount: u128) {
        self.accounts.entry(*account).or_insert((0, 0)).1 += amount;
    }

    fn sub_balance(&mut self, account: &Address, amount: u128) -> Result<(), ChainError> {
        let entry = self.accounts.entry(*account).or_insert((0, 0));
        if entry.1 < amount {
            return Err(ChainError::InsufficientBalance {
                account: *account,
                have: entry.1,
                need: amount,
            });
        }
        entry.1 -= amount;
        Ok(())
    }

    fn commit(&mut self) -> Hash {
        let mut entries: Vec<(Address, u64, u128)> = self
            .accounts
            .iter()
            .map(|(a, (n, b))| (*a, *n, *b))
            .collect();
        entries.sort();
        Hash::of(&entries)
    }
}

/// Plain-transfer execution: no contracts, just balance moves, fees and
/// nonce bumps. `shard` scopes recipient credits — cross-shard recipients
/// are credited by the destination shard's debt, not here.
pub struct TransferVm {
    shard: u16,
}

impl TransferVm {
    pub fn new(shard: u16) -> TransferVm {
        TransferVm { shard }
    }
}

impl Vm for TransferVm {
    fn execute(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDb,
        header: &BlockHeader,
    ) -> Result<Receipt, ChainError> {
        let account_nonce = state.nonce(&tx.body.from);
        if tx.body.nonce != account_nonce {
            return Err(ChainError::NonceMismatch {
                account: tx.body.from,
                tx_nonce: tx.body.nonce,
                account_nonce,
            });
        }

        let fee = tx.body.gas_price.saturating_mul(tx.body.gas_limit as u128);
        state.sub_balance(&tx.body.from, tx.body.amount.saturating_add(fee))?;
        state.add_balance(&header.creator, fee);
        if tx.body.to.shard() == self.shard {
            state.add_balance(&tx.body.to, tx.body.amount);
        }
        state.set_nonce(&tx.body.from, account_nonce + 1);

        Ok(Receipt::transfer(tx.hash(), tx.body.gas_limit, Hash::ZERO))
    }
}

struct ChainInner {
    blocks: HashMap<Hash, Arc<Block>>,
    canonical: Vec<Hash>,
    head: Hash,
    genesis_alloc: MemoryState,
    state: MemoryState,
    tx_index: HashMap<Hash, (Hash, usize)>,
    debt_index: HashMap<Hash, (Hash, usize)>,
}

/// In-memory chain used across the pool and miner test suites.
pub struct TestChain {
    shard: u16,
    bus: EventBus,
    vm: TransferVm,
    inner: Mutex<ChainInner>,
}

impl TestChain {
    pub fn new(shard: u16, bus: EventBus) -> TestChain {
        Self::with_genesis_difficulty(shard, bus, 256)
    }

    pub fn with_genesis_difficulty(shard: u16, bus: EventBus, difficulty: u128) -> TestChain {
        let genesis = Arc::new(Block {
            header: BlockHeader {
                previous_hash: Hash::ZERO,
                creator: Address::EMPTY,
                height: 0,
                timestamp: 0,
                difficulty,
                state_root: Hash::ZERO,
                tx_root: Hash::ZERO,
                debt_root: Hash::ZERO,
                receipt_root: Hash::ZERO,
                consensus: ConsensusTag::MatrixPow,
                witness: Vec::new(),
                extra: Vec::new(),
            },
            transactions: Vec::new(),
            debts: Vec::new(),
        });
        let genesis_hash = genesis.hash();

        TestChain {
            shard,
            bus,
            vm: TransferVm::new(shard),
            inner: Mutex::new(ChainInner {
                blocks: HashMap::from([(genesis_hash, genesis)]),
                canonical: vec![genesis_hash],
                head: genesis_hash,
                genesis_alloc: MemoryState::default(),
                state: MemoryState::default(),
                tx_index: HashMap::new(),
                debt_index: HashMap::new(),
            }),
        }
    }

    pub fn shard(&self) -> u16 {
        self.shard
    }

    /// Genesis allocation.
    pub fn fund(&self, account: Address, amount: u128) {
        let mut inner = self.inner.lock();
        inner.genesis_alloc.fund(account, amount);
        inner.state.fund(account, amount);
    }

    pub fn head(&self) -> Arc<Block> {
        let inner = self.inner.lock();
        Arc::clone(&inner.blocks[&inner.head])
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.inner.lock().state.balance(account)
    }

    fn replay(inner: &mut ChainInner, block: &Block, shard: u16) {
        let coinbase = block.header.creator;
        for tx in &block.transactions {
            if tx.is_reward() {
                inner.state.add_balance(&tx.body.to, tx.body.amount);
                continue;
            }
            let fee = tx.body.gas_price.saturating_mul(tx.body.gas_limit as u128);
            let _ = inner.state.sub_balance(&tx.body.from, tx.body.amount + fee);
            inner.state.add_balance(&coinbase, fee);
            if tx.body.to.shard() == shard {
                inner.state.add_balance(&tx.body.to, tx.body.amount);
            }
            let nonce = inner.state.nonce(&tx.body.from);
            inner.state.set_nonce(&tx.body.from, nonce.max(tx.body.nonce + 1));
        }
        for debt in &block.debts {
            inner.state.add_balance(&debt.data.to, debt.data.amount);
            inner.state.add_balance(&coinbase, debt.fee());
        }
    }

    fn index_block(inner: &mut ChainInner, block: &Block) {
        let hash = block.hash();
        for (i, tx) in block.transactions.iter().enumerate() {
            inner.tx_index.insert(tx.hash(), (hash, i));
        }
        for (i, debt) in block.debts.iter().enumerate() {
            inner.debt_index.insert(debt.hash(), (hash, i));
        }
    }

    fn rebuild_canonical(
        inner: &mut ChainInner,
        new_head: Hash,
        shard: u16,
    ) -> Result<(), ChainError> {
        let mut branch = Vec::new();
        let mut cursor = new_head;
        loop {
            let block = inner
                .blocks
                .get(&cursor)
                .cloned()
                .ok_or(ChainError::BlockNotFound(cursor))?;
            branch.push(cursor);
            if block.header.height == 0 {
                break;
            }
            cursor = block.header.previous_hash;
        }
        branch.reverse();

        // Rebuild indices and state from genesis along the new branch.
        inner.canonical = branch.clone();
        inner.tx_index.clear();
        inner.debt_index.clear();
        inner.state = inner.genesis_alloc.clone();
        for hash in branch {
            let block = Arc::clone(&inner.blocks[&hash]);
            Self::index_block(inner, &block);
            if block.header.height > 0 {
                Self::replay(inner, &block, shard);
            }
        }
        Ok(())
    }
}

impl ChainStore for TestChain {
    fn head_hash(&self) -> Result<Hash, ChainError> {
        Ok(self.inner.lock().head)
    }

    fn block(&self, hash: &Hash) -> Result<Arc<Block>, ChainError> {
        self.inner
            .lock()
            .blocks
            .get(hash)
            .cloned()
            .ok_or(ChainError::BlockNotFound(*hash))
    }

    fn block_by_height(&self, height: u64) -> Result<Arc<Block>, ChainError> {
        let inner = self.inner.lock();
        inner
            .canonical
            .get(height as usize)
            .map(|h| Arc::clone(&inner.blocks[h]))
            .ok_or(ChainError::HeightNotFound(height))
    }

    fn header(&self, hash: &Hash) -> Result<BlockHeader, ChainError> {
        self.block(hash).map(|b| b.header.clone())
    }

    fn tx_index(&self, hash: &Hash) -> Result<Option<(Hash, usize)>, ChainError> {
        Ok(self.inner.lock().tx_index.get(hash).copied())
    }

    fn debt_index(&self, hash: &Hash) -> Result<Option<(Hash, usize)>, ChainError> {
        Ok(self.inner.lock().debt_index.get(hash).copied())
    }
}

impl Chain for TestChain {
    fn current_info(&self) -> Result<(Arc<Block>, Box<dyn StateDb>), ChainError> {
        let inner = self.inner.lock();
        let head = Arc::clone(&inner.blocks[&inner.head]);
        Ok((head, Box::new(inner.state.clone())))
    }

    fn current_state(&self) -> Result<Box<dyn StateDb>, ChainError> {
        Ok(Box::new(self.inner.lock().state.clone()))
    }

    fn store(&self) -> &dyn ChainStore {
        self
    }

    fn apply_tx(
        &self,
        tx: &Transaction,
        _index: usize,
        _coinbase: &Address,
        state: &mut dyn StateDb,
        header: &BlockHeader,
    ) -> Result<Receipt, ChainError> {
        if tx.is_reward() {
            state.add_balance(&tx.body.to, tx.body.amount);
            return Ok(Receipt::transfer(tx.hash(), 0, Hash::ZERO));
        }

        // User transactions go through the execution seam; fees accrue to
        // the header's creator.
        self.vm.execute(tx, state, header)
    }

    fn apply_debt_without_verify(
        &self,
        state: &mut dyn StateDb,
        debt: &Debt,
        coinbase: &Address,
        _parent: &BlockHeader,
        _common_ancestor: &BlockHeader,
    ) -> Result<(), ChainError> {
        if self.inner.lock().debt_index.contains_key(&debt.hash()) {
            return Err(ChainError::State(format!(
                "debt {} already packed",
                debt.hash()
            )));
        }
        state.add_balance(&debt.data.to, debt.data.amount);
        state.add_balance(coinbase, debt.fee());
        Ok(())
    }

    fn write_block(&self, block: &Block) -> Result<(), ChainError> {
        let hash = block.hash();
        let (old_head, new_head) = {
            let mut inner = self.inner.lock();
            if !inner.blocks.contains_key(&block.header.previous_hash) {
                return Err(ChainError::HeaderNotFound(block.header.previous_hash));
            }

            let old_head = inner.head;
            let head_height = inner.blocks[&old_head].header.height;
            inner.blocks.insert(hash, Arc::new(block.clone()));

            if block.header.previous_hash == old_head {
                // Plain extension.
                inner.canonical.push(hash);
                inner.head = hash;
                Self::index_block(&mut inner, block);
                Self::replay(&mut inner, block, self.shard);
            } else if block.header.height > head_height {
                // Longer side branch wins.
                Self::rebuild_canonical(&mut inner, hash, self.shard)?;
                inner.head = hash;
            } else {
                // Shorter side branch, stored only.
                return Ok(());
            }
            (old_head, inner.head)
        };

        self.bus.publish(Event::ChainHeaderChanged {
            new_head,
            old_head,
        });
        Ok(())
    }

    fn find_common_ancestor(
        &self,
        a: &BlockHeader,
        b: &BlockHeader,
    ) -> Result<BlockHeader, ChainError> {
        let mut a = a.clone();
        let mut b = b.clone();

        while a.height > b.height {
            a = self.header(&a.previous_hash)?;
        }
        while b.height > a.height {
            b = self.header(&b.previous_hash)?;
        }
        while a.hash() != b.hash() {
            a = self.header(&a.previous_hash)?;
            b = self.header(&b.previous_hash)?;
        }
        Ok(a)
    }
}

type VerdictFn = dyn Fn(&Debt) -> DebtVerdict + Send + Sync;

/// Verifier double returning fixed or computed verdicts.
pub struct TestVerifier {
    verdict: Box<VerdictFn>,
}

impl TestVerifier {
    pub fn fixed(packed: bool, confirmed: bool, error: Option<VerifierError>) -> TestVerifier {
        TestVerifier {
            verdict: Box::new(move |_| DebtVerdict {
                packed,
                confirmed,
                error: error.clone(),
            }),
        }
    }

    pub fn with<F>(f: F) -> TestVerifier
    where
        F: Fn(&Debt) -> DebtVerdict + Send + Sync + 'static,
    {
        TestVerifier {
            verdict: Box::new(f),
        }
    }
}

impl DebtVerifier for TestVerifier {
    fn validate_debt(&self, debt: &Debt) -> DebtVerdict {
        (self.verdict)(debt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_types::test_utils::{test_address, test_transfer};

    fn make_block(parent: &Block, creator: Address, txs: Vec<Arc<Transaction>>) -> Block {
        let header = BlockHeader {
            previous_hash: parent.hash(),
            creator,
            height: parent.header.height + 1,
            timestamp: parent.header.timestamp + 20,
            difficulty: parent.header.difficulty,
            state_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            debt_root: Hash::ZERO,
            receipt_root: Hash::ZERO,
            consensus: ConsensusTag::MatrixPow,
            witness: Vec::new(),
            extra: Vec::new(),
        };
        Block::new(header, txs, &[], Vec::new())
    }

    #[test]
    fn extension_moves_head_and_indexes_bodies() {
        let chain = TestChain::new(1, EventBus::default());
        let genesis = chain.head();

        let tx = Arc::new(test_transfer(1, 1, test_address(1, 9), 10, 1, 0));
        chain.fund(tx.body.from, 1_000_000);
        let block = make_block(&genesis, test_address(1, 5), vec![tx.clone()]);

        chain.write_block(&block).unwrap();
        assert_eq!(chain.head().hash(), block.hash());
        assert!(chain.tx_index(&tx.hash()).unwrap().is_some());
    }

    #[test]
    fn longer_branch_wins_fork_choice() {
        let bus = EventBus::default();
        let chain = TestChain::new(1, bus.clone());
        let genesis = chain.head();

        let a1 = make_block(&genesis, test_address(1, 5), Vec::new());
        chain.write_block(&a1).unwrap();

        let b1 = make_block(&genesis, test_address(1, 6), Vec::new());
        chain.write_block(&b1).unwrap();
        // Same height: head unchanged.
        assert_eq!(chain.head().hash(), a1.hash());

        let b2 = make_block(&b1, test_address(1, 6), Vec::new());
        chain.write_block(&b2).unwrap();
        assert_eq!(chain.head().hash(), b2.hash());
    }

    #[test]
    fn common_ancestor_walks_both_branches() {
        let chain = TestChain::new(1, EventBus::default());
        let genesis = chain.head();

        let a1 = make_block(&genesis, test_address(1, 5), Vec::new());
        let a2 = make_block(&a1, test_address(1, 5), Vec::new());
        let b1 = make_block(&genesis, test_address(1, 6), Vec::new());
        chain.write_block(&a1).unwrap();
        chain.write_block(&a2).unwrap();
        chain.write_block(&b1).unwrap();

        let ancestor = chain
            .find_common_ancestor(&a2.header, &b1.header)
            .unwrap();
        assert_eq!(ancestor.hash(), genesis.hash());
    }

    #[test]
    fn unknown_parent_rejected() {
        let chain = TestChain::new(1, EventBus::default());
        let genesis = chain.head();
        let mut orphan = make_block(&genesis, test_address(1, 5), Vec::new());
        orphan.header.previous_hash = Hash::of_bytes(b"nowhere");
        assert!(matches!(
            chain.write_block(&orphan),
            Err(ChainError::HeaderNotFound(_))
        ));
    }
}
