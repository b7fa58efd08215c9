//! A mining task: header, transactions, receipts and debts.

use crate::miner::MinerError;
use lattice_consensus::block_reward;
use lattice_core::{validate_for_admission, Chain, StateDb};
use lattice_pool::{DebtPool, TransactionPool};
use lattice_types::{Address, Block, BlockHeader, Debt, Receipt, Transaction};
use std::sync::Arc;

/// Soft byte budget for one block body.
pub const BLOCK_BYTE_LIMIT: usize = 1024 * 1024;

/// Work in progress for the engine: everything needed to build a block.
pub struct Task {
    header: BlockHeader,
    txs: Vec<Arc<Transaction>>,
    receipts: Vec<Receipt>,
    debts: Vec<Arc<Debt>>,
    coinbase: Address,
    shard: u16,
}

impl Task {
    pub fn new(header: BlockHeader, coinbase: Address, shard: u16) -> Task {
        Task {
            header,
            txs: Vec::new(),
            receipts: Vec::new(),
            debts: Vec::new(),
            coinbase,
            shard,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub(crate) fn set_witness(&mut self, witness: Vec<u8>) {
        self.header.witness = witness;
    }

    /// Fill the block body in strict order — debts, then the miner reward,
    /// then user transactions — and commit the state root into the header.
    /// Debts settle prior commitments from other shards and must not be
    /// starved by local transaction pressure; the reward occupies index 0
    /// for receipt indexing.
    pub fn apply_transactions_and_debts(
        &mut self,
        chain: &dyn Chain,
        tx_pool: &TransactionPool,
        debt_pool: &DebtPool,
        state: &mut dyn StateDb,
    ) -> Result<(), MinerError> {
        let remaining = self.choose_debts(chain, debt_pool, state);

        let reward = self.handle_reward_tx(chain, state)?;

        self.choose_transactions(chain, tx_pool, state, remaining);

        tracing::info!(
            height = self.header.height,
            reward,
            txs = self.txs.len(),
            debts = self.debts.len(),
            "assembled mining task"
        );

        self.header.state_root = state.commit();
        Ok(())
    }

    /// Pack verified debts under the byte budget; a debt whose application
    /// fails is dropped from the pool. Returns the budget left for
    /// transactions.
    fn choose_debts(
        &mut self,
        chain: &dyn Chain,
        debt_pool: &DebtPool,
        state: &mut dyn StateDb,
    ) -> usize {
        let mut size = BLOCK_BYTE_LIMIT;

        while size > 0 {
            let (debts, _) = debt_pool.get_processable_debts(size);
            if debts.is_empty() {
                break;
            }

            let store = chain.store();
            let Ok(head_hash) = store.head_hash() else {
                return size;
            };
            let Ok(head) = store.header(&head_hash) else {
                return size;
            };
            let Ok(parent) = store.header(&self.header.previous_hash) else {
                return size;
            };
            let Ok(ancestor) = chain.find_common_ancestor(&parent, &head) else {
                return size;
            };

            for debt in debts {
                if let Err(err) =
                    chain.apply_debt_without_verify(state, &debt, &self.coinbase, &parent, &ancestor)
                {
                    tracing::debug!(debt = %debt.hash(), %err, "dropping debt that failed to apply");
                    debt_pool.remove_debt(&debt.hash());
                    continue;
                }

                size = size.saturating_sub(debt.size());
                self.debts.push(debt);
            }
        }

        size
    }

    /// Issue and apply the miner reward; it is always the first transaction.
    fn handle_reward_tx(
        &mut self,
        chain: &dyn Chain,
        state: &mut dyn StateDb,
    ) -> Result<u128, MinerError> {
        let amount = block_reward(self.header.height);
        let reward = Arc::new(Transaction::reward(
            self.coinbase,
            amount,
            self.header.timestamp,
        ));

        let receipt = chain.apply_tx(&reward, 0, &self.coinbase, state, &self.header)?;
        self.txs.push(reward);
        self.receipts.push(receipt);
        Ok(amount)
    }

    /// Pack pending transactions under the remaining budget. A transaction
    /// that fails validation or application is dropped from the pool and the
    /// packing continues.
    fn choose_transactions(
        &mut self,
        chain: &dyn Chain,
        tx_pool: &TransactionPool,
        state: &mut dyn StateDb,
        mut size: usize,
    ) {
        let mut tx_index = 1; // index 0 is the miner reward

        while size > 0 {
            let (txs, mut batch_size) = tx_pool.get_processable_transactions(size);
            if txs.is_empty() {
                break;
            }

            for tx in txs {
                if let Err(err) = validate_for_admission(state, &tx, self.shard) {
                    tx_pool.remove_transaction(&tx.hash());
                    tracing::error!(tx = %tx.hash(), %err, "failed to validate packed transaction");
                    batch_size = batch_size.saturating_sub(tx.size());
                    continue;
                }

                match chain.apply_tx(&tx, tx_index, &self.coinbase, state, &self.header) {
                    Ok(receipt) => {
                        self.txs.push(tx);
                        self.receipts.push(receipt);
                        tx_index += 1;
                    }
                    Err(err) => {
                        tx_pool.remove_transaction(&tx.hash());
                        tracing::error!(tx = %tx.hash(), %err, "failed to apply packed transaction");
                        batch_size = batch_size.saturating_sub(tx.size());
                    }
                }
            }

            size = size.saturating_sub(batch_size);
        }
    }

    /// Build the block from the task.
    pub fn generate_block(&self) -> Block {
        Block::new(
            self.header.clone(),
            self.txs.clone(),
            &self.receipts,
            self.debts.clone(),
        )
    }
}
