//! End-to-end pool behavior against the in-memory chain.

use lattice_core::testing::{TestChain, TestVerifier};
use lattice_core::{Chain, EventBus, VerifierError};
use lattice_pool::{
    CachedTxWindow, DebtPool, DebtPoolConfig, PoolError, TransactionPool, TxPoolConfig,
};
use lattice_types::test_utils::{test_address, test_transfer};
use lattice_types::{Address, Block, BlockHeader, ConsensusTag, Debt, Hash, Transaction};
use std::sync::Arc;

const FUND: u128 = 1_000_000_000;

fn make_tx_pool(capacity: usize) -> (Arc<TestChain>, Arc<TransactionPool>, EventBus) {
    let bus = EventBus::default();
    let chain = Arc::new(TestChain::new(1, bus.clone()));
    let pool = Arc::new(TransactionPool::new(
        TxPoolConfig {
            capacity,
            ..TxPoolConfig::default()
        },
        1,
        chain.clone() as Arc<dyn Chain>,
        bus.clone(),
        Arc::new(CachedTxWindow::new(1000)),
    ));
    (chain, pool, bus)
}

fn funded_transfer(
    chain: &TestChain,
    seed: u8,
    nonce: u64,
    price: u128,
) -> Arc<Transaction> {
    let tx = Arc::new(test_transfer(1, seed, test_address(1, 99), 100, price, nonce));
    chain.fund(tx.body.from, FUND);
    tx
}

fn next_block(parent: &Block, creator: Address, txs: Vec<Arc<Transaction>>) -> Block {
    let reward = Arc::new(Transaction::reward(creator, 0, parent.header.timestamp + 20));
    let mut body = vec![reward];
    body.extend(txs);
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
    Block::new(header, body, &[], Vec::new())
}

#[test]
fn single_sender_packs_in_nonce_order() {
    let (chain, pool, _bus) = make_tx_pool(100);

    // Insertion order 1, 3, 2 with prices 10, 100, 50.
    let t1 = funded_transfer(&chain, 1, 1, 10);
    let t3 = funded_transfer(&chain, 1, 3, 100);
    let t2 = funded_transfer(&chain, 1, 2, 50);
    pool.add_transaction(t1).unwrap();
    pool.add_transaction(t3).unwrap();
    pool.add_transaction(t2).unwrap();

    let (packed, _) = pool.get_processable_transactions(usize::MAX);
    let nonces: Vec<u64> = packed.iter().map(|tx| tx.body.nonce).collect();
    assert_eq!(nonces, vec![1, 2, 3]);
}

#[test]
fn cheapest_sender_is_evicted_under_pressure() {
    let (chain, pool, _bus) = make_tx_pool(3);

    let a = funded_transfer(&chain, 1, 0, 10);
    let b = funded_transfer(&chain, 2, 0, 20);
    let c = funded_transfer(&chain, 3, 0, 30);
    pool.add_transaction(a.clone()).unwrap();
    pool.add_transaction(b.clone()).unwrap();
    pool.add_transaction(c.clone()).unwrap();

    let d = funded_transfer(&chain, 4, 0, 25);
    pool.add_transaction(d.clone()).unwrap();

    assert_eq!(pool.len(), 3);
    assert!(!pool.has(&a.hash()), "cheapest sender evicted");
    assert!(pool.has(&b.hash()));
    assert!(pool.has(&c.hash()));
    assert!(pool.has(&d.hash()));
}

#[test]
fn full_pool_without_cheaper_sender_rejects() {
    let (chain, pool, _bus) = make_tx_pool(2);

    pool.add_transaction(funded_transfer(&chain, 1, 0, 20)).unwrap();
    pool.add_transaction(funded_transfer(&chain, 2, 0, 30)).unwrap();

    let cheap = funded_transfer(&chain, 3, 0, 10);
    assert_eq!(pool.add_transaction(cheap), Err(PoolError::PoolFull));
    assert_eq!(pool.len(), 2);
}

#[test]
fn same_nonce_replaced_only_by_higher_price() {
    let (chain, pool, _bus) = make_tx_pool(100);

    let low = funded_transfer(&chain, 1, 5, 10);
    pool.add_transaction(low.clone()).unwrap();

    // Same (sender, nonce, price) but a different payload, so the hash
    // differs and the replacement rule decides.
    let equal = Arc::new(test_transfer(1, 1, test_address(1, 98), 200, 10, 5));
    assert_eq!(
        pool.add_transaction(equal),
        Err(PoolError::NonceAlreadyUsed)
    );

    let high = funded_transfer(&chain, 1, 5, 11);
    pool.add_transaction(high.clone()).unwrap();

    assert_eq!(pool.len(), 1);
    assert!(!pool.has(&low.hash()));
    assert!(pool.has(&high.hash()));
    assert_eq!(
        pool.get_transaction(&high.hash()).unwrap().body.gas_price,
        11
    );
}

#[test]
fn duplicate_hash_rejected() {
    let (chain, pool, _bus) = make_tx_pool(100);
    let tx = funded_transfer(&chain, 1, 0, 10);
    pool.add_transaction(tx.clone()).unwrap();
    assert_eq!(pool.add_transaction(tx), Err(PoolError::HashExists));
}

#[test]
fn reversed_block_txs_return_to_the_pool() {
    let (chain, pool, _bus) = make_tx_pool(100);
    let tx = funded_transfer(&chain, 1, 0, 10);

    // The block never made it onto the canonical chain; its transactions
    // become reinjection candidates.
    let block = next_block(&chain.head(), test_address(1, 50), vec![tx.clone()]);
    pool.handle_chain_reversed(&block);

    assert!(pool.has(&tx.hash()));
}

#[test]
fn recently_mined_tx_bounces_off_the_window() {
    let (chain, pool, _bus) = make_tx_pool(100);
    let tx = funded_transfer(&chain, 1, 0, 10);

    let block = next_block(&chain.head(), test_address(1, 50), vec![tx.clone()]);
    pool.cache_block_txs(&block);

    assert_eq!(pool.add_transaction(tx), Err(PoolError::DuplicateTx));
}

#[test]
fn byte_budget_bounds_packing() {
    let (chain, pool, _bus) = make_tx_pool(100);
    pool.add_transaction(funded_transfer(&chain, 1, 0, 10)).unwrap();
    pool.add_transaction(funded_transfer(&chain, 2, 0, 20)).unwrap();

    let one_tx = funded_transfer(&chain, 3, 0, 1).size();
    let (packed, size) = pool.get_processable_transactions(one_tx);
    assert_eq!(packed.len(), 1);
    assert_eq!(size, one_tx);
    // The higher-priced sender went first.
    assert_eq!(packed[0].body.gas_price, 20);
}

#[test]
fn processing_rotates_back_to_pending() {
    let (chain, pool, _bus) = make_tx_pool(100);
    let tx = funded_transfer(&chain, 1, 0, 10);
    pool.add_transaction(tx.clone()).unwrap();

    let (packed, _) = pool.get_processable_transactions(usize::MAX);
    assert_eq!(packed.len(), 1);
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.transaction_count(true, false), 1);

    // Next take clears the processing marks; the maintenance pass then
    // rotates the unpacked transaction back into the queue.
    let (packed, _) = pool.get_processable_transactions(usize::MAX);
    assert!(packed.is_empty());
    pool.inner().maintenance_tick();
    assert_eq!(pool.pending_count(), 1);

    let (packed, _) = pool.get_processable_transactions(usize::MAX);
    assert_eq!(packed[0].hash(), tx.hash());
}

#[test]
fn head_change_reinjects_orphans_and_drops_new_branch_txs() {
    let (chain, pool, _bus) = make_tx_pool(100);
    let genesis = chain.head();
    let creator = test_address(1, 50);

    let t1 = funded_transfer(&chain, 1, 0, 10);
    let t2 = funded_transfer(&chain, 2, 0, 10);
    let t3 = funded_transfer(&chain, 3, 0, 10);

    // Canonical: G <- A1(t1). Side branch: G <- B1(t2) <- B2(t3).
    let a1 = next_block(&genesis, creator, vec![t1.clone()]);
    chain.write_block(&a1).unwrap();
    assert_eq!(chain.head().hash(), a1.hash());

    // t2 sits in the pool while the side branch packs it.
    pool.add_transaction(t2.clone()).unwrap();

    let b1 = next_block(&genesis, creator, vec![t2.clone()]);
    chain.write_block(&b1).unwrap();
    let b2 = next_block(&b1, creator, vec![t3.clone()]);
    chain.write_block(&b2).unwrap();
    assert_eq!(chain.head().hash(), b2.hash());

    pool.handle_chain_header_changed(b2.hash(), a1.hash());

    assert!(pool.has(&t1.hash()), "orphaned tx reinjected");
    assert!(!pool.has(&t2.hash()), "tx packed on the new branch removed");
    assert!(!pool.has(&t3.hash()), "tx packed on the new branch never added");
}

fn make_debt_pool(
    shard: u16,
    verifier: Option<Arc<TestVerifier>>,
) -> (Arc<TestChain>, Arc<DebtPool>, EventBus) {
    let bus = EventBus::default();
    let chain = Arc::new(TestChain::new(shard, bus.clone()));
    let pool = Arc::new(DebtPool::new(
        DebtPoolConfig::default(),
        shard,
        chain.clone() as Arc<dyn Chain>,
        bus.clone(),
        verifier.map(|v| v as Arc<dyn lattice_core::DebtVerifier>),
    ));
    (chain, pool, bus)
}

fn cross_shard_debt(seed: u8) -> Arc<Debt> {
    let tx = test_transfer(1, seed, test_address(2, 77), 500, 3, 0);
    Arc::new(Debt::from_tx(&tx).expect("cross-shard tx yields a debt"))
}

#[test]
fn confirmed_debt_is_promoted_to_pending() {
    let verifier = Arc::new(TestVerifier::fixed(true, true, None));
    let (_chain, pool, _bus) = make_debt_pool(2, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();
    assert_eq!(pool.to_confirm_count(), 1);

    pool.check_debts_once().unwrap();

    assert_eq!(pool.to_confirm_count(), 0);
    let (packed, _) = pool.get_processable_debts(usize::MAX);
    assert_eq!(packed.len(), 1);
    assert_eq!(packed[0].hash(), debt.hash());
}

#[test]
fn unprovable_debt_is_dropped() {
    let verifier = Arc::new(TestVerifier::fixed(
        false,
        false,
        Some(VerifierError::Disproved("no such tx".into())),
    ));
    let (_chain, pool, _bus) = make_debt_pool(2, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();

    assert!(pool.check_debts_once().is_err());
    assert_eq!(pool.to_confirm_count(), 0);
    assert!(pool.get_debt(&debt.hash()).is_none());
}

#[test]
fn packed_but_unconfirmed_debt_is_retained() {
    let verifier = Arc::new(TestVerifier::fixed(
        true,
        false,
        Some(VerifierError::MissingData("below confirm depth".into())),
    ));
    let (_chain, pool, _bus) = make_debt_pool(2, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();

    assert!(pool.check_debts_once().is_err());
    assert_eq!(pool.to_confirm_count(), 1);
    assert!(pool.get_debt(&debt.hash()).is_some());
}

#[test]
fn undecided_debt_retries_next_round() {
    let verifier = Arc::new(TestVerifier::fixed(false, false, None));
    let (_chain, pool, _bus) = make_debt_pool(2, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();

    pool.check_debts_once().unwrap();
    assert_eq!(pool.to_confirm_count(), 1);
}

#[test]
fn wrong_shard_debt_is_dropped_as_malformed() {
    let verifier = Arc::new(TestVerifier::fixed(true, true, None));
    // Local shard 3, but the debt targets shard 2.
    let (_chain, pool, _bus) = make_debt_pool(3, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();

    assert!(pool.check_debts_once().is_err());
    assert_eq!(pool.to_confirm_count(), 0);
}

#[test]
fn duplicate_debt_enqueue_is_idempotent() {
    let verifier = Arc::new(TestVerifier::fixed(true, true, None));
    let (_chain, pool, _bus) = make_debt_pool(2, Some(verifier));

    let debt = cross_shard_debt(1);
    pool.add_debt(debt.clone()).unwrap();
    pool.add_debt(debt.clone()).unwrap();
    assert_eq!(pool.to_confirm_count(), 1);

    pool.check_debts_once().unwrap();
    pool.add_debt(debt).unwrap();
    assert_eq!(pool.to_confirm_count(), 0, "promoted debt is not re-queued");
}

#[tokio::test(flavor = "multi_thread")]
async fn event_pump_reinjects_on_head_change() {
    let (chain, pool, bus) = make_tx_pool(100);
    let debt_pool = Arc::new(DebtPool::new(
        DebtPoolConfig::default(),
        1,
        chain.clone() as Arc<dyn Chain>,
        bus.clone(),
        None,
    ));
    tokio::spawn(lattice_pool::run_pool_events(
        pool.clone(),
        debt_pool,
        bus.clone(),
    ));
    // Let the pump subscribe before the first event fires.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let genesis = chain.head();
    let creator = test_address(1, 50);
    let t1 = funded_transfer(&chain, 1, 0, 10);

    let a1 = next_block(&genesis, creator, vec![t1.clone()]);
    chain.write_block(&a1).unwrap();

    let b1 = next_block(&genesis, creator, Vec::new());
    chain.write_block(&b1).unwrap();
    let b2 = next_block(&b1, creator, Vec::new());
    chain.write_block(&b2).unwrap();
    assert_eq!(chain.head().hash(), b2.hash());

    // The reorg event reaches the pump, which reinjects the orphaned tx.
    for _ in 0..200 {
        if pool.has(&t1.hash()) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("orphaned tx was not reinjected");
}

#[test]
fn capacity_bound_holds_after_every_add() {
    let (chain, pool, _bus) = make_tx_pool(5);
    for seed in 1..=30u8 {
        let _ = pool.add_transaction(funded_transfer(&chain, seed, 0, seed as u128));
        assert!(pool.len() <= 5);
    }
}
