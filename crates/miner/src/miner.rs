//! The miner: an event-driven pack/seal loop.
//!
//! A single control channel accepts start/stop requests; pool insertions and
//! downloader transitions feed it through the event bus. Messages are
//! processed sequentially — this is the only component that starts or stops
//! sealing.

use crate::task::Task;
use crossbeam_channel::{Receiver, Sender};
use lattice_consensus::{ConsensusError, Engine, StopToken};
use lattice_core::{Chain, ChainError, Event, EventBus, EventReceiver};
use lattice_pool::{DebtPool, TransactionPool};
use lattice_types::{Address, Block, BlockHeader, Hash};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

/// Miner failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MinerError {
    #[error("miner is already running")]
    AlreadyRunning,

    #[error("cannot start miner while the node is syncing")]
    Syncing,

    #[error("no mining task so far")]
    NoTask,

    #[error("submitted height {submitted} does not match current task height {current}")]
    HeightMismatch { submitted: u64, current: u64 },

    #[error("coinbase is on shard {actual}, local shard is {expected}")]
    WrongCoinbaseShard { actual: u16, expected: u16 },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

/// Miner configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MinerConfig {
    pub coinbase: Address,
    /// Coinbase candidates for pool-mining mode, picked at random per task.
    pub coinbase_list: Vec<Address>,
    /// Pool-mining mode: templates are handed to external workers instead
    /// of being sealed locally.
    pub pool_mode: bool,
    pub shard: u16,
}

/// Per-node miner.
pub struct Miner {
    mining: AtomicBool,
    can_start: AtomicBool,
    stopped: AtomicBool,
    /// Manual brake: while raised the miner refuses to start.
    stopper: AtomicBool,

    pool_mode: bool,
    shard: u16,
    coinbase: Mutex<Address>,
    coinbase_list: Vec<Address>,

    chain: Arc<dyn Chain>,
    tx_pool: Arc<TransactionPool>,
    debt_pool: Arc<DebtPool>,
    engine: Arc<dyn Engine>,
    bus: EventBus,

    current: Mutex<Option<Task>>,
    stop_token: Mutex<StopToken>,

    result_tx: Sender<Option<Block>>,
    result_rx: Receiver<Option<Block>>,
    msg_tx: mpsc::Sender<bool>,
    msg_rx: Mutex<Option<mpsc::Receiver<bool>>>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

impl Miner {
    pub fn new(
        config: MinerConfig,
        chain: Arc<dyn Chain>,
        tx_pool: Arc<TransactionPool>,
        debt_pool: Arc<DebtPool>,
        engine: Arc<dyn Engine>,
        bus: EventBus,
    ) -> Arc<Miner> {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let (msg_tx, msg_rx) = mpsc::channel(100);

        Arc::new(Miner {
            mining: AtomicBool::new(false),
            can_start: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            stopper: AtomicBool::new(false),
            pool_mode: config.pool_mode,
            shard: config.shard,
            coinbase: Mutex::new(config.coinbase),
            coinbase_list: config.coinbase_list,
            chain,
            tx_pool,
            debt_pool,
            engine,
            bus,
            current: Mutex::new(None),
            stop_token: Mutex::new(StopToken::new()),
            result_tx,
            result_rx,
            msg_tx,
            msg_rx: Mutex::new(Some(msg_rx)),
        })
    }

    /// Launch the control loop, the event subscription and the block-wait
    /// thread. Call once, inside a tokio runtime.
    pub fn spawn_loops(self: &Arc<Self>) {
        let rx = self
            .msg_rx
            .lock()
            .take()
            .expect("miner loops spawned once");
        tokio::spawn(Arc::clone(self).run_control(rx));
        tokio::spawn(Arc::clone(self).run_events(self.bus.subscribe()));

        let miner = Arc::clone(self);
        std::thread::Builder::new()
            .name("wait-block".into())
            .spawn(move || miner.run_wait_block())
            .expect("spawn wait-block thread");
    }

    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::Acquire)
    }

    /// The miner may start when it is stopped, not syncing, and the manual
    /// brake is released.
    pub fn can_start(&self) -> bool {
        !self.stopper.load(Ordering::Acquire)
            && self.stopped.load(Ordering::Acquire)
            && !self.mining.load(Ordering::Acquire)
            && self.can_start.load(Ordering::Acquire)
    }

    pub fn set_stopper(&self, stopper: bool) {
        self.stopper.store(stopper, Ordering::Release);
    }

    pub fn set_threads(&self, threads: usize) {
        self.engine.set_threads(threads);
    }

    pub fn coinbase(&self) -> Address {
        *self.coinbase.lock()
    }

    pub fn set_coinbase(&self, coinbase: Address) {
        *self.coinbase.lock() = coinbase;
    }

    /// Enqueue a start (true) or stop (false) request.
    pub fn notify(&self, start: bool) {
        if self.msg_tx.try_send(start).is_err() {
            tracing::debug!("miner control channel full, request dropped");
        }
    }

    /// Start mining: prepare the first block and hand it to the engine.
    pub fn start(&self) -> Result<(), MinerError> {
        if self.mining.load(Ordering::Acquire) {
            return Err(MinerError::AlreadyRunning);
        }
        if !self.can_start.load(Ordering::Acquire) {
            return Err(MinerError::Syncing);
        }

        *self.stop_token.lock() = StopToken::new();

        if let Err(err) = self.prepare_new_block() {
            tracing::warn!(%err, "failed to prepare the first block");
            return Err(err);
        }

        self.mining.store(true, Ordering::Release);
        self.stopped.store(false, Ordering::Release);
        tracing::info!("miner started");
        Ok(())
    }

    /// Stop mining and cancel the running seal task.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_token.lock().stop();
        self.mining.store(false, Ordering::Release);
        tracing::info!("miner stopped");
    }

    /// Control loop: processes start/stop requests sequentially.
    async fn run_control(self: Arc<Self>, mut rx: mpsc::Receiver<bool>) {
        while let Some(msg) = rx.recv().await {
            if msg {
                if self.can_start() {
                    if let Err(err) = self.start() {
                        tracing::error!(%err, "error starting miner");
                    }
                } else {
                    tracing::debug!(
                        stopper = self.stopper.load(Ordering::Acquire),
                        stopped = self.stopped.load(Ordering::Acquire),
                        mining = self.mining.load(Ordering::Acquire),
                        can_start = self.can_start.load(Ordering::Acquire),
                        "cannot start miner"
                    );
                }
            } else if !self.stopped.load(Ordering::Acquire) && self.mining.load(Ordering::Acquire) {
                self.stop();
            } else {
                tracing::debug!("miner is not working, stop request ignored");
            }
        }
    }

    /// Event subscription: pool insertions nudge the miner, downloader
    /// transitions gate it.
    async fn run_events(self: Arc<Self>, mut events: EventReceiver) {
        loop {
            match events.recv().await {
                Ok(Event::TransactionInserted(_)) | Ok(Event::DebtsInserted(_)) => {
                    self.notify(true);
                }
                Ok(Event::DownloaderStart) => {
                    tracing::info!("downloader started, stopping miner");
                    self.can_start.store(false, Ordering::Release);
                    self.notify(false);
                }
                Ok(Event::DownloaderDone) | Ok(Event::DownloaderFailed) => {
                    self.can_start.store(true, Ordering::Release);
                    self.notify(true);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "miner lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Blocking loop on the seal results channel: commits solved blocks and
    /// retriggers mining. Commit failures are logged and never poison the
    /// loop; the next prepare retries.
    fn run_wait_block(self: Arc<Self>) {
        while let Ok(result) = self.result_rx.recv() {
            match result {
                Some(block) => {
                    tracing::info!(
                        height = block.height(),
                        hash = %block.hash(),
                        "found a new mined block"
                    );
                    match self.chain.write_block(&block) {
                        Ok(()) => {
                            self.tx_pool.cache_block_txs(&block);
                            tracing::info!("saved mined block");
                            self.bus.publish(Event::BlockMined(Arc::new(block)));
                        }
                        Err(err) => {
                            tracing::error!(%err, "failed to save the block");
                        }
                    }
                }
                None => {
                    tracing::warn!("seal exhausted the nonce space, re-preparing");
                }
            }

            self.stopped.store(true, Ordering::Release);
            self.mining.store(false, Ordering::Release);
            // Loop mining after the round completes.
            self.notify(true);
        }
    }

    /// Assemble the next block and commit it to the engine (or publish it as
    /// a template in pool mode).
    fn prepare_new_block(&self) -> Result<(), MinerError> {
        tracing::debug!("starting mining the new block");

        let mut timestamp = unix_now();
        let (parent, mut state) = self.chain.current_info()?;

        if parent.header.timestamp >= timestamp {
            timestamp = parent.header.timestamp + 1;
        }

        // Bounded clock-skew tolerance: never mine more than a second into
        // the future, sleep the gap instead.
        let now = unix_now();
        if timestamp > now + 1 {
            let wait = Duration::from_secs(timestamp - now);
            tracing::info!(?wait, "mining too far in the future, waiting");
            std::thread::sleep(wait);
        }

        let mut coinbase = self.coinbase();
        let mut header = BlockHeader {
            previous_hash: parent.hash(),
            creator: coinbase,
            height: parent.height() + 1,
            timestamp,
            difficulty: 0,
            state_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            debt_root: Hash::ZERO,
            receipt_root: Hash::ZERO,
            consensus: self.engine.consensus_tag(),
            witness: Vec::new(),
            extra: Vec::new(),
        };

        self.engine.prepare(self.chain.store(), &mut header)?;

        if self.pool_mode {
            if let Some(choice) = self.coinbase_list.choose(&mut rand::thread_rng()) {
                coinbase = *choice;
                self.set_coinbase(coinbase);
            }
            header.creator = coinbase;
        }

        if coinbase.shard() != self.shard {
            return Err(MinerError::WrongCoinbaseShard {
                actual: coinbase.shard(),
                expected: self.shard,
            });
        }

        let mut task = Task::new(header, coinbase, self.shard);
        task.apply_transactions_and_debts(
            self.chain.as_ref(),
            &self.tx_pool,
            &self.debt_pool,
            state.as_mut(),
        )?;

        if self.pool_mode {
            tracing::info!(
                height = task.height(),
                difficulty = task.header().difficulty,
                "created a new task for the pool"
            );
            *self.current.lock() = Some(task);
        } else {
            tracing::info!(
                height = task.height(),
                difficulty = task.header().difficulty,
                "committing a new task to the engine"
            );
            let block = task.generate_block();
            let token = self.stop_token.lock().clone();
            self.engine
                .seal(self.chain.store(), block, token, self.result_tx.clone())?;
            *self.current.lock() = Some(task);
        }

        Ok(())
    }

    /// The current template header, for external workers.
    pub fn work_header(&self) -> Option<BlockHeader> {
        self.current.lock().as_ref().map(|t| t.header().clone())
    }

    /// The current task difficulty.
    pub fn task_difficulty(&self) -> Option<u128> {
        self.current.lock().as_ref().map(|t| t.header().difficulty)
    }

    /// An external worker posts a nonce for the current template. The header
    /// is re-verified by the engine before the block is committed.
    pub fn submit_work(&self, height: u64, nonce: u64) -> Result<(), MinerError> {
        let mut current = self.current.lock();
        let Some(task) = current.as_mut() else {
            return Err(MinerError::NoTask);
        };

        if task.height() != height {
            return Err(MinerError::HeightMismatch {
                submitted: height,
                current: task.height(),
            });
        }

        let mut header = task.header().clone();
        header.set_nonce(nonce);
        self.engine.verify_header(self.chain.store(), &header)?;

        task.set_witness(header.witness);
        let block = task.generate_block();
        *current = None;
        drop(current);

        let _ = self.result_tx.send(Some(block));
        Ok(())
    }
}
