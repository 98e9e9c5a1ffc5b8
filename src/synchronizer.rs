//! Background block synchronizer.
//!
//! Pulls blocks from the daemon, scans their outputs with the private view
//! key and credits matches to the owning sub wallet. Progress (height plus a
//! window of recent block hashes) is persisted with the wallet so a reopened
//! wallet resumes where it stopped.

use crate::config::{RetryPolicy, WalletConfig};
use crate::constants::{BLOCKS_PER_SYNC_REQUEST, LAST_KNOWN_BLOCK_HASHES_SIZE};
use crate::daemon::{Daemon, SyncRequest};
use crate::error::DaemonError;
use crate::events::{EventHandler, WalletEvent};
use crate::keys::{generate_key_derivation, underive_public_key, PublicKey, SecretKey};
use crate::sub_wallets::SubWallets;
use crate::types::{hex_hash_vec, Hash, RawTransaction, Transaction, TransactionInput, WalletBlock};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

/// Where scanning has got to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationStatus {
    last_known_block_height: u64,
    /// Newest first. Entry `i` is the hash at `last_known_block_height - i`.
    #[serde(with = "hex_hash_vec")]
    last_known_block_hashes: Vec<Hash>,
}

impl SynchronizationStatus {
    pub fn last_known_block_height(&self) -> u64 {
        self.last_known_block_height
    }

    pub fn has_blocks(&self) -> bool {
        !self.last_known_block_hashes.is_empty()
    }

    /// Hashes sent to the daemon so it can find our fork point.
    pub fn checkpoints(&self) -> Vec<Hash> {
        self.last_known_block_hashes.clone()
    }

    fn hash_at(&self, height: u64) -> Option<&Hash> {
        let offset = self.last_known_block_height.checked_sub(height)?;
        self.last_known_block_hashes.get(offset as usize)
    }

    fn store_block_hash(&mut self, height: u64, hash: Hash) {
        self.last_known_block_height = height;
        self.last_known_block_hashes.insert(0, hash);
        self.last_known_block_hashes.truncate(LAST_KNOWN_BLOCK_HASHES_SIZE);
    }

    /// Forgets every block at or above `fork_height`.
    fn rewind(&mut self, fork_height: u64) {
        if !self.has_blocks() || fork_height > self.last_known_block_height {
            return;
        }

        let dropped = (self.last_known_block_height - fork_height + 1) as usize;
        let dropped = dropped.min(self.last_known_block_hashes.len());
        self.last_known_block_hashes.drain(..dropped);
        self.last_known_block_height = fork_height.saturating_sub(1);
    }
}

/// Snapshot for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Number of blocks the wallet has scanned up to, i.e. last height + 1.
    pub wallet_block_count: u64,
    pub start_height: u64,
    pub start_timestamp: u64,
}

struct Worker {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    runtime: Handle,
}

pub struct WalletSynchronizer {
    start_height: u64,
    start_timestamp: u64,
    private_view_key: SecretKey,
    status: Arc<Mutex<SynchronizationStatus>>,

    daemon: Option<Arc<dyn Daemon>>,
    events: EventHandler,
    sub_wallets: Option<Arc<RwLock<SubWallets>>>,
    worker: Option<Worker>,
}

impl WalletSynchronizer {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        start_height: u64,
        start_timestamp: u64,
        private_view_key: SecretKey,
        events: EventHandler,
    ) -> Self {
        Self {
            start_height,
            start_timestamp,
            private_view_key,
            status: Arc::new(Mutex::new(SynchronizationStatus::default())),
            daemon: Some(daemon),
            events,
            sub_wallets: None,
            worker: None,
        }
    }

    /// Reattaches the live resources a deserialized synchronizer lacks.
    pub fn initialize_after_load(&mut self, daemon: Arc<dyn Daemon>, events: EventHandler) {
        self.daemon = Some(daemon);
        self.events = events;
    }

    pub fn set_sub_wallets(&mut self, sub_wallets: Arc<RwLock<SubWallets>>) {
        self.sub_wallets = Some(sub_wallets);
    }

    pub fn private_view_key(&self) -> &SecretKey {
        &self.private_view_key
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn status(&self) -> SynchronizationStatus {
        lock(&self.status).clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        let status = lock(&self.status);
        let wallet_block_count = if status.has_blocks() {
            status.last_known_block_height + 1
        } else {
            0
        };

        SyncStatus {
            wallet_block_count,
            start_height: self.start_height,
            start_timestamp: self.start_timestamp,
        }
    }

    /// Spawns the sync task on `runtime`. Does nothing if it is already
    /// running or the daemon and sub wallets have not been attached yet.
    pub fn start(&mut self, runtime: &Handle, config: &WalletConfig) {
        if self.worker.is_some() {
            return;
        }

        let (Some(daemon), Some(sub_wallets)) = (self.daemon.clone(), self.sub_wallets.clone()) else {
            tracing::warn!("synchronizer started before daemon and sub wallets were attached");
            return;
        };

        let sync = SyncLoop {
            daemon,
            sub_wallets,
            status: Arc::clone(&self.status),
            events: self.events.clone(),
            private_view_key: self.private_view_key.clone(),
            start_height: self.start_height,
            start_timestamp: self.start_timestamp,
            sync_interval: config.sync_interval,
            retry_policy: config.retry_policy.clone(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = runtime.spawn(sync.run(stop_rx).with_subscriber(config.dispatch.clone()));

        tracing::debug!(
            start_height = self.start_height,
            start_timestamp = self.start_timestamp,
            "synchronizer started"
        );

        self.worker = Some(Worker {
            stop_tx,
            task,
            runtime: runtime.clone(),
        });
    }

    /// Signals the sync task and blocks until it has finished its current
    /// block. Must not be called from inside the runtime.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.stop_tx.send(true);
        if let Err(e) = worker.runtime.block_on(worker.task) {
            tracing::warn!("synchronizer task failed: {}", e);
        }
    }
}

impl Drop for WalletSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SyncLoop {
    daemon: Arc<dyn Daemon>,
    sub_wallets: Arc<RwLock<SubWallets>>,
    status: Arc<Mutex<SynchronizationStatus>>,
    events: EventHandler,
    private_view_key: SecretKey,
    start_height: u64,
    start_timestamp: u64,
    sync_interval: Duration,
    retry_policy: RetryPolicy,
}

impl SyncLoop {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            let request = self.next_request();
            let daemon = Arc::clone(&self.daemon);

            let fetched = match tokio::task::spawn_blocking(move || daemon.get_wallet_sync_data(&request)).await {
                Ok(fetched) => fetched,
                Err(e) => Err(DaemonError::Connection(format!("sync request aborted: {}", e))),
            };

            let delay = match fetched {
                Ok(blocks) if blocks.is_empty() => {
                    failures = 0;
                    let height = lock(&self.status).last_known_block_height();
                    self.events.emit(WalletEvent::SyncCaughtUp { height });
                    self.sync_interval
                }
                Ok(blocks) => {
                    failures = 0;
                    for block in &blocks {
                        if *stop_rx.borrow() {
                            tracing::debug!("synchronizer stopped");
                            return;
                        }
                        self.process_block(block);
                    }
                    Duration::ZERO
                }
                Err(e) => {
                    let delay = self.retry_policy.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    tracing::warn!("failed to fetch blocks (attempt {}): {}, retrying in {:?}", failures, e, delay);
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("synchronizer stopped");
    }

    fn next_request(&self) -> SyncRequest {
        SyncRequest {
            checkpoints: lock(&self.status).checkpoints(),
            start_height: self.start_height,
            start_timestamp: self.start_timestamp,
            block_count: BLOCKS_PER_SYNC_REQUEST,
        }
    }

    /// Applies one block. The sub wallet mutation and the progress update
    /// happen under the same write lock.
    fn process_block(&self, block: &WalletBlock) {
        let mut pending = Vec::new();

        {
            let mut sub_wallets = self.sub_wallets.write().unwrap_or_else(PoisonError::into_inner);
            let mut status = lock(&self.status);

            if status.has_blocks() && block.block_height <= status.last_known_block_height() {
                if status.hash_at(block.block_height) == Some(&block.block_hash) {
                    return;
                }

                let removed = sub_wallets.remove_forked_data(block.block_height);
                status.rewind(block.block_height);
                tracing::info!(
                    "chain forked at height {}: removed {} inputs",
                    block.block_height,
                    removed
                );
                pending.push(WalletEvent::ChainForked { fork_height: block.block_height });
            }

            let coinbase = block.coinbase_transaction.iter().map(|tx| (tx, true));
            let regular = block.transactions.iter().map(|tx| (tx, false));

            for (raw, is_coinbase) in coinbase.chain(regular) {
                if let Some(transaction) = self.scan_transaction(&mut sub_wallets, block, raw, is_coinbase) {
                    let event = WalletEvent::TransactionFound {
                        hash: transaction.hash,
                        amount: transaction.total_amount(),
                        block_height: block.block_height,
                    };

                    if sub_wallets.add_transaction(transaction) {
                        pending.push(event);
                    }
                }
            }

            status.store_block_hash(block.block_height, block.block_hash);
        }

        pending.push(WalletEvent::BlockProcessed { height: block.block_height });
        for event in pending {
            self.events.emit(event);
        }
    }

    /// Credits every output of `raw` that belongs to one of our sub wallets.
    fn scan_transaction(
        &self,
        sub_wallets: &mut SubWallets,
        block: &WalletBlock,
        raw: &RawTransaction,
        is_coinbase: bool,
    ) -> Option<Transaction> {
        let derivation = match generate_key_derivation(&raw.transaction_public_key, &self.private_view_key) {
            Ok(derivation) => derivation,
            Err(_) => {
                tracing::debug!("skipping transaction {} with invalid public key", hex::encode(raw.hash));
                return None;
            }
        };

        let mut transfers: BTreeMap<PublicKey, i64> = BTreeMap::new();

        for (index, output) in raw.key_outputs.iter().enumerate() {
            let Ok(spend_key) = underive_public_key(&derivation, index as u64, &output.key) else {
                continue;
            };

            if !sub_wallets.contains(&spend_key) {
                continue;
            }

            let input = TransactionInput {
                amount: output.amount,
                block_height: block.block_height,
                parent_transaction_hash: raw.hash,
                transaction_index: index as u64,
                key: output.key,
                transaction_public_key: raw.transaction_public_key,
            };

            if sub_wallets.store_transaction_input(&spend_key, input) {
                credit(&mut transfers, spend_key, output.amount);
            }
        }

        if transfers.is_empty() {
            return None;
        }

        Some(Transaction {
            hash: raw.hash,
            transfers,
            fee: 0,
            block_height: block.block_height,
            timestamp: block.block_timestamp,
            is_coinbase,
        })
    }
}

/// Adds `amount` to the signed transfer for `spend_key`, clamping at
/// `i64::MAX` rather than wrapping.
fn credit(transfers: &mut BTreeMap<PublicKey, i64>, spend_key: PublicKey, amount: u64) {
    let amount = i64::try_from(amount).unwrap_or(i64::MAX);
    let entry = transfers.entry(spend_key).or_insert(0);
    *entry = entry.saturating_add(amount);
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletSynchronizerJson {
    start_height: u64,
    start_timestamp: u64,
    private_view_key: SecretKey,
    transaction_synchronizer_status: SynchronizationStatus,
}

impl Serialize for WalletSynchronizer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WalletSynchronizerJson {
            start_height: self.start_height,
            start_timestamp: self.start_timestamp,
            private_view_key: self.private_view_key.clone(),
            transaction_synchronizer_status: self.status(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WalletSynchronizer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = WalletSynchronizerJson::deserialize(deserializer)?;

        Ok(Self {
            start_height: json.start_height,
            start_timestamp: json.start_timestamp,
            private_view_key: json.private_view_key,
            status: Arc::new(Mutex::new(json.transaction_synchronizer_status)),
            daemon: None,
            events: EventHandler::default(),
            sub_wallets: None,
            worker: None,
        })
    }
}
