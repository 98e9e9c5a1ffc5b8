//! In-memory daemon for deterministic testing.
//!
//! Holds a scripted chain and answers sync requests from it. Payments to a
//! wallet are built with real key derivations, so the synchronizer scans
//! them exactly as it would scan blocks from a node.

use crate::daemon::{Daemon, InitCallback, SyncRequest};
use crate::error::DaemonError;
use crate::keys::{derive_public_key, generate_key_derivation, generate_keys_from_rng, PublicKey};
use crate::types::{Hash, KeyOutput, RawTransaction, WalletBlock};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the mock answers `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitBehaviour {
    Succeed,
    Fail(String),
    /// Never invokes the callback.
    Hang,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MockChain {
    blocks: Vec<WalletBlock>,
    #[serde(skip)]
    fork_generation: u64,
    #[serde(skip)]
    failures_remaining: usize,
    #[serde(skip)]
    requests: Vec<SyncRequest>,
}

#[derive(Clone)]
pub struct MockDaemon {
    chain: Arc<Mutex<MockChain>>,
    init_behaviour: InitBehaviour,
    genesis_timestamp: u64,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(Mutex::new(MockChain::default())),
            init_behaviour: InitBehaviour::Succeed,
            genesis_timestamp: crate::constants::GENESIS_BLOCK_TIMESTAMP,
        }
    }

    /// Loads a chain previously written with [`MockDaemon::save_to_file`].
    pub fn from_file(file_path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(file_path.as_ref())
            .map_err(|e| format!("Failed to read chain file: {}", e))?;

        let chain: MockChain = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse chain file: {}", e))?;

        Ok(Self {
            chain: Arc::new(Mutex::new(chain)),
            ..Self::new()
        })
    }

    pub fn save_to_file(&self, file_path: impl AsRef<Path>) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&*self.lock())
            .map_err(|e| format!("Failed to serialize chain: {}", e))?;
        std::fs::write(file_path, json).map_err(|e| format!("Failed to write chain file: {}", e))
    }

    pub fn with_init_behaviour(mut self, behaviour: InitBehaviour) -> Self {
        self.init_behaviour = behaviour;
        self
    }

    /// Block timestamps are `genesis + height * DIFFICULTY_TARGET`.
    pub fn with_genesis_timestamp(mut self, timestamp: u64) -> Self {
        self.genesis_timestamp = timestamp;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockChain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn make_block(&self, height: u64, generation: u64, transactions: Vec<RawTransaction>) -> WalletBlock {
        let mut hasher = Keccak256::new();
        hasher.update(height.to_le_bytes());
        hasher.update(generation.to_le_bytes());

        WalletBlock {
            block_height: height,
            block_hash: hasher.finalize().into(),
            block_timestamp: self.genesis_timestamp + height * crate::constants::DIFFICULTY_TARGET,
            coinbase_transaction: None,
            transactions,
        }
    }

    /// Appends a block holding `transactions`. Returns its height.
    pub fn add_block(&self, transactions: Vec<RawTransaction>) -> u64 {
        let mut chain = self.lock();
        let height = chain.blocks.len() as u64;
        let block = self.make_block(height, chain.fork_generation, transactions);
        chain.blocks.push(block);
        height
    }

    pub fn add_empty_blocks(&self, count: u64) {
        for _ in 0..count {
            self.add_block(Vec::new());
        }
    }

    /// Replaces every block from `height` upwards with empty blocks carrying
    /// new hashes, keeping the chain length.
    pub fn fork_at(&self, height: u64) {
        let mut chain = self.lock();
        chain.fork_generation += 1;
        let generation = chain.fork_generation;
        let length = chain.blocks.len() as u64;

        chain.blocks.truncate(height as usize);
        for h in height..length {
            let block = self.make_block(h, generation, Vec::new());
            chain.blocks.push(block);
        }
    }

    pub fn height(&self) -> u64 {
        self.lock().blocks.len() as u64
    }

    /// The next `count` sync requests fail with a connection error.
    pub fn fail_next_requests(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.lock().requests.clone()
    }
}

impl Default for MockDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon for MockDaemon {
    fn init(&self, callback: InitCallback) {
        match &self.init_behaviour {
            InitBehaviour::Succeed => {
                std::thread::spawn(move || callback(Ok(())));
            }
            InitBehaviour::Fail(reason) => {
                let reason = reason.clone();
                std::thread::spawn(move || callback(Err(DaemonError::Connection(reason))));
            }
            InitBehaviour::Hang => {
                // Hold the callback forever so the waiter sees no disconnect.
                std::mem::forget(callback);
            }
        }
    }

    fn get_wallet_sync_data(&self, request: &SyncRequest) -> Result<Vec<WalletBlock>, DaemonError> {
        let mut chain = self.lock();
        chain.requests.push(request.clone());

        if chain.failures_remaining > 0 {
            chain.failures_remaining -= 1;
            return Err(DaemonError::Connection("connection reset".to_string()));
        }

        let from_checkpoint = request.checkpoints.iter().find_map(|checkpoint| {
            chain
                .blocks
                .iter()
                .position(|block| &block.block_hash == checkpoint)
                .map(|position| position + 1)
        });

        let start = from_checkpoint.unwrap_or_else(|| {
            chain
                .blocks
                .iter()
                .position(|block| {
                    if request.start_height == 0 && request.start_timestamp != 0 {
                        block.block_timestamp >= request.start_timestamp
                    } else {
                        block.block_height >= request.start_height
                    }
                })
                .unwrap_or(chain.blocks.len())
        });

        Ok(chain
            .blocks
            .iter()
            .skip(start)
            .take(request.block_count)
            .cloned()
            .collect())
    }
}

/// Builds a transaction paying `amounts` to the address with the given
/// public keys, one output per amount.
pub fn build_payment<R: RngCore + CryptoRng>(
    rng: &mut R,
    public_spend_key: &PublicKey,
    public_view_key: &PublicKey,
    amounts: &[u64],
) -> Result<RawTransaction, DaemonError> {
    let (transaction_public_key, transaction_private_key) = generate_keys_from_rng(rng);

    let derivation = generate_key_derivation(public_view_key, &transaction_private_key)
        .map_err(|e| DaemonError::InvalidData(e.to_string()))?;

    let key_outputs = amounts
        .iter()
        .enumerate()
        .map(|(index, &amount)| {
            derive_public_key(&derivation, index as u64, public_spend_key)
                .map(|key| KeyOutput { key, amount })
                .map_err(|e| DaemonError::InvalidData(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut hash: Hash = [0u8; 32];
    rng.fill_bytes(&mut hash);

    Ok(RawTransaction {
        hash,
        transaction_public_key,
        key_outputs,
    })
}
