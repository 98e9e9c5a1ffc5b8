//! The wallet aggregate: owns the key material, the encrypted file, the
//! daemon handle and the synchronizer, and sequences their lifecycles.

use crate::address::{
    address_from_keys, address_from_private_keys, addresses_to_spend_keys, keys_from_address,
    validate_our_addresses,
};
use crate::config::WalletConfig;
use crate::constants::WALLET_FILE_FORMAT_VERSION;
use crate::crypto::{open_container, seal_container};
use crate::daemon::{handshake, Daemon};
use crate::events::{EventHandler, WalletEvent};
use crate::keys::{
    check_signature, derive_view_from_spend, generate_keys, generate_signature, public_from_private,
    PublicKey, SecretKey, Signature,
};
use crate::mnemonic::{mnemonic_to_private_key, private_key_to_mnemonic};
use crate::sub_wallets::SubWallets;
use crate::synchronizer::{SyncStatus, WalletSynchronizer};
use crate::time::TimeProvider;
use crate::types::Transaction;
use crate::{Result, WalletError};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tempfile::NamedTempFile;
use tokio::runtime::{self, Runtime};
use tokio::sync::broadcast;
use tracing::dispatcher;
use zeroize::Zeroizing;

pub struct WalletBackend {
    filename: PathBuf,
    password: Zeroizing<String>,
    private_view_key: SecretKey,
    is_view_wallet: bool,

    daemon: Option<Arc<dyn Daemon>>,
    sub_wallets: Arc<RwLock<SubWallets>>,
    synchronizer: Option<WalletSynchronizer>,
    events: EventHandler,

    /// Set once `init()` has succeeded; an initialized wallet saves itself
    /// when closed or dropped.
    initialized: bool,
    config: WalletConfig,
    /// Drives the synchronizer and times the handshake. Declared last so it
    /// outlives the synchronizer on drop.
    runtime: Runtime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletFileRef<'a> {
    wallet_file_format_version: u32,
    private_view_key: &'a SecretKey,
    is_view_wallet: bool,
    sub_wallets: &'a SubWallets,
    wallet_synchronizer: Option<&'a WalletSynchronizer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletFile {
    wallet_file_format_version: u32,
    private_view_key: SecretKey,
    is_view_wallet: bool,
    sub_wallets: SubWallets,
    #[serde(default)]
    wallet_synchronizer: Option<WalletSynchronizer>,
}

impl WalletBackend {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Creates a wallet with fresh keys. It scans from the current time.
    pub fn create_wallet(
        filename: impl AsRef<Path>,
        password: &str,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
    ) -> Result<Self> {
        Self::construct(filename.as_ref(), password, daemon, config, |time| {
            let (public_spend_key, private_spend_key) = generate_keys();
            let (private_view_key, public_view_key) = derive_view_from_spend(&private_spend_key)?;
            let address = address_from_keys(&public_spend_key, &public_view_key)?;

            let sub_wallets = SubWallets::new(private_spend_key, address, 0, true, time)?;
            Ok((private_view_key, sub_wallets))
        })
    }

    pub fn import_wallet_from_seed(
        mnemonic_seed: &str,
        filename: impl AsRef<Path>,
        password: &str,
        scan_height: u64,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
    ) -> Result<Self> {
        Self::construct(filename.as_ref(), password, daemon, config, |time| {
            let private_spend_key = mnemonic_to_private_key(mnemonic_seed)?;
            let (private_view_key, public_view_key) = derive_view_from_spend(&private_spend_key)?;
            let public_spend_key = public_from_private(&private_spend_key)?;
            let address = address_from_keys(&public_spend_key, &public_view_key)?;

            let sub_wallets = SubWallets::new(private_spend_key, address, scan_height, false, time)?;
            Ok((private_view_key, sub_wallets))
        })
    }

    pub fn import_wallet_from_keys(
        private_spend_key: SecretKey,
        private_view_key: SecretKey,
        filename: impl AsRef<Path>,
        password: &str,
        scan_height: u64,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
    ) -> Result<Self> {
        Self::construct(filename.as_ref(), password, daemon, config, |time| {
            let address = address_from_private_keys(&private_spend_key, &private_view_key)?;

            let sub_wallets = SubWallets::new(private_spend_key, address, scan_height, false, time)?;
            Ok((private_view_key, sub_wallets))
        })
    }

    /// Imports a watch-only wallet.
    ///
    /// The address is only parsed for its public spend key. Its view key is
    /// not compared with `private_view_key`, so a mismatched pair produces a
    /// wallet that scans with one key while reporting the other's address.
    pub fn import_view_wallet(
        private_view_key: SecretKey,
        address: &str,
        filename: impl AsRef<Path>,
        password: &str,
        scan_height: u64,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
    ) -> Result<Self> {
        Self::construct(filename.as_ref(), password, daemon, config, |time| {
            public_from_private(&private_view_key)?;
            let (public_spend_key, _) = keys_from_address(address)?;

            let sub_wallets =
                SubWallets::new_view_wallet(public_spend_key, address.to_string(), scan_height, false, time);
            Ok((private_view_key, sub_wallets))
        })
    }

    /// The shared creation protocol: claim the filename, build the keys and
    /// sub wallets, connect, then write the first save. The claimed file is
    /// released again if any later step fails.
    fn construct(
        filename: &Path,
        password: &str,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
        build: impl FnOnce(&dyn TimeProvider) -> Result<(SecretKey, SubWallets)>,
    ) -> Result<Self> {
        let dispatch = config.dispatch.clone();

        dispatcher::with_default(&dispatch, || {
            claim_new_wallet_file(filename)?;

            let (private_view_key, sub_wallets) = match build(config.time.as_ref()) {
                Ok(parts) => parts,
                Err(e) => {
                    release_wallet_file(filename);
                    return Err(e);
                }
            };

            let mut wallet = match Self::from_parts(
                filename.to_path_buf(),
                password,
                private_view_key,
                sub_wallets,
                None,
                config,
            ) {
                Ok(wallet) => wallet,
                Err(e) => {
                    release_wallet_file(filename);
                    return Err(e);
                }
            };
            wallet.daemon = Some(daemon);

            if let Err(e) = wallet.init().and_then(|()| wallet.save()) {
                wallet.abandon();
                release_wallet_file(filename);
                return Err(e);
            }

            tracing::info!("created wallet {}", filename.display());
            Ok(wallet)
        })
    }

    /// Opens an existing wallet file and starts syncing from where it left off.
    pub fn open_wallet(
        filename: impl AsRef<Path>,
        password: &str,
        daemon: Arc<dyn Daemon>,
        config: WalletConfig,
    ) -> Result<Self> {
        let filename = filename.as_ref();
        let dispatch = config.dispatch.clone();

        dispatcher::with_default(&dispatch, || {
            let contents = fs::read(filename).map_err(|_| WalletError::FilenameNonExistent)?;
            let json = open_container(&contents, password)?;

            let file: WalletFile = serde_json::from_slice(&json).map_err(|e| {
                tracing::warn!("wallet json is invalid: {}", e);
                WalletError::WalletFileCorrupted
            })?;

            if file.wallet_file_format_version > WALLET_FILE_FORMAT_VERSION {
                tracing::warn!(
                    "unsupported wallet file format version {}",
                    file.wallet_file_format_version
                );
                return Err(WalletError::WalletFileCorrupted);
            }

            if file.is_view_wallet != file.sub_wallets.is_view_wallet() {
                return Err(WalletError::WalletFileCorrupted);
            }

            if let Some(synchronizer) = &file.wallet_synchronizer {
                if synchronizer.private_view_key() != &file.private_view_key {
                    return Err(WalletError::WalletFileCorrupted);
                }
            }

            let mut wallet = Self::from_parts(
                filename.to_path_buf(),
                password,
                file.private_view_key,
                file.sub_wallets,
                file.wallet_synchronizer,
                config,
            )?;
            wallet.initialize_after_load(daemon);

            if let Err(e) = wallet.init() {
                wallet.abandon();
                return Err(e);
            }

            tracing::info!("opened wallet {}", filename.display());
            Ok(wallet)
        })
    }

    fn from_parts(
        filename: PathBuf,
        password: &str,
        private_view_key: SecretKey,
        sub_wallets: SubWallets,
        synchronizer: Option<WalletSynchronizer>,
        config: WalletConfig,
    ) -> Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wallet-sync")
            .enable_all()
            .build()?;

        Ok(Self {
            filename,
            password: Zeroizing::new(password.to_string()),
            private_view_key,
            is_view_wallet: sub_wallets.is_view_wallet(),
            daemon: None,
            sub_wallets: Arc::new(RwLock::new(sub_wallets)),
            synchronizer,
            events: EventHandler::new(config.event_capacity),
            initialized: false,
            config,
            runtime,
        })
    }

    /// Attaches what a wallet read from disk lacks: the daemon and a fresh
    /// event channel.
    fn initialize_after_load(&mut self, daemon: Arc<dyn Daemon>) {
        self.daemon = Some(daemon);
        self.events = EventHandler::new(self.config.event_capacity);
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Connects to the daemon and starts the synchronizer.
    ///
    /// The synchronizer is wired up and started even when the handshake
    /// fails; the handshake outcome is what gets returned.
    ///
    /// # Panics
    ///
    /// If no daemon has been attached.
    pub fn init(&mut self) -> Result<()> {
        let Some(daemon) = self.daemon.clone() else {
            panic!("WalletBackend::init called without a daemon");
        };

        let dispatch = self.config.dispatch.clone();
        dispatcher::with_default(&dispatch, || {
            let connected = handshake(daemon.as_ref(), self.config.handshake, self.runtime.handle());

            match self.synchronizer.as_mut() {
                Some(synchronizer) => synchronizer.initialize_after_load(Arc::clone(&daemon), self.events.clone()),
                None => {
                    let (start_height, start_timestamp) = self.read_sub_wallets().get_min_initial_sync_start();
                    self.synchronizer = Some(WalletSynchronizer::new(
                        Arc::clone(&daemon),
                        start_height,
                        start_timestamp,
                        self.private_view_key.clone(),
                        self.events.clone(),
                    ));
                }
            }

            if let Some(synchronizer) = self.synchronizer.as_mut() {
                synchronizer.set_sub_wallets(Arc::clone(&self.sub_wallets));
                synchronizer.start(self.runtime.handle(), &self.config);
            }

            connected?;
            self.initialized = true;
            Ok(())
        })
    }

    /// Encrypts the current state and atomically replaces the wallet file.
    pub fn save(&self) -> Result<()> {
        dispatcher::with_default(&self.config.dispatch, || {
            let json = {
                let sub_wallets = self.read_sub_wallets();
                let file = WalletFileRef {
                    wallet_file_format_version: WALLET_FILE_FORMAT_VERSION,
                    private_view_key: &self.private_view_key,
                    is_view_wallet: self.is_view_wallet,
                    sub_wallets: &sub_wallets,
                    wallet_synchronizer: self.synchronizer.as_ref(),
                };
                Zeroizing::new(serde_json::to_vec(&file).map_err(|e| WalletError::Serialization(e.to_string()))?)
            };

            let contents = seal_container(&json, &self.password)?;
            write_wallet_file(&self.filename, &contents)?;

            tracing::debug!("saved wallet to {}", self.filename.display());
            Ok(())
        })
    }

    /// Stops syncing and, if the wallet was initialized, saves it.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(synchronizer) = self.synchronizer.as_mut() {
            synchronizer.stop();
        }

        if !std::mem::take(&mut self.initialized) {
            return Ok(());
        }

        self.save()
    }

    /// Tears down a half-built wallet without saving it.
    fn abandon(mut self) {
        self.initialized = false;
        if let Some(synchronizer) = self.synchronizer.as_mut() {
            synchronizer.stop();
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Balance of the sub wallet behind `address`, which must be ours.
    pub fn get_balance(&self, address: &str) -> Result<u64> {
        let sub_wallets = self.read_sub_wallets();
        validate_our_addresses(&[address], &sub_wallets)?;

        let spend_keys = addresses_to_spend_keys(&[address]);
        Ok(sub_wallets.get_balance(&spend_keys, false))
    }

    pub fn get_total_balance(&self) -> u64 {
        self.read_sub_wallets().get_balance(&[], true)
    }

    pub fn primary_address(&self) -> String {
        self.read_sub_wallets()
            .primary_address()
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.read_sub_wallets().addresses()
    }

    pub fn is_view_wallet(&self) -> bool {
        self.is_view_wallet
    }

    pub fn private_view_key(&self) -> &SecretKey {
        &self.private_view_key
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The public and private spend key of one of our addresses.
    pub fn get_spend_keys(&self, address: &str) -> Result<(PublicKey, SecretKey)> {
        if self.is_view_wallet {
            return Err(WalletError::IllegalViewWalletOperation);
        }

        let sub_wallets = self.read_sub_wallets();
        validate_our_addresses(&[address], &sub_wallets)?;

        let (public_spend_key, _) = keys_from_address(address)?;
        let private_spend_key = sub_wallets.private_spend_key(&public_spend_key)?.clone();

        Ok((public_spend_key, private_spend_key))
    }

    /// Mnemonic of the primary address.
    pub fn get_mnemonic_seed(&self) -> Result<Zeroizing<String>> {
        if self.is_view_wallet {
            return Err(WalletError::IllegalViewWalletOperation);
        }

        let sub_wallets = self.read_sub_wallets();
        let primary = sub_wallets.primary().ok_or(WalletError::AddressNotInWallet)?;
        let private_spend_key = sub_wallets.private_spend_key(&primary.public_spend_key)?;

        private_key_to_mnemonic(private_spend_key)
    }

    /// Signs `message` with the spend key of one of our addresses. Returns
    /// the signature as hex.
    pub fn sign_message(&self, address: &str, message: &str) -> Result<String> {
        let (public_spend_key, private_spend_key) = self.get_spend_keys(address)?;
        let prefix_hash: [u8; 32] = Keccak256::digest(message.as_bytes()).into();

        let signature = generate_signature(&prefix_hash, &public_spend_key, &private_spend_key)?;
        Ok(signature.to_hex())
    }

    /// Checks a signature made by [`WalletBackend::sign_message`]. The address
    /// does not need to belong to this wallet.
    pub fn verify_message(&self, address: &str, message: &str, signature: &str) -> Result<bool> {
        let (public_spend_key, _) = keys_from_address(address)?;
        let Some(signature) = Signature::from_hex(signature) else {
            return Ok(false);
        };

        let prefix_hash: [u8; 32] = Keccak256::digest(message.as_bytes()).into();
        Ok(check_signature(&prefix_hash, &public_spend_key, &signature))
    }

    pub fn sync_status(&self) -> SyncStatus {
        match &self.synchronizer {
            Some(synchronizer) => synchronizer.sync_status(),
            None => {
                let (start_height, start_timestamp) = self.read_sub_wallets().get_min_initial_sync_start();
                SyncStatus {
                    wallet_block_count: 0,
                    start_height,
                    start_timestamp,
                }
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.read_sub_wallets().transactions().to_vec()
    }

    fn read_sub_wallets(&self) -> RwLockReadGuard<'_, SubWallets> {
        self.sub_wallets.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WalletBackend {
    fn drop(&mut self) {
        let dispatch = self.config.dispatch.clone();
        dispatcher::with_default(&dispatch, || {
            if let Err(e) = self.shutdown() {
                tracing::error!("failed to save wallet on drop: {}", e);
            }
        });
    }
}

/// Claims `filename` for a new wallet. Never touches an existing file.
fn claim_new_wallet_file(filename: &Path) -> Result<()> {
    if filename.exists() {
        return Err(WalletError::WalletFileAlreadyExists);
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(filename)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => WalletError::WalletFileAlreadyExists,
            _ => WalletError::InvalidWalletFilename,
        })?;

    Ok(())
}

fn release_wallet_file(filename: &Path) {
    if let Err(e) = fs::remove_file(filename) {
        tracing::warn!("failed to remove {}: {}", filename.display(), e);
    }
}

/// Writes through a uniquely named temporary file in the same directory and
/// renames it over the target, so a crash mid-write leaves the previous save
/// intact. The temporary file is created owner-only and removed on failure.
fn write_wallet_file(filename: &Path, contents: &[u8]) -> Result<()> {
    let dir = match filename.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|_| WalletError::InvalidWalletFilename)?;

    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(filename).map_err(|e| WalletError::Io(e.error))?;
    Ok(())
}
