//! CryptoNote wallet backend.
//!
//! A [`WalletBackend`] owns a wallet's keys and sub wallets, keeps them in an
//! encrypted container on disk and runs a background [`WalletSynchronizer`]
//! that scans blocks from a [`Daemon`] for outputs paying the wallet.
//!
//! Each backend drives its synchronizer on a small tokio runtime of its own.
//! Its methods block, so call them from ordinary threads rather than from
//! inside an async task.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_backend::{mock_daemon::MockDaemon, WalletBackend, WalletConfig};
//!
//! let daemon = Arc::new(MockDaemon::new());
//! let wallet = WalletBackend::create_wallet("my.wallet", "hunter2", daemon, WalletConfig::default())?;
//! println!("{}: {}", wallet.primary_address(), wallet.get_total_balance());
//! wallet.close()?;
//! # Ok::<(), wallet_backend::WalletError>(())
//! ```

pub mod address;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod daemon;
pub mod error;
pub mod events;
pub mod keys;
pub mod mnemonic;
pub mod mock_daemon;
pub mod sub_wallets;
pub mod synchronizer;
pub mod time;
pub mod types;
pub mod wallet_backend;

pub use config::{RetryPolicy, WalletConfig};
pub use daemon::{Daemon, HandshakeWait, SyncRequest};
pub use error::{DaemonError, Result, WalletError};
pub use events::WalletEvent;
pub use keys::{PublicKey, SecretKey};
pub use synchronizer::{SyncStatus, WalletSynchronizer};
pub use wallet_backend::WalletBackend;
