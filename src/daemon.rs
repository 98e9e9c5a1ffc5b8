//! The daemon collaborator contract and the blocking handshake bridge.

use crate::error::DaemonError;
use crate::types::{Hash, WalletBlock};
use crate::{Result, WalletError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Invoked exactly once with the outcome of the connection attempt.
pub type InitCallback = Box<dyn FnOnce(std::result::Result<(), DaemonError>) + Send + 'static>;

/// What the synchronizer asks the daemon for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Recent block hashes we already have, newest first. The daemon answers
    /// from just after the newest one it recognises.
    pub checkpoints: Vec<Hash>,
    pub start_height: u64,
    pub start_timestamp: u64,
    pub block_count: usize,
}

/// A connection to a remote node.
pub trait Daemon: Send + Sync {
    /// Starts connecting. Must not block; reports through `callback`.
    fn init(&self, callback: InitCallback);

    fn get_wallet_sync_data(&self, request: &SyncRequest) -> std::result::Result<Vec<WalletBlock>, DaemonError>;
}

/// How long `init()` is willing to wait for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeWait {
    /// Wait as long as the daemon takes. Hangs if it never answers.
    Unbounded,
    Timeout(Duration),
}

impl HandshakeWait {
    fn wait(&self, rx: oneshot::Receiver<std::result::Result<(), DaemonError>>, runtime: &Handle) -> Result<()> {
        let received = match *self {
            HandshakeWait::Unbounded => rx.blocking_recv(),
            HandshakeWait::Timeout(timeout) => runtime
                .block_on(async move { tokio::time::timeout(timeout, rx).await })
                .map_err(|_| WalletError::DaemonHandshakeTimeout)?,
        };

        // A dropped sender means the daemon discarded the callback.
        let outcome = received.map_err(|_| WalletError::FailedToInitDaemon)?;

        outcome.map_err(|e| {
            tracing::warn!("daemon handshake failed: {}", e);
            WalletError::FailedToInitDaemon
        })
    }
}

/// Issues `daemon.init` and blocks the calling thread until the callback
/// fires (or the wait gives up). Bounded waits are timed on `runtime`, so
/// this must not be called from inside it.
pub fn handshake(daemon: &dyn Daemon, wait: HandshakeWait, runtime: &Handle) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    daemon.init(Box::new(move |outcome| {
        // The waiter may have timed out and gone.
        let _ = tx.send(outcome);
    }));

    wait.wait(rx, runtime)
}
