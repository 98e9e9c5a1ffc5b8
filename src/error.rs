//! Error types shared across the wallet backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("a file already exists at the wallet path")]
    WalletFileAlreadyExists,

    #[error("the wallet filename cannot be opened for writing")]
    InvalidWalletFilename,

    #[error("the wallet file does not exist")]
    FilenameNonExistent,

    #[error("the file is not a wallet file")]
    NotAWalletFile,

    #[error("the wallet file is corrupted")]
    WalletFileCorrupted,

    #[error("incorrect password for this wallet")]
    WrongPassword,

    #[error("the mnemonic seed is invalid")]
    InvalidMnemonic,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("address has the wrong length")]
    AddressWrongLength,

    #[error("address is not valid base58")]
    AddressNotBase58,

    #[error("address has the wrong prefix")]
    AddressWrongPrefix,

    #[error("address does not belong to this wallet")]
    AddressNotInWallet,

    #[error("operation requires a private spend key, which view wallets do not hold")]
    IllegalViewWalletOperation,

    #[error("failed to initialize the daemon connection")]
    FailedToInitDaemon,

    #[error("timed out waiting for the daemon handshake")]
    DaemonHandshakeTimeout,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`crate::daemon::Daemon`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DaemonError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, WalletError>;
