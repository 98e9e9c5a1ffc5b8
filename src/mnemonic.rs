//! Mnemonic seed <-> private spend key.
//!
//! A seed is the 24 word English phrase encoding the 32 bytes of a reduced
//! spend key, so decoding then re-encoding a phrase is lossless.

use crate::keys::{public_from_private, SecretKey};
use crate::{Result, WalletError};
use bip39::{Language, Mnemonic};
use curve25519_dalek::scalar::Scalar;
use zeroize::Zeroizing;

const SEED_WORD_COUNT: usize = 24;

pub fn mnemonic_to_private_key(mnemonic: &str) -> Result<SecretKey> {
    let normalized = Zeroizing::new(
        mnemonic
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );

    let parsed = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|_| WalletError::InvalidMnemonic)?;

    if parsed.word_count() != SEED_WORD_COUNT {
        return Err(WalletError::InvalidMnemonic);
    }

    let entropy = Zeroizing::new(parsed.to_entropy());
    let bytes: [u8; 32] = entropy
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::InvalidMnemonic)?;

    let scalar = Zeroizing::new(Scalar::from_bytes_mod_order(bytes));
    let key = SecretKey::from_bytes(scalar.to_bytes());

    // A phrase for the zero scalar is well formed but unusable.
    public_from_private(&key).map_err(|_| WalletError::InvalidMnemonic)?;

    Ok(key)
}

pub fn private_key_to_mnemonic(private_spend_key: &SecretKey) -> Result<Zeroizing<String>> {
    public_from_private(private_spend_key)?;

    let mnemonic = Mnemonic::from_entropy_in(Language::English, private_spend_key.as_bytes())
        .map_err(|_| WalletError::InvalidSecretKey)?;

    Ok(Zeroizing::new(mnemonic.to_string()))
}
