//! Public address encoding, decoding and validation.

use crate::constants::{ADDRESS_BASE58_PREFIX, STANDARD_ADDRESS_LENGTH};
use crate::keys::{public_from_private, read_varint, write_varint, PublicKey, SecretKey};
use crate::sub_wallets::SubWallets;
use crate::{Result, WalletError};

/// Renders the address for a spend/view public key pair.
pub fn address_from_keys(public_spend_key: &PublicKey, public_view_key: &PublicKey) -> Result<String> {
    let mut data = Vec::with_capacity(4 + 64);
    write_varint(&mut data, ADDRESS_BASE58_PREFIX);
    data.extend_from_slice(&public_spend_key.0);
    data.extend_from_slice(&public_view_key.0);

    base58_monero::encode_check(&data)
        .map_err(|e| WalletError::Serialization(format!("Failed to encode address: {}", e)))
}

pub fn address_from_private_keys(
    private_spend_key: &SecretKey,
    private_view_key: &SecretKey,
) -> Result<String> {
    let public_spend_key = public_from_private(private_spend_key)?;
    let public_view_key = public_from_private(private_view_key)?;
    address_from_keys(&public_spend_key, &public_view_key)
}

/// Splits a standard address into its (spend, view) public keys.
pub fn keys_from_address(address: &str) -> Result<(PublicKey, PublicKey)> {
    if address.len() != STANDARD_ADDRESS_LENGTH {
        return Err(WalletError::AddressWrongLength);
    }

    let data = base58_monero::decode_check(address).map_err(|_| WalletError::AddressNotBase58)?;

    let (prefix, consumed) = read_varint(&data).ok_or(WalletError::AddressWrongPrefix)?;
    if prefix != ADDRESS_BASE58_PREFIX {
        return Err(WalletError::AddressWrongPrefix);
    }

    let keys = &data[consumed..];
    if keys.len() != 64 {
        return Err(WalletError::AddressWrongLength);
    }

    let mut spend = [0u8; 32];
    let mut view = [0u8; 32];
    spend.copy_from_slice(&keys[..32]);
    view.copy_from_slice(&keys[32..]);

    Ok((PublicKey(spend), PublicKey(view)))
}

/// Checks every address is well formed.
pub fn validate_addresses<S: AsRef<str>>(addresses: &[S]) -> Result<()> {
    for address in addresses {
        keys_from_address(address.as_ref())?;
    }
    Ok(())
}

/// Checks every address is well formed and belongs to one of our sub wallets.
pub fn validate_our_addresses<S: AsRef<str>>(addresses: &[S], sub_wallets: &SubWallets) -> Result<()> {
    for address in addresses {
        let (spend_key, _) = keys_from_address(address.as_ref())?;

        if !sub_wallets.contains(&spend_key) {
            return Err(WalletError::AddressNotInWallet);
        }
    }
    Ok(())
}

/// Maps addresses to the public spend keys they carry. Addresses must have
/// been validated first; invalid ones are skipped.
pub fn addresses_to_spend_keys<S: AsRef<str>>(addresses: &[S]) -> Vec<PublicKey> {
    addresses
        .iter()
        .filter_map(|address| keys_from_address(address.as_ref()).ok())
        .map(|(spend, _)| spend)
        .collect()
}
