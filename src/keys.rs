//! Key primitives: secret/public keys, view-from-spend derivation, the
//! output key derivations used when scanning, and message signatures.

use crate::{Result, WalletError};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
};
use rand_core::{CryptoRng, OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// A private key. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Zeroizing<[u8; 32]>);

/// A compressed curve point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(pub [u8; 32]);

/// Shared secret between a transaction public key and a view key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivation(pub [u8; 32]);

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(*self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = Zeroizing::new(hex::decode(s).map_err(|_| WalletError::InvalidSecretKey)?);
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::InvalidSecretKey)?;
        Ok(Self::from_bytes(array))
    }

    /// The key as a scalar, rejecting zero and non-reduced encodings.
    fn to_scalar(&self) -> Result<Zeroizing<Scalar>> {
        let scalar: Option<Scalar> = Scalar::from_canonical_bytes(*self.0).into();
        match scalar {
            Some(s) if s != Scalar::ZERO => Ok(Zeroizing::new(s)),
            _ => Err(WalletError::InvalidSecretKey),
        }
    }

    fn from_scalar(scalar: &Scalar) -> Self {
        Self::from_bytes(scalar.to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn decompress(&self) -> Result<EdwardsPoint> {
        CompressedEdwardsY(self.0)
            .decompress()
            .ok_or(WalletError::InvalidPublicKey)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| WalletError::InvalidPublicKey)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::InvalidPublicKey)?;
        Ok(Self(array))
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        SecretKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 64] = bytes.as_slice().try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Keccak-256, reduced to a scalar.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let hash: [u8; 32] = Keccak256::digest(data).into();
    Scalar::from_bytes_mod_order(hash)
}

pub fn public_from_private(secret_key: &SecretKey) -> Result<PublicKey> {
    let scalar = secret_key.to_scalar()?;
    let point: EdwardsPoint = &*scalar * ED25519_BASEPOINT_TABLE;
    Ok(PublicKey(point.compress().to_bytes()))
}

/// Generates a fresh key pair from the OS RNG.
pub fn generate_keys() -> (PublicKey, SecretKey) {
    generate_keys_from_rng(&mut OsRng)
}

pub fn generate_keys_from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> (PublicKey, SecretKey) {
    loop {
        let mut bytes = Zeroizing::new([0u8; 64]);
        rng.fill_bytes(&mut *bytes);
        let scalar = Zeroizing::new(Scalar::from_bytes_mod_order_wide(&bytes));

        if *scalar == Scalar::ZERO {
            continue;
        }

        let point: EdwardsPoint = &*scalar * ED25519_BASEPOINT_TABLE;
        return (
            PublicKey(point.compress().to_bytes()),
            SecretKey::from_scalar(&scalar),
        );
    }
}

/// Derives the view key pair from a spend key, so only the spend key needs
/// backing up.
pub fn derive_view_from_spend(private_spend_key: &SecretKey) -> Result<(SecretKey, PublicKey)> {
    private_spend_key.to_scalar()?;

    let view_scalar = Zeroizing::new(hash_to_scalar(private_spend_key.as_bytes()));
    let private_view_key = SecretKey::from_scalar(&view_scalar);
    let public_view_key = public_from_private(&private_view_key)?;

    Ok((private_view_key, public_view_key))
}

/// `8 * a * R` for view secret `a` and transaction public key `R`.
pub fn generate_key_derivation(
    transaction_public_key: &PublicKey,
    private_view_key: &SecretKey,
) -> Result<KeyDerivation> {
    let point = transaction_public_key.decompress()?;
    let scalar = private_view_key.to_scalar()?;
    let shared = (&*scalar * point).mul_by_cofactor();
    Ok(KeyDerivation(shared.compress().to_bytes()))
}

fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u64) -> Scalar {
    let mut data = Vec::with_capacity(32 + 10);
    data.extend_from_slice(&derivation.0);
    write_varint(&mut data, output_index);
    hash_to_scalar(&data)
}

/// One-time output key `Hs(D || i) * G + B` for a recipient spend key `B`.
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: u64,
    public_spend_key: &PublicKey,
) -> Result<PublicKey> {
    let base = public_spend_key.decompress()?;
    let offset = derivation_to_scalar(derivation, output_index);
    let point = &offset * ED25519_BASEPOINT_TABLE + base;
    Ok(PublicKey(point.compress().to_bytes()))
}

/// Inverse of [`derive_public_key`]: recovers the spend key an output was
/// sent to. The result only means something if it matches one of our keys.
pub fn underive_public_key(
    derivation: &KeyDerivation,
    output_index: u64,
    output_key: &PublicKey,
) -> Result<PublicKey> {
    let point = output_key.decompress()?;
    let offset = derivation_to_scalar(derivation, output_index);
    let spend = point - &offset * ED25519_BASEPOINT_TABLE;
    Ok(PublicKey(spend.compress().to_bytes()))
}

fn signature_challenge(prefix_hash: &[u8; 32], public_key: &PublicKey, commitment: &EdwardsPoint) -> Scalar {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(prefix_hash);
    data.extend_from_slice(&public_key.0);
    data.extend_from_slice(&commitment.compress().to_bytes());
    hash_to_scalar(&data)
}

/// Schnorr signature `(c, r)` over a 32 byte hash.
pub fn generate_signature(
    prefix_hash: &[u8; 32],
    public_key: &PublicKey,
    secret_key: &SecretKey,
) -> Result<Signature> {
    let secret = secret_key.to_scalar()?;

    let mut nonce_bytes = Zeroizing::new([0u8; 64]);
    OsRng.fill_bytes(&mut *nonce_bytes);
    let nonce = Zeroizing::new(Scalar::from_bytes_mod_order_wide(&nonce_bytes));

    let commitment: EdwardsPoint = &*nonce * ED25519_BASEPOINT_TABLE;
    let c = signature_challenge(prefix_hash, public_key, &commitment);
    let r = *nonce - c * *secret;

    let mut signature = [0u8; 64];
    signature[..32].copy_from_slice(&c.to_bytes());
    signature[32..].copy_from_slice(&r.to_bytes());
    Ok(Signature(signature))
}

pub fn check_signature(prefix_hash: &[u8; 32], public_key: &PublicKey, signature: &Signature) -> bool {
    let Ok(point) = public_key.decompress() else {
        return false;
    };

    let mut c_bytes = [0u8; 32];
    let mut r_bytes = [0u8; 32];
    c_bytes.copy_from_slice(&signature.0[..32]);
    r_bytes.copy_from_slice(&signature.0[32..]);

    let c: Option<Scalar> = Scalar::from_canonical_bytes(c_bytes).into();
    let r: Option<Scalar> = Scalar::from_canonical_bytes(r_bytes).into();
    let (Some(c), Some(r)) = (c, r) else {
        return false;
    };

    let commitment = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
    signature_challenge(prefix_hash, public_key, &commitment) == c
}

/// LEB128 varint as used in CryptoNote serialization.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Returns the value and the number of bytes consumed.
pub fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in data.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
