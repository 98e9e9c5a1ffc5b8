//! Wallet container encryption and framing.
//!
//! ```text
//! [IS_A_WALLET_IDENTIFIER][salt: 16][AES-256-CBC(IS_CORRECT_PASSWORD_IDENTIFIER || json)]
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256 over the password and salt; the salt is
//! also the CBC IV. Decryption never reports a wrong password itself: a
//! wrong key yields garbage, which the second identifier check rejects.

use crate::constants::{
    IS_A_WALLET_IDENTIFIER, IS_CORRECT_PASSWORD_IDENTIFIER, KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};
use crate::{Result, WalletError};
use aes::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use sha2::Sha256;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK_SIZE: usize = 16;

/// Checks `data` starts with `magic` and returns the rest.
///
/// Used for both the file-type tag and the password tag; the caller picks
/// which error means "too short" and which means "wrong bytes".
pub fn check_magic<'a>(
    data: &'a [u8],
    magic: &[u8],
    too_small_error: WalletError,
    wrong_identifier_error: WalletError,
) -> Result<&'a [u8]> {
    if data.len() < magic.len() {
        return Err(too_small_error);
    }

    if &data[..magic.len()] != magic {
        return Err(wrong_identifier_error);
    }

    Ok(&data[magic.len()..])
}

/// Derives the AES key from a password with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &str, salt: &[u8; SALT_SIZE]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// Generates a cryptographically secure random salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    use rand_core::RngCore;
    let mut salt = [0u8; SALT_SIZE];
    rand_core::OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypts under a freshly generated salt, returned alongside the
/// ciphertext.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<([u8; SALT_SIZE], Vec<u8>)> {
    let salt = generate_salt();
    let key = derive_key(password, &salt);

    let cipher = Aes256CbcEnc::new_from_slices(&*key, &salt)
        .map_err(|e| WalletError::Serialization(format!("Failed to create cipher: {}", e)))?;

    Ok((salt, cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)))
}

/// Decrypts with the key derived from `password` and `salt`.
///
/// Invalid padding is not an error here: under a wrong key it is the
/// expected outcome, and the garbage is returned whole for the identifier
/// check to reject.
pub fn decrypt(ciphertext: &[u8], salt: &[u8; SALT_SIZE], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(WalletError::WalletFileCorrupted);
    }

    let key = derive_key(password, salt);

    let cipher = Aes256CbcDec::new_from_slices(&*key, salt)
        .map_err(|e| WalletError::Serialization(format!("Failed to create cipher: {}", e)))?;

    let mut plaintext = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| WalletError::WalletFileCorrupted)?,
    );

    let unpadded = pkcs7_unpadded_len(&plaintext);
    plaintext.truncate(unpadded);

    Ok(plaintext)
}

fn pkcs7_unpadded_len(data: &[u8]) -> usize {
    let Some(&last) = data.last() else {
        return 0;
    };

    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return data.len();
    }

    if data[data.len() - pad..].iter().all(|&b| b as usize == pad) {
        data.len() - pad
    } else {
        data.len()
    }
}

/// Frames serialized wallet state into the on-disk container.
pub fn seal_container(wallet_data: &[u8], password: &str) -> Result<Vec<u8>> {
    let mut plaintext =
        Zeroizing::new(Vec::with_capacity(IS_CORRECT_PASSWORD_IDENTIFIER.len() + wallet_data.len()));
    plaintext.extend_from_slice(&IS_CORRECT_PASSWORD_IDENTIFIER);
    plaintext.extend_from_slice(wallet_data);

    let (salt, ciphertext) = encrypt(&plaintext, password)?;

    let mut file_contents =
        Vec::with_capacity(IS_A_WALLET_IDENTIFIER.len() + SALT_SIZE + ciphertext.len());
    file_contents.extend_from_slice(&IS_A_WALLET_IDENTIFIER);
    file_contents.extend_from_slice(&salt);
    file_contents.extend_from_slice(&ciphertext);

    Ok(file_contents)
}

/// Validates, decrypts and unframes a container, returning the serialized
/// wallet state.
pub fn open_container(file_contents: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let rest = check_magic(
        file_contents,
        &IS_A_WALLET_IDENTIFIER,
        WalletError::NotAWalletFile,
        WalletError::NotAWalletFile,
    )?;

    if rest.len() < SALT_SIZE {
        return Err(WalletError::WalletFileCorrupted);
    }

    let (salt_bytes, ciphertext) = rest.split_at(SALT_SIZE);
    let salt: [u8; SALT_SIZE] = salt_bytes
        .try_into()
        .map_err(|_| WalletError::WalletFileCorrupted)?;

    let decrypted = decrypt(ciphertext, &salt, password)?;

    let wallet_data = check_magic(
        &decrypted,
        &IS_CORRECT_PASSWORD_IDENTIFIER,
        WalletError::WalletFileCorrupted,
        WalletError::WrongPassword,
    )?;

    Ok(Zeroizing::new(wallet_data.to_vec()))
}
