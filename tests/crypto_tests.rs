use wallet_backend::constants::{IS_A_WALLET_IDENTIFIER, IS_CORRECT_PASSWORD_IDENTIFIER, SALT_SIZE};
use wallet_backend::crypto::{
    check_magic, decrypt, derive_key, encrypt, generate_salt, open_container, seal_container,
};
use wallet_backend::WalletError;

#[test]
fn test_key_derivation_deterministic() {
    let salt = [42u8; SALT_SIZE];

    let key1 = derive_key("test_password_123", &salt);
    let key2 = derive_key("test_password_123", &salt);
    assert_eq!(&*key1, &*key2);

    let other_salt = derive_key("test_password_123", &[43u8; SALT_SIZE]);
    assert_ne!(&*key1, &*other_salt);

    let other_password = derive_key("test_password_124", &salt);
    assert_ne!(&*key1, &*other_password);
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let plaintext = b"{\"walletFileFormatVersion\":0}";

    let (salt, ciphertext) = encrypt(plaintext, "pw").unwrap();
    assert_eq!(ciphertext.len() % 16, 0);
    assert_ne!(&ciphertext[..], &plaintext[..]);

    let decrypted = decrypt(&ciphertext, &salt, "pw").unwrap();
    assert_eq!(&decrypted[..], &plaintext[..]);
}

#[test]
fn test_salt_fresh_per_encryption() {
    let (salt1, ciphertext1) = encrypt(b"same plaintext", "same password").unwrap();
    let (salt2, ciphertext2) = encrypt(b"same plaintext", "same password").unwrap();

    assert_ne!(salt1, salt2);
    assert_ne!(ciphertext1, ciphertext2);
    assert_ne!(generate_salt(), generate_salt());
}

#[test]
fn test_decrypt_wrong_password_is_not_an_error() {
    let (salt, ciphertext) = encrypt(&[7u8; 100], "right").unwrap();

    // Garbage comes back; it is up to the identifier check to notice.
    let garbage = decrypt(&ciphertext, &salt, "wrong").unwrap();
    assert_ne!(&garbage[..], &[7u8; 100][..]);
}

#[test]
fn test_container_roundtrip() {
    let json = br#"{"hello":"world"}"#;
    let container = seal_container(json, "pw1").unwrap();

    assert!(container.starts_with(&IS_A_WALLET_IDENTIFIER));

    let opened = open_container(&container, "pw1").unwrap();
    assert_eq!(&opened[..], &json[..]);
}

#[test]
fn test_container_wrong_password() {
    let container = seal_container(br#"{"hello":"world"}"#, "pw1").unwrap();

    assert!(matches!(
        open_container(&container, "pw2"),
        Err(WalletError::WrongPassword)
    ));
}

#[test]
fn test_container_not_a_wallet() {
    assert!(matches!(
        open_container(b"short", "pw"),
        Err(WalletError::NotAWalletFile)
    ));

    let mut container = seal_container(b"{}", "pw").unwrap();
    container[0] ^= 0xff;
    assert!(matches!(
        open_container(&container, "pw"),
        Err(WalletError::NotAWalletFile)
    ));
}

#[test]
fn test_container_truncated() {
    let container = seal_container(b"{}", "pw").unwrap();

    // Identifier plus half a salt.
    let truncated = &container[..IS_A_WALLET_IDENTIFIER.len() + SALT_SIZE / 2];
    assert!(matches!(
        open_container(truncated, "pw"),
        Err(WalletError::WalletFileCorrupted)
    ));

    // Identifier and salt, ciphertext cut mid-block.
    let cut = &container[..container.len() - 3];
    assert!(matches!(
        open_container(cut, "pw"),
        Err(WalletError::WalletFileCorrupted)
    ));
}

#[test]
fn test_check_magic_errors_are_caller_chosen() {
    let data = [IS_CORRECT_PASSWORD_IDENTIFIER.as_slice(), b"payload"].concat();

    let rest = check_magic(
        &data,
        &IS_CORRECT_PASSWORD_IDENTIFIER,
        WalletError::WalletFileCorrupted,
        WalletError::WrongPassword,
    )
    .unwrap();
    assert_eq!(rest, b"payload");

    assert!(matches!(
        check_magic(
            &data[..5],
            &IS_CORRECT_PASSWORD_IDENTIFIER,
            WalletError::WalletFileCorrupted,
            WalletError::WrongPassword
        ),
        Err(WalletError::WalletFileCorrupted)
    ));

    assert!(matches!(
        check_magic(
            b"You're a small guy.\n",
            &IS_CORRECT_PASSWORD_IDENTIFIER,
            WalletError::WalletFileCorrupted,
            WalletError::WrongPassword
        ),
        Err(WalletError::WrongPassword)
    ));
}
