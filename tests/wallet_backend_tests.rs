
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{genesis_config, test_config, wait_for, wait_for_height, TestEnv};
use wallet_backend::mock_daemon::{InitBehaviour, MockDaemon};
use wallet_backend::{SecretKey, WalletBackend, WalletError, WalletEvent};

#[test]
fn test_create_reopen_wrong_password() {
    let env = TestEnv::new(1);
    let path = env.path("w.wallet");

    let wallet = WalletBackend::create_wallet(&path, "pw1", env.daemon(), test_config()).unwrap();
    let address = wallet.primary_address();
    assert!(address.starts_with("TRTL"));
    assert_eq!(address.len(), 99);
    wallet.close().unwrap();

    assert!(fs::metadata(&path).unwrap().len() > 0);

    let reopened = WalletBackend::open_wallet(&path, "pw1", env.daemon(), test_config()).unwrap();
    assert_eq!(reopened.primary_address(), address);
    reopened.close().unwrap();

    assert!(matches!(
        WalletBackend::open_wallet(&path, "pw2", env.daemon(), test_config()),
        Err(WalletError::WrongPassword)
    ));
}

#[test]
fn test_saves_leave_neighbouring_files_alone() {
    let env = TestEnv::new(17);
    let path = env.path("w.wallet");
    let neighbour = env.path("w.wallet.tmp");
    fs::write(&neighbour, b"user data").unwrap();

    let wallet = WalletBackend::create_wallet(&path, "pw", env.daemon(), test_config()).unwrap();
    wallet.save().unwrap();
    wallet.close().unwrap();

    assert_eq!(fs::read(&neighbour).unwrap(), b"user data");
    assert_eq!(fs::read_dir(env.temp_dir.path()).unwrap().count(), 2);
}

#[test]
fn test_create_refuses_existing_file() {
    let env = TestEnv::new(2);
    let path = env.path("taken.wallet");
    fs::write(&path, b"precious").unwrap();

    let result = WalletBackend::create_wallet(&path, "pw", env.daemon(), test_config());

    assert!(matches!(result, Err(WalletError::WalletFileAlreadyExists)));
    assert_eq!(fs::read(&path).unwrap(), b"precious");
}

#[test]
fn test_create_unwritable_path() {
    let env = TestEnv::new(3);
    let path = env.path("missing/dir/w.wallet");

    assert!(matches!(
        WalletBackend::create_wallet(&path, "pw", env.daemon(), test_config()),
        Err(WalletError::InvalidWalletFilename)
    ));
}

#[test]
fn test_open_errors() {
    let env = TestEnv::new(4);

    assert!(matches!(
        WalletBackend::open_wallet(env.path("nope.wallet"), "pw", env.daemon(), test_config()),
        Err(WalletError::FilenameNonExistent)
    ));

    let not_a_wallet = env.path("notes.txt");
    fs::write(&not_a_wallet, b"just some notes, definitely long enough to hold an identifier").unwrap();
    assert!(matches!(
        WalletBackend::open_wallet(&not_a_wallet, "pw", env.daemon(), test_config()),
        Err(WalletError::NotAWalletFile)
    ));
}

#[test]
fn test_open_rejects_invalid_json() {
    let env = TestEnv::new(5);
    let path = env.path("bad.wallet");
    let container = wallet_backend::crypto::seal_container(b"{\"not\": \"a wallet\"}", "pw").unwrap();
    fs::write(&path, container).unwrap();

    assert!(matches!(
        WalletBackend::open_wallet(&path, "pw", env.daemon(), test_config()),
        Err(WalletError::WalletFileCorrupted)
    ));
}

#[test]
fn test_handshake_failures() {
    let env = TestEnv::new(6);

    let refused = Arc::new(MockDaemon::new().with_init_behaviour(InitBehaviour::Fail("refused".into())));
    let path = env.path("refused.wallet");
    assert!(matches!(
        WalletBackend::create_wallet(&path, "pw", refused, test_config()),
        Err(WalletError::FailedToInitDaemon)
    ));
    assert!(!path.exists());

    let silent = Arc::new(MockDaemon::new().with_init_behaviour(InitBehaviour::Hang));
    let path = env.path("silent.wallet");
    let config = test_config().with_handshake_timeout(Duration::from_millis(100));
    assert!(matches!(
        WalletBackend::create_wallet(&path, "pw", silent, config),
        Err(WalletError::DaemonHandshakeTimeout)
    ));
    assert!(!path.exists());
}

#[test]
fn test_import_from_seed_restores_address() {
    let env = TestEnv::new(7);

    let original = WalletBackend::create_wallet(env.path("a.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let seed = original.get_mnemonic_seed().unwrap();
    assert_eq!(seed.split_whitespace().count(), 24);

    let restored =
        WalletBackend::import_wallet_from_seed(&seed, env.path("b.wallet"), "pw", 0, env.daemon(), test_config())
            .unwrap();

    assert_eq!(restored.primary_address(), original.primary_address());
    assert_eq!(restored.private_view_key(), original.private_view_key());
    assert_eq!(restored.sync_status().start_height, 0);
}

#[test]
fn test_import_from_seed_invalid() {
    let env = TestEnv::new(8);
    let path = env.path("w.wallet");

    let result =
        WalletBackend::import_wallet_from_seed("not a real seed", &path, "pw", 0, env.daemon(), test_config());

    assert!(matches!(result, Err(WalletError::InvalidMnemonic)));
    assert!(!path.exists());
}

#[test]
fn test_import_from_keys() {
    let env = TestEnv::new(9);

    let original = WalletBackend::create_wallet(env.path("a.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let address = original.primary_address();
    let (_, private_spend_key) = original.get_spend_keys(&address).unwrap();

    let imported = WalletBackend::import_wallet_from_keys(
        private_spend_key,
        original.private_view_key().clone(),
        env.path("b.wallet"),
        "pw",
        1000,
        env.daemon(),
        test_config(),
    )
    .unwrap();

    assert_eq!(imported.primary_address(), address);
    assert_eq!(imported.sync_status().start_height, 1000);
    assert_eq!(imported.sync_status().start_timestamp, 0);
}

#[test]
fn test_import_from_keys_rejects_zero_key() {
    let env = TestEnv::new(10);
    let path = env.path("w.wallet");

    let result = WalletBackend::import_wallet_from_keys(
        SecretKey::from_bytes([0u8; 32]),
        SecretKey::from_bytes([0u8; 32]),
        &path,
        "pw",
        0,
        env.daemon(),
        test_config(),
    );

    assert!(matches!(result, Err(WalletError::InvalidSecretKey)));
    assert!(!path.exists());
}

#[test]
fn test_sync_credits_payments_and_persists() {
    let mut env = TestEnv::new(11);
    let path = env.path("w.wallet");

    let wallet = WalletBackend::create_wallet(&path, "pw", env.daemon(), genesis_config()).unwrap();
    let address = wallet.primary_address();
    let mut events = wallet.subscribe();

    env.daemon.add_empty_blocks(2);
    env.pay(&address, &[1500, 500]);
    env.daemon.add_empty_blocks(2);

    wait_for(|| wallet.get_total_balance() == 2000);
    wait_for_height(&wallet, 5);

    assert_eq!(wallet.get_balance(&address).unwrap(), 2000);

    let transactions = wallet.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].block_height, 2);
    assert_eq!(transactions[0].total_amount(), 2000);

    let mut found = None;
    while let Ok(event) = events.try_recv() {
        if let WalletEvent::TransactionFound { amount, .. } = event {
            found = Some(amount);
        }
    }
    assert_eq!(found, Some(2000));

    wallet.close().unwrap();

    let reopened = WalletBackend::open_wallet(&path, "pw", env.daemon(), genesis_config()).unwrap();
    assert_eq!(reopened.get_total_balance(), 2000);
    assert!(reopened.sync_status().wallet_block_count >= 5);

    env.pay(&address, &[1]);
    wait_for(|| reopened.get_total_balance() == 2001);
}

#[test]
fn test_drop_saves_initialized_wallet() {
    let mut env = TestEnv::new(12);
    let path = env.path("w.wallet");

    {
        let wallet = WalletBackend::create_wallet(&path, "pw", env.daemon(), genesis_config()).unwrap();
        env.pay(&wallet.primary_address(), &[77]);
        wait_for(|| wallet.get_total_balance() == 77);
    }

    let reopened = WalletBackend::open_wallet(&path, "pw", env.daemon(), genesis_config()).unwrap();
    assert_eq!(reopened.get_total_balance(), 77);
}

#[test]
fn test_balance_rejects_foreign_and_malformed_addresses() {
    let env = TestEnv::new(13);

    let ours = WalletBackend::create_wallet(env.path("a.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let theirs = WalletBackend::create_wallet(env.path("b.wallet"), "pw", env.daemon(), test_config()).unwrap();

    assert_eq!(ours.get_balance(&ours.primary_address()).unwrap(), 0);
    assert!(matches!(
        ours.get_balance(&theirs.primary_address()),
        Err(WalletError::AddressNotInWallet)
    ));
    assert!(matches!(ours.get_balance("TRTLshort"), Err(WalletError::AddressWrongLength)));
}

#[test]
fn test_view_wallet_has_no_spend_key() {
    let mut env = TestEnv::new(14);

    let full = WalletBackend::create_wallet(env.path("full.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let address = full.primary_address();

    let view = WalletBackend::import_view_wallet(
        full.private_view_key().clone(),
        &address,
        env.path("view.wallet"),
        "pw",
        0,
        env.daemon(),
        test_config(),
    )
    .unwrap();

    assert!(view.is_view_wallet());
    assert_eq!(view.primary_address(), address);
    assert!(matches!(view.get_spend_keys(&address), Err(WalletError::IllegalViewWalletOperation)));
    assert!(matches!(view.get_mnemonic_seed(), Err(WalletError::IllegalViewWalletOperation)));
    assert!(matches!(
        view.sign_message(&address, "hello"),
        Err(WalletError::IllegalViewWalletOperation)
    ));

    // Watching still works.
    env.pay(&address, &[300]);
    wait_for(|| view.get_total_balance() == 300);
    view.close().unwrap();

    let reopened = WalletBackend::open_wallet(env.path("view.wallet"), "pw", env.daemon(), test_config()).unwrap();
    assert!(reopened.is_view_wallet());
    assert_eq!(reopened.get_total_balance(), 300);
}

#[test]
fn test_view_wallet_trusts_supplied_address() {
    let mut env = TestEnv::new(15);

    let a = WalletBackend::create_wallet(env.path("a.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let b = WalletBackend::create_wallet(env.path("b.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let b_address = b.primary_address();

    // A's view key with B's address is accepted without cross-checking.
    let mismatched = WalletBackend::import_view_wallet(
        a.private_view_key().clone(),
        &b_address,
        env.path("mismatched.wallet"),
        "pw",
        0,
        env.daemon(),
        test_config(),
    )
    .unwrap();

    assert_eq!(mismatched.primary_address(), b_address);

    // It reports B's address but cannot see payments to it.
    let height = env.pay(&b_address, &[999]);
    wait_for_height(&mismatched, height + 1);
    assert_eq!(mismatched.get_total_balance(), 0);

    // A malformed address is still rejected.
    assert!(matches!(
        WalletBackend::import_view_wallet(
            a.private_view_key().clone(),
            "not an address",
            env.path("bad.wallet"),
            "pw",
            0,
            env.daemon(),
            test_config(),
        ),
        Err(WalletError::AddressWrongLength)
    ));
}

#[test]
fn test_sign_and_verify_message() {
    let env = TestEnv::new(16);

    let wallet = WalletBackend::create_wallet(env.path("w.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let other = WalletBackend::create_wallet(env.path("o.wallet"), "pw", env.daemon(), test_config()).unwrap();
    let address = wallet.primary_address();

    let signature = wallet.sign_message(&address, "hello").unwrap();

    assert!(wallet.verify_message(&address, "hello", &signature).unwrap());
    assert!(!wallet.verify_message(&address, "hellO", &signature).unwrap());
    assert!(!wallet.verify_message(&other.primary_address(), "hello", &signature).unwrap());
    assert!(!wallet.verify_message(&address, "hello", "zz").unwrap());

    // Anyone can verify.
    assert!(other.verify_message(&address, "hello", &signature).unwrap());
}
