//! Sub wallets: the spend-key addressed accounts in one container, the
//! outputs they own and the transactions that touched them.

use crate::keys::{public_from_private, PublicKey, SecretKey};
use crate::time::{current_timestamp_adjusted, scan_height_to_timestamp, TimeProvider};
use crate::types::{Transaction, TransactionInput};
use crate::{Result, WalletError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWallet {
    pub public_spend_key: PublicKey,
    /// None for view wallets
    pub private_spend_key: Option<SecretKey>,
    pub address: String,
    pub sync_start_height: u64,
    pub sync_start_timestamp: u64,
    pub is_primary_address: bool,
    pub unspent_inputs: Vec<TransactionInput>,
}

impl SubWallet {
    /// Exactly one of height/timestamp is set: new wallets start from the
    /// adjusted creation time, imported ones from the given height.
    fn new(
        public_spend_key: PublicKey,
        private_spend_key: Option<SecretKey>,
        address: String,
        scan_height: u64,
        new_wallet: bool,
        time: &dyn TimeProvider,
    ) -> Self {
        let (sync_start_height, sync_start_timestamp) = if new_wallet {
            (0, current_timestamp_adjusted(time))
        } else {
            (scan_height, 0)
        };

        Self {
            public_spend_key,
            private_spend_key,
            address,
            sync_start_height,
            sync_start_timestamp,
            is_primary_address: true,
            unspent_inputs: Vec::new(),
        }
    }

    /// Saturates at `u64::MAX`.
    pub fn balance(&self) -> u64 {
        self.unspent_inputs
            .iter()
            .fold(0u64, |total, input| total.saturating_add(input.amount))
    }
}

#[derive(Debug, Clone)]
pub struct SubWallets {
    /// Insertion order, primary first.
    public_spend_keys: Vec<PublicKey>,
    sub_wallets: BTreeMap<PublicKey, SubWallet>,
    transactions: Vec<Transaction>,
    is_view_wallet: bool,
}

impl SubWallets {
    pub fn new(
        private_spend_key: SecretKey,
        address: String,
        scan_height: u64,
        new_wallet: bool,
        time: &dyn TimeProvider,
    ) -> Result<Self> {
        let public_spend_key = public_from_private(&private_spend_key)?;
        let sub_wallet = SubWallet::new(
            public_spend_key,
            Some(private_spend_key),
            address,
            scan_height,
            new_wallet,
            time,
        );
        Ok(Self::from_primary(sub_wallet, false))
    }

    /// A watch-only container: the spend key is known only by its public half.
    pub fn new_view_wallet(
        public_spend_key: PublicKey,
        address: String,
        scan_height: u64,
        new_wallet: bool,
        time: &dyn TimeProvider,
    ) -> Self {
        let sub_wallet = SubWallet::new(public_spend_key, None, address, scan_height, new_wallet, time);
        Self::from_primary(sub_wallet, true)
    }

    fn from_primary(sub_wallet: SubWallet, is_view_wallet: bool) -> Self {
        let key = sub_wallet.public_spend_key;
        let mut sub_wallets = BTreeMap::new();
        sub_wallets.insert(key, sub_wallet);

        Self {
            public_spend_keys: vec![key],
            sub_wallets,
            transactions: Vec::new(),
            is_view_wallet,
        }
    }

    pub fn is_view_wallet(&self) -> bool {
        self.is_view_wallet
    }

    pub fn contains(&self, public_spend_key: &PublicKey) -> bool {
        self.sub_wallets.contains_key(public_spend_key)
    }

    pub fn primary(&self) -> Option<&SubWallet> {
        self.sub_wallets.values().find(|w| w.is_primary_address)
    }

    pub fn primary_address(&self) -> Option<&str> {
        self.primary().map(|w| w.address.as_str())
    }

    pub fn addresses(&self) -> Vec<String> {
        self.public_spend_keys
            .iter()
            .filter_map(|key| self.sub_wallets.get(key))
            .map(|w| w.address.clone())
            .collect()
    }

    /// The private spend key for a sub wallet. View wallets never have one.
    pub fn private_spend_key(&self, public_spend_key: &PublicKey) -> Result<&SecretKey> {
        if self.is_view_wallet {
            return Err(WalletError::IllegalViewWalletOperation);
        }

        let sub_wallet = self
            .sub_wallets
            .get(public_spend_key)
            .ok_or(WalletError::AddressNotInWallet)?;

        sub_wallet
            .private_spend_key
            .as_ref()
            .ok_or(WalletError::IllegalViewWalletOperation)
    }

    /// Sums unspent inputs for the given sub wallets, or all of them when
    /// `take_from_all` is set.
    pub fn get_balance(&self, public_spend_keys: &[PublicKey], take_from_all: bool) -> u64 {
        self.sub_wallets
            .iter()
            .filter(|(key, _)| take_from_all || public_spend_keys.contains(key))
            .fold(0u64, |total, (_, w)| total.saturating_add(w.balance()))
    }

    /// Where a synchronizer for this container must start: `(height, 0)` or
    /// `(0, timestamp)`, whichever reaches further back.
    pub fn get_min_initial_sync_start(&self) -> (u64, u64) {
        let min_height = self
            .sub_wallets
            .values()
            .map(|w| w.sync_start_height)
            .min()
            .unwrap_or(0);

        let min_timestamp = self
            .sub_wallets
            .values()
            .map(|w| w.sync_start_timestamp)
            .min()
            .unwrap_or(0);

        // At least one is zero already; the caller uses the other.
        if min_height == 0 || min_timestamp == 0 {
            return (min_height, min_timestamp);
        }

        if scan_height_to_timestamp(min_height) < min_timestamp {
            (min_height, 0)
        } else {
            (0, min_timestamp)
        }
    }

    /// Credits an output to a sub wallet. Returns false if it was already known.
    pub fn store_transaction_input(&mut self, public_spend_key: &PublicKey, input: TransactionInput) -> bool {
        let Some(sub_wallet) = self.sub_wallets.get_mut(public_spend_key) else {
            return false;
        };

        let known = sub_wallet.unspent_inputs.iter().any(|existing| {
            existing.parent_transaction_hash == input.parent_transaction_hash
                && existing.transaction_index == input.transaction_index
        });

        if known {
            return false;
        }

        sub_wallet.unspent_inputs.push(input);
        true
    }

    /// Records a transaction. Returns false if it was already known.
    pub fn add_transaction(&mut self, transaction: Transaction) -> bool {
        if self.transactions.iter().any(|tx| tx.hash == transaction.hash) {
            return false;
        }

        self.transactions.push(transaction);
        true
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Drops everything at or above `fork_height`. Returns the number of
    /// inputs removed.
    pub fn remove_forked_data(&mut self, fork_height: u64) -> usize {
        let mut removed = 0;

        for sub_wallet in self.sub_wallets.values_mut() {
            let before = sub_wallet.unspent_inputs.len();
            sub_wallet.unspent_inputs.retain(|input| input.block_height < fork_height);
            removed += before - sub_wallet.unspent_inputs.len();
        }

        self.transactions.retain(|tx| tx.block_height < fork_height);

        removed
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubWalletsJson {
    public_spend_keys: Vec<PublicKey>,
    sub_wallet: Vec<SubWallet>,
    transactions: Vec<Transaction>,
    is_view_wallet: bool,
}

impl Serialize for SubWallets {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        SubWalletsJson {
            public_spend_keys: self.public_spend_keys.clone(),
            sub_wallet: self
                .public_spend_keys
                .iter()
                .filter_map(|key| self.sub_wallets.get(key).cloned())
                .collect(),
            transactions: self.transactions.clone(),
            is_view_wallet: self.is_view_wallet,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SubWallets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = SubWalletsJson::deserialize(deserializer)?;

        if json.sub_wallet.is_empty() {
            return Err(serde::de::Error::custom("wallet has no sub wallets"));
        }

        let mut sub_wallets = BTreeMap::new();
        for sub_wallet in json.sub_wallet {
            if json.is_view_wallet && sub_wallet.private_spend_key.is_some() {
                return Err(serde::de::Error::custom("view wallet holds a private spend key"));
            }

            if let Some(private) = &sub_wallet.private_spend_key {
                let public = public_from_private(private).map_err(serde::de::Error::custom)?;
                if public != sub_wallet.public_spend_key {
                    return Err(serde::de::Error::custom("spend key mismatch - possible corruption"));
                }
            }

            sub_wallets.insert(sub_wallet.public_spend_key, sub_wallet);
        }

        if json.public_spend_keys.len() != sub_wallets.len()
            || json.public_spend_keys.iter().any(|key| !sub_wallets.contains_key(key))
        {
            return Err(serde::de::Error::custom("public spend keys do not match sub wallets"));
        }

        Ok(Self {
            public_spend_keys: json.public_spend_keys,
            sub_wallets,
            transactions: json.transactions,
            is_view_wallet: json.is_view_wallet,
        })
    }
}
