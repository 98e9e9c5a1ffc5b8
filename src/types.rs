//! Wallet and chain data types.

use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Hash = [u8; 32];

/// A transaction affecting one or more of our sub wallets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(with = "hex_hash")]
    pub hash: Hash,
    /// Amount per sub wallet. Positive for incoming.
    pub transfers: BTreeMap<PublicKey, i64>,
    pub fee: u64,
    pub block_height: u64,
    pub timestamp: u64,
    pub is_coinbase: bool,
}

impl Transaction {
    pub fn total_amount(&self) -> i64 {
        self.transfers.values().fold(0i64, |total, amount| total.saturating_add(*amount))
    }
}

/// An output we own and have not spent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub amount: u64,
    pub block_height: u64,
    #[serde(with = "hex_hash")]
    pub parent_transaction_hash: Hash,
    pub transaction_index: u64,
    /// One-time key of the output.
    pub key: PublicKey,
    pub transaction_public_key: PublicKey,
}

/// A key output as delivered by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyOutput {
    pub key: PublicKey,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(with = "hex_hash")]
    pub hash: Hash,
    pub transaction_public_key: PublicKey,
    pub key_outputs: Vec<KeyOutput>,
}

/// The per-block slice of chain data a wallet needs to scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletBlock {
    pub block_height: u64,
    #[serde(with = "hex_hash")]
    pub block_hash: Hash,
    pub block_timestamp: u64,
    pub coinbase_transaction: Option<RawTransaction>,
    pub transactions: Vec<RawTransaction>,
}

/// Hashes are stored as hex strings in the wallet JSON.
pub mod hex_hash {
    use super::Hash;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!(
                "Invalid hash length: expected 32, got {}",
                bytes.len()
            ))
        })
    }
}

pub mod hex_hash_vec {
    use super::Hash;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hashes: &[Hash], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
        for hash in hashes {
            seq.serialize_element(&hex::encode(hash))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash>, D::Error> {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| {
                let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("Invalid hash length"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_amount() {
        let mut transfers = BTreeMap::new();
        transfers.insert(PublicKey([1u8; 32]), 500);
        transfers.insert(PublicKey([2u8; 32]), 250);

        let tx = Transaction {
            hash: [0u8; 32],
            transfers,
            fee: 0,
            block_height: 10,
            timestamp: 1_600_000_000,
            is_coinbase: false,
        };

        assert_eq!(tx.total_amount(), 750);
    }

    #[test]
    fn test_total_amount_saturates() {
        let mut transfers = BTreeMap::new();
        transfers.insert(PublicKey([1u8; 32]), i64::MAX);
        transfers.insert(PublicKey([2u8; 32]), 1);

        let tx = Transaction {
            hash: [0u8; 32],
            transfers,
            fee: 0,
            block_height: 10,
            timestamp: 0,
            is_coinbase: false,
        };

        assert_eq!(tx.total_amount(), i64::MAX);
    }

    #[test]
    fn test_transaction_json_uses_hex() {
        let mut transfers = BTreeMap::new();
        transfers.insert(PublicKey([0xab; 32]), 1);

        let tx = Transaction {
            hash: [0xcd; 32],
            transfers,
            fee: 0,
            block_height: 1,
            timestamp: 2,
            is_coinbase: true,
        };

        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains(&"cd".repeat(32)));
        assert!(json.contains(&"ab".repeat(32)));

        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
