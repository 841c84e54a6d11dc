// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Error, Formatter};

use digest::Digest;
use serde::{Deserialize, Serialize};
use tessera_common_types::types::{BlockHash, FixedHash, HashDigest, BLOCK_HASH_LENGTH};
use thiserror::Error;

use crate::blocks::{BlockHeader, BlockMetadata};

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Transaction index {tx_index} is out of range for a block with {num_txs} transactions")]
    TxIndexOutOfRange { tx_index: usize, num_txs: usize },
    #[error("Transaction {tx_index} carries an unknown validation flag byte {code}")]
    InvalidValidationFlag { tx_index: usize, code: u8 },
}

/// A transaction as it appears in a committed block: the client-assigned id plus the endorsed payload. The
/// payload is opaque to the storage layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx_id: String,
    pub payload: Vec<u8>,
}

impl TransactionEnvelope {
    pub fn new<T: Into<String>>(tx_id: T, payload: Vec<u8>) -> Self {
        Self {
            tx_id: tx_id.into(),
            payload,
        }
    }
}

/// An ordered batch of transactions with a monotonic number, plus the metadata the validation pipeline attaches
/// before commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<TransactionEnvelope>,
    pub metadata: BlockMetadata,
}

impl Block {
    /// Assembles a block from a transaction batch, computing the data hash and initializing the validation flag
    /// vector to one entry per transaction.
    pub fn new(number: u64, previous_hash: BlockHash, transactions: Vec<TransactionEnvelope>) -> Self {
        let data_hash = hash_transactions(&transactions);
        let metadata = BlockMetadata::new(transactions.len());
        Self {
            header: BlockHeader::new(number, previous_hash, data_hash),
            transactions,
            metadata,
        }
    }

    /// The genesis block of a ledger carries number 0 and an all-zero previous hash.
    pub fn genesis(transactions: Vec<TransactionEnvelope>) -> Self {
        Self::new(0, [0u8; BLOCK_HASH_LENGTH], transactions)
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}, {} transaction(s)", self.header, self.transactions.len())
    }
}

fn hash_transactions(transactions: &[TransactionEnvelope]) -> FixedHash {
    let mut digest = HashDigest::new();
    for tx in transactions {
        digest.update((tx.tx_id.len() as u64).to_le_bytes());
        digest.update(tx.tx_id.as_bytes());
        digest.update((tx.payload.len() as u64).to_le_bytes());
        digest.update(&tx.payload);
    }
    digest.finalize().into()
}
