// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
    #[error("Block number {number} does not match the next block height {height}")]
    UnexpectedBlockNumber { number: u64, height: u64 },
    #[error("Block {0} is not stored")]
    BlockNotFound(u64),
    #[error("No block with hash {0} is stored")]
    BlockHashNotFound(String),
    #[error("No committed block contains transaction {0}")]
    TxIdNotFound(String),
    #[error("Block file {path} is corrupt: {reason}")]
    CorruptBlockFile { path: String, reason: String },
    #[error("Block store at {0} is locked by another process")]
    StoreLocked(String),
}

#[derive(Debug, Error)]
pub enum PvtDataStoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
    #[error("Commit for block {number} does not match the last committed block height {height}")]
    UnexpectedBlockNumber { number: u64, height: u64 },
    #[error("Private data log {path} is corrupt: {reason}")]
    CorruptLog { path: String, reason: String },
    #[error("Cannot bootstrap the private data store to height {height}: the store is already at height {current}")]
    AlreadyInitialized { height: u64, current: u64 },
    #[error("Private data store at {0} is locked by another process")]
    StoreLocked(String),
}

#[derive(Debug, Error)]
pub enum LedgerStorageError {
    #[error("Block store error: {0}")]
    BlockStoreError(#[from] BlockStoreError),
    #[error("Private data store error: {0}")]
    PvtDataStoreError(#[from] PvtDataStoreError),
    #[error(
        "Store heights out of sync: the block store is at height {block_store_height} but the private data store \
         is at height {pvt_store_height}"
    )]
    StoreHeightsOutOfSync {
        block_store_height: u64,
        pvt_store_height: u64,
    },
    #[error("Invalid ledger storage configuration: {0}")]
    ConfigError(String),
    #[error("The BTL policy has not been initialized for this ledger")]
    BtlPolicyNotSet,
}
