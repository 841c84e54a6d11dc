// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! The append-only block store contract and its file-backed implementation.

mod file_store;

pub use file_store::{FileBlockStore, FileBlockStoreProvider};
use tessera_common_types::types::BlockHash;

use crate::{blocks::Block, ledger_storage::error::BlockStoreError};

/// Append-only persistence of blocks for a single ledger. The store's height is the authoritative ledger
/// height.
pub trait BlockStore {
    /// The number of blocks stored. This is also the number the next appended block must carry.
    fn height(&self) -> u64;

    /// Appends `block` to the ledger. Fails with [`BlockStoreError::UnexpectedBlockNumber`] unless the block's
    /// number equals the current height.
    fn add_block(&mut self, block: &Block) -> Result<(), BlockStoreError>;

    fn fetch_block_by_number(&self, block_num: u64) -> Result<Block, BlockStoreError>;

    fn fetch_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BlockStoreError>;

    /// Fetches the block containing the transaction with the given id. When a transaction id was (incorrectly)
    /// reused, the earliest committed occurrence wins.
    fn fetch_block_by_tx_id(&self, tx_id: &str) -> Result<Block, BlockStoreError>;
}

/// Opens per-ledger block stores below a common root directory.
pub trait BlockStoreProvider {
    type Store: BlockStore;

    fn open(&self, ledger_id: &str) -> Result<Self::Store, BlockStoreError>;
}
