// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_PURGE_INTERVAL: u64 = 100;
const DEFAULT_MAX_BLOCK_FILE_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStorageConfig {
    /// Directory holding the per-ledger block stores.
    pub block_store_dir: PathBuf,
    /// Directory holding the per-ledger private data stores.
    pub pvt_data_store_dir: PathBuf,
    /// Number of blocks between purges of private data whose block-to-live has expired.
    pub purge_interval: u64,
    /// Size at which the block store rolls over to a new block file.
    pub max_block_file_size: u64,
}

impl LedgerStorageConfig {
    /// Config rooted at a single data directory, using the standard `chains` / `pvtdataStore` layout below it.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            block_store_dir: root.join("chains"),
            pvt_data_store_dir: root.join("pvtdataStore"),
            ..Default::default()
        }
    }
}

impl Default for LedgerStorageConfig {
    fn default() -> Self {
        Self {
            block_store_dir: PathBuf::from("data/chains"),
            pvt_data_store_dir: PathBuf::from("data/pvtdataStore"),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            max_block_file_size: DEFAULT_MAX_BLOCK_FILE_SIZE,
        }
    }
}
