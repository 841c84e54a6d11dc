// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::fs;

use log::*;

use crate::ledger_storage::{
    block_store::{BlockStoreProvider, FileBlockStoreProvider},
    config::LedgerStorageConfig,
    database::LedgerDatabase,
    error::LedgerStorageError,
    pvt_store::{FilePvtDataStoreProvider, PvtDataStoreProvider},
};

const LOG_TARGET: &str = "t::ls::provider";

/// Opens [`LedgerDatabase`]s for named ledgers, owning the per-store providers they are built from.
///
/// `open` / `close` are not thread safe; the databases handed out are. Databases should be shut down before the
/// provider is closed.
pub struct LedgerStorageProvider<BP, PP> {
    block_store_provider: BP,
    pvt_store_provider: PP,
}

impl<BP, PP> LedgerStorageProvider<BP, PP>
where
    BP: BlockStoreProvider,
    PP: PvtDataStoreProvider,
{
    pub fn new(block_store_provider: BP, pvt_store_provider: PP) -> Self {
        Self {
            block_store_provider,
            pvt_store_provider,
        }
    }

    /// Opens (or creates) the stores of the named ledger and reconciles them into a database.
    pub fn open(&self, ledger_id: &str) -> Result<LedgerDatabase<BP::Store, PP::Store>, LedgerStorageError> {
        validate_ledger_id(ledger_id)?;
        let block_store = self.block_store_provider.open(ledger_id)?;
        let pvt_store = self.pvt_store_provider.open(ledger_id)?;
        LedgerDatabase::new(ledger_id, block_store, pvt_store)
    }

    pub fn block_store_provider(&self) -> &BP {
        &self.block_store_provider
    }

    pub fn pvt_store_provider(&self) -> &PP {
        &self.pvt_store_provider
    }

    /// Releases the provider handles. Dropping has the same effect; this exists so shutdown shows up
    /// explicitly at call sites.
    pub fn close(self) {
        debug!(target: LOG_TARGET, "Ledger storage provider closed");
    }
}

/// The file-backed provider used by a Tessera peer: block files under `<block_store_dir>/<ledger_id>` and a
/// private data log under `<pvt_data_store_dir>/<ledger_id>`.
pub type FileLedgerStorageProvider = LedgerStorageProvider<FileBlockStoreProvider, FilePvtDataStoreProvider>;

impl FileLedgerStorageProvider {
    pub fn from_config(config: LedgerStorageConfig) -> Result<Self, LedgerStorageError> {
        if config.block_store_dir.as_os_str().is_empty() {
            return Err(LedgerStorageError::ConfigError(
                "block store directory is not set".to_string(),
            ));
        }
        if config.pvt_data_store_dir.as_os_str().is_empty() {
            return Err(LedgerStorageError::ConfigError(
                "private data store directory is not set".to_string(),
            ));
        }
        if config.block_store_dir == config.pvt_data_store_dir {
            return Err(LedgerStorageError::ConfigError(
                "block store and private data store directories must differ".to_string(),
            ));
        }
        if config.max_block_file_size == 0 {
            return Err(LedgerStorageError::ConfigError(
                "maximum block file size must be non-zero".to_string(),
            ));
        }
        fs::create_dir_all(&config.block_store_dir).map_err(|e| {
            LedgerStorageError::ConfigError(format!(
                "cannot create block store directory {}: {}",
                config.block_store_dir.display(),
                e
            ))
        })?;
        fs::create_dir_all(&config.pvt_data_store_dir).map_err(|e| {
            LedgerStorageError::ConfigError(format!(
                "cannot create private data store directory {}: {}",
                config.pvt_data_store_dir.display(),
                e
            ))
        })?;
        debug!(
            target: LOG_TARGET,
            "Ledger storage provider rooted at {} / {}",
            config.block_store_dir.display(),
            config.pvt_data_store_dir.display()
        );
        Ok(Self::new(
            FileBlockStoreProvider::new(&config.block_store_dir, config.max_block_file_size),
            FilePvtDataStoreProvider::new(&config.pvt_data_store_dir, config.purge_interval),
        ))
    }

    /// The ledgers already present on disk, in lexical order.
    pub fn ledger_ids(&self) -> Result<Vec<String>, LedgerStorageError> {
        Ok(self.block_store_provider.ledger_ids()?)
    }
}

fn validate_ledger_id(ledger_id: &str) -> Result<(), LedgerStorageError> {
    let well_formed = !ledger_id.is_empty() &&
        ledger_id != "." &&
        ledger_id != ".." &&
        ledger_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !well_formed {
        return Err(LedgerStorageError::ConfigError(format!(
            "'{}' is not a valid ledger id",
            ledger_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn rejects_invalid_ledger_ids() {
        for bad in ["", ".", "..", "a/b", "a\\b", "ledger one"] {
            assert!(validate_ledger_id(bad).is_err(), "'{}' should be rejected", bad);
        }
        for good in ["ledger-1", "my_ledger", "Ledger.2"] {
            assert!(validate_ledger_id(good).is_ok(), "'{}' should be accepted", good);
        }
    }

    #[test]
    fn rejects_misconfigured_roots() {
        let dir = tempdir().unwrap();
        let mut config = LedgerStorageConfig::with_root(dir.path());
        config.pvt_data_store_dir = config.block_store_dir.clone();
        assert!(matches!(
            FileLedgerStorageProvider::from_config(config),
            Err(LedgerStorageError::ConfigError(_))
        ));

        let mut config = LedgerStorageConfig::with_root(dir.path());
        config.max_block_file_size = 0;
        assert!(matches!(
            FileLedgerStorageProvider::from_config(config),
            Err(LedgerStorageError::ConfigError(_))
        ));
    }
}
