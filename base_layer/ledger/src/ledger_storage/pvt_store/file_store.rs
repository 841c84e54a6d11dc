// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::BTreeMap,
    fs,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use fs2::FileExt;
use log::*;
use serde::{Deserialize, Serialize};

use crate::ledger_storage::{
    btl::BtlPolicy,
    error::PvtDataStoreError,
    framing,
    framing::DecodeOutcome,
    pvt_data::{MissingPvtDataInfo, MissingPvtDataMap, PvtNsCollFilter, TxPvtData},
    pvt_store::{PvtDataStore, PvtDataStoreProvider},
};

const LOG_TARGET: &str = "t::ls::pvt_store";

const PVT_DATA_LOG_NAME: &str = "pvtdata.log";
const PVT_DATA_LOG_TMP_NAME: &str = "pvtdata.log.tmp";
const LOCK_FILE_NAME: &str = "LOCK";

#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    /// Sets the last committed block height without carrying data. Written when bootstrapping against a
    /// pre-existing block store, and as the tail record of a compacted log.
    Height { height: u64 },
    Commit {
        block_num: u64,
        pvt_data: Vec<TxPvtData>,
        missing: MissingPvtDataMap,
    },
}

#[derive(Clone, Debug, Default)]
struct BlockPvtRecord {
    /// Ascending by `seq_in_block`.
    pvt_data: Vec<TxPvtData>,
    missing: MissingPvtDataMap,
}

/// Private data store over a single append-only log per ledger.
///
/// Every commit appends one framed [`LogRecord`]; the full store state is rebuilt by replaying the log on
/// open. A torn record at the tail of the log is an append that never completed: it is truncated away during
/// replay, which is what rolls back a pending write left by a crash. BTL purges rewrite the log without the
/// expired entries and atomically swap it into place.
pub struct FilePvtDataStore {
    dir: PathBuf,
    purge_interval: u64,
    // Held open for the lifetime of the store to keep the advisory lock.
    _lock_file: File,
    log_file: File,
    height: u64,
    /// Only blocks that actually have private data or missing-data entries are present.
    blocks: BTreeMap<u64, BlockPvtRecord>,
    btl_policy: Option<Arc<dyn BtlPolicy>>,
}

impl FilePvtDataStore {
    pub fn open<P: AsRef<Path>>(dir: P, purge_interval: u64) -> Result<Self, PvtDataStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(LOCK_FILE_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| PvtDataStoreError::StoreLocked(dir.display().to_string()))?;

        let log_path = dir.join(PVT_DATA_LOG_NAME);
        let mut height = 0;
        let mut blocks = BTreeMap::new();
        if log_path.exists() {
            replay_log(&log_path, &mut height, &mut blocks)?;
        }
        let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        debug!(
            target: LOG_TARGET,
            "Opened private data store at {} at height {} ({} block(s) hold data)",
            dir.display(),
            height,
            blocks.len()
        );
        Ok(Self {
            dir,
            purge_interval,
            _lock_file: lock_file,
            log_file,
            height,
            blocks,
            btl_policy: None,
        })
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(PVT_DATA_LOG_NAME)
    }

    fn append_record(&mut self, record: &LogRecord) -> Result<(), PvtDataStoreError> {
        let payload = bincode::serialize(record)?;
        self.log_file.write_all(&framing::encode_record(&payload))?;
        self.log_file.sync_data()?;
        Ok(())
    }

    fn maybe_purge(&mut self, committed_block: u64) -> Result<(), PvtDataStoreError> {
        if self.purge_interval == 0 || committed_block % self.purge_interval != 0 {
            return Ok(());
        }
        let policy = match self.btl_policy.clone() {
            Some(policy) => policy,
            None => return Ok(()),
        };
        let before = self.num_entries();
        for (&block_num, record) in self.blocks.iter_mut() {
            for tx in record.pvt_data.iter_mut() {
                for ns in tx.write_set.ns_writes.iter_mut() {
                    let namespace = ns.namespace.clone();
                    ns.collections
                        .retain(|coll| policy.expiry(&namespace, &coll.collection, block_num) > committed_block);
                }
                tx.write_set.ns_writes.retain(|ns| !ns.collections.is_empty());
            }
            record.pvt_data.retain(|tx| !tx.write_set.is_empty());
            record
                .missing
                .retain(|_, entry| policy.expiry(&entry.namespace, &entry.collection, block_num) > committed_block);
        }
        self.blocks
            .retain(|_, record| !record.pvt_data.is_empty() || !record.missing.is_empty());
        let purged = before - self.num_entries();
        if purged > 0 {
            self.rewrite_log()?;
            info!(
                target: LOG_TARGET,
                "Purged {} expired private data entr(ies) at block {}", purged, committed_block
            );
        }
        Ok(())
    }

    /// Collection write sets plus missing-data entries currently retained.
    fn num_entries(&self) -> usize {
        self.blocks
            .values()
            .map(|record| {
                let data: usize = record
                    .pvt_data
                    .iter()
                    .flat_map(|tx| tx.write_set.ns_writes.iter())
                    .map(|ns| ns.collections.len())
                    .sum();
                let missing: usize = record.missing.iter().map(|(_, entries)| entries.len()).sum();
                data + missing
            })
            .sum()
    }

    /// Writes the current state to a fresh log and atomically swaps it over the old one.
    fn rewrite_log(&mut self) -> Result<(), PvtDataStoreError> {
        let tmp_path = self.dir.join(PVT_DATA_LOG_TMP_NAME);
        let mut tmp = File::create(&tmp_path)?;
        for (&block_num, record) in &self.blocks {
            let payload = bincode::serialize(&LogRecord::Commit {
                block_num,
                pvt_data: record.pvt_data.clone(),
                missing: record.missing.clone(),
            })?;
            tmp.write_all(&framing::encode_record(&payload))?;
        }
        let payload = bincode::serialize(&LogRecord::Height { height: self.height })?;
        tmp.write_all(&framing::encode_record(&payload))?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, self.log_path())?;
        self.log_file = OpenOptions::new().append(true).open(self.log_path())?;
        Ok(())
    }
}

impl PvtDataStore for FilePvtDataStore {
    fn last_committed_block_height(&self) -> u64 {
        self.height
    }

    fn init_last_committed_block_height(&mut self, height: u64) -> Result<(), PvtDataStoreError> {
        if self.height != 0 || !self.blocks.is_empty() {
            return Err(PvtDataStoreError::AlreadyInitialized {
                height,
                current: self.height,
            });
        }
        self.append_record(&LogRecord::Height { height })?;
        self.height = height;
        info!(
            target: LOG_TARGET,
            "Bootstrapped private data store at {} to height {}",
            self.dir.display(),
            height
        );
        Ok(())
    }

    fn init(&mut self, btl_policy: Arc<dyn BtlPolicy>) {
        self.btl_policy = Some(btl_policy);
    }

    fn commit(
        &mut self,
        block_num: u64,
        mut pvt_data: Vec<TxPvtData>,
        missing: MissingPvtDataMap,
    ) -> Result<(), PvtDataStoreError> {
        if block_num != self.height {
            return Err(PvtDataStoreError::UnexpectedBlockNumber {
                number: block_num,
                height: self.height,
            });
        }
        pvt_data.sort_by_key(|tx| tx.seq_in_block);
        let record = LogRecord::Commit {
            block_num,
            pvt_data,
            missing,
        };
        self.append_record(&record)?;
        match record {
            LogRecord::Commit { pvt_data, missing, .. } => {
                debug!(
                    target: LOG_TARGET,
                    "Committed private data for block {}: {} tx entr(ies), {} tx(s) with data missing",
                    block_num,
                    pvt_data.len(),
                    missing.iter().count()
                );
                if !pvt_data.is_empty() || !missing.is_empty() {
                    self.blocks.insert(block_num, BlockPvtRecord { pvt_data, missing });
                }
            },
            LogRecord::Height { .. } => {},
        }
        self.height = block_num + 1;
        self.maybe_purge(block_num)?;
        Ok(())
    }

    fn fetch_pvt_data_by_block(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> Result<Vec<TxPvtData>, PvtDataStoreError> {
        let record = match self.blocks.get(&block_num) {
            Some(record) => record,
            None => return Ok(Vec::new()),
        };
        let mut result = Vec::with_capacity(record.pvt_data.len());
        for tx in &record.pvt_data {
            let write_set = match filter {
                Some(filter) => tx.write_set.filtered(filter),
                None => tx.write_set.clone(),
            };
            result.push(TxPvtData {
                seq_in_block: tx.seq_in_block,
                write_set,
            });
        }
        Ok(result)
    }

    fn fetch_missing_pvt_data_info(&self, max_blocks: u64) -> Result<MissingPvtDataInfo, PvtDataStoreError> {
        let mut info = MissingPvtDataInfo::new();
        if max_blocks == 0 || self.height == 0 {
            return Ok(info);
        }
        let from = self.height.saturating_sub(max_blocks);
        for (&block_num, record) in self.blocks.range(from..self.height) {
            for (seq_in_block, entries) in record.missing.iter() {
                for entry in entries.iter().filter(|entry| entry.is_eligible) {
                    info.add(block_num, seq_in_block, entry.namespace.clone(), entry.collection.clone());
                }
            }
        }
        Ok(info)
    }
}

/// Opens [`FilePvtDataStore`]s below a common root, one subdirectory per ledger.
#[derive(Clone, Debug)]
pub struct FilePvtDataStoreProvider {
    dir: PathBuf,
    purge_interval: u64,
}

impl FilePvtDataStoreProvider {
    pub fn new<P: AsRef<Path>>(dir: P, purge_interval: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            purge_interval,
        }
    }
}

impl PvtDataStoreProvider for FilePvtDataStoreProvider {
    type Store = FilePvtDataStore;

    fn open(&self, ledger_id: &str) -> Result<Self::Store, PvtDataStoreError> {
        FilePvtDataStore::open(self.dir.join(ledger_id), self.purge_interval)
    }
}

/// Replays the log into `height` and `blocks`, truncating a torn tail record.
fn replay_log(
    path: &Path,
    height: &mut u64,
    blocks: &mut BTreeMap<u64, BlockPvtRecord>,
) -> Result<(), PvtDataStoreError> {
    let buf = fs::read(path)?;
    let mut pos = 0usize;
    while pos < buf.len() {
        match framing::decode_record(&buf[pos..]) {
            DecodeOutcome::Record { payload, consumed } => {
                let record: LogRecord =
                    bincode::deserialize(payload).map_err(|e| PvtDataStoreError::CorruptLog {
                        path: path.display().to_string(),
                        reason: format!("undecodable record at offset {}: {}", pos, e),
                    })?;
                match record {
                    LogRecord::Height { height: h } => *height = h,
                    LogRecord::Commit {
                        block_num,
                        pvt_data,
                        missing,
                    } => {
                        if !pvt_data.is_empty() || !missing.is_empty() {
                            blocks.insert(block_num, BlockPvtRecord { pvt_data, missing });
                        }
                        *height = block_num + 1;
                    },
                }
                pos += consumed;
            },
            DecodeOutcome::Incomplete => {
                truncate_torn_tail(path, pos)?;
                return Ok(());
            },
            DecodeOutcome::BadChecksum { consumed } if pos + consumed == buf.len() => {
                truncate_torn_tail(path, pos)?;
                return Ok(());
            },
            DecodeOutcome::BadChecksum { .. } => {
                return Err(PvtDataStoreError::CorruptLog {
                    path: path.display().to_string(),
                    reason: format!("unreadable record at offset {}", pos),
                });
            },
        }
    }
    Ok(())
}

fn truncate_torn_tail(path: &Path, valid_len: usize) -> Result<(), PvtDataStoreError> {
    warn!(
        target: LOG_TARGET,
        "Rolling back uncommitted pending write at offset {} of {}",
        valid_len,
        path.display()
    );
    OpenOptions::new().write(true).open(path)?.set_len(valid_len as u64)?;
    Ok(())
}
