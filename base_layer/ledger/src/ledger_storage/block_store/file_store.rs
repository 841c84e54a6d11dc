// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::HashMap,
    fs,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use log::*;
use tessera_common_types::types::{to_hex, BlockHash};

use crate::{
    blocks::Block,
    ledger_storage::{
        block_store::{BlockStore, BlockStoreProvider},
        error::BlockStoreError,
        framing,
        framing::DecodeOutcome,
    },
};

const LOG_TARGET: &str = "t::ls::block_store";

const BLOCK_FILE_PREFIX: &str = "blockfile_";
const LOCK_FILE_NAME: &str = "LOCK";

/// Position of one block record within the rolled block files.
#[derive(Clone, Copy, Debug)]
struct BlockLocation {
    file_num: u32,
    offset: u64,
    record_len: usize,
}

/// Append-only block store over numbered block files.
///
/// Blocks are framed with the shared record framing and appended to `blockfile_000000`,
/// `blockfile_000001`, … with a new file started whenever the active one would exceed the configured size.
/// The block number, hash and tx id indexes are held in memory and rebuilt by scanning the files on open;
/// a torn record at the tail of the active file (a crash mid-append) is truncated away during the scan.
pub struct FileBlockStore {
    dir: PathBuf,
    max_file_size: u64,
    // Held open for the lifetime of the store to keep the advisory lock.
    _lock_file: File,
    current_file: File,
    current_file_num: u32,
    current_file_size: u64,
    locations: Vec<BlockLocation>,
    hash_index: HashMap<BlockHash, u64>,
    tx_id_index: HashMap<String, u64>,
}

impl FileBlockStore {
    pub fn open<P: AsRef<Path>>(dir: P, max_file_size: u64) -> Result<Self, BlockStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(LOCK_FILE_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| BlockStoreError::StoreLocked(dir.display().to_string()))?;

        let file_nums = list_block_files(&dir)?;
        let mut locations = Vec::new();
        let mut hash_index = HashMap::new();
        let mut tx_id_index = HashMap::new();
        let mut current_file_size = 0;
        let last_file_num = file_nums.last().copied().unwrap_or(0);
        for &file_num in &file_nums {
            let is_last = file_num == last_file_num;
            current_file_size = scan_block_file(
                &dir,
                file_num,
                is_last,
                &mut locations,
                &mut hash_index,
                &mut tx_id_index,
            )?;
        }

        let current_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(block_file_path(&dir, last_file_num))?;
        debug!(
            target: LOG_TARGET,
            "Opened block store at {} with {} block(s) across {} file(s)",
            dir.display(),
            locations.len(),
            last_file_num + 1
        );
        Ok(Self {
            dir,
            max_file_size,
            _lock_file: lock_file,
            current_file,
            current_file_num: last_file_num,
            current_file_size,
            locations,
            hash_index,
            tx_id_index,
        })
    }

    fn roll_file(&mut self) -> Result<(), BlockStoreError> {
        let next = self.current_file_num + 1;
        self.current_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(block_file_path(&self.dir, next))?;
        self.current_file_num = next;
        self.current_file_size = 0;
        debug!(target: LOG_TARGET, "Rolled over to block file {} in {}", next, self.dir.display());
        Ok(())
    }

    fn read_record(&self, location: BlockLocation) -> Result<Block, BlockStoreError> {
        let path = block_file_path(&self.dir, location.file_num);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut buf = vec![0u8; location.record_len];
        file.read_exact(&mut buf)?;
        match framing::decode_record(&buf) {
            DecodeOutcome::Record { payload, .. } => Ok(bincode::deserialize(payload)?),
            _ => Err(BlockStoreError::CorruptBlockFile {
                path: path.display().to_string(),
                reason: format!("record at offset {} no longer decodes", location.offset),
            }),
        }
    }
}

impl BlockStore for FileBlockStore {
    fn height(&self) -> u64 {
        self.locations.len() as u64
    }

    fn add_block(&mut self, block: &Block) -> Result<(), BlockStoreError> {
        let height = self.height();
        if block.number() != height {
            return Err(BlockStoreError::UnexpectedBlockNumber {
                number: block.number(),
                height,
            });
        }
        let payload = bincode::serialize(block)?;
        let record = framing::encode_record(&payload);
        if self.current_file_size > 0 && self.current_file_size + record.len() as u64 > self.max_file_size {
            self.roll_file()?;
        }
        let offset = self.current_file_size;
        self.current_file.write_all(&record)?;
        self.current_file.sync_data()?;

        self.locations.push(BlockLocation {
            file_num: self.current_file_num,
            offset,
            record_len: record.len(),
        });
        self.hash_index.insert(block.hash(), block.number());
        for tx in &block.transactions {
            self.tx_id_index.entry(tx.tx_id.clone()).or_insert_with(|| block.number());
        }
        self.current_file_size += record.len() as u64;
        debug!(
            target: LOG_TARGET,
            "Appended block {} ({} bytes) to block file {}",
            block.number(),
            record.len(),
            self.current_file_num
        );
        Ok(())
    }

    fn fetch_block_by_number(&self, block_num: u64) -> Result<Block, BlockStoreError> {
        let location = self
            .locations
            .get(block_num as usize)
            .copied()
            .ok_or(BlockStoreError::BlockNotFound(block_num))?;
        self.read_record(location)
    }

    fn fetch_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BlockStoreError> {
        let block_num = self
            .hash_index
            .get(hash)
            .copied()
            .ok_or_else(|| BlockStoreError::BlockHashNotFound(to_hex(hash)))?;
        self.fetch_block_by_number(block_num)
    }

    fn fetch_block_by_tx_id(&self, tx_id: &str) -> Result<Block, BlockStoreError> {
        let block_num = self
            .tx_id_index
            .get(tx_id)
            .copied()
            .ok_or_else(|| BlockStoreError::TxIdNotFound(tx_id.to_string()))?;
        self.fetch_block_by_number(block_num)
    }
}

/// Opens [`FileBlockStore`]s below a common root, one subdirectory per ledger.
#[derive(Clone, Debug)]
pub struct FileBlockStoreProvider {
    dir: PathBuf,
    max_file_size: u64,
}

impl FileBlockStoreProvider {
    pub fn new<P: AsRef<Path>>(dir: P, max_file_size: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_file_size,
        }
    }

    /// The ledgers with a block store below this provider's root, in lexical order.
    pub fn ledger_ids(&self) -> Result<Vec<String>, BlockStoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl BlockStoreProvider for FileBlockStoreProvider {
    type Store = FileBlockStore;

    fn open(&self, ledger_id: &str) -> Result<Self::Store, BlockStoreError> {
        FileBlockStore::open(self.dir.join(ledger_id), self.max_file_size)
    }
}

fn block_file_path(dir: &Path, file_num: u32) -> PathBuf {
    dir.join(format!("{}{:06}", BLOCK_FILE_PREFIX, file_num))
}

/// Lists the block file numbers present in `dir`, verifying they are consecutive from 0.
fn list_block_files(dir: &Path) -> Result<Vec<u32>, BlockStoreError> {
    let mut file_nums = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(num) = name
            .to_str()
            .and_then(|name| name.strip_prefix(BLOCK_FILE_PREFIX))
            .and_then(|suffix| suffix.parse::<u32>().ok())
        {
            file_nums.push(num);
        }
    }
    file_nums.sort_unstable();
    for (i, &num) in file_nums.iter().enumerate() {
        if num != i as u32 {
            return Err(BlockStoreError::CorruptBlockFile {
                path: block_file_path(dir, i as u32).display().to_string(),
                reason: "block file missing from the sequence".to_string(),
            });
        }
    }
    Ok(file_nums)
}

/// Scans one block file, appending every decodable block to the indexes. Returns the number of valid bytes in
/// the file. A record that fails to decode at the tail of the last file is truncated away; anywhere else it is
/// corruption.
fn scan_block_file(
    dir: &Path,
    file_num: u32,
    is_last: bool,
    locations: &mut Vec<BlockLocation>,
    hash_index: &mut HashMap<BlockHash, u64>,
    tx_id_index: &mut HashMap<String, u64>,
) -> Result<u64, BlockStoreError> {
    let path = block_file_path(dir, file_num);
    let buf = fs::read(&path)?;
    let mut pos = 0usize;
    while pos < buf.len() {
        match framing::decode_record(&buf[pos..]) {
            DecodeOutcome::Record { payload, consumed } => {
                let block: Block =
                    bincode::deserialize(payload).map_err(|e| BlockStoreError::CorruptBlockFile {
                        path: path.display().to_string(),
                        reason: format!("undecodable block record at offset {}: {}", pos, e),
                    })?;
                let expected = locations.len() as u64;
                if block.number() != expected {
                    return Err(BlockStoreError::CorruptBlockFile {
                        path: path.display().to_string(),
                        reason: format!("expected block {} but found block {}", expected, block.number()),
                    });
                }
                locations.push(BlockLocation {
                    file_num,
                    offset: pos as u64,
                    record_len: consumed,
                });
                hash_index.insert(block.hash(), block.number());
                for tx in &block.transactions {
                    tx_id_index.entry(tx.tx_id.clone()).or_insert_with(|| block.number());
                }
                pos += consumed;
            },
            // A record that fails to decode is only a torn append if nothing follows it in the active file.
            DecodeOutcome::Incomplete if is_last => {
                truncate_torn_tail(&path, pos)?;
                return Ok(pos as u64);
            },
            DecodeOutcome::BadChecksum { consumed } if is_last && pos + consumed == buf.len() => {
                truncate_torn_tail(&path, pos)?;
                return Ok(pos as u64);
            },
            DecodeOutcome::Incomplete | DecodeOutcome::BadChecksum { .. } => {
                return Err(BlockStoreError::CorruptBlockFile {
                    path: path.display().to_string(),
                    reason: format!("unreadable record at offset {}", pos),
                });
            },
        }
    }
    Ok(pos as u64)
}

fn truncate_torn_tail(path: &Path, valid_len: usize) -> Result<(), BlockStoreError> {
    warn!(
        target: LOG_TARGET,
        "Dropping torn record at offset {} of {} left by an interrupted append",
        valid_len,
        path.display()
    );
    OpenOptions::new().write(true).open(path)?.set_len(valid_len as u64)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;
    use tessera_common_types::types::BLOCK_HASH_LENGTH;

    use super::*;
    use crate::blocks::TransactionEnvelope;

    fn build_chain(len: usize) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(len);
        let mut previous_hash = [0u8; BLOCK_HASH_LENGTH];
        for number in 0..len as u64 {
            let txs = (0..3)
                .map(|i| TransactionEnvelope::new(format!("blk{}_tx{}", number, i), vec![number as u8; 64]))
                .collect();
            let block = Block::new(number, previous_hash, txs);
            previous_hash = block.hash();
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn add_and_fetch_blocks() {
        let dir = tempdir().unwrap();
        let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        assert_eq!(store.height(), 0);
        let blocks = build_chain(5);
        for block in &blocks {
            store.add_block(block).unwrap();
        }
        assert_eq!(store.height(), 5);
        assert_eq!(store.fetch_block_by_number(3).unwrap(), blocks[3]);
        assert_eq!(store.fetch_block_by_hash(&blocks[2].hash()).unwrap(), blocks[2]);
        assert_eq!(store.fetch_block_by_tx_id("blk4_tx1").unwrap(), blocks[4]);
    }

    #[test]
    fn unknown_lookups_error() {
        let dir = tempdir().unwrap();
        let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        store.add_block(&build_chain(1)[0]).unwrap();
        assert!(matches!(
            store.fetch_block_by_number(1),
            Err(BlockStoreError::BlockNotFound(1))
        ));
        assert!(matches!(
            store.fetch_block_by_hash(&[9u8; BLOCK_HASH_LENGTH]),
            Err(BlockStoreError::BlockHashNotFound(_))
        ));
        assert!(matches!(
            store.fetch_block_by_tx_id("no-such-tx"),
            Err(BlockStoreError::TxIdNotFound(_))
        ));
    }

    #[test]
    fn rejects_out_of_order_blocks() {
        let dir = tempdir().unwrap();
        let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        let blocks = build_chain(3);
        store.add_block(&blocks[0]).unwrap();
        // A duplicate and a skip are both rejected.
        assert!(matches!(
            store.add_block(&blocks[0]),
            Err(BlockStoreError::UnexpectedBlockNumber { number: 0, height: 1 })
        ));
        assert!(matches!(
            store.add_block(&blocks[2]),
            Err(BlockStoreError::UnexpectedBlockNumber { number: 2, height: 1 })
        ));
        assert_eq!(store.height(), 1);
    }

    #[test]
    fn reopen_preserves_contents() {
        let dir = tempdir().unwrap();
        let blocks = build_chain(4);
        {
            let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
            for block in &blocks {
                store.add_block(block).unwrap();
            }
        }
        let store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        assert_eq!(store.height(), 4);
        assert_eq!(store.fetch_block_by_number(0).unwrap(), blocks[0]);
        assert_eq!(store.fetch_block_by_hash(&blocks[3].hash()).unwrap(), blocks[3]);
    }

    #[test]
    fn rolls_over_small_block_files() {
        let dir = tempdir().unwrap();
        let blocks = build_chain(6);
        {
            let mut store = FileBlockStore::open(dir.path(), 256).unwrap();
            for block in &blocks {
                store.add_block(block).unwrap();
            }
            assert!(store.current_file_num > 0);
        }
        let store = FileBlockStore::open(dir.path(), 256).unwrap();
        assert_eq!(store.height(), 6);
        for block in &blocks {
            assert_eq!(store.fetch_block_by_number(block.number()).unwrap(), *block);
        }
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        let blocks = build_chain(3);
        {
            let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
            for block in &blocks[..2] {
                store.add_block(block).unwrap();
            }
        }
        // Simulate a crash partway through an append.
        let path = block_file_path(dir.path(), 0);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x2a, 0x01, 0x02, 0x03]).unwrap();
        drop(file);

        let mut store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        assert_eq!(store.height(), 2);
        store.add_block(&blocks[2]).unwrap();
        assert_eq!(store.fetch_block_by_number(2).unwrap(), blocks[2]);
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _store = FileBlockStore::open(dir.path(), 1024 * 1024).unwrap();
        assert!(matches!(
            FileBlockStore::open(dir.path(), 1024 * 1024),
            Err(BlockStoreError::StoreLocked(_))
        ));
    }

    #[test]
    fn provider_opens_per_ledger_dirs() {
        let dir = tempdir().unwrap();
        let provider = FileBlockStoreProvider::new(dir.path(), 1024 * 1024);
        let mut first = provider.open("ledger-1").unwrap();
        let mut second = provider.open("ledger-2").unwrap();
        let blocks = build_chain(2);
        first.add_block(&blocks[0]).unwrap();
        second.add_block(&blocks[0]).unwrap();
        second.add_block(&blocks[1]).unwrap();
        assert_eq!(first.height(), 1);
        assert_eq!(second.height(), 2);
    }
}
