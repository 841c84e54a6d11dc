// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{collections::BTreeMap, path::Path, sync::Arc};

use rand::{rngs::OsRng, RngCore};
use tessera_common_types::{transaction::TxValidationCode, types::BLOCK_HASH_LENGTH};

use crate::{
    blocks::{Block, TransactionEnvelope},
    ledger_storage::{
        block_store::FileBlockStore,
        pvt_store::FilePvtDataStore,
        BlockAndPvtData,
        CollectionPvtWriteSet,
        FileLedgerStorageProvider,
        LedgerDatabase,
        LedgerStorageConfig,
        MissingPvtDataMap,
        NeverExpires,
        NsPvtWriteSet,
        TxPvtData,
        TxPvtWriteSet,
    },
};

pub const TEST_LEDGER_ID: &str = "test-ledger";

pub type TestLedgerDatabase = LedgerDatabase<FileBlockStore, FilePvtDataStore>;

pub fn create_provider(root: &Path) -> FileLedgerStorageProvider {
    FileLedgerStorageProvider::from_config(LedgerStorageConfig::with_root(root)).unwrap()
}

/// Opens (or reopens) the test ledger under `root` and hands it a no-expiry BTL policy.
pub fn open_test_ledger(root: &Path) -> TestLedgerDatabase {
    let db = create_provider(root).open(TEST_LEDGER_ID).unwrap();
    db.init(Arc::new(NeverExpires));
    db
}

pub fn random_payload() -> Vec<u8> {
    let mut payload = vec![0u8; 64];
    OsRng.fill_bytes(&mut payload);
    payload
}

/// A block of `num_txs` transactions, all flagged valid, with ids `blk<number>_tx<i>`.
pub fn build_block(number: u64, previous_hash: [u8; BLOCK_HASH_LENGTH], num_txs: usize) -> Block {
    let txs = (0..num_txs)
        .map(|i| TransactionEnvelope::new(format!("blk{}_tx{}", number, i), random_payload()))
        .collect();
    let mut block = Block::new(number, previous_hash, txs);
    for i in 0..num_txs {
        block.metadata.set_validation_code(i, TxValidationCode::Valid).unwrap();
    }
    block
}

/// The next block of the ledger, chained onto the current tip.
pub fn build_next_block(db: &TestLedgerDatabase, num_txs: usize) -> Block {
    let metadata = db.get_chain_metadata().unwrap();
    let previous_hash = metadata
        .best_block_hash()
        .copied()
        .unwrap_or([0u8; BLOCK_HASH_LENGTH]);
    build_block(metadata.height(), previous_hash, num_txs)
}

/// The standard test write set: `ns-1/{coll-1, coll-2}` and `ns-2/coll-1`.
pub fn sample_write_set() -> TxPvtWriteSet {
    TxPvtWriteSet {
        ns_writes: vec![
            NsPvtWriteSet {
                namespace: "ns-1".to_string(),
                collections: vec![
                    CollectionPvtWriteSet {
                        collection: "coll-1".to_string(),
                        payload: random_payload(),
                    },
                    CollectionPvtWriteSet {
                        collection: "coll-2".to_string(),
                        payload: random_payload(),
                    },
                ],
            },
            NsPvtWriteSet {
                namespace: "ns-2".to_string(),
                collections: vec![CollectionPvtWriteSet {
                    collection: "coll-1".to_string(),
                    payload: random_payload(),
                }],
            },
        ],
    }
}

pub fn sample_pvt_data(seqs: &[u64]) -> BTreeMap<u64, TxPvtData> {
    seqs.iter()
        .map(|&seq_in_block| {
            (seq_in_block, TxPvtData {
                seq_in_block,
                write_set: sample_write_set(),
            })
        })
        .collect()
}

/// Commits the next block with private data attached to the given tx sequences. Returns the committed block.
pub fn commit_block(db: &TestLedgerDatabase, num_txs: usize, pvt_seqs: &[u64]) -> Block {
    let block = build_next_block(db, num_txs);
    db.commit_with_pvt_data(BlockAndPvtData {
        block: block.clone(),
        pvt_data: sample_pvt_data(pvt_seqs),
        missing_pvt_data: MissingPvtDataMap::new(),
    })
    .unwrap();
    block
}
