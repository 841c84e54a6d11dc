// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! The private data store contract and its file-backed implementation.

mod file_store;

use std::sync::Arc;

pub use file_store::{FilePvtDataStore, FilePvtDataStoreProvider};

use crate::ledger_storage::{
    btl::BtlPolicy,
    error::PvtDataStoreError,
    pvt_data::{MissingPvtDataInfo, MissingPvtDataMap, PvtNsCollFilter, TxPvtData},
};

/// Persistence of per-transaction private write sets and missing-data records for a single ledger, keyed by
/// `(block number, tx sequence)`.
pub trait PvtDataStore {
    /// The height reported by the private data side: the number of the next block it expects to commit. This
    /// may legally be one more than the block store height after an interrupted ledger commit.
    fn last_committed_block_height(&self) -> u64;

    /// Bootstraps an empty store against a block store that already holds `height` blocks. The pre-existing
    /// blocks are recorded as having no private data. Fails if the store has committed anything already.
    fn init_last_committed_block_height(&mut self, height: u64) -> Result<(), PvtDataStoreError>;

    /// Hands the store the BTL policy consulted when purging expired data. Must be called before the first
    /// commit; until then no purging takes place.
    fn init(&mut self, btl_policy: Arc<dyn BtlPolicy>);

    /// Commits the private data and missing-data records for `block_num`. Fails with
    /// [`PvtDataStoreError::UnexpectedBlockNumber`] unless `block_num` equals the last committed block height.
    fn commit(
        &mut self,
        block_num: u64,
        pvt_data: Vec<TxPvtData>,
        missing: MissingPvtDataMap,
    ) -> Result<(), PvtDataStoreError>;

    /// The private data stored for `block_num` in ascending tx sequence order, with `filter` applied to each
    /// write set. Blocks without private data yield an empty list.
    fn fetch_pvt_data_by_block(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> Result<Vec<TxPvtData>, PvtDataStoreError>;

    /// Eligible missing-data entries for the `max_blocks` most recently committed blocks.
    fn fetch_missing_pvt_data_info(&self, max_blocks: u64) -> Result<MissingPvtDataInfo, PvtDataStoreError>;
}

/// Opens per-ledger private data stores below a common root directory.
pub trait PvtDataStoreProvider {
    type Store: PvtDataStore;

    fn open(&self, ledger_id: &str) -> Result<Self::Store, PvtDataStoreError>;
}
