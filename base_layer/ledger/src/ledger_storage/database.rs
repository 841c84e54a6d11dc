// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::*;
use once_cell::sync::OnceCell;
use tessera_common_types::{chain_metadata::ChainMetadata, types::BlockHash};

use crate::{
    blocks::Block,
    ledger_storage::{
        block_store::BlockStore,
        btl::BtlPolicy,
        error::LedgerStorageError,
        pvt_data::{BlockAndPvtData, MissingPvtDataInfo, MissingPvtDataMap, PvtNsCollFilter, TxPvtData},
        pvt_store::PvtDataStore,
    },
};

const LOG_TARGET: &str = "t::ls::database";

/// The storage coordinator for one ledger.
///
/// A ledger commit touches two independently persisted stores, so a crash can land between the two writes.
/// `LedgerDatabase` makes the pair behave like a single store. The private data side is written first because
/// the block store height is the authoritative ledger height: a crash after the private data write leaves the
/// private data store exactly one block ahead, a state this database recognises on open and repairs on the next
/// commit of the same block number by skipping the private data write. No other height skew is accepted.
///
/// Commits are serialized internally. Readers run concurrently with each other and with a commit; each read
/// sees one store's pre- or post-commit state independently, so a reader may briefly observe the private data
/// store one block ahead mid-commit.
pub struct LedgerDatabase<B, P> {
    ledger_id: String,
    block_store: RwLock<B>,
    pvt_store: RwLock<P>,
    commit_lock: Mutex<()>,
    btl_initialized: OnceCell<()>,
}

impl<B, P> LedgerDatabase<B, P>
where
    B: BlockStore,
    P: PvtDataStore,
{
    /// Binds the two stores together, reconciling their heights. Opening fails if the stores are skewed by
    /// more than the single block a crashed commit can produce.
    pub fn new(ledger_id: &str, block_store: B, mut pvt_store: P) -> Result<Self, LedgerStorageError> {
        let block_store_height = block_store.height();
        let pvt_store_height = pvt_store.last_committed_block_height();
        if pvt_store_height == 0 && block_store_height > 0 {
            // A ledger that predates private data support: start tracking from the current height.
            info!(
                target: LOG_TARGET,
                "Bootstrapping private data store of ledger '{}' to block store height {}",
                ledger_id,
                block_store_height
            );
            pvt_store.init_last_committed_block_height(block_store_height)?;
        } else if pvt_store_height == block_store_height + 1 {
            warn!(
                target: LOG_TARGET,
                "Private data store of ledger '{}' is one block ahead of the block store ({} vs {}); a crash \
                 interrupted the last commit and it will reconcile on the next commit",
                ledger_id,
                pvt_store_height,
                block_store_height
            );
        } else if pvt_store_height != block_store_height {
            return Err(LedgerStorageError::StoreHeightsOutOfSync {
                block_store_height,
                pvt_store_height,
            });
        }
        debug!(
            target: LOG_TARGET,
            "Opened ledger '{}' at height {}", ledger_id, block_store_height
        );
        Ok(Self {
            ledger_id: ledger_id.to_string(),
            block_store: RwLock::new(block_store),
            pvt_store: RwLock::new(pvt_store),
            commit_lock: Mutex::new(()),
            btl_initialized: OnceCell::new(),
        })
    }

    /// Hands the ledger its BTL policy. Must be called once before the first commit; later calls are ignored.
    pub fn init(&self, btl_policy: Arc<dyn BtlPolicy>) {
        if self.btl_initialized.set(()).is_err() {
            warn!(
                target: LOG_TARGET,
                "BTL policy of ledger '{}' is already initialized; ignoring", self.ledger_id
            );
            return;
        }
        acquire_write(&self.pvt_store).init(btl_policy);
    }

    /// Commits `block_and_pvt` to both stores: private data first, then the block.
    ///
    /// When the private data store is one block ahead after an earlier interrupted or failed commit, the
    /// private data carried here is ignored in favour of what was already persisted, and only the block store
    /// write is performed. A block store failure leaves the private data store one block ahead; that is a legal
    /// state and the commit of the same block may be retried.
    pub fn commit_with_pvt_data(&self, block_and_pvt: BlockAndPvtData) -> Result<(), LedgerStorageError> {
        if self.btl_initialized.get().is_none() {
            return Err(LedgerStorageError::BtlPolicyNotSet);
        }
        let _commit_guard = acquire_mutex(&self.commit_lock);
        let BlockAndPvtData {
            block,
            pvt_data,
            missing_pvt_data,
        } = block_and_pvt;
        let block_num = block.number();

        let block_store_height = acquire_read(&self.block_store).height();
        let pvt_store_height = acquire_read(&self.pvt_store).last_committed_block_height();
        if pvt_store_height <= block_store_height {
            let pvt_entries: Vec<TxPvtData> = pvt_data.into_values().collect();
            acquire_write(&self.pvt_store).commit(block_num, pvt_entries, missing_pvt_data)?;
        } else {
            info!(
                target: LOG_TARGET,
                "Private data store of ledger '{}' is already at height {}; skipping its write for block {}",
                self.ledger_id,
                pvt_store_height,
                block_num
            );
        }
        acquire_write(&self.block_store).add_block(&block)?;
        debug!(
            target: LOG_TARGET,
            "Committed block {} to ledger '{}'", block_num, self.ledger_id
        );
        Ok(())
    }

    /// The private data stored for `block_num`, ascending by tx sequence, with `filter` applied to each write
    /// set. Entries for invalid transactions are included; blocks without private data yield an empty list.
    pub fn fetch_pvt_data_by_block(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> Result<Vec<TxPvtData>, LedgerStorageError> {
        Ok(acquire_read(&self.pvt_store).fetch_pvt_data_by_block(block_num, filter)?)
    }

    /// The block at `block_num` joined with its private data. Transactions whose write set is entirely
    /// filtered away have no entry in the result map.
    pub fn fetch_block_with_pvt_data(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> Result<BlockAndPvtData, LedgerStorageError> {
        let block = acquire_read(&self.block_store).fetch_block_by_number(block_num)?;
        let entries = acquire_read(&self.pvt_store).fetch_pvt_data_by_block(block_num, filter)?;
        let mut pvt_data = BTreeMap::new();
        for tx in entries {
            if !tx.write_set.is_empty() {
                pvt_data.insert(tx.seq_in_block, tx);
            }
        }
        Ok(BlockAndPvtData {
            block,
            pvt_data,
            missing_pvt_data: MissingPvtDataMap::new(),
        })
    }

    /// Eligible missing-data entries for the `max_blocks` most recently committed blocks, regardless of the
    /// transactions' validity flags.
    pub fn fetch_missing_pvt_data_info(&self, max_blocks: u64) -> Result<MissingPvtDataInfo, LedgerStorageError> {
        Ok(acquire_read(&self.pvt_store).fetch_missing_pvt_data_info(max_blocks)?)
    }

    pub fn fetch_block(&self, block_num: u64) -> Result<Block, LedgerStorageError> {
        Ok(acquire_read(&self.block_store).fetch_block_by_number(block_num)?)
    }

    pub fn fetch_block_by_hash(&self, hash: &BlockHash) -> Result<Block, LedgerStorageError> {
        Ok(acquire_read(&self.block_store).fetch_block_by_hash(hash)?)
    }

    pub fn fetch_block_by_tx_id(&self, tx_id: &str) -> Result<Block, LedgerStorageError> {
        Ok(acquire_read(&self.block_store).fetch_block_by_tx_id(tx_id)?)
    }

    /// Ledger metadata. The height reported here is always the block store height, never the private data
    /// store's.
    pub fn get_chain_metadata(&self) -> Result<ChainMetadata, LedgerStorageError> {
        let block_store = acquire_read(&self.block_store);
        let height = block_store.height();
        if height == 0 {
            return Ok(ChainMetadata::empty());
        }
        let best = block_store.fetch_block_by_number(height - 1)?;
        let previous_block_hash = if height >= 2 { Some(best.header.previous_hash) } else { None };
        Ok(ChainMetadata::new(height, Some(best.hash()), previous_block_hash))
    }

    /// Whether the private data store holds one block the block store does not (the footprint of an
    /// interrupted commit).
    pub fn is_pvt_store_ahead_of_block_store(&self) -> bool {
        let block_store_height = acquire_read(&self.block_store).height();
        let pvt_store_height = acquire_read(&self.pvt_store).last_committed_block_height();
        pvt_store_height > block_store_height
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Releases the underlying stores. Dropping the database has the same effect; this exists so shutdown
    /// shows up explicitly at call sites.
    pub fn shutdown(self) {
        debug!(target: LOG_TARGET, "Shut down storage for ledger '{}'", self.ledger_id);
    }

    #[cfg(test)]
    pub(crate) fn block_store_write(&self) -> RwLockWriteGuard<'_, B> {
        acquire_write(&self.block_store)
    }

    #[cfg(test)]
    pub(crate) fn pvt_store_write(&self) -> RwLockWriteGuard<'_, P> {
        acquire_write(&self.pvt_store)
    }
}

// Lock poisoning carries no state to protect here; the stores keep their own on-disk consistency.
fn acquire_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn acquire_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn acquire_mutex<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
