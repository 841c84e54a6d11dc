// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! Private data structures: per-transaction write sets, missing-data bookkeeping and the read filter.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::blocks::Block;

/// Private write set payload for a single collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPvtWriteSet {
    pub collection: String,
    pub payload: Vec<u8>,
}

/// Ordered collection write sets within one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsPvtWriteSet {
    pub namespace: String,
    pub collections: Vec<CollectionPvtWriteSet>,
}

/// The ordered namespace write sets disseminated for one transaction. Order is preserved through storage and
/// filtering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPvtWriteSet {
    pub ns_writes: Vec<NsPvtWriteSet>,
}

impl TxPvtWriteSet {
    pub fn is_empty(&self) -> bool {
        self.ns_writes.is_empty()
    }

    /// Applies `filter`: a namespace entry is retained iff at least one of its collections is allowed, and
    /// within a retained namespace only allowed collections remain. Entry order is preserved, so applying the
    /// same filter twice is a no-op.
    pub fn filtered(&self, filter: &PvtNsCollFilter) -> TxPvtWriteSet {
        let ns_writes = self
            .ns_writes
            .iter()
            .filter_map(|ns| {
                let collections: Vec<_> = ns
                    .collections
                    .iter()
                    .filter(|coll| filter.contains(&ns.namespace, &coll.collection))
                    .cloned()
                    .collect();
                if collections.is_empty() {
                    None
                } else {
                    Some(NsPvtWriteSet {
                        namespace: ns.namespace.clone(),
                        collections,
                    })
                }
            })
            .collect();
        TxPvtWriteSet { ns_writes }
    }
}

/// Private write sets disseminated for the transaction at `seq_in_block` within its block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPvtData {
    pub seq_in_block: u64,
    pub write_set: TxPvtWriteSet,
}

/// A single expected-but-absent private data record. `is_eligible` marks whether this peer is a member of the
/// collection and should attempt to fetch the data from its peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPvtData {
    pub namespace: String,
    pub collection: String,
    pub is_eligible: bool,
}

/// Missing private data per transaction sequence number within one block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPvtDataMap(BTreeMap<u64, Vec<MissingPvtData>>);

impl MissingPvtDataMap {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add<N: Into<String>, C: Into<String>>(
        &mut self,
        seq_in_block: u64,
        namespace: N,
        collection: C,
        is_eligible: bool,
    ) {
        self.0.entry(seq_in_block).or_default().push(MissingPvtData {
            namespace: namespace.into(),
            collection: collection.into(),
            is_eligible,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[MissingPvtData])> {
        self.0.iter().map(|(seq, entries)| (*seq, entries.as_slice()))
    }

    /// Drops the entries for which `retain` returns false, removing emptied transaction slots.
    pub fn retain<F: FnMut(u64, &MissingPvtData) -> bool>(&mut self, mut retain: F) {
        for (seq, entries) in self.0.iter_mut() {
            entries.retain(|entry| retain(*seq, entry));
        }
        self.0.retain(|_, entries| !entries.is_empty());
    }
}

/// Read filter restricting private data to a set of `(namespace, collection)` pairs. An absent filter is the
/// identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PvtNsCollFilter(HashMap<String, HashSet<String>>);

impl PvtNsCollFilter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add<N: Into<String>, C: Into<String>>(&mut self, namespace: N, collection: C) {
        self.0.entry(namespace.into()).or_default().insert(collection.into());
    }

    pub fn contains(&self, namespace: &str, collection: &str) -> bool {
        self.0
            .get(namespace)
            .map(|colls| colls.contains(collection))
            .unwrap_or(false)
    }
}

/// A block joined with the private data committed (or expected) alongside it. `pvt_data` is keyed by the
/// transaction's sequence number in the block; transactions without private data have no entry.
#[derive(Clone, Debug)]
pub struct BlockAndPvtData {
    pub block: Block,
    pub pvt_data: BTreeMap<u64, TxPvtData>,
    pub missing_pvt_data: MissingPvtDataMap,
}

impl BlockAndPvtData {
    /// A block with no private data and nothing known to be missing.
    pub fn new(block: Block) -> Self {
        Self {
            block,
            pvt_data: BTreeMap::new(),
            missing_pvt_data: MissingPvtDataMap::new(),
        }
    }
}

/// Summary of missing private data over a range of blocks, keyed by block number and then by tx sequence,
/// listing the `(namespace, collection)` pairs absent for each transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingPvtDataInfo(BTreeMap<u64, BTreeMap<u64, Vec<(String, String)>>>);

impl MissingPvtDataInfo {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add<N: Into<String>, C: Into<String>>(&mut self, block_num: u64, seq_in_block: u64, namespace: N, collection: C) {
        self.0
            .entry(block_num)
            .or_default()
            .entry(seq_in_block)
            .or_default()
            .push((namespace.into(), collection.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn num_blocks(&self) -> usize {
        self.0.len()
    }

    pub fn block(&self, block_num: u64) -> Option<&BTreeMap<u64, Vec<(String, String)>>> {
        self.0.get(&block_num)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BTreeMap<u64, Vec<(String, String)>>)> {
        self.0.iter().map(|(block_num, txs)| (*block_num, txs))
    }
}
