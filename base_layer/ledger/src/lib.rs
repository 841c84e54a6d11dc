// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! # Tessera ledger storage
//!
//! Persistence for a Tessera peer's ledgers. Each ledger is backed by two independently persisted stores: an
//! append-only block store and a private data store. The [`ledger_storage::LedgerDatabase`] coordinates commits
//! across the two so that a block and its private data appear to commit atomically, recovers from crashes that
//! interrupt a commit between the stores, and serves read views that join block data with private data.

pub mod blocks;
pub mod ledger_storage;
