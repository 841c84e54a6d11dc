// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! Common types shared between the Tessera base layer crates.

pub mod chain_metadata;
pub mod transaction;
pub mod types;
