// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Error, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::{to_hex, BlockHash};

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct ChainMetadata {
    /// The number of blocks committed to the ledger. This is also the number of the next block to be committed.
    height: u64,
    /// The block hash of the current ledger tip, or `None` while the ledger is empty.
    best_block_hash: Option<BlockHash>,
    /// The block hash referenced by the tip block's header, or `None` while the ledger holds fewer than two blocks.
    previous_block_hash: Option<BlockHash>,
}

impl ChainMetadata {
    pub fn new(height: u64, best_block_hash: Option<BlockHash>, previous_block_hash: Option<BlockHash>) -> Self {
        Self {
            height,
            best_block_hash,
            previous_block_hash,
        }
    }

    /// Metadata for a ledger that has no committed blocks yet.
    pub fn empty() -> Self {
        Self {
            height: 0,
            best_block_hash: None,
            previous_block_hash: None,
        }
    }

    /// Returns the number of committed blocks.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn best_block_hash(&self) -> Option<&BlockHash> {
        self.best_block_hash.as_ref()
    }

    pub fn previous_block_hash(&self) -> Option<&BlockHash> {
        self.previous_block_hash.as_ref()
    }
}

impl Display for ChainMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        writeln!(f, "Height: {}", self.height)?;
        match self.best_block_hash {
            Some(ref hash) => writeln!(f, "Best block: {}", to_hex(hash))?,
            None => writeln!(f, "Best block: none")?,
        }
        Ok(())
    }
}
