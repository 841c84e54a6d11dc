// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::fmt::{Display, Error, Formatter};

use digest::Digest;
use serde::{Deserialize, Serialize};
use tessera_common_types::types::{to_hex, BlockHash, FixedHash, HashDigest};

/// Header of a Tessera block. The header commits to the block's position in the chain and to its transaction
/// batch via `data_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position of this block in the ledger. Block numbers start at 0 and increase by one per block.
    pub number: u64,
    /// Hash of the previous block's header. All zeroes for block 0.
    pub previous_hash: BlockHash,
    /// Digest over the ordered transaction batch.
    pub data_hash: FixedHash,
}

impl BlockHeader {
    pub fn new(number: u64, previous_hash: BlockHash, data_hash: FixedHash) -> Self {
        Self {
            number,
            previous_hash,
            data_hash,
        }
    }

    /// The identity of the block: a digest over the header fields.
    pub fn hash(&self) -> BlockHash {
        let mut digest = HashDigest::new();
        digest.update(self.number.to_le_bytes());
        digest.update(self.previous_hash);
        digest.update(self.data_hash);
        digest.finalize().into()
    }
}

impl Display for BlockHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Block #{} ({})", self.number, to_hex(&self.hash()))
    }
}
