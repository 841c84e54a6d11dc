// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use tessera_common_types::transaction::TxValidationCode;

use crate::blocks::block::BlockError;

/// Per-block metadata recorded by the validation pipeline. Currently this carries the transaction validation
/// flag vector: one [`TxValidationCode`] byte per transaction, indexed by position in the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    tx_validation_flags: Vec<u8>,
}

impl BlockMetadata {
    /// Metadata for a block of `num_txs` transactions, all flagged [`TxValidationCode::NotValidated`].
    pub fn new(num_txs: usize) -> Self {
        Self {
            tx_validation_flags: vec![TxValidationCode::NotValidated.as_byte(); num_txs],
        }
    }

    pub fn num_txs(&self) -> usize {
        self.tx_validation_flags.len()
    }

    pub fn set_validation_code(&mut self, tx_index: usize, code: TxValidationCode) -> Result<(), BlockError> {
        let num_txs = self.num_txs();
        let flag = self
            .tx_validation_flags
            .get_mut(tx_index)
            .ok_or(BlockError::TxIndexOutOfRange { tx_index, num_txs })?;
        *flag = code.as_byte();
        Ok(())
    }

    pub fn validation_code(&self, tx_index: usize) -> Result<TxValidationCode, BlockError> {
        let byte = self
            .tx_validation_flags
            .get(tx_index)
            .copied()
            .ok_or(BlockError::TxIndexOutOfRange {
                tx_index,
                num_txs: self.num_txs(),
            })?;
        TxValidationCode::try_from(byte).map_err(|e| BlockError::InvalidValidationFlag {
            tx_index,
            code: e.code,
        })
    }

    /// Whether the transaction at `tx_index` passed validation. Out-of-range indexes report `false`.
    pub fn is_valid(&self, tx_index: usize) -> bool {
        self.validation_code(tx_index).map(|c| c.is_valid()).unwrap_or(false)
    }
}
