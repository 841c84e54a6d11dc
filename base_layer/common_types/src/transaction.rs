// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    convert::TryFrom,
    fmt,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The outcome of validating a transaction within a block. One code is recorded per transaction in the block
/// metadata. Validity is an annotation on the block; an invalid transaction is still part of the committed block.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxValidationCode {
    /// The transaction passed the full validation pipeline.
    Valid = 0,
    /// The transaction envelope could not be decoded.
    BadEnvelope = 1,
    /// A key read by the transaction was modified by an earlier transaction in the same or a previous block.
    MvccReadConflict = 2,
    /// A range read by the transaction was modified by an earlier transaction.
    PhantomReadConflict = 3,
    /// The transaction did not satisfy the endorsement policy of a namespace it writes to.
    EndorsementPolicyFailure = 4,
    /// Another transaction with the same id was committed earlier.
    DuplicateTxId = 5,
    /// The write set was malformed.
    BadWriteSet = 6,
    /// The transaction has not been through the validation pipeline.
    #[default]
    NotValidated = 255,
}

impl TxValidationCode {
    pub fn is_valid(self) -> bool {
        self == TxValidationCode::Valid
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
#[error("Invalid TxValidationCode: {code}")]
pub struct TxValidationCodeConversionError {
    pub code: u8,
}

impl TryFrom<u8> for TxValidationCode {
    type Error = TxValidationCodeConversionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TxValidationCode::Valid),
            1 => Ok(TxValidationCode::BadEnvelope),
            2 => Ok(TxValidationCode::MvccReadConflict),
            3 => Ok(TxValidationCode::PhantomReadConflict),
            4 => Ok(TxValidationCode::EndorsementPolicyFailure),
            5 => Ok(TxValidationCode::DuplicateTxId),
            6 => Ok(TxValidationCode::BadWriteSet),
            255 => Ok(TxValidationCode::NotValidated),
            code => Err(TxValidationCodeConversionError { code }),
        }
    }
}

impl Display for TxValidationCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TxValidationCode::Valid => write!(f, "Valid"),
            TxValidationCode::BadEnvelope => write!(f, "Bad envelope"),
            TxValidationCode::MvccReadConflict => write!(f, "MVCC read conflict"),
            TxValidationCode::PhantomReadConflict => write!(f, "Phantom read conflict"),
            TxValidationCode::EndorsementPolicyFailure => write!(f, "Endorsement policy failure"),
            TxValidationCode::DuplicateTxId => write!(f, "Duplicate transaction id"),
            TxValidationCode::BadWriteSet => write!(f, "Bad write set"),
            TxValidationCode::NotValidated => write!(f, "Not validated"),
        }
    }
}
