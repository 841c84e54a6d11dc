// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

use blake2::Blake2b;
use digest::consts::U32;

pub const BLOCK_HASH_LENGTH: usize = 32;

/// Identifier for a committed block, the digest of its encoded header.
pub type BlockHash = FixedHash;

pub type FixedHash = [u8; BLOCK_HASH_LENGTH];

/// Specify the hash function for general hashing in the base layer.
pub type HashDigest = Blake2b<U32>;

/// Hex representation used when rendering hashes in logs and errors.
pub fn to_hex(hash: &FixedHash) -> String {
    hex::encode(hash)
}
