// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

//! Record framing shared by the file-backed stores.
//!
//! Each record is laid out as `varint(payload length) || crc32(payload) || payload`. The checksum lets an
//! interrupted append be distinguished from on-disk corruption: a record that fails to parse at the tail of the
//! active file is a torn write and is dropped, anywhere else it is corruption.

use integer_encoding::VarInt;

const CRC_LEN: usize = 4;

/// Outcome of decoding the record at the head of `buf`.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome<'a> {
    /// A complete record: the payload plus the total number of framed bytes consumed.
    Record { payload: &'a [u8], consumed: usize },
    /// The buffer ends before the record does.
    Incomplete,
    /// The record is fully framed but its checksum does not match the payload. `consumed` is the framed length,
    /// letting the caller tell a failure at the tail from one mid-file.
    BadChecksum { consumed: usize },
}

pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let len_prefix = (payload.len() as u64).encode_var_vec();
    let mut record = Vec::with_capacity(len_prefix.len() + CRC_LEN + payload.len());
    record.extend_from_slice(&len_prefix);
    record.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    record.extend_from_slice(payload);
    record
}

pub fn decode_record(buf: &[u8]) -> DecodeOutcome<'_> {
    let (payload_len, varint_len) = match u64::decode_var(buf) {
        Some(decoded) => decoded,
        None => return DecodeOutcome::Incomplete,
    };
    let payload_len = payload_len as usize;
    let payload_start = varint_len + CRC_LEN;
    // A garbage length (e.g. from a torn varint) can exceed the address space.
    let record_len = match payload_start.checked_add(payload_len) {
        Some(len) => len,
        None => return DecodeOutcome::Incomplete,
    };
    if buf.len() < record_len {
        return DecodeOutcome::Incomplete;
    }
    let mut crc_bytes = [0u8; CRC_LEN];
    crc_bytes.copy_from_slice(&buf[varint_len..payload_start]);
    let payload = &buf[payload_start..payload_start + payload_len];
    if crc32fast::hash(payload) != u32::from_le_bytes(crc_bytes) {
        return DecodeOutcome::BadChecksum { consumed: record_len };
    }
    DecodeOutcome::Record {
        payload,
        consumed: payload_start + payload_len,
    }
}
