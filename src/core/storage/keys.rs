// src/core/storage/keys.rs

//! Composite keys for records in the `elements` column family.
//!
//! Layout: `[key_len: u32 BE][user key][version: u64 BE][sub key]`.
//! The length prefix keeps one user key from being a byte-prefix of another,
//! and the `[key_len][key][version]` head identifies exactly one incarnation
//! of a collection. Everything after it sorts bytewise, so list sub keys are
//! the 8-byte big-endian synthetic index.

use crate::core::SpinelKvError;
use bytes::{BufMut, Bytes, BytesMut};

const KEY_LEN_SIZE: usize = 4;
const VERSION_SIZE: usize = 8;

fn malformed(raw: &[u8]) -> SpinelKvError {
    SpinelKvError::DataCorruption(format!("malformed internal key {}", hex::encode(raw)))
}

/// Encodes `(key, version, sub_key)` into one comparable byte string.
pub fn encode_internal_key(key: &[u8], version: u64, sub_key: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(KEY_LEN_SIZE + key.len() + VERSION_SIZE + sub_key.len());
    buf.put_u32(key.len() as u32);
    buf.put_slice(key);
    buf.put_u64(version);
    buf.put_slice(sub_key);
    buf.freeze()
}

/// The prefix shared by every record of one collection incarnation.
pub fn version_prefix(key: &[u8], version: u64) -> Bytes {
    encode_internal_key(key, version, &[])
}

/// The element key of list slot `index`.
pub fn list_element_key(key: &[u8], version: u64, index: u64) -> Bytes {
    encode_internal_key(key, version, &index.to_be_bytes())
}

/// Extracts the synthetic index from a list element key sharing `prefix`.
pub fn decode_list_index(raw: &[u8], prefix: &[u8]) -> Result<u64, SpinelKvError> {
    let sub_key = raw.strip_prefix(prefix).ok_or_else(|| malformed(raw))?;
    let bytes: [u8; 8] = sub_key.try_into().map_err(|_| malformed(raw))?;
    Ok(u64::from_be_bytes(bytes))
}
