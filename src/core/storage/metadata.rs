// src/core/storage/metadata.rs

//! Metadata records stored in the `metadata` column family, one per user key.
//!
//! Every record starts with a common header `[type: u8][version: u64][size: u64]`
//! (big-endian). Collection types append their own fields; lists append
//! `[head: u64][tail: u64]`.

use crate::core::SpinelKvError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Synthetic index at which every new list starts, leaving room for
/// practically unbounded growth in both directions.
pub const INDEX_MIDPOINT: u64 = u64::MAX / 2;

const HEADER_SIZE: usize = 1 + 8 + 8;
const LIST_EXTRA_SIZE: usize = 8 + 8;

/// The type discriminator stored in the first byte of every metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RedisType {
    String = 0,
    Hash = 1,
    Set = 2,
    List = 3,
    ZSet = 4,
}

impl RedisType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RedisType::String),
            1 => Some(RedisType::Hash),
            2 => Some(RedisType::Set),
            3 => Some(RedisType::List),
            4 => Some(RedisType::ZSet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedisType::String => "string",
            RedisType::Hash => "hash",
            RedisType::Set => "set",
            RedisType::List => "list",
            RedisType::ZSet => "zset",
        }
    }
}

/// The fields shared by every metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataHeader {
    pub kind: RedisType,
    pub version: u64,
    pub size: u64,
}

impl MetadataHeader {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind as u8);
        buf.put_u64(self.version);
        buf.put_u64(self.size);
    }

    /// Decodes the header and returns it together with the type-specific tail.
    pub fn decode(raw: &[u8]) -> Result<(Self, &[u8]), SpinelKvError> {
        if raw.len() < HEADER_SIZE {
            return Err(SpinelKvError::DataCorruption(format!(
                "metadata record too short: {} bytes",
                raw.len()
            )));
        }
        let mut buf = raw;
        let type_byte = buf.get_u8();
        let kind = RedisType::from_u8(type_byte).ok_or_else(|| {
            SpinelKvError::DataCorruption(format!("unknown metadata type {type_byte}"))
        })?;
        let version = buf.get_u64();
        let size = buf.get_u64();
        Ok((
            Self {
                kind,
                version,
                size,
            },
            buf,
        ))
    }
}

/// A metadata record of one concrete collection type.
pub trait MetadataRecord: Sized {
    const TYPE: RedisType;

    /// Metadata for a key being created right now, with a fresh version.
    fn fresh() -> Self;

    fn encode(&self) -> Bytes;

    /// Decodes a record whose header has already been checked against `TYPE`.
    fn decode_body(header: MetadataHeader, body: &[u8]) -> Result<Self, SpinelKvError>;

    /// Decodes a raw record, failing with `WrongType` if it belongs to another type.
    fn decode(raw: &[u8]) -> Result<Self, SpinelKvError> {
        let (header, body) = MetadataHeader::decode(raw)?;
        if header.kind != Self::TYPE {
            return Err(SpinelKvError::WrongType);
        }
        Self::decode_body(header, body)
    }
}

/// Outcome of a metadata lookup. Absence is an ordinary state, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLookup<M> {
    Empty,
    Present(M),
}

impl<M> MetadataLookup<M> {
    pub fn into_option(self) -> Option<M> {
        match self {
            MetadataLookup::Empty => None,
            MetadataLookup::Present(m) => Some(m),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MetadataLookup::Empty)
    }

    /// Converts absence into `KeyNotFound` for operations that need an existing key.
    pub fn require(self) -> Result<M, SpinelKvError> {
        self.into_option().ok_or(SpinelKvError::KeyNotFound)
    }
}

/// Metadata of one list: the live synthetic window `[head, tail)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMetadata {
    pub version: u64,
    pub head: u64,
    pub tail: u64,
    pub size: u64,
}

impl ListMetadata {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            head: INDEX_MIDPOINT,
            tail: INDEX_MIDPOINT,
            size: 0,
        }
    }

    /// The synthetic index of logical position `pos`.
    pub fn slot(&self, pos: u64) -> u64 {
        self.head + pos
    }

    /// Normalizes a possibly negative logical index. Returns `None` when out of range.
    pub fn resolve_index(&self, index: i64) -> Option<u64> {
        let size = self.size as i64;
        let index = if index < 0 { index + size } else { index };
        (0..size).contains(&index).then_some(index as u64)
    }
}

impl MetadataRecord for ListMetadata {
    const TYPE: RedisType = RedisType::List;

    fn fresh() -> Self {
        Self::new(generate_version())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + LIST_EXTRA_SIZE);
        MetadataHeader {
            kind: Self::TYPE,
            version: self.version,
            size: self.size,
        }
        .put(&mut buf);
        buf.put_u64(self.head);
        buf.put_u64(self.tail);
        buf.freeze()
    }

    fn decode_body(header: MetadataHeader, mut body: &[u8]) -> Result<Self, SpinelKvError> {
        if body.len() < LIST_EXTRA_SIZE {
            return Err(SpinelKvError::DataCorruption(
                "list metadata is missing head/tail".to_string(),
            ));
        }
        let head = body.get_u64();
        let tail = body.get_u64();
        if tail.checked_sub(head) != Some(header.size) {
            return Err(SpinelKvError::DataCorruption(format!(
                "list metadata window [{head}, {tail}) disagrees with size {}",
                header.size
            )));
        }
        Ok(Self {
            version: header.version,
            head,
            tail,
            size: header.size,
        })
    }
}

fn version_counter() -> &'static AtomicU64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    COUNTER.get_or_init(|| AtomicU64::new(rand::thread_rng().r#gen::<u64>()))
}

/// Generates a version for a newly created key: microseconds since the epoch
/// in the high bits, an 11-bit rolling counter in the low bits.
pub fn generate_version() -> u64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    let counter = version_counter().fetch_add(1, Ordering::Relaxed);
    (micros << 11) | (counter & 0x7ff)
}
