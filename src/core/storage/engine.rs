// src/core/storage/engine.rs

//! The contract every ordered key-value backend must satisfy.
//!
//! A backend exposes two logically separate keyspaces ("column families"),
//! point reads and writes, an atomic multi-operation batch commit, and a forward
//! iterator that can seek to an arbitrary key.

use crate::core::SpinelKvError;
use bytes::Bytes;
use std::fmt;

/// The logical namespaces stored side by side in one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnFamily {
    /// One record per user key, holding the encoded metadata.
    Metadata,
    /// One record per collection element, keyed by the composite internal key.
    Elements,
}

impl ColumnFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Metadata => "metadata",
            ColumnFamily::Elements => "elements",
        }
    }
}

impl fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-read tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether values read should be inserted into the backend's read cache.
    /// Large one-shot scans turn this off.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

impl ReadOptions {
    /// Options for a sequential scan that should not evict hot entries.
    pub fn bulk_scan() -> Self {
        Self { fill_cache: false }
    }
}

/// A single mutation staged in a `WriteBatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        cf: ColumnFamily,
        key: Bytes,
        value: Bytes,
    },
    Delete {
        cf: ColumnFamily,
        key: Bytes,
    },
}

impl BatchOp {
    pub fn cf(&self) -> ColumnFamily {
        match self {
            BatchOp::Put { cf, .. } | BatchOp::Delete { cf, .. } => *cf,
        }
    }

    pub fn key(&self) -> &Bytes {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key, .. } => key,
        }
    }
}

/// An ordered set of mutations committed all-or-nothing by `Storage::write`.
/// Later operations on the same key win over earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, cf: ColumnFamily, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.ops.push(BatchOp::Put {
            cf,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, cf: ColumnFamily, key: impl Into<Bytes>) {
        self.ops.push(BatchOp::Delete { cf, key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// A forward iterator over `(key, value)` pairs of one column family.
pub type StorageIter<'a> = Box<dyn Iterator<Item = Result<(Bytes, Bytes), SpinelKvError>> + 'a>;

/// The ordered key-value store the collection engines are built on.
///
/// Implementations must guarantee that a committed `WriteBatch` is visible
/// either entirely or not at all, and that an iterator observes a single
/// consistent view of the column family it scans.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Point read. `Ok(None)` means the key is absent.
    fn get(
        &self,
        cf: ColumnFamily,
        key: &[u8],
        opts: &ReadOptions,
    ) -> Result<Option<Bytes>, SpinelKvError>;

    /// Commits every operation in `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), SpinelKvError>;

    /// Returns an iterator positioned at the first key `>= start` in `cf`.
    fn iter_from<'a>(
        &'a self,
        cf: ColumnFamily,
        start: &[u8],
        opts: &ReadOptions,
    ) -> Result<StorageIter<'a>, SpinelKvError>;

    /// Single-key write.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> Result<(), SpinelKvError> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put(cf, Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        self.write(batch)
    }

    /// Single-key delete. Deleting an absent key is not an error.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> Result<(), SpinelKvError> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete(cf, Bytes::copy_from_slice(key));
        self.write(batch)
    }

    /// Forces buffered writes to durable media. A no-op for volatile backends.
    fn flush(&self) -> Result<(), SpinelKvError> {
        Ok(())
    }
}
