// src/core/storage/sled_store.rs

//! A durable backend built on `sled`, with one tree per column family.
//!
//! Batches spanning both trees commit through a multi-tree sled transaction, so
//! a metadata update and its element writes become visible together.

use super::engine::{BatchOp, ColumnFamily, ReadOptions, Storage, StorageIter, WriteBatch};
use crate::core::SpinelKvError;
use bytes::Bytes;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    metadata: sled::Tree,
    elements: sled::Tree,
}

/// Tuning options passed through to `sled::Config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SledOptions {
    /// Page cache size in bytes.
    pub cache_capacity_bytes: u64,
    /// Background flush interval; `None` disables periodic flushing.
    pub flush_every_ms: Option<u64>,
    /// Create a throwaway database that is removed on drop.
    pub temporary: bool,
}

impl Default for SledOptions {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
            temporary: false,
        }
    }
}

impl SledStorage {
    /// Opens (or creates) a sled database at `path`.
    pub fn open(path: impl AsRef<Path>, options: SledOptions) -> Result<Self, SpinelKvError> {
        let path = path.as_ref();
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(options.cache_capacity_bytes)
            .flush_every_ms(options.flush_every_ms)
            .temporary(options.temporary)
            .open()?;
        let storage = Self::from_db(db)?;
        info!(
            "Opened sled storage at {} (recovered: {})",
            path.display(),
            storage.db.was_recovered()
        );
        Ok(storage)
    }

    /// Wraps an already opened sled database.
    pub fn from_db(db: sled::Db) -> Result<Self, SpinelKvError> {
        let metadata = db.open_tree(ColumnFamily::Metadata.name())?;
        let elements = db.open_tree(ColumnFamily::Elements.name())?;
        Ok(Self {
            db,
            metadata,
            elements,
        })
    }

    fn tree(&self, cf: ColumnFamily) -> &sled::Tree {
        match cf {
            ColumnFamily::Metadata => &self.metadata,
            ColumnFamily::Elements => &self.elements,
        }
    }

    /// Number of records in a column family, across all versions.
    pub fn record_count(&self, cf: ColumnFamily) -> usize {
        self.tree(cf).len()
    }
}

fn select<'t>(
    cf: ColumnFamily,
    metadata: &'t TransactionalTree,
    elements: &'t TransactionalTree,
) -> &'t TransactionalTree {
    match cf {
        ColumnFamily::Metadata => metadata,
        ColumnFamily::Elements => elements,
    }
}

impl Storage for SledStorage {
    fn get(
        &self,
        cf: ColumnFamily,
        key: &[u8],
        _opts: &ReadOptions,
    ) -> Result<Option<Bytes>, SpinelKvError> {
        // sled manages its page cache internally; `fill_cache` is only a hint.
        Ok(self
            .tree(cf)
            .get(key)?
            .map(|v| Bytes::copy_from_slice(&v)))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), SpinelKvError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.ops();
        (&self.metadata, &self.elements)
            .transaction(|(metadata, elements)| {
                for op in ops {
                    let tree = select(op.cf(), metadata, elements);
                    match op {
                        BatchOp::Put { key, value, .. } => {
                            tree.insert(&key[..], &value[..])?;
                        }
                        BatchOp::Delete { key, .. } => {
                            tree.remove(&key[..])?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })?;
        Ok(())
    }

    fn iter_from<'a>(
        &'a self,
        cf: ColumnFamily,
        start: &[u8],
        _opts: &ReadOptions,
    ) -> Result<StorageIter<'a>, SpinelKvError> {
        let iter = self.tree(cf).range(start.to_vec()..).map(|item| {
            item.map(|(k, v)| (Bytes::copy_from_slice(&k), Bytes::copy_from_slice(&v)))
                .map_err(SpinelKvError::from)
        });
        Ok(Box::new(iter))
    }

    fn flush(&self) -> Result<(), SpinelKvError> {
        self.db.flush()?;
        Ok(())
    }
}
