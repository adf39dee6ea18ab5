// src/core/database/core.rs

use super::locking::KeyLocks;
use crate::config::{Config, StorageBackend};
use crate::core::SpinelKvError;
use crate::core::storage::metadata::MetadataHeader;
use crate::core::storage::{
    ColumnFamily, MemoryStorage, MetadataLookup, MetadataRecord, ReadOptions, RedisType,
    SledOptions, SledStorage, Storage, WriteBatch,
};
use std::sync::Arc;
use tracing::{debug, info};

/// The default number of writer lock stripes.
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// `Db` is the entry point for every collection operation. It owns the shared
/// storage backend and the per-key writer locks.
#[derive(Debug, Clone)]
pub struct Db {
    storage: Arc<dyn Storage>,
    pub(super) locks: Arc<KeyLocks>,
}

/// Selects one end of a list.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Side {
    Left,
    Right,
}

impl Db {
    /// Creates a `Db` over an existing storage backend.
    pub fn new(storage: Arc<dyn Storage>, lock_stripes: usize) -> Self {
        Self {
            storage,
            locks: Arc::new(KeyLocks::new(lock_stripes)),
        }
    }

    /// Creates a `Db` backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::default()), DEFAULT_LOCK_STRIPES)
    }

    /// Builds the storage backend described by `config` and wraps it.
    pub fn open(config: &Config) -> Result<Self, SpinelKvError> {
        let storage_config = &config.storage;
        let storage: Arc<dyn Storage> = match storage_config.backend {
            StorageBackend::Memory => {
                info!(
                    "Using in-memory storage (read cache: {} entries)",
                    storage_config.block_cache_capacity
                );
                Arc::new(MemoryStorage::new(storage_config.block_cache_capacity))
            }
            StorageBackend::Sled => Arc::new(SledStorage::open(
                &storage_config.path,
                SledOptions {
                    cache_capacity_bytes: storage_config.sled_cache_bytes,
                    flush_every_ms: (storage_config.flush_every_ms > 0)
                        .then_some(storage_config.flush_every_ms),
                    temporary: false,
                },
            )?),
        };
        Ok(Self::new(storage, storage_config.lock_stripes))
    }

    /// The underlying storage backend.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Reads and decodes the metadata record of `key` for collection type `M`.
    ///
    /// Absence is reported as `MetadataLookup::Empty`; a record of another type
    /// fails with `WrongType`.
    pub fn get_metadata<M: MetadataRecord>(
        &self,
        key: &[u8],
    ) -> Result<MetadataLookup<M>, SpinelKvError> {
        match self
            .storage
            .get(ColumnFamily::Metadata, key, &ReadOptions::default())?
        {
            None => Ok(MetadataLookup::Empty),
            Some(raw) => M::decode(&raw).map(MetadataLookup::Present),
        }
    }

    /// Returns the type of the value stored at `key`, if any.
    pub fn key_type(&self, key: &[u8]) -> Result<Option<RedisType>, SpinelKvError> {
        let raw = self
            .storage
            .get(ColumnFamily::Metadata, key, &ReadOptions::default())?;
        raw.map(|raw| MetadataHeader::decode(&raw).map(|(header, _)| header.kind))
            .transpose()
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool, SpinelKvError> {
        Ok(self.key_type(key)?.is_some())
    }

    /// Deletes `key` regardless of its type. Element records are not touched:
    /// they become unreachable because any recreated key gets a new version.
    pub fn del(&self, key: &[u8]) -> Result<bool, SpinelKvError> {
        let _guard = self.locks.lock(key);
        if !self.exists(key)? {
            return Ok(false);
        }
        self.storage.delete(ColumnFamily::Metadata, key)?;
        debug!("Deleted key '{}'", display_key(key));
        Ok(true)
    }

    /// Commits a batch, skipping the round trip when it is empty.
    pub(super) fn commit(&self, batch: WriteBatch) -> Result<(), SpinelKvError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.storage.write(batch)
    }

    /// Forces buffered writes to durable media.
    pub fn flush(&self) -> Result<(), SpinelKvError> {
        self.storage.flush()
    }
}

/// Formats a user key for log output, falling back to hex for binary keys.
pub(super) fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) => s.to_string(),
        Err(_) => format!("0x{}", hex::encode(key)),
    }
}
