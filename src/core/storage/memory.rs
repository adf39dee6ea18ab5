// src/core/storage/memory.rs

//! A volatile, snapshotting in-memory backend.
//!
//! Both column families live in one `Tables` value behind an `Arc`. Writers
//! copy-on-write through `Arc::make_mut`, so an iterator that captured the
//! previous `Arc` keeps scanning a frozen view while batches commit.

use super::engine::{BatchOp, ColumnFamily, ReadOptions, Storage, StorageIter, WriteBatch};
use crate::core::SpinelKvError;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type CacheKey = (ColumnFamily, Bytes);

#[derive(Debug, Clone, Default)]
struct Tables {
    metadata: BTreeMap<Bytes, Bytes>,
    elements: BTreeMap<Bytes, Bytes>,
}

impl Tables {
    fn table(&self, cf: ColumnFamily) -> &BTreeMap<Bytes, Bytes> {
        match cf {
            ColumnFamily::Metadata => &self.metadata,
            ColumnFamily::Elements => &self.elements,
        }
    }

    fn table_mut(&mut self, cf: ColumnFamily) -> &mut BTreeMap<Bytes, Bytes> {
        match cf {
            ColumnFamily::Metadata => &mut self.metadata,
            ColumnFamily::Elements => &mut self.elements,
        }
    }
}

/// Read-cache counters, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fills: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct MemoryStorage {
    tables: RwLock<Arc<Tables>>,
    /// `None` when the configured capacity is zero.
    cache: Option<Mutex<LruCache<CacheKey, Bytes>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MemoryStorage {
    /// Creates an empty store with a read cache of `cache_capacity` entries.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            tables: RwLock::new(Arc::new(Tables::default())),
            cache: NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fills: AtomicU64::new(0),
        }
    }

    /// Number of live records in a column family, across all versions.
    pub fn record_count(&self, cf: ColumnFamily) -> usize {
        self.tables.read().table(cf).len()
    }

    /// Returns every record in a column family whose key starts with `prefix`.
    pub fn records_with_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> Vec<(Bytes, Bytes)> {
        let guard = self.tables.read();
        guard
            .table(cf)
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            entries: self.cache.as_ref().map_or(0, |c| c.lock().len()),
        }
    }

    /// Inserts a value read from `snapshot` into the cache, but only if that
    /// snapshot is still the current state; a stale value must never be cached.
    fn fill_from_snapshot(&self, snapshot: &Arc<Tables>, cf: ColumnFamily, key: &Bytes, value: &Bytes) {
        let Some(cache) = &self.cache else {
            return;
        };
        let current = self.tables.read();
        if Arc::ptr_eq(&*current, snapshot) {
            cache.lock().put((cf, key.clone()), value.clone());
            self.fills.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Storage for MemoryStorage {
    fn get(
        &self,
        cf: ColumnFamily,
        key: &[u8],
        opts: &ReadOptions,
    ) -> Result<Option<Bytes>, SpinelKvError> {
        let cache_key = (cf, Bytes::copy_from_slice(key));
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.lock().get(&cache_key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(value.clone()));
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        // The read lock is held across the cache fill so no writer can slip in
        // between the lookup and the insert.
        let guard = self.tables.read();
        let value = guard.table(cf).get(key).cloned();
        if opts.fill_cache
            && let (Some(cache), Some(v)) = (&self.cache, &value)
        {
            cache.lock().put(cache_key, v.clone());
            self.fills.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), SpinelKvError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut guard = self.tables.write();
        let tables = Arc::make_mut(&mut *guard);
        let mut cache = self.cache.as_ref().map(|c| c.lock());
        for op in batch.into_ops() {
            if let Some(cache) = cache.as_mut() {
                cache.pop(&(op.cf(), op.key().clone()));
            }
            match op {
                BatchOp::Put { cf, key, value } => {
                    tables.table_mut(cf).insert(key, value);
                }
                BatchOp::Delete { cf, key } => {
                    tables.table_mut(cf).remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter_from<'a>(
        &'a self,
        cf: ColumnFamily,
        start: &[u8],
        opts: &ReadOptions,
    ) -> Result<StorageIter<'a>, SpinelKvError> {
        let snapshot = Arc::clone(&*self.tables.read());
        Ok(Box::new(SnapshotIter {
            store: self,
            snapshot,
            cf,
            lower: Bound::Included(Bytes::copy_from_slice(start)),
            fill_cache: opts.fill_cache,
        }))
    }
}

/// Walks a frozen `Tables` snapshot, re-seeking past the last returned key.
struct SnapshotIter<'a> {
    store: &'a MemoryStorage,
    snapshot: Arc<Tables>,
    cf: ColumnFamily,
    lower: Bound<Bytes>,
    fill_cache: bool,
}

impl Iterator for SnapshotIter<'_> {
    type Item = Result<(Bytes, Bytes), SpinelKvError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self
            .snapshot
            .table(self.cf)
            .range((self.lower.clone(), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))?;
        self.lower = Bound::Excluded(key.clone());
        if self.fill_cache {
            self.store
                .fill_from_snapshot(&self.snapshot, self.cf, &key, &value);
        }
        Some(Ok((key, value)))
    }
}
