// src/core/database/list.rs

//! The list engine.
//!
//! A list is a metadata record holding the live window `[head, tail)` of
//! synthetic indices plus one element record per index. Logical position `i`
//! lives at synthetic index `head + i`. Pushing moves `head` down or `tail` up;
//! popping moves them back. Every mutation stages its element writes and the
//! metadata update into a single `WriteBatch`.

use super::core::{Db, Side, display_key};
use crate::core::SpinelKvError;
use crate::core::storage::keys::{decode_list_index, list_element_key, version_prefix};
use crate::core::storage::{
    ColumnFamily, ListMetadata, MetadataLookup, MetadataRecord, ReadOptions, WriteBatch,
};
use bytes::Bytes;
use tracing::{debug, warn};

/// Result of a consistency check over one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReport {
    /// The size recorded in metadata.
    pub expected: u64,
    /// Element records found under the current version inside `[head, tail)`.
    pub found: u64,
    /// Logical positions in `[0, size)` without an element record.
    pub missing: Vec<u64>,
    /// Synthetic indices of records under the current version outside `[head, tail)`.
    pub outside_window: Vec<u64>,
}

impl ListReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.outside_window.is_empty() && self.found == self.expected
    }
}

impl Db {
    fn list_metadata(&self, key: &[u8]) -> Result<MetadataLookup<ListMetadata>, SpinelKvError> {
        self.get_metadata::<ListMetadata>(key)
    }

    /// Returns the number of elements in the list, or 0 if the key is absent.
    pub fn llen(&self, key: &[u8]) -> Result<u64, SpinelKvError> {
        Ok(self.list_metadata(key)?.into_option().map_or(0, |m| m.size))
    }

    // --- Push ---

    /// Pushes `elements` onto one end of the list. With `Side::Left` the
    /// elements are inserted one after another at the head, so the last one
    /// ends up first. Returns the new length.
    pub fn push(
        &self,
        key: &[u8],
        elements: &[Bytes],
        side: Side,
        create_if_missing: bool,
    ) -> Result<u64, SpinelKvError> {
        let _guard = self.locks.lock(key);
        let mut meta = match self.list_metadata(key)? {
            MetadataLookup::Present(meta) => meta,
            MetadataLookup::Empty if create_if_missing => ListMetadata::fresh(),
            MetadataLookup::Empty => return Err(SpinelKvError::KeyNotFound),
        };
        if elements.is_empty() {
            return Ok(meta.size);
        }

        let mut batch = WriteBatch::with_capacity(elements.len() + 1);
        stage_push(key, &mut meta, elements, side, &mut batch)?;
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;

        debug!(
            "Pushed {} element(s) to {:?} of list '{}', new length {}",
            elements.len(),
            side,
            display_key(key),
            meta.size
        );
        Ok(meta.size)
    }

    pub fn lpush(&self, key: &[u8], elements: &[Bytes]) -> Result<u64, SpinelKvError> {
        self.push(key, elements, Side::Left, true)
    }

    pub fn rpush(&self, key: &[u8], elements: &[Bytes]) -> Result<u64, SpinelKvError> {
        self.push(key, elements, Side::Right, true)
    }

    /// Like `lpush`, but fails with `KeyNotFound` instead of creating the list.
    pub fn lpushx(&self, key: &[u8], elements: &[Bytes]) -> Result<u64, SpinelKvError> {
        self.push(key, elements, Side::Left, false)
    }

    pub fn rpushx(&self, key: &[u8], elements: &[Bytes]) -> Result<u64, SpinelKvError> {
        self.push(key, elements, Side::Right, false)
    }

    // --- Pop ---

    /// Removes and returns the element at one end of the list.
    pub fn pop(&self, key: &[u8], side: Side) -> Result<Bytes, SpinelKvError> {
        let _guard = self.locks.lock(key);
        let mut meta = self.list_metadata(key)?.require()?;

        let mut batch = WriteBatch::with_capacity(2);
        let element = self.stage_pop(key, &mut meta, side, &mut batch)?;
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;

        debug!(
            "Popped from {:?} of list '{}', remaining {}",
            side,
            display_key(key),
            meta.size
        );
        Ok(element)
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Bytes, SpinelKvError> {
        self.pop(key, Side::Left)
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Bytes, SpinelKvError> {
        self.pop(key, Side::Right)
    }

    /// Pops up to `count` elements from one end in a single batch, in the
    /// order they were removed.
    pub fn pop_count(
        &self,
        key: &[u8],
        side: Side,
        count: u64,
    ) -> Result<Vec<Bytes>, SpinelKvError> {
        let _guard = self.locks.lock(key);
        let mut meta = self.list_metadata(key)?.require()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let n = count.min(meta.size);
        let mut popped = Vec::with_capacity(n as usize);
        let mut batch = WriteBatch::with_capacity(n as usize + 1);
        for _ in 0..n {
            popped.push(self.stage_pop(key, &mut meta, side, &mut batch)?);
        }
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;
        Ok(popped)
    }

    // --- Indexed access ---

    /// Returns the element at logical `index` (negative counts from the end),
    /// or `None` when the index is out of range or the key is absent.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, SpinelKvError> {
        let found = self.locks.read_settled(key, || -> Result<_, SpinelKvError> {
            let Some(meta) = self.list_metadata(key)?.into_option() else {
                return Ok(None);
            };
            let Some(pos) = meta.resolve_index(index) else {
                return Ok(None);
            };
            let slot = meta.slot(pos);
            let element = self.read_element(key, &meta, slot)?;
            Ok(Some((meta, slot, element)))
        })?;
        match found {
            None => Ok(None),
            Some((_, _, Some(element))) => Ok(Some(element)),
            Some((meta, slot, None)) => Err(self.missing_element(key, &meta, slot)),
        }
    }

    /// Overwrites the element at logical `index`. Writing the value already
    /// stored is a no-op.
    pub fn lset(&self, key: &[u8], index: i64, value: Bytes) -> Result<(), SpinelKvError> {
        let _guard = self.locks.lock(key);
        let meta = self.list_metadata(key)?.require()?;
        let pos = meta
            .resolve_index(index)
            .ok_or_else(|| SpinelKvError::InvalidArgument("index out of range".to_string()))?;

        let slot = meta.slot(pos);
        let current = self
            .read_element(key, &meta, slot)?
            .ok_or_else(|| self.missing_element(key, &meta, slot))?;
        if current == value {
            return Ok(());
        }
        let element_key = list_element_key(key, meta.version, slot);
        self.storage()
            .put(ColumnFamily::Elements, &element_key, &value)
    }

    // --- Range & trim ---

    /// Returns the elements between `start` and `stop`, both inclusive. Negative
    /// offsets count from the end. Out-of-range offsets never fail.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, SpinelKvError> {
        self.locks.read_settled(key, || -> Result<_, SpinelKvError> {
            let Some(meta) = self.list_metadata(key)?.into_option() else {
                return Ok(Vec::new());
            };
            let size = meta.size as i64;
            let start = if start < 0 { start + size } else { start };
            let stop = if stop < 0 { stop + size } else { stop };
            if start < 0 || stop < 0 || start > stop || start >= size {
                return Ok(Vec::new());
            }
            self.scan_elements(key, &meta, start as u64, stop as u64)
        })
    }

    /// Trims the list so that it only contains the elements between `start`
    /// and `stop`, both inclusive. An empty resulting range deletes the key.
    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), SpinelKvError> {
        let _guard = self.locks.lock(key);
        let Some(mut meta) = self.list_metadata(key)?.into_option() else {
            return Ok(());
        };

        let size = meta.size as i64;
        let start = if start < 0 { size + start } else { start };
        // An overly negative stop clamps to the list end instead of going
        // negative, so it never turns into a full deletion on its own.
        let stop = if stop < 0 {
            if meta.size > stop.unsigned_abs() {
                size + stop
            } else {
                size
            }
        } else {
            stop
        };
        let stop = stop.min(size - 1);

        if start < 0 || start > stop {
            self.storage().delete(ColumnFamily::Metadata, key)?;
            debug!("Trim emptied list '{}'", display_key(key));
            return Ok(());
        }

        // TODO: when only a few elements survive relative to the list size,
        // copy the survivors under a fresh version instead of deleting the rest.
        let (start, stop) = (start as u64, stop as u64);
        let new_head = meta.head + start;
        let new_tail = meta.head + stop + 1;
        let mut batch = WriteBatch::with_capacity((meta.size - (stop - start + 1)) as usize + 1);
        for index in meta.head..new_head {
            batch.delete(
                ColumnFamily::Elements,
                list_element_key(key, meta.version, index),
            );
        }
        for index in new_tail..meta.tail {
            batch.delete(
                ColumnFamily::Elements,
                list_element_key(key, meta.version, index),
            );
        }
        if batch.is_empty() {
            return Ok(());
        }

        let removed = batch.len();
        meta.head = new_head;
        meta.tail = new_tail;
        meta.size = stop - start + 1;
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;
        debug!(
            "Trimmed {} element(s) from list '{}', remaining {}",
            removed,
            display_key(key),
            meta.size
        );
        Ok(())
    }

    // --- Moving between lists ---

    /// Atomically pops an element from `from` side of `src` and pushes it to
    /// the `to` side of `dst`, creating `dst` if needed. Both mutations commit
    /// in one batch. `src == dst` rotates the list.
    pub fn lmove(
        &self,
        src: &[u8],
        dst: &[u8],
        from: Side,
        to: Side,
    ) -> Result<Bytes, SpinelKvError> {
        let _guards = self.locks.lock_many(&[src, dst]);
        let mut src_meta = self.list_metadata(src)?.require()?;
        let mut batch = WriteBatch::with_capacity(4);

        let element = self.stage_pop(src, &mut src_meta, from, &mut batch)?;
        let moved = std::slice::from_ref(&element);
        if src == dst {
            stage_push(src, &mut src_meta, moved, to, &mut batch)?;
            stage_metadata(src, &src_meta, &mut batch);
        } else {
            let mut dst_meta = match self.list_metadata(dst)? {
                MetadataLookup::Present(meta) => meta,
                MetadataLookup::Empty => ListMetadata::fresh(),
            };
            stage_push(dst, &mut dst_meta, moved, to, &mut batch)?;
            stage_metadata(src, &src_meta, &mut batch);
            stage_metadata(dst, &dst_meta, &mut batch);
        }
        self.commit(batch)?;

        debug!(
            "Moved element from {:?} of '{}' to {:?} of '{}'",
            from,
            display_key(src),
            to,
            display_key(dst)
        );
        Ok(element)
    }

    /// Pops the last element of `src` and pushes it to the head of `dst`.
    pub fn rpoplpush(&self, src: &[u8], dst: &[u8]) -> Result<Bytes, SpinelKvError> {
        self.lmove(src, dst, Side::Right, Side::Left)
    }

    // --- Search & element-wise edits ---

    /// Returns the logical position of the first element equal to `element`.
    pub fn lpos(&self, key: &[u8], element: &[u8]) -> Result<Option<u64>, SpinelKvError> {
        self.locks
            .read_settled(key, || self.find_position(key, element))
    }

    fn find_position(&self, key: &[u8], element: &[u8]) -> Result<Option<u64>, SpinelKvError> {
        let Some(meta) = self.list_metadata(key)?.into_option() else {
            return Ok(None);
        };
        let prefix = version_prefix(key, meta.version);
        let start_key = list_element_key(key, meta.version, meta.head);
        let iter = self
            .storage()
            .iter_from(ColumnFamily::Elements, &start_key, &ReadOptions::bulk_scan())?;
        for item in iter {
            let (raw_key, value) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            let index = decode_list_index(&raw_key, &prefix)?;
            if index >= meta.tail {
                break;
            }
            if value.as_ref() == element {
                return Ok(Some(index - meta.head));
            }
        }
        Ok(None)
    }

    /// Removes occurrences of `element`: the first `count` from the head when
    /// `count > 0`, the last `|count|` from the tail when `count < 0`, and all of
    /// them when `count == 0`. Returns the number removed.
    ///
    /// Survivors are compacted toward the end the scan started from, so only
    /// the records between the first removal and that end are rewritten.
    pub fn lrem(&self, key: &[u8], count: i64, element: &[u8]) -> Result<u64, SpinelKvError> {
        let _guard = self.locks.lock(key);
        let Some(mut meta) = self.list_metadata(key)?.into_option() else {
            return Ok(0);
        };
        let entries = self.scan_elements(key, &meta, 0, meta.size - 1)?;
        if entries.len() as u64 != meta.size {
            return Err(self.corruption(key, &meta, "element scan came up short"));
        }

        let limit = if count == 0 {
            u64::MAX
        } else {
            count.unsigned_abs()
        };
        let mut doomed = vec![false; entries.len()];
        let mut removed = 0u64;
        let positions: Box<dyn Iterator<Item = usize>> = if count >= 0 {
            Box::new(0..entries.len())
        } else {
            Box::new((0..entries.len()).rev())
        };
        for pos in positions {
            if removed == limit {
                break;
            }
            if entries[pos].as_ref() == element {
                doomed[pos] = true;
                removed += 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let version = meta.version;
        let mut batch = WriteBatch::new();
        if count >= 0 {
            // Shift survivors after the first removal toward the head.
            let first = doomed.iter().position(|d| *d).unwrap_or(0);
            let survivors = (first..entries.len()).filter(|&p| !doomed[p]);
            for (offset, pos) in survivors.enumerate() {
                let target = first + offset;
                if target != pos && entries[target] != entries[pos] {
                    batch.put(
                        ColumnFamily::Elements,
                        list_element_key(key, version, meta.slot(target as u64)),
                        entries[pos].clone(),
                    );
                }
            }
            for pos in (meta.size - removed)..meta.size {
                batch.delete(
                    ColumnFamily::Elements,
                    list_element_key(key, version, meta.slot(pos)),
                );
            }
            meta.tail -= removed;
        } else {
            // Shift survivors before the last removal toward the tail.
            let last = doomed.iter().rposition(|d| *d).unwrap_or(0);
            let survivors: Vec<usize> = (0..=last).filter(|&p| !doomed[p]).collect();
            for (offset, &pos) in survivors.iter().enumerate() {
                let target = removed as usize + offset;
                if target != pos && entries[target] != entries[pos] {
                    batch.put(
                        ColumnFamily::Elements,
                        list_element_key(key, version, meta.slot(target as u64)),
                        entries[pos].clone(),
                    );
                }
            }
            for pos in 0..removed {
                batch.delete(
                    ColumnFamily::Elements,
                    list_element_key(key, version, meta.slot(pos)),
                );
            }
            meta.head += removed;
        }
        meta.size -= removed;
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;

        debug!(
            "Removed {} occurrence(s) from list '{}', remaining {}",
            removed,
            display_key(key),
            meta.size
        );
        Ok(removed)
    }

    /// Inserts `element` before or after the first occurrence of `pivot`.
    /// Returns the new length, `-1` if the pivot is missing, or `0` if the key
    /// is absent. Only the shorter side of the list is shifted.
    pub fn linsert(
        &self,
        key: &[u8],
        pivot: &[u8],
        element: Bytes,
        before: bool,
    ) -> Result<i64, SpinelKvError> {
        let _guard = self.locks.lock(key);
        let Some(mut meta) = self.list_metadata(key)?.into_option() else {
            return Ok(0);
        };
        let entries = self.scan_elements(key, &meta, 0, meta.size - 1)?;
        if entries.len() as u64 != meta.size {
            return Err(self.corruption(key, &meta, "element scan came up short"));
        }
        let Some(pivot_pos) = entries.iter().position(|e| e.as_ref() == pivot) else {
            return Ok(-1);
        };

        let insert_at = if before { pivot_pos } else { pivot_pos + 1 };
        let version = meta.version;
        let mut batch = WriteBatch::new();
        if insert_at <= entries.len() / 2 {
            // Shift everything left of the insertion point one slot toward the head.
            let new_head = meta
                .head
                .checked_sub(1)
                .ok_or_else(|| index_space_exhausted(key))?;
            for (pos, value) in entries[..insert_at].iter().enumerate() {
                batch.put(
                    ColumnFamily::Elements,
                    list_element_key(key, version, new_head + pos as u64),
                    value.clone(),
                );
            }
            batch.put(
                ColumnFamily::Elements,
                list_element_key(key, version, new_head + insert_at as u64),
                element,
            );
            meta.head = new_head;
        } else {
            // Shift everything from the insertion point one slot toward the tail.
            for (pos, value) in entries.iter().enumerate().skip(insert_at) {
                batch.put(
                    ColumnFamily::Elements,
                    list_element_key(key, version, meta.slot(pos as u64 + 1)),
                    value.clone(),
                );
            }
            batch.put(
                ColumnFamily::Elements,
                list_element_key(key, version, meta.slot(insert_at as u64)),
                element,
            );
            meta.tail = meta
                .tail
                .checked_add(1)
                .ok_or_else(|| index_space_exhausted(key))?;
        }
        meta.size += 1;
        stage_metadata(key, &meta, &mut batch);
        self.commit(batch)?;
        Ok(meta.size as i64)
    }

    // --- Diagnostics ---

    /// Scans every record of the current version and compares it against the
    /// metadata window. Returns `None` for an absent key. Never repairs.
    ///
    /// Writers going through this `Db` are waited out, so a list that changes
    /// during the scan is scanned again rather than reported. Writers in other
    /// processes are not visible to that check.
    pub fn lverify(&self, key: &[u8]) -> Result<Option<ListReport>, SpinelKvError> {
        let report = self.locks.read_settled(key, || self.build_report(key))?;
        if let Some(report) = &report
            && !report.is_consistent()
        {
            warn!(
                "List '{}' failed verification: {} missing, {} outside window",
                display_key(key),
                report.missing.len(),
                report.outside_window.len()
            );
        }
        Ok(report)
    }

    fn build_report(&self, key: &[u8]) -> Result<Option<ListReport>, SpinelKvError> {
        let Some(meta) = self.list_metadata(key)?.into_option() else {
            return Ok(None);
        };
        let prefix = version_prefix(key, meta.version);
        let iter = self
            .storage()
            .iter_from(ColumnFamily::Elements, &prefix, &ReadOptions::bulk_scan())?;

        let mut report = ListReport {
            expected: meta.size,
            ..ListReport::default()
        };
        let mut next_expected = meta.head;
        for item in iter {
            let (raw_key, _) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            let index = decode_list_index(&raw_key, &prefix)?;
            if index < meta.head || index >= meta.tail {
                report.outside_window.push(index);
                continue;
            }
            report
                .missing
                .extend((next_expected..index).map(|i| i - meta.head));
            next_expected = index + 1;
            report.found += 1;
        }
        report
            .missing
            .extend((next_expected..meta.tail).map(|i| i - meta.head));
        Ok(Some(report))
    }

    // --- Internal helpers ---

    /// Reads the element record at synthetic index `slot`.
    fn read_element(
        &self,
        key: &[u8],
        meta: &ListMetadata,
        slot: u64,
    ) -> Result<Option<Bytes>, SpinelKvError> {
        let element_key = list_element_key(key, meta.version, slot);
        self.storage()
            .get(ColumnFamily::Elements, &element_key, &ReadOptions::default())
    }

    /// A record inside the metadata window is absent: the window promised it exists.
    fn missing_element(&self, key: &[u8], meta: &ListMetadata, slot: u64) -> SpinelKvError {
        self.corruption(key, meta, &format!("element at index {slot} is missing"))
    }

    /// Collects the elements at logical positions `[first, last]`, stopping
    /// early at the end of the current version's records.
    fn scan_elements(
        &self,
        key: &[u8],
        meta: &ListMetadata,
        first: u64,
        last: u64,
    ) -> Result<Vec<Bytes>, SpinelKvError> {
        let prefix = version_prefix(key, meta.version);
        let start_key = list_element_key(key, meta.version, meta.slot(first));
        let last_index = meta.head.saturating_add(last);
        let iter = self
            .storage()
            .iter_from(ColumnFamily::Elements, &start_key, &ReadOptions::bulk_scan())?;

        let capacity = (last - first).saturating_add(1).min(meta.size);
        let mut elements = Vec::with_capacity(capacity as usize);
        for item in iter {
            let (raw_key, value) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            if decode_list_index(&raw_key, &prefix)? > last_index {
                break;
            }
            elements.push(value);
        }
        Ok(elements)
    }

    /// Stages the removal of the element at one end and shrinks the window.
    fn stage_pop(
        &self,
        key: &[u8],
        meta: &mut ListMetadata,
        side: Side,
        batch: &mut WriteBatch,
    ) -> Result<Bytes, SpinelKvError> {
        if meta.size == 0 {
            return Err(SpinelKvError::KeyNotFound);
        }
        let slot = match side {
            Side::Left => meta.head,
            Side::Right => meta.tail - 1,
        };
        let element = self
            .read_element(key, meta, slot)?
            .ok_or_else(|| self.missing_element(key, meta, slot))?;
        batch.delete(
            ColumnFamily::Elements,
            list_element_key(key, meta.version, slot),
        );
        match side {
            Side::Left => meta.head += 1,
            Side::Right => meta.tail -= 1,
        }
        meta.size -= 1;
        Ok(element)
    }

    fn corruption(&self, key: &[u8], meta: &ListMetadata, detail: &str) -> SpinelKvError {
        warn!(
            "Corrupted list '{}' (version {}, window [{}, {})): {}",
            display_key(key),
            meta.version,
            meta.head,
            meta.tail,
            detail
        );
        SpinelKvError::DataCorruption(format!("list '{}': {detail}", display_key(key)))
    }
}

/// Assigns synthetic indices to `elements` and stages their records.
fn stage_push(
    key: &[u8],
    meta: &mut ListMetadata,
    elements: &[Bytes],
    side: Side,
    batch: &mut WriteBatch,
) -> Result<(), SpinelKvError> {
    for element in elements {
        let slot = match side {
            Side::Left => {
                meta.head = meta
                    .head
                    .checked_sub(1)
                    .ok_or_else(|| index_space_exhausted(key))?;
                meta.head
            }
            Side::Right => {
                let slot = meta.tail;
                meta.tail = meta
                    .tail
                    .checked_add(1)
                    .ok_or_else(|| index_space_exhausted(key))?;
                slot
            }
        };
        batch.put(
            ColumnFamily::Elements,
            list_element_key(key, meta.version, slot),
            element.clone(),
        );
    }
    meta.size += elements.len() as u64;
    Ok(())
}

/// Stages the metadata record: written when the list is non-empty, deleted
/// when it became empty.
fn stage_metadata(key: &[u8], meta: &ListMetadata, batch: &mut WriteBatch) {
    let meta_key = Bytes::copy_from_slice(key);
    if meta.size == 0 {
        batch.delete(ColumnFamily::Metadata, meta_key);
    } else {
        batch.put(ColumnFamily::Metadata, meta_key, meta.encode());
    }
}

fn index_space_exhausted(key: &[u8]) -> SpinelKvError {
    SpinelKvError::InvalidArgument(format!(
        "list '{}' has exhausted its index space",
        display_key(key)
    ))
}
