// src/core/database/locking.rs

//! Striped writer locks with per-stripe change sequences.
//!
//! Every mutating collection operation holds the stripe of its key across the
//! read-modify-write window between loading metadata and committing the batch.
//! Two writers on the same key are therefore serialized.
//!
//! Readers never take the mutex. Each stripe also carries a sequence number
//! that is odd while a writer holds the stripe and even otherwise. A reader
//! samples it before and after its reads and retries if it moved, so a
//! metadata read and the element reads that follow it always describe the
//! same state of the list.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

#[derive(Debug, Default)]
struct Stripe {
    lock: Mutex<()>,
    sequence: AtomicU64,
}

/// Holds one stripe for writing. Dropping it releases the stripe and marks
/// the write as finished for readers.
#[derive(Debug)]
pub struct StripeGuard<'a> {
    stripe: &'a Stripe,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StripeGuard<'a> {
    fn acquire(stripe: &'a Stripe) -> Self {
        let guard = stripe.lock.lock();
        stripe.sequence.fetch_add(1, Ordering::SeqCst);
        Self {
            stripe,
            _guard: guard,
        }
    }
}

impl Drop for StripeGuard<'_> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is dropped.
        self.stripe.sequence.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct KeyLocks {
    stripes: Vec<Stripe>,
}

impl KeyLocks {
    pub fn new(stripe_count: usize) -> Self {
        let stripe_count = stripe_count.max(1);
        Self {
            stripes: (0..stripe_count).map(|_| Stripe::default()).collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Calculates the stripe index for a given key using hashing.
    pub fn stripe_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Locks the stripe owning `key`.
    pub fn lock(&self, key: &[u8]) -> StripeGuard<'_> {
        StripeGuard::acquire(&self.stripes[self.stripe_index(key)])
    }

    /// Locks the stripes of several keys, ensuring a consistent locking order
    /// by sorting stripe indices to prevent deadlocks. Keys sharing a stripe
    /// take it once.
    pub fn lock_many(&self, keys: &[&[u8]]) -> Vec<StripeGuard<'_>> {
        let indices: BTreeSet<usize> = keys.iter().map(|key| self.stripe_index(key)).collect();
        indices
            .into_iter()
            .map(|index| StripeGuard::acquire(&self.stripes[index]))
            .collect()
    }

    /// Runs the read-only closure `read` until it completes without a writer
    /// touching the stripe of `key` in the meantime, and returns that result.
    pub fn read_settled<T>(&self, key: &[u8], mut read: impl FnMut() -> T) -> T {
        let sequence = &self.stripes[self.stripe_index(key)].sequence;
        loop {
            let before = sequence.load(Ordering::SeqCst);
            if before % 2 == 1 {
                thread::yield_now();
                continue;
            }
            let result = read();
            if sequence.load(Ordering::SeqCst) == before {
                return result;
            }
        }
    }
}
