// src/core/database/mod.rs

//! The collection engines built on top of the storage layer.
//! `Db` owns a storage backend and the writer locks; each collection type adds
//! its operations as an `impl Db` block in its own module.

pub mod core;
pub mod list;
pub mod locking;

pub use self::core::{DEFAULT_LOCK_STRIPES, Db, Side};
pub use list::ListReport;
pub use locking::KeyLocks;
