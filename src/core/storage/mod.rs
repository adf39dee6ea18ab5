// src/core/storage/mod.rs

pub mod engine;
pub mod keys;
pub mod memory;
pub mod metadata;
pub mod sled_store;

pub use engine::{ColumnFamily, ReadOptions, Storage, StorageIter, WriteBatch};
pub use memory::MemoryStorage;
pub use metadata::{ListMetadata, MetadataLookup, MetadataRecord, RedisType};
pub use sled_store::{SledOptions, SledStorage};
