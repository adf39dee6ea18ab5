// src/core/mod.rs

//! The central module containing the storage layer and collection engines of SpinelKV.

pub mod database;
pub mod errors;
pub mod storage;

pub use database::Db;
pub use errors::SpinelKvError;
