// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::core::database::{Db, Side};
pub use crate::core::errors::SpinelKvError;
