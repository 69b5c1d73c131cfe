//! Data models shared across the crate.
//!
//! This module re-exports all model types used throughout the library.

pub mod connection;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, IsolationLevel, TransactionState};
pub use value::{FromSqlValue, SqlValue};
