//! Database access layer.
//!
//! This module provides:
//! - Connection providers (direct driver connections and three pool backends)
//! - Connections with manual-commit transaction state
//! - Statement templates and argument binding
//! - Statement execution and row cursors
//! - Name-based row mapping into records
//! - Transaction coordination and resource release
//! - Database dispatch macros for reducing code duplication

pub mod closer;
pub mod connection;
pub mod cursor;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod mapper;
mod params;
pub mod provider;
pub mod template;
pub mod transaction;
pub mod types;

pub use closer::{release, release_connection};
pub use connection::DbConnection;
pub use cursor::RowCursor;
pub use executor::{ExecuteResult, StatementExecutor};
pub use mapper::{ColumnMap, Record};
pub use provider::{
    BackendOptions, Bb8Pool, Bb8Provider, ConnectionProvider, DeadpoolPool, DeadpoolProvider,
    DirectProvider, PoolBackend, PoolProvider, ProviderRegistry, SqlxManager, SqlxPool,
    SqlxPoolProvider, build_provider,
};
pub use template::{BoundStatement, StatementTemplate};
pub use transaction::TransactionCoordinator;
