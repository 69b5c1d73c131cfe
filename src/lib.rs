//! reldao: a generic relational data-access layer.
//!
//! - [`db::provider`]: connections from the raw driver or from one of several
//!   pool backends, behind one [`ConnectionProvider`] trait
//! - [`db::executor`]: positional `?` statements for queries, updates and
//!   scalars, sharing one bind path
//! - [`db::mapper`]: rows mapped into records by column label
//! - [`db::transaction`]: manual-commit units of work with rollback
//! - [`db::closer`]: release of connections, statements and cursors
//!
//! MySQL, PostgreSQL and SQLite are supported.

pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DataSourceConfig, PoolOptions, ProviderKind};
pub use db::{
    ConnectionProvider, DbConnection, Record, StatementExecutor, TransactionCoordinator,
    build_provider,
};
pub use error::{DaoError, DaoResult};
pub use models::{DatabaseType, IsolationLevel, SqlValue, TransactionState};
