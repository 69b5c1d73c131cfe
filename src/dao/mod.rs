//! Data access objects.
//!
//! [`BaseDao`] fixes the record type at compile time and forwards to the
//! [`StatementExecutor`]; table-specific DAOs build on it.

pub mod customer;

pub use customer::{Customer, CustomerDao, CustomerDaoImpl};

use crate::db::{DbConnection, Record, StatementExecutor};
use crate::error::DaoResult;
use crate::models::{FromSqlValue, SqlValue};
use std::marker::PhantomData;

/// Generic operations for one record type.
pub struct BaseDao<T: Record> {
    executor: StatementExecutor,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> BaseDao<T> {
    pub fn new() -> Self {
        Self {
            executor: StatementExecutor::new(),
            _record: PhantomData,
        }
    }

    pub fn executor(&self) -> &StatementExecutor {
        &self.executor
    }

    /// Every row mapped into `T`.
    pub async fn query(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Vec<T>> {
        self.executor.query::<T>(conn, sql, args).await
    }

    /// The first row mapped into `T`.
    pub async fn query_one(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Option<T>> {
        self.executor.query_one::<T>(conn, sql, args).await
    }

    pub async fn update(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<u64> {
        self.executor.update(conn, sql, args).await
    }

    /// A single value such as `count(*)`.
    pub async fn value<V: FromSqlValue>(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Option<V>> {
        self.executor.value::<V>(conn, sql, args).await
    }
}

impl<T: Record> Default for BaseDao<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Clone for BaseDao<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Record> std::fmt::Debug for BaseDao<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseDao")
            .field("record", &std::any::type_name::<T>())
            .finish()
    }
}
