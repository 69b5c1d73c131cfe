//! Statement execution.
//!
//! Every operation goes through the same path:
//!
//! 1. parse the template and find its `?` placeholders
//! 2. check the argument count (a mismatch fails here, before any I/O)
//! 3. bind the arguments for the connection's backend
//! 4. run the statement on the caller's connection
//!
//! The executor never commits. Whether a statement is durable immediately
//! depends on the connection's auto-commit state, which lets several calls
//! share one transaction.

use crate::db::connection::{ConnectionInner, DbConnection};
use crate::db::cursor::RowCursor;
use crate::db::mapper::{ColumnMap, Record, convert};
use crate::db::params::{mysql_query, postgres_query, sqlite_query};
use crate::db::template::{BoundStatement, StatementTemplate};
use crate::error::DaoResult;
use crate::impl_db_dispatch;
use crate::models::{FromSqlValue, SqlValue};
use std::time::Instant;
use tracing::debug;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Key generated by the last insert, where the backend reports one
    /// (MySQL `LAST_INSERT_ID()`, SQLite rowid). PostgreSQL callers use
    /// `RETURNING` with [`StatementExecutor::value`] instead.
    pub last_insert_id: Option<i64>,
}

/// Runs statement templates against a caller-owned connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementExecutor;

impl StatementExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Parse `sql` and bind `args` for the connection's backend.
    ///
    /// Fails with a binding error when the argument count differs from the
    /// placeholder count. Nothing is sent to the database.
    pub fn prepare(
        &self,
        conn: &DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<BoundStatement> {
        StatementTemplate::parse(sql, conn.db_type())?.bind(args)
    }

    /// Execute a prepared query and return a cursor over its rows.
    pub async fn open_cursor<'a>(
        &self,
        conn: &'a mut DbConnection,
        stmt: &'a BoundStatement,
    ) -> DaoResult<RowCursor<'a>> {
        RowCursor::open(conn, stmt).await
    }

    /// Run a query and map every row into `T`. No rows gives an empty Vec.
    pub async fn query<T: Record>(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Vec<T>> {
        let start = Instant::now();
        let stmt = self.prepare(conn, sql, args)?;
        let mut cursor = RowCursor::open(conn, &stmt).await?;
        let records = cursor.collect::<T>().await?;
        cursor.close()?;

        debug!(
            sql = %sql,
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(records)
    }

    /// Run a query and map only its first row.
    pub async fn query_one<T: Record>(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Option<T>> {
        let stmt = self.prepare(conn, sql, args)?;
        let mut cursor = RowCursor::open(conn, &stmt).await?;
        let record = cursor.next_record::<T>().await?;
        cursor.close()?;
        Ok(record)
    }

    /// Run a query and keep every row as an ordered column map.
    pub async fn query_maps(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Vec<ColumnMap>> {
        self.query::<ColumnMap>(conn, sql, args).await
    }

    /// First column of the first row, or `None` when the query yields no row.
    pub async fn scalar(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Option<SqlValue>> {
        let stmt = self.prepare(conn, sql, args)?;
        let mut cursor = RowCursor::open(conn, &stmt).await?;
        let value = cursor.next_value().await?;
        cursor.close()?;

        debug!(sql = %sql, found = value.is_some(), "Scalar query completed");
        Ok(value)
    }

    /// Typed [`scalar`](Self::scalar). Use `Option<V>` to accept SQL NULL.
    pub async fn value<V: FromSqlValue>(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<Option<V>> {
        match self.scalar(conn, sql, args).await? {
            Some(value) => convert("1", value).map(Some),
            None => Ok(None),
        }
    }

    /// Run an insert, update or delete and return the affected-row count.
    pub async fn update(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<u64> {
        let stmt = self.prepare(conn, sql, args)?;
        Ok(self.execute(conn, &stmt).await?.rows_affected)
    }

    /// Run an insert and report the generated key along with the count.
    pub async fn insert(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        args: &[SqlValue],
    ) -> DaoResult<ExecuteResult> {
        let stmt = self.prepare(conn, sql, args)?;
        self.execute(conn, &stmt).await
    }

    /// Run one template once per argument row, in order, on the same
    /// connection. Returns the total affected-row count.
    ///
    /// Every row is checked against the placeholder count before the first
    /// one runs.
    pub async fn update_batch(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        rows: &[Vec<SqlValue>],
    ) -> DaoResult<u64> {
        let template = StatementTemplate::parse(sql, conn.db_type())?;
        let statements = rows
            .iter()
            .map(|args| template.bind(args))
            .collect::<DaoResult<Vec<_>>>()?;

        let mut total = 0;
        for stmt in &statements {
            total += self.execute(conn, stmt).await?.rows_affected;
        }
        debug!(sql = %sql, batch = statements.len(), rows = total, "Batch completed");
        Ok(total)
    }

    /// Execute a prepared statement that returns no rows.
    pub async fn execute(
        &self,
        conn: &mut DbConnection,
        stmt: &BoundStatement,
    ) -> DaoResult<ExecuteResult> {
        let start = Instant::now();
        stmt.ensure_backend(conn.db_type())?;
        conn.before_statement().await?;

        let result = impl_db_dispatch!(ConnectionInner, conn.inner_mut(), {
            MySql(h) => {
                let done = mysql_query(stmt).execute(&mut **h).await?;
                ExecuteResult {
                    rows_affected: done.rows_affected(),
                    last_insert_id: i64::try_from(done.last_insert_id())
                        .ok()
                        .filter(|id| *id != 0),
                }
            },
            Postgres(h) => {
                let done = postgres_query(stmt).execute(&mut **h).await?;
                ExecuteResult {
                    rows_affected: done.rows_affected(),
                    last_insert_id: None,
                }
            },
            SQLite(h) => {
                let done = sqlite_query(stmt).execute(&mut **h).await?;
                ExecuteResult {
                    rows_affected: done.rows_affected(),
                    last_insert_id: Some(done.last_insert_rowid()).filter(|id| *id != 0),
                }
            },
        });

        debug!(
            sql = %stmt.sql(),
            args = stmt.args().len(),
            rows_affected = result.rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(result)
    }
}
