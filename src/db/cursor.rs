//! Forward-only row cursors.
//!
//! A [`RowCursor`] borrows both the connection and the statement it was opened
//! from, so neither can be released while the cursor is alive. Rows are pulled
//! from the driver one at a time.

use crate::db::connection::{ConnectionInner, DbConnection};
use crate::db::mapper::{ColumnMap, Record, map_row};
use crate::db::params::{mysql_query, postgres_query, sqlite_query};
use crate::db::template::BoundStatement;
use crate::db::types::RowDecode;
use crate::error::{DaoError, DaoResult};
use crate::impl_db_dispatch;
use crate::models::SqlValue;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

type RowStream<'a, R> = BoxStream<'a, Result<R, sqlx::Error>>;

enum CursorInner<'a> {
    MySql(RowStream<'a, MySqlRow>),
    Postgres(RowStream<'a, PgRow>),
    SQLite(RowStream<'a, SqliteRow>),
}

/// Single-pass sequence of result rows.
pub struct RowCursor<'a> {
    inner: CursorInner<'a>,
    rows_read: u64,
    exhausted: bool,
}

impl<'a> RowCursor<'a> {
    /// Execute `stmt` on `conn` and position the cursor before the first row.
    pub(crate) async fn open(
        conn: &'a mut DbConnection,
        stmt: &'a BoundStatement,
    ) -> DaoResult<RowCursor<'a>> {
        stmt.ensure_backend(conn.db_type())?;
        conn.before_statement().await?;
        debug!(sql = %stmt.sql(), args = stmt.args().len(), "Opening cursor");

        let inner = impl_db_dispatch!(ConnectionInner, conn.inner_mut(), {
            MySql(h) => CursorInner::MySql(mysql_query(stmt).fetch(&mut **h)),
            Postgres(h) => CursorInner::Postgres(postgres_query(stmt).fetch(&mut **h)),
            SQLite(h) => CursorInner::SQLite(sqlite_query(stmt).fetch(&mut **h)),
        });

        Ok(RowCursor {
            inner,
            rows_read: 0,
            exhausted: false,
        })
    }

    /// Advance and map the next row into `T`, or `None` past the last row.
    pub async fn next_record<T: Record>(&mut self) -> DaoResult<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }
        let mapped = impl_db_dispatch!(CursorInner, &mut self.inner, {
            MySql(s) => next_mapped(s).await,
            Postgres(s) => next_mapped(s).await,
            SQLite(s) => next_mapped(s).await,
        });
        self.track(mapped)
    }

    /// Advance and return the next row as a column map.
    pub async fn next_map(&mut self) -> DaoResult<Option<ColumnMap>> {
        self.next_record::<ColumnMap>().await
    }

    /// Advance and return the first column of the next row.
    pub async fn next_value(&mut self) -> DaoResult<Option<SqlValue>> {
        if self.exhausted {
            return Ok(None);
        }
        let value = impl_db_dispatch!(CursorInner, &mut self.inner, {
            MySql(s) => next_first_column(s).await,
            Postgres(s) => next_first_column(s).await,
            SQLite(s) => next_first_column(s).await,
        });
        self.track(value)
    }

    /// Map every remaining row, in order.
    pub async fn collect<T: Record>(&mut self) -> DaoResult<Vec<T>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record::<T>().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Rows handed out so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Whether the last row has been passed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Stop reading. Unread rows are discarded by the driver.
    pub fn close(self) -> DaoResult<()> {
        debug!(rows = self.rows_read, exhausted = self.exhausted, "Cursor closed");
        Ok(())
    }

    fn track<V>(&mut self, next: DaoResult<Option<V>>) -> DaoResult<Option<V>> {
        match &next {
            Ok(Some(_)) => self.rows_read += 1,
            Ok(None) => self.exhausted = true,
            Err(_) => {}
        }
        next
    }
}

impl std::fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("rows_read", &self.rows_read)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

async fn next_mapped<R: RowDecode, T: Record>(
    stream: &mut RowStream<'_, R>,
) -> DaoResult<Option<T>> {
    match stream.try_next().await? {
        Some(row) => map_row(&row).map(Some),
        None => Ok(None),
    }
}

async fn next_first_column<R: RowDecode>(
    stream: &mut RowStream<'_, R>,
) -> DaoResult<Option<SqlValue>> {
    match stream.try_next().await? {
        Some(row) if row.column_count() == 0 => Err(DaoError::mapping(
            "1",
            "the statement produced rows without columns",
        )),
        Some(row) => row.decode_value(0).map(Some),
        None => Ok(None),
    }
}
