//! A single logical database connection and its transaction state.
//!
//! # Architecture
//!
//! [`DbConnection`] wraps one backend-specific connection. Where the
//! connection came from (a fresh driver connection or one of the pool
//! backends) is hidden behind [`Handle`], which dereferences to the driver
//! connection in every case.
//!
//! Transaction boundaries follow the manual-commit protocol:
//!
//! ```text
//! AutoCommit -> ManualOpen -> {Committed | RolledBack} -> AutoCommitRestored -> Released
//! ```
//!
//! Turning auto-commit off does not talk to the database. The transaction is
//! started lazily, right before the first statement, so an isolation level set
//! after auto-commit was disabled still applies to it.
//!
//! BEGIN, COMMIT and ROLLBACK go through the driver's transaction manager, so
//! the driver connection itself knows whether a transaction is open. Pools
//! rely on that when a connection comes back without being released.

use crate::config::ProviderKind;
use crate::db::provider::SqlxManager;
use crate::error::{DaoError, DaoResult};
use crate::impl_db_dispatch;
use crate::models::{DatabaseType, IsolationLevel, TransactionState};
use sqlx::pool::PoolConnection;
use sqlx::{Database, Executor, MySql, Postgres, Sqlite, TransactionManager};
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

// =============================================================================
// Connection Handle
// =============================================================================

/// A driver connection together with the way it must be given back.
pub(crate) enum Handle<DB>
where
    DB: Database,
    DB::Connection: 'static,
{
    /// Owned driver connection, closed on release.
    Direct(DB::Connection),
    /// Checked out of a `sqlx::Pool`.
    Sqlx(PoolConnection<DB>),
    /// Checked out of a `bb8::Pool`.
    Bb8(bb8::PooledConnection<'static, SqlxManager<DB::Connection>>),
    /// Checked out of a `deadpool` managed pool.
    Deadpool(deadpool::managed::Object<SqlxManager<DB::Connection>>),
}

impl<DB> Handle<DB>
where
    DB: Database,
    DB::Connection: 'static,
{
    /// Close a direct connection, or hand a pooled one back to its pool.
    async fn release(self) -> DaoResult<()> {
        match self {
            Handle::Direct(conn) => sqlx::Connection::close(conn).await.map_err(DaoError::from),
            Handle::Sqlx(_) | Handle::Bb8(_) | Handle::Deadpool(_) => Ok(()),
        }
    }
}

impl<DB> Deref for Handle<DB>
where
    DB: Database,
    DB::Connection: 'static,
{
    type Target = DB::Connection;

    fn deref(&self) -> &DB::Connection {
        match self {
            Handle::Direct(conn) => conn,
            Handle::Sqlx(conn) => &**conn,
            Handle::Bb8(conn) => &**conn,
            Handle::Deadpool(conn) => &**conn,
        }
    }
}

impl<DB> DerefMut for Handle<DB>
where
    DB: Database,
    DB::Connection: 'static,
{
    fn deref_mut(&mut self) -> &mut DB::Connection {
        match self {
            Handle::Direct(conn) => conn,
            Handle::Sqlx(conn) => &mut **conn,
            Handle::Bb8(conn) => &mut **conn,
            Handle::Deadpool(conn) => &mut **conn,
        }
    }
}

/// Backend-specific connection (avoids `AnyConnection` limitations).
pub(crate) enum ConnectionInner {
    MySql(Handle<MySql>),
    Postgres(Handle<Postgres>),
    SQLite(Handle<Sqlite>),
}

impl ConnectionInner {
    fn db_type(&self) -> DatabaseType {
        match self {
            ConnectionInner::MySql(_) => DatabaseType::MySQL,
            ConnectionInner::Postgres(_) => DatabaseType::PostgreSQL,
            ConnectionInner::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a statement without arguments or result rows.
    async fn execute_raw(&mut self, sql: &str) -> DaoResult<()> {
        debug!(sql = %sql, "Executing control statement");
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => (&mut **h).execute(sql).await.map(|_| ()),
            Postgres(h) => (&mut **h).execute(sql).await.map(|_| ()),
            SQLite(h) => (&mut **h).execute(sql).await.map(|_| ()),
        })
        .map_err(DaoError::from)
    }

    /// Open a transaction, with `statement` replacing the plain `BEGIN`.
    async fn begin(&mut self, statement: Option<String>) -> DaoResult<()> {
        debug!(statement = ?statement, "Beginning transaction");
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => begin_on(&mut **h, statement).await,
            Postgres(h) => begin_on(&mut **h, statement).await,
            SQLite(h) => begin_on(&mut **h, statement).await,
        })
        .map_err(DaoError::from)
    }

    async fn commit(&mut self) -> DaoResult<()> {
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => commit_on(&mut **h).await,
            Postgres(h) => commit_on(&mut **h).await,
            SQLite(h) => commit_on(&mut **h).await,
        })
        .map_err(DaoError::from)
    }

    async fn rollback(&mut self) -> DaoResult<()> {
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => rollback_on(&mut **h).await,
            Postgres(h) => rollback_on(&mut **h).await,
            SQLite(h) => rollback_on(&mut **h).await,
        })
        .map_err(DaoError::from)
    }

    fn in_transaction(&self) -> bool {
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => sqlx::Connection::is_in_transaction(&**h),
            Postgres(h) => sqlx::Connection::is_in_transaction(&**h),
            SQLite(h) => sqlx::Connection::is_in_transaction(&**h),
        })
    }

    async fn ping(&mut self) -> DaoResult<()> {
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => sqlx::Connection::ping(&mut **h).await,
            Postgres(h) => sqlx::Connection::ping(&mut **h).await,
            SQLite(h) => sqlx::Connection::ping(&mut **h).await,
        })
        .map_err(DaoError::from)
    }

    async fn release(self) -> DaoResult<()> {
        impl_db_dispatch!(ConnectionInner, self, {
            MySql(h) => h.release().await,
            Postgres(h) => h.release().await,
            SQLite(h) => h.release().await,
        })
    }
}

async fn begin_on<C: sqlx::Connection>(
    conn: &mut C,
    statement: Option<String>,
) -> Result<(), sqlx::Error> {
    <C::Database as Database>::TransactionManager::begin(conn, statement.map(Cow::Owned)).await
}

async fn commit_on<C: sqlx::Connection>(conn: &mut C) -> Result<(), sqlx::Error> {
    <C::Database as Database>::TransactionManager::commit(conn).await
}

async fn rollback_on<C: sqlx::Connection>(conn: &mut C) -> Result<(), sqlx::Error> {
    <C::Database as Database>::TransactionManager::rollback(conn).await
}

/// Roll back a transaction left open on a driver connection that came back
/// to its pool without going through [`DbConnection::close`].
pub(crate) async fn rollback_abandoned<C: sqlx::Connection>(
    conn: &mut C,
) -> Result<(), sqlx::Error> {
    if conn.is_in_transaction() {
        warn!("Pooled connection returned with an open transaction, rolling back");
        rollback_on(conn).await?;
    }
    Ok(())
}

// =============================================================================
// DbConnection
// =============================================================================

/// One live connection, owned by a single caller until released.
///
/// Obtain it from a [`ConnectionProvider`](crate::db::ConnectionProvider) and
/// give it back with [`close`](Self::close) or the
/// [closer](crate::db::closer::release).
pub struct DbConnection {
    inner: ConnectionInner,
    provider: ProviderKind,
    state: TransactionState,
    isolation: Option<IsolationLevel>,
    /// BEGIN has been sent for the current manual transaction.
    begun: bool,
    /// SQLite `read_uncommitted` was switched on for this transaction.
    dirty_reads: bool,
}

impl DbConnection {
    pub(crate) fn new(inner: ConnectionInner, provider: ProviderKind) -> Self {
        Self {
            inner,
            provider,
            state: TransactionState::AutoCommit,
            isolation: None,
            begun: false,
            dirty_reads: false,
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type()
    }

    /// Which provider handed out this connection.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn auto_commit(&self) -> bool {
        self.state.is_auto_commit()
    }

    /// Isolation level requested for manual transactions, if any.
    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Whether the driver connection has a transaction open on the server.
    ///
    /// Unlike [`state`](Self::state) this is false while a manual transaction
    /// is pending but has not run a statement yet.
    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    /// Check that the connection is still alive.
    pub async fn ping(&mut self) -> DaoResult<()> {
        self.inner.ping().await
    }

    /// Switch between auto-commit and manual-commit mode.
    ///
    /// Disabling auto-commit opens a manual transaction; disabling it again
    /// while one is open is a transaction error. Enabling it after a commit
    /// or rollback restores auto-commit; enabling it while a transaction is
    /// still open commits that transaction first.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> DaoResult<()> {
        match (auto_commit, self.state) {
            (false, TransactionState::ManualOpen) => Err(DaoError::transaction(
                "a transaction is already open on this connection",
            )),
            (false, TransactionState::Committed | TransactionState::RolledBack) => {
                Err(DaoError::transaction(
                    "restore auto-commit before opening another transaction",
                ))
            }
            (false, _) => {
                self.transition(TransactionState::ManualOpen)?;
                self.begun = false;
                debug!(provider = %self.provider, "Auto-commit disabled");
                Ok(())
            }
            (true, TransactionState::ManualOpen) => {
                self.commit().await?;
                self.restore_auto_commit().await
            }
            (true, TransactionState::Committed | TransactionState::RolledBack) => {
                self.restore_auto_commit().await
            }
            (true, _) => Ok(()),
        }
    }

    /// Request an isolation level for manual transactions on this connection.
    ///
    /// May be called before or after disabling auto-commit, but not once the
    /// transaction has run a statement.
    pub fn set_transaction_isolation(&mut self, level: IsolationLevel) -> DaoResult<()> {
        if self.begun {
            return Err(DaoError::transaction(
                "cannot change the isolation level of a transaction in progress",
            ));
        }
        self.isolation = Some(level);
        Ok(())
    }

    /// Convenience for `set_auto_commit(false)` plus an optional isolation level.
    pub async fn begin(&mut self, isolation: Option<IsolationLevel>) -> DaoResult<()> {
        self.set_auto_commit(false).await?;
        if let Some(level) = isolation {
            self.set_transaction_isolation(level)?;
        }
        Ok(())
    }

    /// Make the open transaction's changes permanent.
    ///
    /// On failure the transaction stays open so it can still be rolled back.
    pub async fn commit(&mut self) -> DaoResult<()> {
        if !self.state.is_manual_open() {
            return Err(DaoError::transaction(format!(
                "commit without an open transaction (state: {})",
                self.state
            )));
        }
        if self.begun {
            self.inner.commit().await?;
        }
        self.begun = false;
        self.transition(TransactionState::Committed)?;
        debug!(provider = %self.provider, "Transaction committed");
        Ok(())
    }

    /// Discard the open transaction's changes.
    pub async fn rollback(&mut self) -> DaoResult<()> {
        if !self.state.is_manual_open() {
            return Err(DaoError::transaction(format!(
                "rollback without an open transaction (state: {})",
                self.state
            )));
        }
        if self.begun {
            self.inner.rollback().await?;
        }
        self.begun = false;
        self.transition(TransactionState::RolledBack)?;
        debug!(provider = %self.provider, "Transaction rolled back");
        Ok(())
    }

    /// Release the connection: close it, or return it to its pool.
    ///
    /// A transaction still open is rolled back first; one that ended without
    /// auto-commit being restored is restored.
    pub async fn close(mut self) -> DaoResult<()> {
        let mut first_error = None;

        if self.state.is_manual_open() {
            warn!(
                provider = %self.provider,
                db_type = %self.db_type(),
                "Releasing connection with an open transaction, rolling back"
            );
            if let Err(e) = self.rollback().await {
                first_error = Some(e);
            }
        }
        if self.state.is_ended() {
            if let Err(e) = self.restore_auto_commit().await {
                first_error.get_or_insert(e);
            }
        }

        let provider = self.provider;
        self.state = TransactionState::Released;
        let released = self.inner.release().await;
        debug!(provider = %provider, "Connection released");

        match (first_error, released) {
            (Some(e), _) | (None, Err(e)) => Err(e),
            (None, Ok(())) => Ok(()),
        }
    }

    /// Prepare the connection for a statement: reject statements in ended
    /// transactions and start a pending manual transaction.
    pub(crate) async fn before_statement(&mut self) -> DaoResult<()> {
        if self.state.is_ended() {
            return Err(DaoError::transaction(format!(
                "transaction already {}; restore auto-commit before issuing statements",
                self.state
            )));
        }
        if self.state.is_manual_open() && !self.begun {
            self.start_transaction().await?;
        }
        Ok(())
    }

    pub(crate) fn inner_mut(&mut self) -> &mut ConnectionInner {
        &mut self.inner
    }

    async fn start_transaction(&mut self) -> DaoResult<()> {
        let db_type = self.db_type();
        let isolation = self.isolation;
        match db_type {
            DatabaseType::MySQL => {
                if let Some(level) = isolation {
                    let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
                    self.inner.execute_raw(&sql).await?;
                }
                self.inner.begin(None).await?;
            }
            DatabaseType::PostgreSQL => {
                let statement =
                    isolation.map(|level| format!("BEGIN ISOLATION LEVEL {}", level.as_sql()));
                self.inner.begin(statement).await?;
            }
            DatabaseType::SQLite => {
                // SQLite transactions are serializable; only dirty reads
                // between shared-cache connections can be switched on.
                if isolation == Some(IsolationLevel::ReadUncommitted) {
                    self.inner.execute_raw("PRAGMA read_uncommitted = 1").await?;
                    self.dirty_reads = true;
                }
                self.inner.begin(None).await?;
            }
        }
        self.begun = true;
        debug!(
            provider = %self.provider,
            db_type = %db_type,
            isolation = ?isolation,
            "Transaction started"
        );
        Ok(())
    }

    async fn restore_auto_commit(&mut self) -> DaoResult<()> {
        self.transition(TransactionState::AutoCommitRestored)?;
        if self.dirty_reads {
            self.dirty_reads = false;
            self.inner.execute_raw("PRAGMA read_uncommitted = 0").await?;
        }
        debug!(provider = %self.provider, "Auto-commit restored");
        Ok(())
    }

    fn transition(&mut self, next: TransactionState) -> DaoResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DaoError::transaction(format!(
                "illegal transition from {} to {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("db_type", &self.db_type())
            .field("provider", &self.provider)
            .field("state", &self.state)
            .field("isolation", &self.isolation)
            .finish()
    }
}
