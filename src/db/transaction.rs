//! Transaction coordination.
//!
//! [`TransactionCoordinator`] runs a unit of work on one connection with
//! auto-commit disabled, then commits it or rolls it back as a whole and
//! restores auto-commit. The work receives the connection and may issue any
//! number of executor calls against it.
//!
//! ```ignore
//! let coordinator = TransactionCoordinator::with_isolation(IsolationLevel::ReadCommitted);
//! coordinator
//!     .run(&mut conn, |conn| {
//!         Box::pin(async move {
//!             executor.update(conn, "update accounts set balance = balance - 100 where user = ?", &sql_args!["AA"]).await?;
//!             executor.update(conn, "update accounts set balance = balance + 100 where user = ?", &sql_args!["BB"]).await?;
//!             Ok(())
//!         })
//!     })
//!     .await?;
//! ```

use crate::db::closer;
use crate::db::connection::DbConnection;
use crate::db::provider::ConnectionProvider;
use crate::error::{DaoError, DaoResult};
use crate::models::IsolationLevel;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

/// Runs units of work inside manual-commit transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionCoordinator {
    isolation: Option<IsolationLevel>,
}

impl TransactionCoordinator {
    /// Transactions at the backend's default isolation level.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation(isolation: IsolationLevel) -> Self {
        Self {
            isolation: Some(isolation),
        }
    }

    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Run `work` as one transaction on `conn`.
    ///
    /// Commits when `work` succeeds. When `work` or the commit fails, rolls
    /// back and returns that error; if the rollback fails too, the error
    /// carries both. Auto-commit is restored on every path where the
    /// transaction ended.
    pub async fn run<T, F>(&self, conn: &mut DbConnection, work: F) -> DaoResult<T>
    where
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DaoResult<T>>,
    {
        conn.set_auto_commit(false).await?;
        if let Some(level) = self.isolation {
            if let Err(e) = conn.set_transaction_isolation(level) {
                return Err(abort(conn, e).await);
            }
        }

        let outcome = match work(conn).await {
            Ok(value) => conn.commit().await.map(|()| value),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                // Already committed: a restore failure is logged, not returned
                if let Err(e) = conn.set_auto_commit(true).await {
                    warn!(error = %e, "Failed to restore auto-commit after commit");
                }
                debug!(isolation = ?self.isolation, "Transaction completed");
                Ok(value)
            }
            Err(cause) => Err(abort(conn, cause).await),
        }
    }

    /// Acquire a connection from `provider`, [`run`](Self::run) `work` on it,
    /// and release the connection whatever the outcome.
    pub async fn run_with<T, F>(&self, provider: &dyn ConnectionProvider, work: F) -> DaoResult<T>
    where
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DaoResult<T>>,
    {
        let mut conn = provider.acquire().await?;
        let result = self.run(&mut conn, work).await;
        closer::release(Some(conn), None, None).await;
        result
    }
}

/// Roll back after `cause` and restore auto-commit, returning the error to
/// report.
async fn abort(conn: &mut DbConnection, cause: DaoError) -> DaoError {
    warn!(error = %cause, "Transaction failed, rolling back");

    if conn.state().is_manual_open() {
        if let Err(rollback) = conn.rollback().await {
            warn!(error = %rollback, "Rollback failed");
            return DaoError::rollback_failed(cause, rollback);
        }
    }
    if let Err(e) = conn.set_auto_commit(true).await {
        warn!(error = %e, "Failed to restore auto-commit after rollback");
    }
    cause
}
