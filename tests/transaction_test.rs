//! Integration tests for manual-commit transactions on SQLite.
//!
//! Tests verify that:
//! - A failure between two updates leaves neither visible once rolled back
//! - Commits are visible to other connections
//! - The coordinator commits, rolls back and restores auto-commit
//! - A rollback failure is reported together with the original cause
//! - Releasing a connection with an open transaction rolls it back
//! - Illegal state transitions are rejected

use reldao::config::{DataSourceConfig, ProviderKind};
use reldao::db::{ConnectionProvider, StatementExecutor, TransactionCoordinator, release};
use reldao::error::{DaoError, DaoResult};
use reldao::models::{IsolationLevel, TransactionState};
use reldao::{DbConnection, build_provider, sql_args};
use std::sync::Arc;
use tempfile::NamedTempFile;

const DEBIT: &str = "update accounts set balance = balance - ? where user = ?";
const CREDIT: &str = "update accounts set balance = balance + ? where user = ?";

/// Create a database with two accounts holding 1000 each and return a
/// provider handing out direct connections to it.
async fn setup_accounts() -> Arc<dyn ConnectionProvider> {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let config = DataSourceConfig::from_url(&format!("sqlite:{}", db_path)).unwrap();
    let provider = build_provider(ProviderKind::Direct, &config).unwrap();

    let mut conn = provider.acquire().await.unwrap();
    let executor = StatementExecutor::new();
    executor
        .update(
            &mut conn,
            "CREATE TABLE accounts (user VARCHAR(20) PRIMARY KEY, balance INTEGER NOT NULL)",
            &[],
        )
        .await
        .unwrap();
    executor
        .update_batch(
            &mut conn,
            "insert into accounts(user, balance) values(?, ?)",
            &[sql_args!["AA", 1000], sql_args!["BB", 1000]],
        )
        .await
        .unwrap();
    release(Some(conn), None, None).await;
    provider
}

/// Read a balance on a fresh connection.
async fn balance(provider: &dyn ConnectionProvider, user: &str) -> i64 {
    let mut conn = provider.acquire().await.unwrap();
    let balance = StatementExecutor::new()
        .value::<i64>(
            &mut conn,
            "select balance from accounts where user = ?",
            &sql_args![user],
        )
        .await
        .unwrap()
        .unwrap();
    release(Some(conn), None, None).await;
    balance
}

/// Move 100 from AA to BB, optionally failing between the two updates.
async fn transfer(conn: &mut DbConnection, fail_midway: bool) -> DaoResult<()> {
    let executor = StatementExecutor::new();
    executor.update(conn, DEBIT, &sql_args![100, "AA"]).await?;
    if fail_midway {
        return Err(DaoError::internal("simulated failure between updates"));
    }
    executor.update(conn, CREDIT, &sql_args![100, "BB"]).await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_transfer_rolls_back_first_update() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    conn.set_auto_commit(false).await.unwrap();
    assert_eq!(conn.state(), TransactionState::ManualOpen);

    let err = transfer(&mut conn, true).await.unwrap_err();
    assert!(matches!(err, DaoError::Internal { .. }));

    conn.rollback().await.unwrap();
    assert_eq!(conn.state(), TransactionState::RolledBack);
    conn.set_auto_commit(true).await.unwrap();
    assert_eq!(conn.state(), TransactionState::AutoCommitRestored);
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 1000);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1000);
}

#[tokio::test]
async fn test_committed_transfer_is_visible() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    conn.set_auto_commit(false).await.unwrap();
    transfer(&mut conn, false).await.unwrap();
    conn.commit().await.unwrap();
    assert_eq!(conn.state(), TransactionState::Committed);
    conn.set_auto_commit(true).await.unwrap();
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1100);
}

#[tokio::test]
async fn test_uncommitted_update_is_invisible_elsewhere() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    conn.set_auto_commit(false).await.unwrap();
    StatementExecutor::new()
        .update(&mut conn, DEBIT, &sql_args![100, "AA"])
        .await
        .unwrap();

    assert_eq!(balance(provider.as_ref(), "AA").await, 1000);

    conn.commit().await.unwrap();
    conn.set_auto_commit(true).await.unwrap();
    release(Some(conn), None, None).await;
    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
}

#[tokio::test]
async fn test_coordinator_commits_on_success() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    let moved = TransactionCoordinator::new()
        .run(&mut conn, |conn| {
            Box::pin(async move {
                transfer(conn, false).await?;
                Ok(100)
            })
        })
        .await
        .unwrap();
    assert_eq!(moved, 100);
    assert_eq!(conn.state(), TransactionState::AutoCommitRestored);
    assert!(conn.auto_commit());
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1100);
}

#[tokio::test]
async fn test_coordinator_result_stands_after_dirty_read_reset() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    // Read-uncommitted on SQLite needs a pragma reset when auto-commit returns
    let moved = TransactionCoordinator::with_isolation(IsolationLevel::ReadUncommitted)
        .run(&mut conn, |conn| {
            Box::pin(async move {
                transfer(conn, false).await?;
                assert!(conn.in_transaction());
                Ok(100)
            })
        })
        .await
        .unwrap();
    assert_eq!(moved, 100);
    assert!(conn.auto_commit());
    assert!(!conn.in_transaction());
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1100);
}

#[tokio::test]
async fn test_coordinator_rolls_back_and_returns_cause() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    let err = TransactionCoordinator::with_isolation(IsolationLevel::Serializable)
        .run(&mut conn, |conn| Box::pin(transfer(conn, true)))
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Internal { .. }), "got {err:?}");
    assert_eq!(conn.state(), TransactionState::AutoCommitRestored);
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 1000);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1000);
}

#[tokio::test]
async fn test_coordinator_run_with_releases_connection() {
    let provider = setup_accounts().await;

    let err = TransactionCoordinator::new()
        .run_with(provider.as_ref(), |conn| Box::pin(transfer(conn, true)))
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Internal { .. }));

    TransactionCoordinator::new()
        .run_with(provider.as_ref(), |conn| Box::pin(transfer(conn, false)))
        .await
        .unwrap();

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
    assert_eq!(balance(provider.as_ref(), "BB").await, 1100);
}

#[tokio::test]
async fn test_rollback_failure_reports_both_errors() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    let err = TransactionCoordinator::new()
        .run(&mut conn, |conn| {
            Box::pin(async move {
                let executor = StatementExecutor::new();
                executor.update(conn, DEBIT, &sql_args![100, "AA"]).await?;
                // End the transaction behind the connection's back so its
                // own rollback has nothing to roll back.
                executor.update(conn, "rollback", &[]).await?;
                Err::<(), _>(DaoError::internal("simulated failure"))
            })
        })
        .await
        .unwrap_err();

    match &err {
        DaoError::RollbackFailed { cause, rollback } => {
            assert!(matches!(**cause, DaoError::Internal { .. }));
            assert!(rollback.is_sql_execution());
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), DaoError::Internal { .. }));
    assert!(err.to_string().contains("rollback also failed"));

    // Release still completes; its own rollback failure is only logged
    release(Some(conn), None, None).await;
    assert_eq!(balance(provider.as_ref(), "AA").await, 1000);
}

#[tokio::test]
async fn test_release_with_open_transaction_rolls_back() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    conn.set_auto_commit(false).await.unwrap();
    StatementExecutor::new()
        .update(&mut conn, DEBIT, &sql_args![100, "AA"])
        .await
        .unwrap();
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 1000);
}

#[tokio::test]
async fn test_enabling_auto_commit_commits_open_transaction() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    conn.set_auto_commit(false).await.unwrap();
    transfer(&mut conn, false).await.unwrap();
    conn.set_auto_commit(true).await.unwrap();
    assert_eq!(conn.state(), TransactionState::AutoCommitRestored);
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();

    let err = conn.commit().await.unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));
    let err = conn.rollback().await.unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));
    assert_eq!(conn.state(), TransactionState::AutoCommit);

    conn.set_auto_commit(false).await.unwrap();
    let err = conn.set_auto_commit(false).await.unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));
    assert_eq!(conn.state(), TransactionState::ManualOpen);

    conn.rollback().await.unwrap();
    let err = conn.set_auto_commit(false).await.unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));
    release(Some(conn), None, None).await;
}

#[tokio::test]
async fn test_statement_after_commit_requires_restore() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();
    let executor = StatementExecutor::new();

    conn.set_auto_commit(false).await.unwrap();
    executor.update(&mut conn, DEBIT, &sql_args![100, "AA"]).await.unwrap();
    conn.commit().await.unwrap();

    let err = executor
        .update(&mut conn, CREDIT, &sql_args![100, "BB"])
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));

    conn.set_auto_commit(true).await.unwrap();
    executor.update(&mut conn, CREDIT, &sql_args![100, "BB"]).await.unwrap();
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "BB").await, 1100);
}

#[tokio::test]
async fn test_isolation_is_fixed_once_transaction_runs() {
    let provider = setup_accounts().await;
    let mut conn = provider.acquire().await.unwrap();
    let executor = StatementExecutor::new();

    conn.set_auto_commit(false).await.unwrap();
    conn.set_transaction_isolation(IsolationLevel::ReadUncommitted)
        .unwrap();
    assert_eq!(
        conn.transaction_isolation(),
        Some(IsolationLevel::ReadUncommitted)
    );

    executor.update(&mut conn, DEBIT, &sql_args![100, "AA"]).await.unwrap();
    let err = conn
        .set_transaction_isolation(IsolationLevel::Serializable)
        .unwrap_err();
    assert!(matches!(err, DaoError::Transaction { .. }));

    conn.rollback().await.unwrap();
    conn.set_auto_commit(true).await.unwrap();

    // A new transaction may pick a different level
    conn.begin(Some(IsolationLevel::Serializable)).await.unwrap();
    executor.update(&mut conn, DEBIT, &sql_args![100, "AA"]).await.unwrap();
    conn.commit().await.unwrap();
    conn.set_auto_commit(true).await.unwrap();
    release(Some(conn), None, None).await;

    assert_eq!(balance(provider.as_ref(), "AA").await, 900);
}
