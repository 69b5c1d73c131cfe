//! Integration tests for connection providers on SQLite.
//!
//! Tests verify that:
//! - Every provider kind hands out working connections
//! - Pools are built lazily, exactly once, even under concurrent acquires
//! - Connection failures and exhausted pools surface as connectivity errors
//! - Pooled connections come back in auto-commit mode
//! - A connection dropped mid-transaction does not leak it into the pool
//! - Named profiles resolve through the registry

use futures_util::future::join_all;
use reldao::config::{DataSourceConfig, PoolOptions, ProviderKind};
use reldao::db::{
    Bb8Provider, ConnectionProvider, DeadpoolProvider, PoolBackend, PoolProvider,
    ProviderRegistry, SqlxPoolProvider, StatementExecutor, build_provider, release,
    release_connection,
};
use reldao::error::DaoError;
use reldao::models::{DatabaseType, TransactionState};
use reldao::sql_args;
use tempfile::NamedTempFile;

/// Create a database file holding three items and return its URL.
async fn setup_items() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = format!("sqlite:{}", db_path);

    let config = DataSourceConfig::from_url(&url).unwrap();
    let provider = build_provider(ProviderKind::Direct, &config).unwrap();
    let mut conn = provider.acquire().await.unwrap();
    let executor = StatementExecutor::new();
    executor
        .update(
            &mut conn,
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();
    executor
        .update_batch(
            &mut conn,
            "insert into items(label) values(?)",
            &[sql_args!["a"], sql_args!["b"], sql_args!["c"]],
        )
        .await
        .unwrap();
    release_connection(conn).await;
    url
}

fn pool_config(url: &str, max_connections: u32) -> DataSourceConfig {
    DataSourceConfig::from_url(url)
        .unwrap()
        .with_pool_options(PoolOptions {
            max_connections: Some(max_connections),
            acquire_timeout_secs: Some(1),
            ..Default::default()
        })
}

async fn count_items(provider: &dyn ConnectionProvider) -> i64 {
    let mut conn = provider.acquire().await.unwrap();
    let count = StatementExecutor::new()
        .value::<i64>(&mut conn, "select count(*) from items", &[])
        .await
        .unwrap()
        .unwrap();
    release_connection(conn).await;
    count
}

/// Acquire from `provider` from eight concurrent callers.
async fn acquire_concurrently<B: PoolBackend>(provider: &PoolProvider<B>) {
    let callers = (0..8).map(|_| count_items(provider));
    let counts = join_all(callers).await;
    assert!(counts.iter().all(|count| *count == 3));
}

#[tokio::test]
async fn test_every_provider_kind_serves_connections() {
    let url = setup_items().await;

    for kind in ProviderKind::ALL {
        let provider = build_provider(kind, &pool_config(&url, 2)).unwrap();
        assert_eq!(provider.kind(), kind);
        assert_eq!(provider.db_type(), DatabaseType::SQLite);

        let mut conn = provider.acquire().await.unwrap();
        assert_eq!(conn.provider(), kind);
        assert_eq!(conn.state(), TransactionState::AutoCommit);
        conn.ping().await.unwrap();

        let labels = StatementExecutor::new()
            .query_maps(&mut conn, "select label from items order by id", &[])
            .await
            .unwrap();
        assert_eq!(labels.len(), 3, "provider {kind}");
        release(Some(conn), None, None).await;
        provider.close().await;
    }
}

#[tokio::test]
async fn test_pools_initialize_lazily_and_once() {
    let url = setup_items().await;
    let config = pool_config(&url, 4);

    let sqlx = SqlxPoolProvider::new(&config).unwrap();
    let bb8 = Bb8Provider::new(&config).unwrap();
    let deadpool = DeadpoolProvider::new(&config).unwrap();
    assert!(!sqlx.is_initialized());
    assert!(!bb8.is_initialized());
    assert!(!deadpool.is_initialized());

    acquire_concurrently(&sqlx).await;
    acquire_concurrently(&bb8).await;
    acquire_concurrently(&deadpool).await;

    assert_eq!(sqlx.initializations(), 1);
    assert_eq!(bb8.initializations(), 1);
    assert_eq!(deadpool.initializations(), 1);

    count_items(&sqlx).await;
    assert_eq!(sqlx.initializations(), 1);

    sqlx.close().await;
    bb8.close().await;
    deadpool.close().await;
}

#[tokio::test]
async fn test_unreachable_database_is_connectivity_error() {
    let url = "sqlite:/nonexistent-reldao-dir/nested/shop.db";
    let config = pool_config(url, 1);

    let direct = build_provider(ProviderKind::Direct, &config).unwrap();
    let err = direct.acquire().await.unwrap_err();
    assert!(err.is_connectivity(), "got {err:?}");
    assert!(err.suggestion().is_some());

    let sqlx = SqlxPoolProvider::new(&config).unwrap();
    let err = sqlx.acquire().await.unwrap_err();
    assert!(err.is_connectivity(), "got {err:?}");
    assert!(!sqlx.is_initialized());
    assert_eq!(sqlx.initializations(), 0);

    let deadpool = DeadpoolProvider::new(&config).unwrap();
    let err = deadpool.acquire().await.unwrap_err();
    assert!(err.is_connectivity(), "got {err:?}");
    assert!(!deadpool.is_initialized());
}

#[tokio::test]
async fn test_exhausted_pool_times_out() {
    let url = setup_items().await;
    let config = pool_config(&url, 1);

    let sqlx = SqlxPoolProvider::new(&config).unwrap();
    let held = sqlx.acquire().await.unwrap();
    let err = sqlx.acquire().await.unwrap_err();
    assert!(matches!(err, DaoError::Connectivity { .. }), "got {err:?}");
    release_connection(held).await;
    assert_eq!(count_items(&sqlx).await, 3);

    let deadpool = DeadpoolProvider::new(&config).unwrap();
    let held = deadpool.acquire().await.unwrap();
    let err = deadpool.acquire().await.unwrap_err();
    assert!(matches!(err, DaoError::Connectivity { .. }), "got {err:?}");
    release_connection(held).await;
    assert_eq!(count_items(&deadpool).await, 3);
}

#[tokio::test]
async fn test_closed_pool_rejects_acquire() {
    let url = setup_items().await;
    let config = pool_config(&url, 1);

    let sqlx = SqlxPoolProvider::new(&config).unwrap();
    count_items(&sqlx).await;
    sqlx.close().await;
    assert!(sqlx.acquire().await.unwrap_err().is_connectivity());

    let deadpool = DeadpoolProvider::new(&config).unwrap();
    count_items(&deadpool).await;
    deadpool.close().await;
    assert!(deadpool.acquire().await.unwrap_err().is_connectivity());
}

#[tokio::test]
async fn test_pooled_connection_returns_in_auto_commit() {
    let url = setup_items().await;
    let executor = StatementExecutor::new();

    for kind in [ProviderKind::Sqlx, ProviderKind::Bb8, ProviderKind::Deadpool] {
        let provider = build_provider(kind, &pool_config(&url, 1)).unwrap();

        let mut conn = provider.acquire().await.unwrap();
        conn.set_auto_commit(false).await.unwrap();
        executor
            .update(&mut conn, "delete from items", &[])
            .await
            .unwrap();
        // Released mid-transaction: the delete must not survive
        release(Some(conn), None, None).await;

        let mut conn = provider.acquire().await.unwrap();
        assert_eq!(conn.state(), TransactionState::AutoCommit, "provider {kind}");
        let count = executor
            .value::<i64>(&mut conn, "select count(*) from items", &[])
            .await
            .unwrap();
        assert_eq!(count, Some(3), "provider {kind}");
        release(Some(conn), None, None).await;
        provider.close().await;
    }
}

#[tokio::test]
async fn test_dropped_connection_does_not_leak_transaction() {
    let url = setup_items().await;
    let executor = StatementExecutor::new();
    let direct = build_provider(ProviderKind::Direct, &pool_config(&url, 1)).unwrap();

    for kind in [ProviderKind::Sqlx, ProviderKind::Bb8, ProviderKind::Deadpool] {
        let provider = build_provider(kind, &pool_config(&url, 1)).unwrap();
        let before = count_items(direct.as_ref()).await;

        let mut conn = provider.acquire().await.unwrap();
        conn.set_auto_commit(false).await.unwrap();
        executor
            .update(&mut conn, "insert into items(label) values(?)", &sql_args!["dropped"])
            .await
            .unwrap();
        assert!(conn.in_transaction());
        // Dropped without release: the pool must not hand out the open BEGIN
        drop(conn);

        let mut conn = provider.acquire().await.unwrap();
        assert!(!conn.in_transaction(), "provider {kind}");
        executor
            .update(&mut conn, "insert into items(label) values(?)", &sql_args!["kept"])
            .await
            .unwrap();
        release(Some(conn), None, None).await;

        // Visible on an unrelated connection, so the insert really committed
        assert_eq!(count_items(direct.as_ref()).await, before + 1, "provider {kind}");
        let mut check = direct.acquire().await.unwrap();
        let dropped = executor
            .value::<i64>(
                &mut check,
                "select count(*) from items where label = ?",
                &sql_args!["dropped"],
            )
            .await
            .unwrap();
        assert_eq!(dropped, Some(0), "provider {kind}");
        release_connection(check).await;

        let mut conn = provider.acquire().await.unwrap();
        conn.set_auto_commit(false).await.unwrap();
        let updated = executor
            .update(
                &mut conn,
                "update items set label = ? where label = ?",
                &sql_args!["kept-2", "kept"],
            )
            .await
            .unwrap();
        assert!(updated >= 1, "provider {kind}");
        conn.commit().await.unwrap();
        conn.set_auto_commit(true).await.unwrap();
        release(Some(conn), None, None).await;
        provider.close().await;
    }
}

#[tokio::test]
async fn test_properties_configure_pool() {
    let url = setup_items().await;
    let config = DataSourceConfig::from_properties([
        ("url", format!("jdbc:{url}")),
        ("driverClass", "org.sqlite.JDBC".to_string()),
        ("maxActive", "2".to_string()),
        ("maxWait", "1500".to_string()),
    ])
    .unwrap();
    assert_eq!(config.db_type, DatabaseType::SQLite);
    assert_eq!(config.pool_options.max_connections, Some(2));
    assert_eq!(config.pool_options.acquire_timeout_secs, Some(2));

    let provider = build_provider(ProviderKind::Bb8, &config).unwrap();
    assert_eq!(count_items(provider.as_ref()).await, 3);
    provider.close().await;
}

#[tokio::test]
async fn test_registry_resolves_profiles() {
    let url = setup_items().await;
    let registry = ProviderRegistry::new();

    registry
        .register(
            "primary",
            build_provider(ProviderKind::Direct, &pool_config(&url, 1)).unwrap(),
        )
        .await
        .unwrap();
    registry
        .register(
            "pooled",
            build_provider(ProviderKind::Deadpool, &pool_config(&url, 2)).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(registry.names().await, ["pooled", "primary"]);

    let err = registry
        .register(
            "primary",
            build_provider(ProviderKind::Sqlx, &pool_config(&url, 1)).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Configuration { .. }));

    let conn = registry.acquire("pooled").await.unwrap();
    assert_eq!(conn.provider(), ProviderKind::Deadpool);
    release(Some(conn), None, None).await;

    let err = registry.acquire("missing").await.unwrap_err();
    assert!(err.is_connectivity());

    registry.close_all().await;
    assert!(registry.names().await.is_empty());
}
