//! reldao - run one parameterized statement through a selectable provider.

use reldao::config::{Command, Config};
use reldao::db::{self, StatementExecutor, TransactionCoordinator, build_provider};
use reldao::error::DaoResult;
use reldao::models::SqlValue;
use reldao::{DbConnection, IsolationLevel};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so that stdout carries only results
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let data_source = config.data_source()?;
    info!(
        provider = %config.provider,
        db_type = %data_source.db_type,
        url = %data_source.masked_url(),
        "Starting reldao v{}",
        env!("CARGO_PKG_VERSION")
    );

    let provider = build_provider(config.provider, &data_source)?;
    let mut conn = provider.acquire().await?;

    let result = match config.isolation {
        Some(level) => run_in_transaction(&mut conn, level, config.command.clone()).await,
        None => run_command(&mut conn, &config.command).await,
    };

    db::release(Some(conn), None, None).await;
    provider.close().await;

    match result {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, suggestion = ?e.suggestion(), "Statement failed");
            Err(e.into())
        }
    }
}

/// Run the command and render its result for stdout.
async fn run_command(conn: &mut DbConnection, command: &Command) -> DaoResult<String> {
    let executor = StatementExecutor::new();
    match command {
        Command::Query { sql, args } => {
            let rows = executor.query_maps(conn, sql, &parse_args(args)).await?;
            let json: Vec<_> = rows.iter().map(|row| row.to_json()).collect();
            serde_json::to_string_pretty(&json)
                .map_err(|e| reldao::DaoError::internal(e.to_string()))
        }
        Command::Update { sql, args } => {
            let affected = executor.update(conn, sql, &parse_args(args)).await?;
            Ok(format!("{affected} row(s) affected"))
        }
        Command::Scalar { sql, args } => {
            let value = executor.scalar(conn, sql, &parse_args(args)).await?;
            Ok(value.map_or_else(|| "(no rows)".to_string(), |v| v.to_string()))
        }
    }
}

/// Run the command as a single transaction at the given isolation level.
async fn run_in_transaction(
    conn: &mut DbConnection,
    level: IsolationLevel,
    command: Command,
) -> DaoResult<String> {
    TransactionCoordinator::with_isolation(level)
        .run(conn, move |conn| {
            Box::pin(async move { run_command(conn, &command).await })
        })
        .await
}

fn parse_args(args: &[String]) -> Vec<SqlValue> {
    args.iter().map(|a| SqlValue::parse_literal(a)).collect()
}
