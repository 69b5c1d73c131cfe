//! Releasing connections, statements and cursors.
//!
//! [`release`] accepts any subset of the three resources and closes the ones
//! present in cursor, statement, connection order. A failure closing one of
//! them is logged and does not stop the others from being released.
//!
//! A cursor borrows its statement and connection, so a cursor still alive is
//! released in its own call before the other two:
//!
//! ```ignore
//! let mut cursor = executor.open_cursor(&mut conn, &stmt).await?;
//! let first = cursor.next_map().await;
//! release(None, None, Some(cursor)).await;
//! release(Some(conn), Some(stmt), None).await;
//! ```

use crate::db::connection::DbConnection;
use crate::db::cursor::RowCursor;
use crate::db::template::BoundStatement;
use crate::error::DaoError;
use tracing::warn;

/// Release whichever resources are present. Never fails.
pub async fn release(
    connection: Option<DbConnection>,
    statement: Option<BoundStatement>,
    cursor: Option<RowCursor<'_>>,
) {
    if let Some(cursor) = cursor {
        if let Err(e) = cursor.close() {
            log_release_failure("cursor", e);
        }
    }
    if let Some(statement) = statement {
        if let Err(e) = statement.close() {
            log_release_failure("statement", e);
        }
    }
    if let Some(connection) = connection {
        if let Err(e) = connection.close().await {
            log_release_failure("connection", e);
        }
    }
}

/// Release a connection on its own.
pub async fn release_connection(connection: DbConnection) {
    release(Some(connection), None, None).await;
}

fn log_release_failure(resource: &str, error: DaoError) {
    let error = DaoError::resource_release(resource, error.to_string());
    warn!(resource = %resource, error = %error, "Ignoring failure while releasing resource");
}
