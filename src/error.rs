//! Error types for the data-access layer.
//!
//! All fallible operations return [`DaoResult`]. Variants fall into four
//! classes that callers can test for without matching on every variant:
//!
//! - connectivity: the connection could not be obtained or the configuration
//!   describing it is unusable ([`DaoError::is_connectivity`])
//! - SQL execution: the statement was rejected, either locally while binding
//!   arguments or by the database ([`DaoError::is_sql_execution`])
//! - mapping: a row could not be materialized into a record
//!   ([`DaoError::is_mapping`])
//! - resource release: only ever logged by the closer, never returned

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Connection failed: {message}")]
    Connectivity { message: String, suggestion: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("SQL execution failed: {message}")]
    SqlExecution {
        message: String,
        /// SQLSTATE, e.g. "23000" for an integrity constraint violation.
        /// Always `None` on SQLite, which has no SQLSTATE.
        sql_state: Option<String>,
    },

    #[error("Argument binding failed: {message}")]
    Binding { message: String },

    #[error("Mapping failed for column '{column}': {message}")]
    Mapping { column: String, message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("{cause}; rollback also failed: {rollback}")]
    RollbackFailed {
        cause: Box<DaoError>,
        rollback: Box<DaoError>,
    },

    #[error("Failed to release {resource}: {message}")]
    ResourceRelease { resource: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DaoError {
    /// Create a connectivity error with a helpful suggestion.
    pub fn connectivity(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a SQL execution error with optional SQL state.
    pub fn sql_execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::SqlExecution {
            message: message.into(),
            sql_state,
        }
    }

    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding {
            message: message.into(),
        }
    }

    /// Placeholder count and argument count disagree.
    pub fn argument_count(expected: usize, supplied: usize) -> Self {
        Self::binding(format!(
            "statement has {expected} placeholder(s) but {supplied} argument(s) were supplied"
        ))
    }

    pub fn mapping(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.into(),
            message: message.into(),
        }
    }

    /// The record shape has no field for a column label.
    pub fn unknown_column(column: impl Into<String>, shape: &str) -> Self {
        let column = column.into();
        Self::Mapping {
            message: format!("{shape} has no field named '{column}'"),
            column,
        }
    }

    /// The column value cannot be stored in the field's declared type.
    pub fn type_mismatch(column: impl Into<String>, expected: &str, found: &str) -> Self {
        Self::mapping(column, format!("expected {expected}, found {found}"))
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Combine the error that aborted a transaction with the rollback failure.
    pub fn rollback_failed(cause: DaoError, rollback: DaoError) -> Self {
        Self::RollbackFailed {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    pub fn resource_release(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceRelease {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connectivity { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the database, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::SqlExecution { sql_state, .. } => sql_state.as_deref(),
            Self::RollbackFailed { cause, .. } => cause.sql_state(),
            _ => None,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Configuration { .. })
    }

    /// Binding failures count as SQL execution failures: the statement was
    /// rejected, just before reaching the database.
    pub fn is_sql_execution(&self) -> bool {
        matches!(self, Self::SqlExecution { .. } | Self::Binding { .. })
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// The error that started the failure, looking through rollback wrappers.
    pub fn root_cause(&self) -> &DaoError {
        match self {
            Self::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Convert sqlx errors to DaoError.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DaoError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                // SQLite reports numeric result codes, not SQLSTATE values
                let code = if db_err.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() {
                    None
                } else {
                    db_err.code().map(|c| c.to_string())
                };
                DaoError::sql_execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DaoError::sql_execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => DaoError::connectivity(
                "Timed out waiting for a pooled connection",
                "Raise max_connections or acquire_timeout, or release connections sooner",
            ),
            sqlx::Error::PoolClosed => {
                DaoError::connectivity("Connection pool is closed", "Create a new provider")
            }
            sqlx::Error::Io(io_err) => DaoError::connectivity(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DaoError::connectivity(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DaoError::connectivity(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DaoError::sql_execution(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DaoError::mapping(col.clone(), format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DaoError::mapping(
                index.to_string(),
                format!("Column index {} out of bounds (len: {})", index, len),
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DaoError::mapping(index, format!("Failed to decode value: {}", source))
            }
            sqlx::Error::Decode(source) => {
                DaoError::mapping("?", format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => DaoError::connectivity(
                "Database worker crashed",
                "Reconnect; the connection is no longer usable",
            ),
            _ => DaoError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for data-access operations.
pub type DaoResult<T> = Result<T, DaoError>;
