//! Connection-related data models.
//!
//! This module defines the backend identifier, isolation levels and the
//! transaction state machine every [`DbConnection`](crate::db::DbConnection)
//! walks through.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string. A leading `jdbc:` is ignored.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        let lower = lower.strip_prefix("jdbc:").unwrap_or(&lower);
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Resolve a `driverClass` property value.
    ///
    /// Accepts plain backend names as well as the JDBC driver class names
    /// found in existing property files.
    pub fn from_driver_identifier(driver: &str) -> Option<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" | "com.mysql.jdbc.driver" | "com.mysql.cj.jdbc.driver"
            | "org.mariadb.jdbc.driver" => Some(Self::MySQL),
            "postgres" | "postgresql" | "pg" | "org.postgresql.driver" => Some(Self::PostgreSQL),
            "sqlite" | "sqlite3" | "org.sqlite.jdbc" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Transaction isolation level requested for a manual-commit section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling used in `SET TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "read_uncommitted" => Ok(Self::ReadUncommitted),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(format!("unknown isolation level: {s}")),
        }
    }
}

/// Position of a connection in the manual-commit protocol.
///
/// ```text
/// AutoCommit -> ManualOpen -> {Committed | RolledBack} -> AutoCommitRestored -> Released
/// ```
///
/// `AutoCommitRestored` behaves like `AutoCommit` for every purpose except
/// reporting: a restored connection may open another transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    AutoCommit,
    ManualOpen,
    Committed,
    RolledBack,
    AutoCommitRestored,
    Released,
}

impl TransactionState {
    /// Statements issued now take effect immediately.
    pub fn is_auto_commit(&self) -> bool {
        matches!(self, Self::AutoCommit | Self::AutoCommitRestored)
    }

    /// A transaction is open and must be committed or rolled back.
    pub fn is_manual_open(&self) -> bool {
        matches!(self, Self::ManualOpen)
    }

    /// The transaction ended but auto-commit has not been restored yet.
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (AutoCommit | AutoCommitRestored, ManualOpen)
                | (ManualOpen, Committed | RolledBack)
                | (Committed | RolledBack, AutoCommitRestored)
                | (AutoCommit | AutoCommitRestored, Released)
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AutoCommit => "auto-commit",
            Self::ManualOpen => "manual-open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::AutoCommitRestored => "auto-commit-restored",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}
