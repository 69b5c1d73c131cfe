//! Statement templates with positional `?` placeholders.
//!
//! Placeholders are found with the `sqlparser` tokenizer rather than a plain
//! character scan, so a `?` inside a string literal, a quoted identifier or a
//! comment is not counted. Each backend is tokenized with its own dialect:
//! backslashes escape only in MySQL strings, `#` starts a comment only in
//! MySQL, and `$$` quotes a string only in PostgreSQL. The count is checked
//! against the argument list before a statement is handed to the driver; a
//! mismatch never reaches the database.

use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, SqlValue};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Location, Token, Tokenizer};
use std::borrow::Cow;

/// An immutable SQL string, the backend it was read for and the byte offsets
/// of its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    sql: String,
    db_type: DatabaseType,
    placeholders: Vec<usize>,
}

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

impl StatementTemplate {
    /// Tokenize `sql` with `db_type`'s lexical rules and record every
    /// positional placeholder.
    ///
    /// Numbered (`?1`, `$1`) and named placeholders are rejected: arguments
    /// bind strictly left to right.
    pub fn parse(sql: impl Into<String>, db_type: DatabaseType) -> DaoResult<Self> {
        let sql = sql.into();
        let dialect = dialect_for(db_type);
        let tokens = Tokenizer::new(dialect.as_ref(), &sql)
            .tokenize_with_location()
            .map_err(|e| DaoError::binding(format!("malformed SQL: {e}")))?;

        let line_starts = line_starts(&sql);
        let mut placeholders = Vec::new();
        for token in tokens {
            let positional = match &token.token {
                Token::Placeholder(text) if text == "?" => true,
                Token::Placeholder(text) => {
                    return Err(DaoError::binding(format!(
                        "unsupported placeholder '{text}', use positional '?'"
                    )));
                }
                // The PostgreSQL lexer reads a bare `?` as an operator.
                Token::Question => db_type == DatabaseType::PostgreSQL,
                _ => false,
            };
            if positional {
                let offset = byte_offset(&sql, &line_starts, token.span.start).ok_or_else(|| {
                    DaoError::internal(format!("placeholder location out of range in: {sql}"))
                })?;
                placeholders.push(offset);
            }
        }

        Ok(Self {
            sql,
            db_type,
            placeholders,
        })
    }

    /// The template as written by the caller.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Backend whose lexical rules the template was read with.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// SQL in the placeholder syntax the backend expects.
    ///
    /// MySQL and SQLite take `?` as is; PostgreSQL needs `$1..$n`.
    pub fn render(&self) -> Cow<'_, str> {
        if self.db_type != DatabaseType::PostgreSQL || self.placeholders.is_empty() {
            return Cow::Borrowed(&self.sql);
        }
        let mut out = String::with_capacity(self.sql.len() + self.placeholders.len() * 2);
        let mut last = 0;
        for (i, &offset) in self.placeholders.iter().enumerate() {
            out.push_str(&self.sql[last..offset]);
            out.push('$');
            out.push_str(&(i + 1).to_string());
            last = offset + 1;
        }
        out.push_str(&self.sql[last..]);
        Cow::Owned(out)
    }

    /// Pair this template with `args`.
    ///
    /// Fails with a binding error when the argument count differs from the
    /// placeholder count.
    pub fn bind(&self, args: &[SqlValue]) -> DaoResult<BoundStatement> {
        self.check_arity(args.len())?;
        Ok(BoundStatement {
            sql: self.render().into_owned(),
            args: args.to_vec(),
            db_type: self.db_type,
        })
    }

    pub(crate) fn check_arity(&self, supplied: usize) -> DaoResult<()> {
        if supplied != self.placeholder_count() {
            return Err(DaoError::argument_count(self.placeholder_count(), supplied));
        }
        Ok(())
    }
}

impl std::fmt::Display for StatementTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A template rendered for one backend together with its validated arguments.
///
/// This is the statement resource: cursors borrow it, and the closer
/// releases it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    args: Vec<SqlValue>,
    db_type: DatabaseType,
}

impl BoundStatement {
    /// SQL as sent to the driver.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Statements carry backend-specific SQL; running one elsewhere is a bug.
    pub(crate) fn ensure_backend(&self, db_type: DatabaseType) -> DaoResult<()> {
        if self.db_type != db_type {
            return Err(DaoError::binding(format!(
                "statement was prepared for {} but the connection is {}",
                self.db_type, db_type
            )));
        }
        Ok(())
    }

    /// Statements hold no server-side resources; closing drops the SQL and
    /// arguments.
    pub fn close(self) -> DaoResult<()> {
        Ok(())
    }
}

/// Byte offset of the first character of every line (1-based lines).
fn line_starts(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Convert a tokenizer location (1-based line and character column) to a
/// byte offset.
fn byte_offset(sql: &str, line_starts: &[usize], location: Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
    let start = *line_starts.get(line)?;
    sql[start..]
        .char_indices()
        .nth(column)
        .map(|(i, _)| start + i)
}
