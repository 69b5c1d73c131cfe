//! Generic row mapping.
//!
//! A record type describes how it receives columns by implementing
//! [`Record`]; usually through [`impl_record!`](crate::impl_record), which
//! generates a compile-time table from column label to field. The mapper
//! creates a fresh default record per row and hands it every column in order.
//! A label the record does not know, or a value the field type cannot hold,
//! fails the whole row with a mapping error.

use crate::db::types::RowDecode;
use crate::error::{DaoError, DaoResult};
use crate::models::{FromSqlValue, SqlValue};
use serde_json::Value as JsonValue;

/// A type that rows can be mapped into.
pub trait Record: Default + Send {
    /// Store `value` in the field bound to `column`.
    fn bind(&mut self, column: &str, value: SqlValue) -> DaoResult<()>;

    /// Column labels this record accepts, in declaration order. Empty for
    /// records that accept any label.
    fn columns() -> &'static [&'static str] {
        &[]
    }
}

/// Convert a column value into a field's type, reporting mismatches against
/// the column label.
pub fn convert<V: FromSqlValue>(column: &str, value: SqlValue) -> DaoResult<V> {
    V::from_sql_value(value).map_err(|found| {
        DaoError::type_mismatch(column, V::TYPE_NAME, found.type_name())
    })
}

/// Map one row into a new record.
pub fn map_row<R: RowDecode + ?Sized, T: Record>(row: &R) -> DaoResult<T> {
    let mut record = T::default();
    for idx in 0..row.column_count() {
        let value = row.decode_value(idx)?;
        record.bind(row.column_label(idx), value)?;
    }
    Ok(record)
}

/// Map every row, in order. No rows gives an empty Vec.
pub fn map_rows<R: RowDecode, T: Record>(rows: &[R]) -> DaoResult<Vec<T>> {
    rows.iter().map(map_row).collect()
}

/// A row kept as ordered (label, value) pairs.
///
/// Accepts every column, so it maps any query. Duplicate labels are kept
/// as they come.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    entries: Vec<(String, SqlValue)>,
}

impl ColumnMap {
    /// First value stored under `label`.
    pub fn get(&self, label: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    /// Value at a 1-based column ordinal.
    pub fn get_index(&self, ordinal: usize) -> Option<&SqlValue> {
        ordinal
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
            .map(|(_, value)| value)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, SqlValue)> {
        self.entries
    }

    /// Convert to a JSON object (later duplicates overwrite earlier ones).
    pub fn to_json(&self) -> JsonValue {
        let map: serde_json::Map<String, JsonValue> = self
            .entries
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

impl Record for ColumnMap {
    fn bind(&mut self, column: &str, value: SqlValue) -> DaoResult<()> {
        self.entries.push((column.to_string(), value));
        Ok(())
    }
}
