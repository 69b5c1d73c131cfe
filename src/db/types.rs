//! Database-agnostic column decoding.
//!
//! This module turns a driver row into column labels and [`SqlValue`]s.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's declared type into a logical category
//! 2. Database-specific decoders extract the value for that category
//!
//! A value the driver cannot decode is reported as a mapping error. Nothing is
//! silently turned into NULL.

use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, SqlValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Temporal types - before integers ("interval" contains "int") and
    // before text, since "datetime" and "timestamp" both contain "time"
    if lower == "timestamptz" || lower == "timestamp with time zone" {
        return TypeCategory::TimestampTz;
    }
    if lower.contains("timestamp") || lower.contains("datetime") {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" || lower == "timetz" {
        return TypeCategory::Time;
    }
    if lower == "interval" {
        return TypeCategory::Unknown;
    }

    // Boolean - MySQL reports TINYINT(1) as BOOLEAN
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "enum" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

/// Prepared statements return NUMERIC in PostgreSQL's binary base-10000
/// form; only the simple query protocol sends text.
impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        if value.format() == PgValueFormat::Text {
            let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
            return Ok(RawDecimal(s.to_string()));
        }
        let decimal = <sqlx::types::Decimal as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(decimal.to_string()))
    }
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// A result row whose columns can be read by position.
///
/// Positions are 0-based here; the public cursor API exposes 1-based
/// ordinals on top of this.
pub trait RowDecode {
    fn column_count(&self) -> usize;

    /// Column label: the alias when the query gave one, else the column name.
    fn column_label(&self, idx: usize) -> &str;

    /// Declared type name as reported by the driver.
    fn column_type(&self, idx: usize) -> &str;

    fn decode_value(&self, idx: usize) -> DaoResult<SqlValue>;

    /// Decode every column into (label, value) pairs in column order.
    fn decode_all(&self) -> DaoResult<Vec<(String, SqlValue)>> {
        (0..self.column_count())
            .map(|idx| Ok((self.column_label(idx).to_string(), self.decode_value(idx)?)))
            .collect()
    }
}

/// Attach the column label to a decode failure.
fn decode_error(label: &str, err: sqlx::Error) -> DaoError {
    match DaoError::from(err) {
        DaoError::Mapping { message, .. } => DaoError::mapping(label, message),
        other => other,
    }
}

impl RowDecode for MySqlRow {
    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn column_label(&self, idx: usize) -> &str {
        self.columns()[idx].name()
    }

    fn column_type(&self, idx: usize) -> &str {
        self.columns()[idx].type_info().name()
    }

    fn decode_value(&self, idx: usize) -> DaoResult<SqlValue> {
        let category = categorize_type(self.column_type(idx), DatabaseType::MySQL);
        mysql::decode_column(self, idx, category)
            .map_err(|e| decode_error(self.column_label(idx), e))
    }
}

impl RowDecode for PgRow {
    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn column_label(&self, idx: usize) -> &str {
        self.columns()[idx].name()
    }

    fn column_type(&self, idx: usize) -> &str {
        self.columns()[idx].type_info().name()
    }

    fn decode_value(&self, idx: usize) -> DaoResult<SqlValue> {
        let category = categorize_type(self.column_type(idx), DatabaseType::PostgreSQL);
        postgres::decode_column(self, idx, category)
            .map_err(|e| decode_error(self.column_label(idx), e))
    }
}

impl RowDecode for SqliteRow {
    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn column_label(&self, idx: usize) -> &str {
        self.columns()[idx].name()
    }

    fn column_type(&self, idx: usize) -> &str {
        self.columns()[idx].type_info().name()
    }

    fn decode_value(&self, idx: usize) -> DaoResult<SqlValue> {
        let category = categorize_type(self.column_type(idx), DatabaseType::SQLite);
        sqlite::decode_column(self, idx, category)
            .map_err(|e| decode_error(self.column_label(idx), e))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

/// Decode `Option<T>` and wrap it, NULL becoming `SqlValue::Null`.
macro_rules! decode_as {
    ($row:expr, $idx:expr, $t:ty, $wrap:expr) => {
        $row.try_get::<Option<$t>, _>($idx)
            .map(|v| v.map($wrap).unwrap_or(SqlValue::Null))
    };
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_as!(row, idx, RawDecimal, |v: RawDecimal| {
                SqlValue::Decimal(v.0)
            }),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as!(row, idx, bool, SqlValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_as!(row, idx, Vec<u8>, SqlValue::Bytes),
            TypeCategory::Json => decode_as!(row, idx, serde_json::Value, SqlValue::Json),
            TypeCategory::Date => decode_as!(row, idx, NaiveDate, SqlValue::Date),
            TypeCategory::Time => decode_as!(row, idx, NaiveTime, SqlValue::Time),
            TypeCategory::Timestamp | TypeCategory::TimestampTz => decode_timestamp(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => {
                decode_as!(row, idx, String, SqlValue::Text)
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = decode_as!(row, idx, i64, SqlValue::Int) {
            return Ok(v);
        }
        // BIGINT UNSIGNED above i64::MAX keeps its exact digits
        decode_as!(row, idx, u64, |v: u64| match i64::try_from(v) {
            Ok(signed) => SqlValue::Int(signed),
            Err(_) => SqlValue::Decimal(v.to_string()),
        })
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = decode_as!(row, idx, f64, SqlValue::Float) {
            return Ok(v);
        }
        decode_as!(row, idx, f32, |v: f32| SqlValue::Float(f64::from(v)))
    }

    /// TIMESTAMP columns are UTC instants; DATETIME carries no zone.
    fn decode_timestamp(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = decode_as!(row, idx, DateTime<Utc>, SqlValue::TimestampTz) {
            return Ok(v);
        }
        decode_as!(row, idx, NaiveDateTime, SqlValue::Timestamp)
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_as!(row, idx, RawDecimal, |v: RawDecimal| {
                SqlValue::Decimal(v.0)
            }),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as!(row, idx, bool, SqlValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_as!(row, idx, Vec<u8>, SqlValue::Bytes),
            TypeCategory::Json => decode_as!(row, idx, serde_json::Value, SqlValue::Json),
            TypeCategory::Date => decode_as!(row, idx, NaiveDate, SqlValue::Date),
            TypeCategory::Time => decode_as!(row, idx, NaiveTime, SqlValue::Time),
            TypeCategory::Timestamp => decode_as!(row, idx, NaiveDateTime, SqlValue::Timestamp),
            TypeCategory::TimestampTz => {
                decode_as!(row, idx, DateTime<Utc>, SqlValue::TimestampTz)
            }
            TypeCategory::Text | TypeCategory::Unknown => {
                decode_as!(row, idx, String, SqlValue::Text)
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = decode_as!(row, idx, i64, SqlValue::Int) {
            return Ok(v);
        }
        if let Ok(v) = decode_as!(row, idx, i32, |v: i32| SqlValue::Int(i64::from(v))) {
            return Ok(v);
        }
        decode_as!(row, idx, i16, |v: i16| SqlValue::Int(i64::from(v)))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = decode_as!(row, idx, f64, SqlValue::Float) {
            return Ok(v);
        }
        decode_as!(row, idx, f32, |v: f32| SqlValue::Float(f64::from(v)))
    }
}

mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use sqlx::ValueRef;

    /// SQLite values carry their own storage class, which may differ from the
    /// declared column type. Declared temporal and boolean columns are decoded
    /// as such when the stored value allows it; otherwise the storage class
    /// decides.
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage = raw.type_info().name().to_ascii_uppercase();

        let declared = match (category, storage.as_str()) {
            (TypeCategory::Date, "TEXT") => decode_as!(row, idx, NaiveDate, SqlValue::Date).ok(),
            (TypeCategory::Time, "TEXT") => decode_as!(row, idx, NaiveTime, SqlValue::Time).ok(),
            (TypeCategory::Timestamp | TypeCategory::TimestampTz, "TEXT") => {
                decode_as!(row, idx, NaiveDateTime, SqlValue::Timestamp).ok()
            }
            (TypeCategory::Boolean, "INTEGER" | "BOOLEAN") => {
                decode_as!(row, idx, bool, SqlValue::Bool).ok()
            }
            (TypeCategory::Json, "TEXT") => {
                decode_as!(row, idx, serde_json::Value, SqlValue::Json).ok()
            }
            _ => None,
        };
        if let Some(value) = declared {
            return Ok(value);
        }

        match storage.as_str() {
            "INTEGER" | "BOOLEAN" => decode_as!(row, idx, i64, SqlValue::Int),
            "REAL" => decode_as!(row, idx, f64, SqlValue::Float),
            "BLOB" => decode_as!(row, idx, Vec<u8>, SqlValue::Bytes),
            _ => decode_as!(row, idx, String, SqlValue::Text),
        }
    }
}
