//! Column and argument values.
//!
//! [`SqlValue`] is what statements are bound with and what decoded columns
//! come back as. Values are carried as the driver produced them; nothing here
//! converts between representations (a `DATE` stays a date, a `DECIMAL` keeps
//! its exact text).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    /// Exact numeric kept in the database's own text form
    Decimal(String),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamptz",
            Self::Json(_) => "json",
        }
    }

    /// Interpret a command-line literal: `null`, `true`/`false`, integers and
    /// floats are recognized, everything else is text.
    pub fn parse_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if s.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(v) = s.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = s.parse::<f64>() {
            if v.is_finite() {
                return Self::Float(v);
            }
        }
        Self::Text(s.to_string())
    }

    /// Convert to a JSON value for display.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(v) | Self::Text(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::TimestampTz(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

// =============================================================================
// Conversions into SqlValue (arguments)
// =============================================================================

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for SqlValue {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::TimestampTz(v)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Build an argument list from heterogeneous values.
///
/// ```ignore
/// let args = sql_args![20, "Gakki", None::<String>];
/// ```
#[macro_export]
macro_rules! sql_args {
    () => {
        ::std::vec::Vec::<$crate::models::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::SqlValue::from($value)),+]
    };
}

// =============================================================================
// Conversions out of SqlValue (record fields)
// =============================================================================

/// A Rust type a column value can be stored into without reinterpretation.
///
/// On mismatch the original value is handed back so the caller can report
/// what was actually found.
pub trait FromSqlValue: Sized {
    /// Name used in mapping error messages.
    const TYPE_NAME: &'static str;

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue>;
}

macro_rules! impl_from_sql_int {
    ($($t:ty),+) => {
        $(
            impl FromSqlValue for $t {
                const TYPE_NAME: &'static str = stringify!($t);

                fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
                    match value {
                        SqlValue::Int(v) => <$t>::try_from(v).map_err(|_| SqlValue::Int(v)),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

impl_from_sql_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromSqlValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Bool(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Float(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for String {
    const TYPE_NAME: &'static str = "String";

    /// Exact decimals are delivered as text, so a `String` field accepts them.
    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Text(v) | SqlValue::Decimal(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Bytes(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Date(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for NaiveTime {
    const TYPE_NAME: &'static str = "NaiveTime";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Time(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Timestamp(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::TimestampTz(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for JsonValue {
    const TYPE_NAME: &'static str = "serde_json::Value";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Json(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl FromSqlValue for SqlValue {
    const TYPE_NAME: &'static str = "SqlValue";

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        Ok(value)
    }
}

/// NULL maps to `None`; anything else must convert to `T`.
impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_sql_value(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}
