//! Declarative macros for reducing code duplication.
//!
//! `impl_db_dispatch!` generates per-backend match arms over the crate's
//! backend enums; `impl_record!` generates the column binding table for a
//! record type. Both expand at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// The first argument names the enum whose `MySql`, `Postgres` and `SQLite`
/// variants are matched.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(Backend, &mut self.backend, {
///     MySql(c) => do_mysql(c),
///     Postgres(c) => do_postgres(c),
///     SQLite(c) => do_sqlite(c),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $enum::$variant($p) => $body,
            )+
        }
    };
}

/// Implement [`Record`](crate::db::mapper::Record) by listing the fields that
/// receive columns.
///
/// Each field binds the column whose label equals the field name, or the
/// label given after `=`. Field types must implement
/// [`FromSqlValue`](crate::models::FromSqlValue).
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Order {
///     order_id: i64,
///     order_name: String,
///     order_date: Option<NaiveDate>,
/// }
///
/// impl_record!(Order {
///     order_id = "orderId",
///     order_name = "orderName",
///     order_date = "orderDate",
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident $(= $label:literal)?),+ $(,)? }) => {
        impl $crate::db::mapper::Record for $ty {
            fn bind(
                &mut self,
                column: &str,
                value: $crate::models::SqlValue,
            ) -> $crate::error::DaoResult<()> {
                $(
                    if column == $crate::__record_label!($field $(, $label)?) {
                        self.$field = $crate::db::mapper::convert(column, value)?;
                        return Ok(());
                    }
                )+
                Err($crate::error::DaoError::unknown_column(column, stringify!($ty)))
            }

            fn columns() -> &'static [&'static str] {
                &[$($crate::__record_label!($field $(, $label)?)),+]
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_label {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $label:literal) => {
        $label
    };
}

pub use impl_db_dispatch;
pub use impl_record;
