//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use tokio_postgres::Row;

/// Trait for converting a database row into a record.
///
/// This is the per-entity scan function used by the executor.
///
/// # Example
///
/// ```ignore
/// use marketdb::{FromRow, OrmResult, RowExt};
///
/// struct Market {
///     id: i64,
///     symbol: String,
/// }
///
/// impl FromRow for Market {
///     fn from_row(row: &tokio_postgres::Row) -> OrmResult<Self> {
///         Ok(Self {
///             id: row.try_get_column("id")?,
///             symbol: row.try_get_column("symbol")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for i64 {
    fn from_row(row: &Row) -> OrmResult<Self> {
        row.try_get(0)
            .map_err(|e| OrmError::decode("0", e.to_string()))
    }
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning OrmError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| OrmError::decode(column, e.to_string()))
    }
}
