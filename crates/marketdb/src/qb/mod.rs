//! Dynamic SQL construction.
//!
//! Repositories assemble INSERT/UPDATE/SELECT statements with a
//! [`QueryBuilder`] and compose WHERE predicates from [`FilterBracket`] trees.
//! Rendering produces a [`BuiltQuery`]: SQL text with `$n` placeholders, the
//! matching argument list, and a human-readable description of the selection.
//!
//! # Features
//!
//! - **Computed placeholders**: `?` markers in leaf templates become `$n` at
//!   render time, numbered by one sequencer for the whole statement
//! - **Nested AND/OR**: brackets nest arbitrarily; arguments follow a pre-order walk
//! - **Range lowering**: lists of values and ranges become OR brackets
//! - **Safe defaults**: an empty filter is `1=1`, an UPDATE needs a SET
//!
//! # Usage
//!
//! ```ignore
//! use marketdb::{params, qb};
//!
//! let mut insert = qb::insert("core.markets");
//! insert.set_insert_field(&["symbol", "type"]);
//! insert.set_insert_values(params!["BTC-USD", 1i16])?;
//! let built = insert.generate_sql()?;
//! assert_eq!(built.sql, "INSERT INTO core.markets (symbol, type) VALUES ($1, $2)");
//!
//! let mut select = qb::select("core.trading_pairs p");
//! select
//!     .select(&["p.id", "p.tick_size"])
//!     .and_bracket(qb::FilterBracket::any_of(
//!         "p.tick_size",
//!         vec![qb::ValueFilter::from(1i64..10)],
//!     ));
//! ```

mod builder;
mod filter;
mod param;
mod sequencer;

pub use builder::{BuiltQuery, Mode, QueryBuilder};
pub use filter::{BoolOp, FilterBracket, TAUTOLOGY, ValueFilter};
pub use param::{Args, Param};
pub use sequencer::{ArgSequencer, count_placeholders};

/// Create an INSERT builder for the given table.
pub fn insert(table: &str) -> QueryBuilder {
    QueryBuilder::new(Mode::Insert, table)
}

/// Create an UPDATE builder for the given table.
pub fn update(table: &str) -> QueryBuilder {
    QueryBuilder::new(Mode::Update, table)
}

/// Create a SELECT builder for the given table (an alias may follow the name).
pub fn select(table: &str) -> QueryBuilder {
    QueryBuilder::new(Mode::Select, table)
}

#[cfg(test)]
mod tests;
