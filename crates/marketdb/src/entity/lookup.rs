//! Typed results for relationship lookups.

use crate::error::{OrmError, OrmResult};

/// Outcome of looking up a related record.
///
/// Only a missing row becomes [`Lookup::Missing`]; every other failure stays
/// an `Err` so that a broken connection is never mistaken for absent data.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// The selection that matched nothing.
    Missing(String),
}

impl<T> Lookup<T> {
    /// Classify the result of a `get`.
    pub fn from_result(result: OrmResult<T>) -> OrmResult<Self> {
        match result {
            Ok(record) => Ok(Lookup::Found(record)),
            Err(OrmError::NotFound(selection)) => Ok(Lookup::Missing(selection)),
            Err(err) => Err(err),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::Missing(_) => None,
        }
    }

    /// The record, or a validation error naming the missing relation.
    pub fn require(self, relation: &str) -> OrmResult<T> {
        match self {
            Lookup::Found(record) => Ok(record),
            Lookup::Missing(selection) => Err(OrmError::validation(format!(
                "{relation} does not exist ({selection})"
            ))),
        }
    }
}
