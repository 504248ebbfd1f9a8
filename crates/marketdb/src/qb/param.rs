//! Parameter storage using Arc for clone-friendly query builders.

use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A clone-friendly bound value.
///
/// Cloning a builder (or rendering it twice) shares the values instead of
/// copying them.
#[derive(Clone)]
pub struct Param(pub(crate) Arc<dyn ToSql + Send + Sync>);

impl Param {
    /// Create a new parameter from any ToSql value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }

    /// Human-readable rendering of the value for diagnostics.
    ///
    /// Strings are shown without their surrounding quotes so that a selection
    /// reads `symbol = BTC-USD` rather than `symbol = "BTC-USD"`.
    pub fn describe(&self) -> String {
        let rendered = format!("{:?}", self.0);
        match rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
        {
            Some(inner) => inner.to_string(),
            None => rendered,
        }
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&self.0).finish()
    }
}

/// Build a `Vec<Param>` from heterogeneous values.
///
/// ```ignore
/// let args = marketdb::params!["BTC-USD", 1i16];
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::qb::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::qb::Param::new($value)),+]
    };
}

/// The flat, ordered argument list of a rendered statement.
///
/// Position `i` binds placeholder `$i+1`.
#[derive(Clone, Debug, Default)]
pub struct Args {
    params: Vec<Param>,
}

impl Args {
    /// Create a new empty argument list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub(crate) fn push(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate over the bound values in placeholder order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Diagnostic rendering of every value, in placeholder order.
    pub fn describe(&self) -> Vec<String> {
        self.params.iter().map(Param::describe).collect()
    }
}
