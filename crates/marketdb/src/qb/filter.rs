//! Composable AND/OR predicate trees.
//!
//! A [`FilterBracket`] holds leaf predicates (a template with `?` markers plus
//! its arguments) and nested brackets. Rendering walks the tree in pre-order
//! and binds every argument through one [`ArgSequencer`], so placeholder
//! numbers and argument positions can never drift apart, however deep the
//! nesting goes.

use crate::error::{OrmError, OrmResult};
use crate::qb::param::{Args, Param};
use crate::qb::sequencer::{ArgSequencer, count_placeholders, describe_template};
use serde::{Deserialize, Serialize};
use std::ops::{Bound, Range, RangeFrom, RangeInclusive, RangeTo, RangeToInclusive};
use std::str::FromStr;
use tokio_postgres::types::ToSql;

/// Fragment rendered for a bracket without entries.
pub const TAUTOLOGY: &str = "1=1";

/// Boolean operator joining the entries of a bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

impl FromStr for BoolOp {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(BoolOp::And),
            "OR" => Ok(BoolOp::Or),
            other => Err(OrmError::structural(format!(
                "unknown filter operator '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
enum Entry {
    Leaf { template: String, args: Vec<Param> },
    Nested(FilterBracket),
}

/// A boolean composition node over leaf predicates and nested brackets.
#[derive(Clone, Debug)]
pub struct FilterBracket {
    op: BoolOp,
    entries: Vec<Entry>,
}

impl Default for FilterBracket {
    fn default() -> Self {
        Self::and()
    }
}

impl FilterBracket {
    /// Create an empty bracket joined by `op`.
    pub fn new(op: BoolOp) -> Self {
        Self {
            op,
            entries: Vec::new(),
        }
    }

    /// Create an empty AND bracket.
    pub fn and() -> Self {
        Self::new(BoolOp::And)
    }

    /// Create an empty OR bracket.
    pub fn or() -> Self {
        Self::new(BoolOp::Or)
    }

    pub fn operator(&self) -> BoolOp {
        self.op
    }

    /// Append a leaf predicate. `?` marks each placeholder, matched to `args`
    /// left to right; write `??` for a literal `?` such as the JSONB key
    /// operator.
    pub fn set_filter(mut self, template: impl Into<String>, args: Vec<Param>) -> Self {
        self.add_filter(template, args);
        self
    }

    /// Append a leaf predicate with exactly one argument.
    pub fn set_filter_value<T: ToSql + Send + Sync + 'static>(
        self,
        template: impl Into<String>,
        value: T,
    ) -> Self {
        self.set_filter(template, vec![Param::new(value)])
    }

    /// Append a nested bracket as one entry.
    pub fn push_bracket(mut self, bracket: FilterBracket) -> Self {
        self.add_bracket(bracket);
        self
    }

    pub(crate) fn add_filter(&mut self, template: impl Into<String>, args: Vec<Param>) {
        self.entries.push(Entry::Leaf {
            template: template.into(),
            args,
        });
    }

    pub(crate) fn add_bracket(&mut self, bracket: FilterBracket) {
        self.entries.push(Entry::Nested(bracket));
    }

    /// True when the bracket would render the tautology.
    ///
    /// Nested brackets without leaves do not count as entries.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|entry| match entry {
            Entry::Leaf { .. } => false,
            Entry::Nested(inner) => inner.is_empty(),
        })
    }

    /// Check that every leaf has as many arguments as `?` markers.
    pub fn validate(&self) -> OrmResult<()> {
        for entry in &self.entries {
            match entry {
                Entry::Leaf { template, args } => {
                    let expected = count_placeholders(template);
                    if expected != args.len() {
                        return Err(OrmError::structural(format!(
                            "filter '{}' has {} placeholder(s) but {} argument(s)",
                            template,
                            expected,
                            args.len()
                        )));
                    }
                }
                Entry::Nested(inner) => inner.validate()?,
            }
        }
        Ok(())
    }

    /// Render into an ongoing pass.
    ///
    /// Empty brackets render [`TAUTOLOGY`]; otherwise the entries are joined by
    /// the operator and wrapped in parentheses. Empty nested brackets are
    /// skipped so they neither narrow an AND nor widen an OR.
    pub fn render(&self, seq: &mut ArgSequencer) -> String {
        if self.is_empty() {
            return TAUTOLOGY.to_string();
        }

        let parts: Vec<String> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Leaf { template, args } => Some(seq.bind_template(template, args)),
                Entry::Nested(inner) if inner.is_empty() => None,
                Entry::Nested(inner) => Some(inner.render(seq)),
            })
            .collect();

        format!("({})", parts.join(&format!(" {} ", self.op.keyword())))
    }

    /// Render on its own, numbering placeholders from `$1`.
    pub fn generate_sql(&self) -> OrmResult<(String, Args)> {
        self.validate()?;
        let mut seq = ArgSequencer::new();
        let sql = self.render(&mut seq);
        Ok((sql, seq.finish()))
    }

    /// Human-readable rendering with values inlined, for logs and error text.
    ///
    /// The outermost parentheses are dropped: `symbol = BTC-USD AND type = 1`.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return TAUTOLOGY.to_string();
        }
        self.describe_parts()
    }

    fn describe_parts(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Leaf { template, args } => Some(describe_template(template, args)),
                Entry::Nested(inner) if inner.is_empty() => None,
                Entry::Nested(inner) => Some(format!("({})", inner.describe_parts())),
            })
            .collect();
        parts.join(&format!(" {} ", self.op.keyword()))
    }

    /// Lower a list of single values and ranges on `field` into an OR bracket:
    /// the field matches any of them.
    ///
    /// | value | lowered to |
    /// |---|---|
    /// | `Single(v)` | `field = ?` |
    /// | lower bound only | `field > ?` / `field >= ?` |
    /// | upper bound only | `field < ?` / `field <= ?` |
    /// | both bounds | `(field >= ? AND field < ?)` as one nested entry |
    /// | no bound | nothing |
    pub fn any_of<T, I>(field: &str, values: I) -> Self
    where
        T: ToSql + Send + Sync + 'static,
        I: IntoIterator<Item = ValueFilter<T>>,
    {
        let mut bracket = FilterBracket::or();
        for value in values {
            match value {
                ValueFilter::Single(v) => {
                    bracket.add_filter(format!("{field} = ?"), vec![Param::new(v)]);
                }
                ValueFilter::Range { lower, upper } => {
                    let lower = match lower {
                        Bound::Included(v) => Some((">=", v)),
                        Bound::Excluded(v) => Some((">", v)),
                        Bound::Unbounded => None,
                    };
                    let upper = match upper {
                        Bound::Included(v) => Some(("<=", v)),
                        Bound::Excluded(v) => Some(("<", v)),
                        Bound::Unbounded => None,
                    };
                    match (lower, upper) {
                        (Some((lo_op, lo)), Some((hi_op, hi))) => {
                            let between = FilterBracket::and()
                                .set_filter_value(format!("{field} {lo_op} ?"), lo)
                                .set_filter_value(format!("{field} {hi_op} ?"), hi);
                            bracket.add_bracket(between);
                        }
                        (Some((op, v)), None) | (None, Some((op, v))) => {
                            bracket.add_filter(format!("{field} {op} ?"), vec![Param::new(v)]);
                        }
                        (None, None) => {}
                    }
                }
            }
        }
        bracket
    }
}

/// One accepted value of a list filter: an exact value or a bounded range.
///
/// Deserializes from `{"single": v}` or
/// `{"range": {"lower": {"Included": v}, "upper": "Unbounded"}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFilter<T> {
    Single(T),
    Range { lower: Bound<T>, upper: Bound<T> },
}

impl<T> ValueFilter<T> {
    pub fn single(value: T) -> Self {
        ValueFilter::Single(value)
    }

    pub fn range(lower: Bound<T>, upper: Bound<T>) -> Self {
        ValueFilter::Range { lower, upper }
    }

    /// `field >= value`
    pub fn at_least(value: T) -> Self {
        Self::range(Bound::Included(value), Bound::Unbounded)
    }

    /// `field > value`
    pub fn greater_than(value: T) -> Self {
        Self::range(Bound::Excluded(value), Bound::Unbounded)
    }

    /// `field <= value`
    pub fn at_most(value: T) -> Self {
        Self::range(Bound::Unbounded, Bound::Included(value))
    }

    /// `field < value`
    pub fn less_than(value: T) -> Self {
        Self::range(Bound::Unbounded, Bound::Excluded(value))
    }
}

impl<T> From<Range<T>> for ValueFilter<T> {
    fn from(r: Range<T>) -> Self {
        Self::range(Bound::Included(r.start), Bound::Excluded(r.end))
    }
}

impl<T> From<RangeInclusive<T>> for ValueFilter<T> {
    fn from(r: RangeInclusive<T>) -> Self {
        let (start, end) = r.into_inner();
        Self::range(Bound::Included(start), Bound::Included(end))
    }
}

impl<T> From<RangeFrom<T>> for ValueFilter<T> {
    fn from(r: RangeFrom<T>) -> Self {
        Self::at_least(r.start)
    }
}

impl<T> From<RangeTo<T>> for ValueFilter<T> {
    fn from(r: RangeTo<T>) -> Self {
        Self::less_than(r.end)
    }
}

impl<T> From<RangeToInclusive<T>> for ValueFilter<T> {
    fn from(r: RangeToInclusive<T>) -> Self {
        Self::at_most(r.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_empty_bracket_is_tautology() {
        let (sql, args) = FilterBracket::and().generate_sql().unwrap();
        assert_eq!(sql, "1=1");
        assert!(args.is_empty());

        let (sql, _) = FilterBracket::or().generate_sql().unwrap();
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn test_or_bracket_numbers_left_to_right() {
        let (sql, args) = FilterBracket::or()
            .set_filter_value("f = ?", 5i32)
            .set_filter_value("f > ?", 10i32)
            .generate_sql()
            .unwrap();
        assert_eq!(sql, "(f = $1 OR f > $2)");
        assert_eq!(args.describe(), vec!["5", "10"]);
    }

    #[test]
    fn test_nested_brackets_flatten_in_pre_order() {
        let inner = FilterBracket::and()
            .set_filter_value("b >= ?", 2i32)
            .set_filter_value("b < ?", 3i32);
        let (sql, args) = FilterBracket::or()
            .set_filter_value("a = ?", 1i32)
            .push_bracket(inner)
            .set_filter_value("c = ?", 4i32)
            .generate_sql()
            .unwrap();
        assert_eq!(sql, "(a = $1 OR (b >= $2 AND b < $3) OR c = $4)");
        assert_eq!(args.describe(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_empty_nested_bracket_is_skipped() {
        let (sql, args) = FilterBracket::or()
            .set_filter_value("a = ?", 1i32)
            .push_bracket(FilterBracket::and())
            .generate_sql()
            .unwrap();
        assert_eq!(sql, "(a = $1)");
        assert_eq!(args.len(), 1);

        let only_empty = FilterBracket::and().push_bracket(FilterBracket::or());
        assert!(only_empty.is_empty());
        assert_eq!(only_empty.generate_sql().unwrap().0, "1=1");
    }

    #[test]
    fn test_multi_placeholder_leaf() {
        let (sql, args) = FilterBracket::and()
            .set_filter("open_time >= ? AND open_time < ?", params![10i64, 20i64])
            .set_filter_value("interval = ?", "1m")
            .generate_sql()
            .unwrap();
        assert_eq!(sql, "(open_time >= $1 AND open_time < $2 AND interval = $3)");
        assert_eq!(args.describe(), vec!["10", "20", "1m"]);
    }

    #[test]
    fn test_placeholder_argument_mismatch_is_structural() {
        let err = FilterBracket::and()
            .push_bracket(FilterBracket::or().set_filter("a = ? OR b = ?", params![1i32]))
            .generate_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::Structural(_)));
    }

    #[test]
    fn test_describe_inlines_values() {
        let bracket = FilterBracket::and()
            .set_filter_value("symbol = ?", "BTC-USD")
            .push_bracket(
                FilterBracket::or()
                    .set_filter_value("type = ?", 1i16)
                    .set_filter_value("type = ?", 2i16),
            );
        assert_eq!(
            bracket.describe(),
            "symbol = BTC-USD AND (type = 1 OR type = 2)"
        );
        assert_eq!(FilterBracket::and().describe(), "1=1");
    }

    #[test]
    fn test_bool_op_parse() {
        assert_eq!("or".parse::<BoolOp>().unwrap(), BoolOp::Or);
        assert_eq!(" AND ".parse::<BoolOp>().unwrap(), BoolOp::And);
        assert!("XOR".parse::<BoolOp>().is_err());
    }

    #[test]
    fn test_any_of_single_bounds() {
        let (sql, args) = FilterBracket::any_of(
            "tick_size",
            vec![
                ValueFilter::greater_than(1i64),
                ValueFilter::at_least(2i64),
                ValueFilter::less_than(3i64),
                ValueFilter::at_most(4i64),
            ],
        )
        .generate_sql()
        .unwrap();
        assert_eq!(
            sql,
            "(tick_size > $1 OR tick_size >= $2 OR tick_size < $3 OR tick_size <= $4)"
        );
        assert_eq!(args.describe(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_any_of_both_bounds_are_anded() {
        let (sql, args) = FilterBracket::any_of(
            "decimals",
            vec![ValueFilter::single(8i16), ValueFilter::from(2i16..6)],
        )
        .generate_sql()
        .unwrap();
        // A two-sided range must hold on both sides, not on either.
        assert_eq!(sql, "(decimals = $1 OR (decimals >= $2 AND decimals < $3))");
        assert_eq!(args.describe(), vec!["8", "2", "6"]);
    }

    #[test]
    fn test_any_of_inclusive_range_and_unbounded() {
        let (sql, args) = FilterBracket::any_of(
            "trades",
            vec![
                ValueFilter::from(10i64..=20),
                ValueFilter::range(Bound::Unbounded, Bound::Unbounded),
            ],
        )
        .generate_sql()
        .unwrap();
        assert_eq!(sql, "((trades >= $1 AND trades <= $2))");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_any_of_empty_list_does_not_narrow() {
        let bracket = FilterBracket::any_of::<i64, _>("trades", Vec::new());
        assert!(bracket.is_empty());
        let (sql, _) = FilterBracket::and()
            .set_filter_value("pair_id = ?", 3i64)
            .push_bracket(bracket)
            .generate_sql()
            .unwrap();
        assert_eq!(sql, "(pair_id = $1)");
    }
}
