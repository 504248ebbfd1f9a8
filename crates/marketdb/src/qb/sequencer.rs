//! Placeholder numbering for a single render pass.

use crate::qb::param::{Args, Param};

/// Hands out `$n` placeholders while collecting the bound values.
///
/// Every value bound through the sequencer gets the next number, so the
/// placeholder `$i` in the rendered text always refers to `args[i - 1]`.
/// Fragments must therefore be rendered in the same order they appear in the
/// final statement.
#[derive(Debug, Default)]
pub struct ArgSequencer {
    args: Args,
}

impl ArgSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its placeholder text.
    pub fn bind(&mut self, param: Param) -> String {
        let idx = self.args.push(param);
        format!("${}", idx)
    }

    /// Number of placeholders emitted so far.
    pub fn emitted(&self) -> usize {
        self.args.len()
    }

    /// Replace every `?` marker in `template` with a fresh placeholder bound
    /// to the matching entry of `values`. `??` is written as a literal `?`.
    ///
    /// Callers validate the counts beforehand (see [`count_placeholders`]).
    pub fn bind_template(&mut self, template: &str, values: &[Param]) -> String {
        let mut result = String::with_capacity(template.len() + values.len() * 2);
        let mut values = values.iter();
        for token in Tokens::new(template) {
            match token {
                Token::Text(text) => result.push_str(text),
                Token::Marker => match values.next() {
                    Some(value) => result.push_str(&self.bind(value.clone())),
                    None => result.push('?'),
                },
            }
        }
        result
    }

    /// Finish the pass and take the collected arguments.
    pub fn finish(self) -> Args {
        self.args
    }
}

/// Count the `?` markers in a leaf template. An escaped `??` is not a
/// marker.
pub fn count_placeholders(template: &str) -> usize {
    Tokens::new(template)
        .filter(|token| *token == Token::Marker)
        .count()
}

/// Inline values into a template for diagnostics: `symbol = ?` with
/// `BTC-USD` becomes `symbol = BTC-USD`.
pub(crate) fn describe_template(template: &str, values: &[Param]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut values = values.iter();
    for token in Tokens::new(template) {
        match token {
            Token::Text(text) => result.push_str(text),
            Token::Marker => match values.next() {
                Some(value) => result.push_str(&value.describe()),
                None => result.push('?'),
            },
        }
    }
    result
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Marker,
}

/// Splits a template into literal text and `?` markers.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(template: &'a str) -> Self {
        Self { rest: template }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.find('?') {
            Some(0) if self.rest[1..].starts_with('?') => {
                self.rest = &self.rest[2..];
                Some(Token::Text("?"))
            }
            Some(0) => {
                self.rest = &self.rest[1..];
                Some(Token::Marker)
            }
            Some(at) => {
                let (text, rest) = self.rest.split_at(at);
                self.rest = rest;
                Some(Token::Text(text))
            }
            None => Some(Token::Text(std::mem::take(&mut self.rest))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_is_gap_free() {
        let mut seq = ArgSequencer::new();
        assert_eq!(seq.bind(Param::new(1i32)), "$1");
        assert_eq!(seq.bind(Param::new(2i32)), "$2");
        assert_eq!(seq.emitted(), 2);
        assert_eq!(seq.bind(Param::new(3i32)), "$3");
        assert_eq!(seq.finish().describe(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_bind_template_continues_numbering() {
        let mut seq = ArgSequencer::new();
        seq.bind(Param::new("x"));
        let sql = seq.bind_template("a = ? OR b = ?", &[Param::new(1i32), Param::new(2i32)]);
        assert_eq!(sql, "a = $2 OR b = $3");
        assert_eq!(seq.emitted(), 3);
    }

    #[test]
    fn test_describe_template() {
        let text = describe_template("symbol = ? AND type = ?", &[Param::new("BTC-USD"), Param::new(1i16)]);
        assert_eq!(text, "symbol = BTC-USD AND type = 1");
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("a = ? AND b BETWEEN ? AND ?"), 3);
        assert_eq!(count_placeholders("deleted_at IS NULL"), 0);
    }

    #[test]
    fn test_doubled_question_mark_is_literal() {
        assert_eq!(count_placeholders("metadata ?? ?"), 1);
        assert_eq!(count_placeholders("label LIKE '%??%'"), 0);
        assert_eq!(count_placeholders("a ??? b"), 1);

        let mut seq = ArgSequencer::new();
        let sql = seq.bind_template("metadata ?? ? AND id = ?", &[Param::new("tier"), Param::new(7i64)]);
        assert_eq!(sql, "metadata ? $1 AND id = $2");
        assert_eq!(seq.emitted(), 2);

        let text = describe_template("metadata ?? ?", &[Param::new("tier")]);
        assert_eq!(text, "metadata ? tier");
    }
}
