//! The token definition for the search query language.

use std::borrow::Cow;
use std::fmt;

use crate::validate::InvalidReason;

/// A token is a single classified unit of the query, with a specific kind,
/// the exact text it was parsed from, and its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// The exact substring of the query this token spans.
    pub text: &'a str,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// A run of whitespace, kept so the query can be reproduced exactly.
    Spaces,
    /// `key:value`, optionally negated and operator-qualified.
    Filter(Box<Filter<'a>>),

    // Values
    /// Plain text, either bare or quoted. `value` is unescaped.
    ValueText { value: Cow<'a, str>, quoted: bool },
    ValueTextList(Vec<ListItem<'a>>),
    /// A number with an optional unit suffix, e.g. `-24h` or `500k`.
    ValueNumber { value: &'a str, unit: Option<&'a str> },
    ValueNumberList(Vec<ListItem<'a>>),
    ValueBoolean(bool),
    ValueIso8601Date,

    // Logic
    /// A parenthesized sub-expression.
    LogicGroup(ParseResult<'a>),
    LogicBoolean(BooleanOperator),

    // Keys
    KeySimple { value: &'a str, quoted: bool },
    /// A function-call shaped key, e.g. `count()` or `p95(transaction.duration)`.
    KeyAggregate { name: &'a str, args: Vec<&'a str> },
    /// `prefix[key]`; the inner key is always a `KeySimple`.
    KeyExplicitTag { prefix: &'a str, key: Box<Token<'a>> },
}

/// One element of a list value. `separator` is the exact text preceding the
/// value (empty for the first item, e.g. `", "` for the rest).
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem<'a> {
    pub separator: &'a str,
    pub value: Token<'a>,
}

/// The contents of a `Filter` token.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<'a> {
    pub negated: bool,
    pub key: Token<'a>,
    pub operator: Option<FilterOperator>,
    pub value: Token<'a>,
    /// Set by the validation pass; advisory only.
    pub invalid: Option<InvalidReason>,
}

impl<'a> Filter<'a> {
    /// The bare name of the key: the unquoted simple key, the aggregate
    /// function name, or the inner key of an explicit tag.
    pub fn key_name(&self) -> &'a str {
        match &self.key.kind {
            TokenKind::KeySimple { value, .. } => *value,
            TokenKind::KeyAggregate { name, .. } => *name,
            TokenKind::KeyExplicitTag { key, .. } => match &key.kind {
                TokenKind::KeySimple { value, .. } => *value,
                _ => key.text,
            },
            _ => self.key.text,
        }
    }

    pub fn is_explicit_tag(&self) -> bool {
        matches!(self.key.kind, TokenKind::KeyExplicitTag { .. })
    }
}

/// Comparison operator between a filter key and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Gte,   // >=
    Lt,    // <
    Lte,   // <=
}

impl FilterOperator {
    /// Longest spellings first so `>=` is never read as `>`.
    pub(crate) const ALL: [(&'static str, FilterOperator); 6] = [
        (">=", FilterOperator::Gte),
        ("<=", FilterOperator::Lte),
        ("!=", FilterOperator::NotEq),
        (">", FilterOperator::Gt),
        ("<", FilterOperator::Lt),
        ("=", FilterOperator::Eq),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
        }
    }

    /// Ordering comparisons, only meaningful for numbers and dates.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized boolean operator between terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOperator {
    And,
    Or,
}

impl BooleanOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
        }
    }
}

impl fmt::Display for BooleanOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Half-open containment: `start <= offset < end`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies entirely inside this span.
    pub fn encloses(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl<'a> Token<'a> {
    /// Direct children of this token, in source order.
    pub fn children(&self) -> Vec<&Token<'a>> {
        match &self.kind {
            TokenKind::Filter(filter) => vec![&filter.key, &filter.value],
            TokenKind::ValueTextList(items) | TokenKind::ValueNumberList(items) => {
                items.iter().map(|item| &item.value).collect()
            }
            TokenKind::LogicGroup(inner) => inner.tokens.iter().collect(),
            TokenKind::KeyExplicitTag { key, .. } => vec![key.as_ref()],
            _ => Vec::new(),
        }
    }

    pub fn as_filter(&self) -> Option<&Filter<'a>> {
        match &self.kind {
            TokenKind::Filter(filter) => Some(filter.as_ref()),
            _ => None,
        }
    }

    /// Rebuilds the token's text from its structure rather than from `text`.
    #[cfg(test)]
    pub(crate) fn reconstruct(&self) -> String {
        match &self.kind {
            TokenKind::Filter(filter) => {
                let mut out = String::new();
                if filter.negated {
                    out.push('!');
                }
                out.push_str(&filter.key.reconstruct());
                out.push(':');
                if let Some(op) = filter.operator {
                    out.push_str(op.as_str());
                }
                out.push_str(&filter.value.reconstruct());
                out
            }
            TokenKind::ValueTextList(items) | TokenKind::ValueNumberList(items) => {
                let mut out = String::from("[");
                for item in items {
                    out.push_str(item.separator);
                    out.push_str(&item.value.reconstruct());
                }
                out.push(']');
                out
            }
            TokenKind::LogicGroup(inner) => format!("({})", inner.to_query_string()),
            TokenKind::KeyExplicitTag { prefix, key } => {
                format!("{}[{}]", prefix, key.reconstruct())
            }
            TokenKind::ValueNumber { value, unit } => {
                format!("{}{}", value, unit.unwrap_or_default())
            }
            _ => self.text.to_string(),
        }
    }

    /// A short name for the token kind.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TokenKind::Spaces => "Spaces",
            TokenKind::Filter(_) => "Filter",
            TokenKind::ValueText { .. } => "ValueText",
            TokenKind::ValueTextList(_) => "ValueTextList",
            TokenKind::ValueNumber { .. } => "ValueNumber",
            TokenKind::ValueNumberList(_) => "ValueNumberList",
            TokenKind::ValueBoolean(_) => "ValueBoolean",
            TokenKind::ValueIso8601Date => "ValueIso8601Date",
            TokenKind::LogicGroup(_) => "LogicGroup",
            TokenKind::LogicBoolean(_) => "LogicBoolean",
            TokenKind::KeySimple { .. } => "KeySimple",
            TokenKind::KeyAggregate { .. } => "KeyAggregate",
            TokenKind::KeyExplicitTag { .. } => "KeyExplicitTag",
        }
    }
}

/// The ordered sequence of top-level tokens produced by one parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseResult<'a> {
    pub tokens: Vec<Token<'a>>,
}

impl<'a> ParseResult<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token<'a>> {
        self.tokens.iter()
    }

    /// Concatenates the text of every token; equal to the parsed query.
    pub fn to_query_string(&self) -> String {
        self.tokens.iter().map(|t| t.text).collect()
    }

    /// Every filter in the result, including those nested in groups, in
    /// source order.
    pub fn filters(&self) -> Vec<&Filter<'a>> {
        let mut out = Vec::new();
        let mut pending: Vec<std::slice::Iter<'_, Token<'a>>> = vec![self.tokens.iter()];
        while let Some(tokens) = pending.last_mut() {
            let Some(token) = tokens.next() else {
                pending.pop();
                continue;
            };
            match &token.kind {
                TokenKind::Filter(filter) => out.push(filter.as_ref()),
                TokenKind::LogicGroup(inner) => pending.push(inner.tokens.iter()),
                _ => {}
            }
        }
        out
    }
}

impl Drop for ParseResult<'_> {
    /// Drops nested groups without recursing once per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.tokens);
        while let Some(mut token) = pending.pop() {
            if let TokenKind::LogicGroup(inner) = &mut token.kind {
                pending.append(&mut inner.tokens);
            }
        }
    }
}

impl<'r, 'a> IntoIterator for &'r ParseResult<'a> {
    type Item = &'r Token<'a>;
    type IntoIter = std::slice::Iter<'r, Token<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_is_half_open() {
        let span = Span::new(2, 5);
        assert!(!span.contains(1));
        assert!(span.contains(2));
        assert!(span.contains(4));
        assert!(!span.contains(5));
        assert_eq!(span.len(), 3);
        assert!(!Span::new(3, 3).contains(3));
    }

    #[test]
    fn test_span_encloses() {
        let outer = Span::new(0, 10);
        assert!(outer.encloses(&Span::new(0, 10)));
        assert!(outer.encloses(&Span::new(3, 3)));
        assert!(!outer.encloses(&Span::new(5, 11)));
    }

    #[test]
    fn test_operator_spellings() {
        for (text, op) in FilterOperator::ALL {
            assert_eq!(op.as_str(), text);
        }
        assert!(FilterOperator::Gte.is_comparison());
        assert!(!FilterOperator::NotEq.is_comparison());
    }
}
