//! The search query parser.
//!
//! ## Grammar
//!
//! ```text
//! query     = term*
//! term      = spaces | group | boolean | filter | free_text
//! spaces    = whitespace+
//! group     = "(" term* ")"
//! boolean   = ("AND" | "OR") end                     (case-insensitive)
//! filter    = "!"? key ":" operator? value end
//! key       = aggregate | explicit_tag | simple_key
//! aggregate = name "(" args ")"
//! explicit  = name "[" simple_key "]"
//! operator  = ">=" | "<=" | "!=" | ">" | "<" | "="
//! value     = quoted | list | date | number | boolean | bare_text
//! list      = "[" item ("," item)* "]"
//! end       = whitespace | ")" | end of input
//! ```
//!
//! The parser is total: every input produces a token sequence whose texts
//! concatenate back to the input. Anything that does not fit the grammar is
//! kept as a `ValueText` token (free text), including unmatched parentheses.
//! A filter whose shape is fine but whose content is not is still a `Filter`;
//! see [`crate::validate`] for the second pass that marks it invalid.

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::token::{
    BooleanOperator, Filter, FilterOperator, ListItem, ParseResult, Span, Token, TokenKind,
};
use crate::validate;

/// Unit suffixes accepted directly after a number.
pub const NUMBER_UNITS: [&str; 13] = [
    "min", "day", "ms", "hr", "wk", "s", "m", "h", "d", "w", "k", "b", "%",
];

/// Parses `query` and annotates invalid filters using the built-in key typing.
pub fn parse(query: &str) -> ParseResult<'_> {
    parse_with_config(query, &SearchConfig::default())
}

/// Parses `query` and annotates invalid filters according to `config`.
pub fn parse_with_config<'a>(query: &'a str, config: &SearchConfig) -> ParseResult<'a> {
    let mut result = Parser::new(query).parse();
    validate::annotate(&mut result, config);
    debug!(tokens = result.len(), query_len = query.len(), "parsed search query");
    result
}

pub struct Parser<'a> {
    input: &'a str,
    /// Current position in the input (byte offset).
    position: usize,
}

/// A `(` whose matching `)` has not been seen yet, with the terms parsed
/// since.
struct OpenGroup<'a> {
    start: usize,
    tokens: Vec<Token<'a>>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Runs the grammar over the whole input. Never fails.
    ///
    /// Groups are tracked on an explicit stack, so nesting depth is bounded
    /// only by memory. A `(` still open at the end of input becomes a
    /// one-character `ValueText` and its terms are spliced into the
    /// enclosing sequence.
    pub fn parse(mut self) -> ParseResult<'a> {
        let mut top = Vec::new();
        let mut open: Vec<OpenGroup<'a>> = Vec::new();

        while let Some(c) = self.peek() {
            let start = self.position;
            let token = match c {
                '(' => {
                    self.bump();
                    open.push(OpenGroup {
                        start,
                        tokens: Vec::new(),
                    });
                    continue;
                }
                ')' => match open.pop() {
                    Some(group) => {
                        self.bump();
                        let inner = ParseResult::new(group.tokens);
                        self.token(TokenKind::LogicGroup(inner), group.start)
                    }
                    None => {
                        self.bump();
                        self.single_char_text(start)
                    }
                },
                _ => self.parse_term(),
            };
            match open.last_mut() {
                Some(group) => group.tokens.push(token),
                None => top.push(token),
            }
        }

        if !open.is_empty() {
            trace!(count = open.len(), "unclosed groups, treating parens as text");
        }
        // Each open group lies inside the previous one, so flattening them
        // outermost first keeps source order.
        for group in open {
            top.push(self.single_char_text(group.start));
            top.extend(group.tokens);
        }
        ParseResult::new(top)
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Advances one character and returns it.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    /// Consumes `expected` if it is the next character.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consumes characters while `pred` holds and returns them.
    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        &self.input[start..self.position]
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.input[start..self.position],
            span: Span::new(start, self.position),
        }
    }

    /// Runs `rule`, rewinding to the current position when it does not match.
    fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let start = self.position;
        let result = rule(self);
        if result.is_none() {
            self.position = start;
        }
        result
    }

    /// Whether a value may end here.
    fn at_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(c) => c.is_whitespace() || c == ')',
        }
    }

    /// Parses one term other than a parenthesis. Always consumes at least
    /// one character.
    fn parse_term(&mut self) -> Token<'a> {
        let start = self.position;
        match self.peek() {
            Some(c) if c.is_whitespace() => {
                self.eat_while(char::is_whitespace);
                self.token(TokenKind::Spaces, start)
            }
            _ => {
                if let Some(token) = self.attempt(Self::parse_logic_boolean) {
                    return token;
                }
                if let Some(token) = self.attempt(Self::parse_filter) {
                    return token;
                }
                self.parse_free_text()
            }
        }
    }

    /// The parenthesis at `start`, as text rather than part of a group.
    fn single_char_text(&self, start: usize) -> Token<'a> {
        let text = &self.input[start..start + 1];
        Token {
            kind: TokenKind::ValueText {
                value: Cow::Borrowed(text),
                quoted: false,
            },
            text,
            span: Span::new(start, start + 1),
        }
    }

    fn parse_logic_boolean(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        let word = self.eat_while(|c| !c.is_whitespace() && c != '(' && c != ')');
        let op = if word.eq_ignore_ascii_case("and") {
            BooleanOperator::And
        } else if word.eq_ignore_ascii_case("or") {
            BooleanOperator::Or
        } else {
            return None;
        };
        if !self.at_end() {
            return None;
        }
        Some(self.token(TokenKind::LogicBoolean(op), start))
    }

    fn parse_filter(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        let negated = self.eat('!');
        let key = self.parse_key()?;
        if !self.eat(':') {
            return None;
        }
        let operator = self.parse_operator();
        let value = self.parse_value();
        if !self.at_end() {
            return None;
        }
        let filter = Filter {
            negated,
            key,
            operator,
            value,
            invalid: None,
        };
        Some(self.token(TokenKind::Filter(Box::new(filter)), start))
    }

    fn parse_key(&mut self) -> Option<Token<'a>> {
        if self.peek() == Some('"') {
            return self.parse_quoted_key();
        }
        let start = self.position;
        let name = self.eat_while(is_key_char);
        if name.is_empty() {
            return None;
        }
        match self.peek() {
            Some('(') => self.parse_aggregate_key(start, name),
            Some('[') => self.parse_explicit_tag_key(start, name),
            _ => Some(self.token(
                TokenKind::KeySimple {
                    value: name,
                    quoted: false,
                },
                start,
            )),
        }
    }

    fn parse_simple_key(&mut self) -> Option<Token<'a>> {
        if self.peek() == Some('"') {
            return self.parse_quoted_key();
        }
        let start = self.position;
        let name = self.eat_while(is_key_char);
        if name.is_empty() {
            return None;
        }
        Some(self.token(
            TokenKind::KeySimple {
                value: name,
                quoted: false,
            },
            start,
        ))
    }

    /// `"key"`, where the quotes are not part of the value.
    fn parse_quoted_key(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        if !self.eat('"') {
            return None;
        }
        let name = self.eat_while(|c| is_key_char(c) || c == ':');
        if name.is_empty() || !self.eat('"') {
            return None;
        }
        Some(self.token(
            TokenKind::KeySimple {
                value: name,
                quoted: true,
            },
            start,
        ))
    }

    fn parse_aggregate_key(&mut self, start: usize, name: &'a str) -> Option<Token<'a>> {
        self.bump(); // consume '('
        let raw_args = self.eat_while(|c| c != '(' && c != ')' && c != '\n');
        if !self.eat(')') {
            return None;
        }
        let args = if raw_args.trim().is_empty() {
            Vec::new()
        } else {
            raw_args.split(',').map(str::trim).collect()
        };
        Some(self.token(TokenKind::KeyAggregate { name, args }, start))
    }

    fn parse_explicit_tag_key(&mut self, start: usize, prefix: &'a str) -> Option<Token<'a>> {
        self.bump(); // consume '['
        let key = self.parse_simple_key()?;
        if !self.eat(']') {
            return None;
        }
        Some(self.token(
            TokenKind::KeyExplicitTag {
                prefix,
                key: Box::new(key),
            },
            start,
        ))
    }

    fn parse_operator(&mut self) -> Option<FilterOperator> {
        let rest = self.rest();
        let (text, op) = FilterOperator::ALL
            .into_iter()
            .find(|(text, _)| rest.starts_with(text))?;
        self.position += text.len();
        Some(op)
    }

    /// Parses a filter value. Falls back to bare text, which may be empty.
    fn parse_value(&mut self) -> Token<'a> {
        if let Some(token) = self.attempt(|p| {
            let token = p.parse_quoted()?;
            p.at_end().then_some(token)
        }) {
            return token;
        }
        if let Some(token) = self.attempt(|p| {
            let token = p.parse_list()?;
            p.at_end().then_some(token)
        }) {
            return token;
        }
        let start = self.position;
        let text = self.eat_while(|c| !c.is_whitespace() && c != '(' && c != ')');
        self.token(classify_scalar(text), start)
    }

    /// `"..."` with `\"` escapes. Fails if the closing quote is missing.
    fn parse_quoted(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        if !self.eat('"') {
            return None;
        }
        let content_start = self.position;
        loop {
            match self.bump()? {
                '\\' => {
                    self.bump()?;
                }
                '"' => break,
                _ => {}
            }
        }
        let raw = &self.input[content_start..self.position - 1];
        let value = if raw.contains("\\\"") {
            Cow::Owned(raw.replace("\\\"", "\""))
        } else {
            Cow::Borrowed(raw)
        };
        Some(self.token(
            TokenKind::ValueText {
                value,
                quoted: true,
            },
            start,
        ))
    }

    fn parse_list(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        if !self.eat('[') {
            return None;
        }
        let mut items = Vec::new();
        let mut separator_start = self.position;
        loop {
            let separator = &self.input[separator_start..self.position];
            let value = self.parse_list_item()?;
            items.push(ListItem { separator, value });

            separator_start = self.position;
            self.eat_while(char::is_whitespace);
            if self.eat(',') {
                self.eat_while(char::is_whitespace);
                continue;
            }
            self.position = separator_start;
            break;
        }
        if !self.eat(']') {
            return None;
        }

        let numeric = items
            .iter()
            .all(|item| matches!(item.value.kind, TokenKind::ValueNumber { .. }));
        let kind = if numeric {
            TokenKind::ValueNumberList(items)
        } else {
            for item in &mut items {
                if matches!(item.value.kind, TokenKind::ValueNumber { .. }) {
                    item.value.kind = TokenKind::ValueText {
                        value: Cow::Borrowed(item.value.text),
                        quoted: false,
                    };
                }
            }
            TokenKind::ValueTextList(items)
        };
        Some(self.token(kind, start))
    }

    /// A list element: quoted text, a number, or bare text.
    fn parse_list_item(&mut self) -> Option<Token<'a>> {
        let ends_item = |c: Option<char>| match c {
            None => true,
            Some(c) => c.is_whitespace() || c == ',' || c == ']',
        };
        if let Some(token) = self.attempt(|p| {
            let token = p.parse_quoted()?;
            ends_item(p.peek()).then_some(token)
        }) {
            return Some(token);
        }
        let start = self.position;
        let text = self.eat_while(|c| {
            !c.is_whitespace() && !matches!(c, ',' | '[' | ']' | '(' | ')' | '"')
        });
        if text.is_empty() {
            return None;
        }
        let kind = match split_number(text) {
            Some((value, unit)) => TokenKind::ValueNumber { value, unit },
            None => TokenKind::ValueText {
                value: Cow::Borrowed(text),
                quoted: false,
            },
        };
        Some(self.token(kind, start))
    }

    /// Text that is not a filter, group or boolean operator.
    fn parse_free_text(&mut self) -> Token<'a> {
        if let Some(token) = self.attempt(|p| {
            let token = p.parse_quoted()?;
            p.at_end().then_some(token)
        }) {
            return token;
        }
        let start = self.position;
        let text = self.eat_while(|c| !c.is_whitespace() && c != '(' && c != ')');
        self.token(
            TokenKind::ValueText {
                value: Cow::Borrowed(text),
                quoted: false,
            },
            start,
        )
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Decides the value kind of bare filter text by its lexical form.
fn classify_scalar(text: &str) -> TokenKind<'_> {
    if is_iso8601_date(text) {
        return TokenKind::ValueIso8601Date;
    }
    if let Some((value, unit)) = split_number(text) {
        return TokenKind::ValueNumber { value, unit };
    }
    if text.eq_ignore_ascii_case("true") {
        return TokenKind::ValueBoolean(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return TokenKind::ValueBoolean(false);
    }
    TokenKind::ValueText {
        value: Cow::Borrowed(text),
        quoted: false,
    }
}

/// Splits `-12.5ms` into `("-12.5", Some("ms"))`. Returns `None` if the text
/// is not a number followed by an optional known unit.
pub fn split_number(text: &str) -> Option<(&str, Option<&str>)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        i = 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    let (value, unit) = text.split_at(i);
    if unit.is_empty() {
        Some((value, None))
    } else if NUMBER_UNITS.contains(&unit) {
        Some((value, Some(unit)))
    } else {
        None
    }
}

/// Matches `YYYY-MM-DD`, optionally followed by `THH:MM[:SS[.fff]]` and a
/// `Z` or `±HH[:]MM` offset. Only the shape is checked here.
pub fn is_iso8601_date(text: &str) -> bool {
    let mut scan = Shape::new(text);
    if !(scan.digits(4) && scan.byte(b'-') && scan.digits(2) && scan.byte(b'-') && scan.digits(2)) {
        return false;
    }
    if scan.byte(b'T') {
        if !(scan.digits(2) && scan.byte(b':') && scan.digits(2)) {
            return false;
        }
        if scan.byte(b':') {
            if !scan.digits(2) {
                return false;
            }
            if scan.byte(b'.') && scan.digits_at_least(1) == 0 {
                return false;
            }
        }
        if scan.byte(b'Z') {
            // utc
        } else if scan.byte(b'+') || scan.byte(b'-') {
            if !scan.digits(2) {
                return false;
            }
            scan.byte(b':');
            if !scan.digits(2) {
                return false;
            }
        }
    }
    scan.is_done()
}

/// Byte cursor for checking fixed lexical shapes.
struct Shape<'s> {
    bytes: &'s [u8],
    pos: usize,
}

impl<'s> Shape<'s> {
    fn new(text: &'s str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn byte(&mut self, expected: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn digits(&mut self, count: usize) -> bool {
        let end = self.pos + count;
        if end <= self.bytes.len() && self.bytes[self.pos..end].iter().all(u8::is_ascii_digit) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn digits_at_least(&mut self, min: usize) -> usize {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let count = self.pos - start;
        if count < min {
            self.pos = start;
            0
        } else {
            count
        }
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
