use crate::token::Token;

/// Whether the cursor sits inside `token`.
///
/// Spans are half-open, so a cursor placed directly after the last character
/// of a token (`cursor == span.end`) is not within it. A missing cursor is
/// never within any token.
pub fn is_within_token(token: &Token<'_>, cursor: Option<usize>) -> bool {
    cursor.is_some_and(|position| token.span.contains(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn test_cursor_boundaries() {
        let result = Parser::new("a:1 is:unresolved").parse();
        let filter = &result.tokens[2];
        assert_eq!(filter.span.start, 4);
        assert_eq!(filter.span.end, 17);

        assert!(!is_within_token(filter, Some(3)));
        assert!(is_within_token(filter, Some(4)));
        assert!(is_within_token(filter, Some(16)));
        assert!(!is_within_token(filter, Some(17)));
        assert!(!is_within_token(filter, None));
    }

    #[test]
    fn test_empty_token_contains_nothing() {
        let result = Parser::new("is:").parse();
        let value = &result.tokens[0].as_filter().unwrap().value;
        assert!(value.span.is_empty());
        assert!(!is_within_token(value, Some(3)));
    }
}
