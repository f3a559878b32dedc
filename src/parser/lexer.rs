// Lexical helpers for the filter expression parser

use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, recognize},
    sequence::{delimited, pair},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace.
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Column-like name: letters, digits, `_`, `.` and `-`, not starting with a digit.
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            opt(take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))),
        )),
        String::from,
    )(input)
}

/// A single- or double-quoted string (no escape sequences).
pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('"'), opt(is_not("\"")), char('"')),
            delimited(char('\''), opt(is_not("'")), char('\'')),
        )),
        |s: Option<&str>| s.unwrap_or_default().to_string(),
    )(input)
}

/// An unquoted token running up to whitespace, a comma or a closing bracket.
pub fn bare_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !matches!(c, ',' | '[' | ']'))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("order_date >= 1"), Ok((" >= 1", "order_date".to_string())));
        assert!(identifier("9lives").is_err());
    }

    #[test]
    fn test_string_literal_quotes() {
        assert_eq!(string_literal(r#""New York" x"#), Ok((" x", "New York".to_string())));
        assert_eq!(string_literal("'a b'"), Ok(("", "a b".to_string())));
        assert_eq!(string_literal(r#""""#), Ok(("", String::new())));
        assert!(string_literal("plain").is_err());
    }

    #[test]
    fn test_ws_skips_spaces() {
        assert_eq!(ws(identifier)("  abc  rest"), Ok(("rest", "abc".to_string())));
    }

    #[test]
    fn test_bare_word_stops_at_delimiters() {
        assert_eq!(bare_word("2024-01-01, x"), Ok((", x", "2024-01-01")));
        assert_eq!(bare_word("b]"), Ok(("]", "b")));
    }
}
