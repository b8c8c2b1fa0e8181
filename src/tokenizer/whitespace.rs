//! # Whitespace
//!
//! Spaces and tabs are kept as [`Token::Whitespace`] because leading whitespace
//! carries the indentation level. A backslash at the end of a line joins it with
//! the next one and is emitted as [`Token::Continuation`].

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::{map, value},
    error::context,
    sequence::preceded,
};

use super::token::{ParserResult, Token};

/// Parses a run of spaces, tabs and form feeds.
///
/// ```
/// # use scratchpad::tokenizer::whitespace::parse_whitespace;
/// # use scratchpad::tokenizer::token::Token;
/// let (rest, token) = parse_whitespace("  \tx").unwrap();
/// assert_eq!(token, Token::Whitespace("  \t".to_string()));
/// assert_eq!(rest, "x");
/// ```
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_whitespace(input: &str) -> ParserResult<Token> {
    context(
        "whitespace",
        map(
            take_while1(|c| c == ' ' || c == '\t' || c == '\x0c'),
            |ws: &str| Token::Whitespace(ws.to_string()),
        ),
    )(input)
}

/// Parses `\n`, `\r\n` or a lone `\r`.
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_newline(input: &str) -> ParserResult<Token> {
    context(
        "newline",
        value(Token::Newline, alt((tag("\r\n"), tag("\n"), tag("\r")))),
    )(input)
}

/// Parses a backslash immediately followed by a line break.
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_continuation(input: &str) -> ParserResult<Token> {
    context(
        "line continuation",
        value(
            Token::Continuation,
            preceded(tag("\\"), alt((tag("\r\n"), tag("\n"), tag("\r")))),
        ),
    )(input)
}

/// Width of an indentation run, with tabs advancing to the next multiple of 8.
pub fn indentation_width(ws: &str) -> usize {
    ws.chars().fold(0, |width, c| match c {
        '\t' => (width / 8 + 1) * 8,
        '\x0c' => 0,
        _ => width + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newlines() {
        assert_eq!(parse_newline("\nx").unwrap(), ("x", Token::Newline));
        assert_eq!(parse_newline("\r\nx").unwrap(), ("x", Token::Newline));
        assert!(parse_newline("x").is_err());
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            parse_continuation("\\\n  y").unwrap(),
            ("  y", Token::Continuation)
        );
        assert!(parse_continuation("\\n").is_err());
    }

    #[test]
    fn test_indentation_width() {
        assert_eq!(indentation_width("    "), 4);
        assert_eq!(indentation_width("\t"), 8);
        assert_eq!(indentation_width("  \t"), 8);
        assert_eq!(indentation_width("\t  "), 10);
    }
}
