//! # Literals
//!
//! String literals support the `r` and `f` prefixes (in either order and case),
//! single, double and triple quotes, and the usual backslash escapes. The body
//! of an f-string is split into [`StringPart`]s here. The parser later turns
//! each replacement field into an expression.
//!
//! Numbers cover decimal, hexadecimal, octal and binary integers, floats with
//! optional exponents, and `_` digit separators. A leading `-` is never part of
//! a literal. It is a unary operator.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize},
    error::{context, VerboseError, VerboseErrorKind},
    sequence::{pair, tuple},
};

use super::token::{ParserResult, Token};

pub const UNTERMINATED: &str = "unterminated string literal";
pub const UNTERMINATED_TRIPLE: &str = "unterminated triple-quoted string literal";
const INTEGER_TOO_LARGE: &str = "integer literal too large";
const INVALID_FSTRING: &str = "invalid f-string";

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Interpolation {
        expression: String,
        conversion: Option<char>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    FString(Vec<StringPart>),
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, Default)]
struct Prefix {
    raw: bool,
    format: bool,
}

fn failure<'a, T>(input: &'a str, reason: &'static str) -> ParserResult<'a, T> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(reason))],
    }))
}

fn parse_prefix(input: &str) -> ParserResult<Prefix> {
    map(
        opt(alt((
            tag_no_case("rf"),
            tag_no_case("fr"),
            tag_no_case("r"),
            tag_no_case("f"),
        ))),
        |prefix: Option<&str>| {
            let prefix = prefix.unwrap_or_default().to_ascii_lowercase();
            Prefix {
                raw: prefix.contains('r'),
                format: prefix.contains('f'),
            }
        },
    )(input)
}

fn parse_quote(input: &str) -> ParserResult<&str> {
    alt((tag("\"\"\""), tag("'''"), tag("\""), tag("'")))(input)
}

/// Scans up to the closing `quote`, honouring backslash escapes. Running into
/// the end of input, or a line break in a single-quoted string, is a failure
/// so the tokenizer does not backtrack into other token kinds.
fn string_body<'a>(input: &'a str, quote: &str) -> ParserResult<'a, &'a str> {
    let triple = quote.len() == 3;
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if !triple && (c == '\n' || c == '\r') {
            break;
        }
        if input[i..].starts_with(quote) {
            return Ok((&input[i + quote.len()..], &input[..i]));
        }
    }
    failure(input, if triple { UNTERMINATED_TRIPLE } else { UNTERMINATED })
}

/// Resolves backslash escapes. Unknown escapes keep their backslash.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                let decoded = (digits.len() == width)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Splits an f-string body into literal text and replacement fields.
pub fn split_format_parts(body: &str, raw: bool) -> Result<Vec<StringPart>, &'static str> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = body.chars().peekable();

    let flush = |text: &mut String, parts: &mut Vec<StringPart>| {
        if !text.is_empty() {
            let literal = if raw { text.clone() } else { unescape(text) };
            parts.push(StringPart::Literal(literal));
            text.clear();
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                flush(&mut text, &mut parts);
                let mut field = String::new();
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                loop {
                    let Some(c) = chars.next() else {
                        return Err("f-string: expecting '}'");
                    };
                    if let Some(q) = quote {
                        if c == q {
                            quote = None;
                        }
                        field.push(c);
                        continue;
                    }
                    match c {
                        '\'' | '"' => {
                            quote = Some(c);
                            field.push(c);
                        }
                        '(' | '[' | '{' => {
                            depth += 1;
                            field.push(c);
                        }
                        ')' | ']' => {
                            depth = depth.saturating_sub(1);
                            field.push(c);
                        }
                        '}' if depth == 0 => break,
                        '}' => {
                            depth -= 1;
                            field.push(c);
                        }
                        _ => field.push(c),
                    }
                }
                parts.push(split_field(&field)?);
            }
            '}' => return Err("f-string: single '}' is not allowed"),
            _ => text.push(c),
        }
    }
    flush(&mut text, &mut parts);
    Ok(parts)
}

/// Splits `expr!r:>10` into its expression, conversion and format spec.
fn split_field(field: &str) -> Result<StringPart, &'static str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut expression_end = field.len();
    let mut conversion = None;
    let mut format_spec = None;

    let indexed: Vec<(usize, char)> = field.char_indices().collect();
    let mut k = 0;
    while k < indexed.len() {
        let (i, c) = indexed[k];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            k += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '!' if depth == 0 => {
                let flag = indexed.get(k + 1).map(|(_, c)| *c);
                let after = indexed.get(k + 2).map(|(_, c)| *c);
                if matches!(flag, Some('r' | 's' | 'a')) && matches!(after, None | Some(':')) {
                    expression_end = expression_end.min(i);
                    conversion = flag;
                    if after == Some(':') {
                        format_spec = Some(field[indexed[k + 2].0 + 1..].to_string());
                    }
                    break;
                }
            }
            ':' if depth == 0 => {
                expression_end = i;
                format_spec = Some(field[i + 1..].to_string());
                break;
            }
            _ => {}
        }
        k += 1;
    }

    let expression = field[..expression_end].trim();
    if expression.is_empty() {
        return Err("f-string: empty expression not allowed");
    }
    Ok(StringPart::Interpolation {
        expression: expression.to_string(),
        conversion,
        format_spec,
    })
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    let (rest, prefix) = parse_prefix(input)?;
    let (rest, quote) = parse_quote(rest)?;
    let (rest, body) = string_body(rest, quote)?;
    if prefix.format {
        match split_format_parts(body, prefix.raw) {
            Ok(parts) => Ok((rest, Literal::FString(parts))),
            Err(_) => failure(input, INVALID_FSTRING),
        }
    } else if prefix.raw {
        Ok((rest, Literal::String(body.to_string())))
    } else {
        Ok((rest, Literal::String(unescape(body))))
    }
}

fn decimal_digits(input: &str) -> ParserResult<&str> {
    recognize(pair(
        digit1,
        take_while(|c: char| c.is_ascii_digit() || c == '_'),
    ))(input)
}

fn exponent(input: &str) -> ParserResult<&str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_float_literal(input: &str) -> ParserResult<Literal> {
    let (rest, text) = context(
        "float literal",
        alt((
            recognize(tuple((
                decimal_digits,
                char('.'),
                opt(decimal_digits),
                opt(exponent),
            ))),
            recognize(tuple((char('.'), decimal_digits, opt(exponent)))),
            recognize(pair(decimal_digits, exponent)),
        )),
    )(input)?;
    match text.replace('_', "").parse::<f64>() {
        Ok(value) => Ok((rest, Literal::Float(value))),
        Err(_) => failure(input, "invalid float literal"),
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_radix_integer(input: &str) -> ParserResult<Literal> {
    let (rest, prefix) = alt((tag_no_case("0x"), tag_no_case("0o"), tag_no_case("0b")))(input)?;
    let radix = match prefix.as_bytes()[1].to_ascii_lowercase() {
        b'x' => 16,
        b'o' => 8,
        _ => 2,
    };
    let (rest, digits) = take_while1(|c: char| c.is_digit(radix) || c == '_')(rest)?;
    match i64::from_str_radix(&digits.replace('_', ""), radix) {
        Ok(value) => Ok((rest, Literal::Integer(value))),
        Err(_) => failure(input, INTEGER_TOO_LARGE),
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_integer_literal(input: &str) -> ParserResult<Literal> {
    let (rest, digits) = context("integer literal", decimal_digits)(input)?;
    match digits.replace('_', "").parse::<i64>() {
        Ok(value) => Ok((rest, Literal::Integer(value))),
        Err(_) => failure(input, INTEGER_TOO_LARGE),
    }
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((
                parse_string_literal,
                parse_float_literal,
                parse_radix_integer,
                parse_integer_literal,
            )),
            Token::Literal,
        ),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(input: &str) -> Literal {
        match parse_literal(input).unwrap().1 {
            Token::Literal(literal) => literal,
            other => panic!("not a literal: {:?}", other),
        }
    }

    #[test]
    fn test_plain_strings() {
        assert_eq!(literal("'hi'"), Literal::String("hi".to_string()));
        assert_eq!(literal("\"it's\""), Literal::String("it's".to_string()));
        assert_eq!(literal(r"'a\nb'"), Literal::String("a\nb".to_string()));
        assert_eq!(literal(r"r'a\nb'"), Literal::String(r"a\nb".to_string()));
        assert_eq!(literal(r"'\x41é'"), Literal::String("Aé".to_string()));
        assert_eq!(literal(r"'\d'"), Literal::String(r"\d".to_string()));
    }

    #[test]
    fn test_triple_quoted_spans_lines() {
        let (rest, token) = parse_literal("\"\"\"one\ntwo\"\"\" tail").unwrap();
        assert_eq!(token, Token::Literal(Literal::String("one\ntwo".to_string())));
        assert_eq!(rest, " tail");
    }

    #[test]
    fn test_unterminated_is_failure() {
        match parse_literal("'abc") {
            Err(nom::Err::Failure(e)) => assert!(e
                .errors
                .iter()
                .any(|(_, kind)| matches!(kind, VerboseErrorKind::Context(c) if *c == UNTERMINATED))),
            other => panic!("expected failure, got {:?}", other),
        }
        match parse_literal("'''abc\n") {
            Err(nom::Err::Failure(e)) => assert!(e.errors.iter().any(
                |(_, kind)| matches!(kind, VerboseErrorKind::Context(c) if *c == UNTERMINATED_TRIPLE)
            )),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_without_quote_backtracks() {
        assert!(matches!(parse_literal("range"), Err(nom::Err::Error(_))));
        assert!(matches!(parse_literal("f(x)"), Err(nom::Err::Error(_))));
    }

    #[test]
    fn test_fstring_parts() {
        assert_eq!(
            literal("f'x = {x!r:>5} {{ok}} {d[\"k\"]}'"),
            Literal::FString(vec![
                StringPart::Literal("x = ".to_string()),
                StringPart::Interpolation {
                    expression: "x".to_string(),
                    conversion: Some('r'),
                    format_spec: Some(">5".to_string()),
                },
                StringPart::Literal(" {ok} ".to_string()),
                StringPart::Interpolation {
                    expression: "d[\"k\"]".to_string(),
                    conversion: None,
                    format_spec: None,
                },
            ])
        );
    }

    #[test]
    fn test_fstring_not_equal_is_not_conversion() {
        assert_eq!(
            literal("f'{a != b}'"),
            Literal::FString(vec![StringPart::Interpolation {
                expression: "a != b".to_string(),
                conversion: None,
                format_spec: None,
            }])
        );
    }

    #[test]
    fn test_invalid_fstring() {
        assert!(matches!(parse_literal("f'{}'"), Err(nom::Err::Failure(_))));
        assert!(matches!(parse_literal("f'a }'"), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(literal("42"), Literal::Integer(42));
        assert_eq!(literal("1_000"), Literal::Integer(1000));
        assert_eq!(literal("0x1F"), Literal::Integer(31));
        assert_eq!(literal("0b101"), Literal::Integer(5));
        assert_eq!(literal("0o17"), Literal::Integer(15));
        assert_eq!(literal("3.25"), Literal::Float(3.25));
        assert_eq!(literal(".5"), Literal::Float(0.5));
        assert_eq!(literal("1e3"), Literal::Float(1000.0));
        assert_eq!(literal("2.5e-1"), Literal::Float(0.25));
    }

    #[test]
    fn test_integer_overflow() {
        assert!(matches!(
            parse_literal("99999999999999999999"),
            Err(nom::Err::Failure(_))
        ));
    }
}
