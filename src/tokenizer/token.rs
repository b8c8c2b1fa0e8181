use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    combinator::recognize,
    error::{context, VerboseError, VerboseErrorKind},
    sequence::pair,
    IResult,
};
use std::str::FromStr;
use thiserror::Error;

use super::{
    comment::parse_comment,
    keyword::Keyword,
    literal::{parse_literal, Literal, UNTERMINATED, UNTERMINATED_TRIPLE},
    symbol::{parse_delimiter, parse_operator, Delimiter, Operator},
    whitespace::{parse_continuation, parse_newline, parse_whitespace},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    Operator(Operator),
    Delimiter(Delimiter),
    Literal(Literal),
    // Formatting
    Whitespace(String),
    Newline,
    Continuation,
    Comment(String),
    // Layout, produced by the preprocessor
    Indent,
    Dedent,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Token::Whitespace(_) | Token::Comment(_) | Token::Continuation
        )
    }

    /// Short human readable form used in syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Keyword(keyword) => format!("'{}'", keyword.as_ref()),
            Token::Identifier(name) => format!("'{}'", name),
            Token::Operator(op) => format!("'{}'", op),
            Token::Delimiter(delimiter) => format!("'{}'", delimiter.symbol()),
            Token::Literal(Literal::Integer(n)) => n.to_string(),
            Token::Literal(Literal::Float(n)) => n.to_string(),
            Token::Literal(_) => "string literal".to_string(),
            Token::Whitespace(_) => "whitespace".to_string(),
            Token::Newline => "newline".to_string(),
            Token::Continuation => "line continuation".to_string(),
            Token::Comment(_) => "comment".to_string(),
            Token::Indent => "indent".to_string(),
            Token::Dedent => "dedent".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_position: usize,
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_position: 0,
            current_line: 1,   // 1-based
            current_column: 1, // 1-based
        }
    }

    #[tracing::instrument(level = "debug", skip(self, input))]
    pub fn tokenize(&mut self, input: &str) -> TokenizerResult<Vec<TokenSpan>> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            let start_position = self.current_position;
            let start_line = self.current_line;
            let start_column = self.current_column;

            let result = alt((
                parse_whitespace,
                parse_continuation,
                parse_newline,
                parse_comment,
                parse_literal,
                parse_identifier,
                parse_operator,
                parse_delimiter,
            ))(remaining);

            match result {
                Ok((new_remaining, token)) => {
                    let consumed = &remaining[..(remaining.len() - new_remaining.len())];
                    self.update_position(consumed);

                    tokens.push(TokenSpan {
                        token,
                        start: start_position,
                        end: self.current_position,
                        line: start_line,
                        column: start_column,
                    });

                    remaining = new_remaining;
                }
                Err(e) => {
                    let error = self.to_error(remaining, e);
                    tracing::debug!("{}", error);
                    return Err(error);
                }
            }
        }

        Ok(tokens)
    }

    fn to_error(&self, remaining: &str, e: nom::Err<VerboseError<&str>>) -> TokenizerError {
        let found = remaining.chars().take(20).collect::<String>();
        let span = Span {
            start: self.current_position,
            end: self.current_position + 1,
            line: self.current_line,
            column: self.current_column,
        };
        match e {
            nom::Err::Incomplete(e) => TokenizerError::ParseError {
                message: format!("Incomplete input, {:?}", e),
                found,
                span,
            },
            // a failure carries the reason of the token kind that committed
            nom::Err::Failure(e) => {
                let reason = e.errors.iter().find_map(|(_, kind)| match kind {
                    VerboseErrorKind::Context(c) => Some(*c),
                    _ => None,
                });
                match reason {
                    Some(UNTERMINATED) => TokenizerError::UnterminatedString { span },
                    Some(UNTERMINATED_TRIPLE) => TokenizerError::UnterminatedTripleQuote { span },
                    reason => TokenizerError::ParseError {
                        message: reason.unwrap_or("invalid syntax").to_string(),
                        found,
                        span,
                    },
                }
            }
            nom::Err::Error(_) => TokenizerError::ParseError {
                message: format!(
                    "invalid character '{}'",
                    remaining.chars().next().unwrap_or(' ')
                ),
                found,
                span,
            },
        }
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            self.current_position += c.len_utf8();
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_identifier(input: &str) -> ParserResult<Token> {
    let (input, id) = context(
        "identifier",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
    )(input)?;

    if let Ok(keyword) = Keyword::from_str(id) {
        return Ok((input, Token::Keyword(keyword)));
    }

    Ok((input, Token::Identifier(id.to_string())))
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

pub type TokenizerResult<T> = Result<T, TokenizerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("{message} at {span}")]
    ParseError {
        message: String,
        found: String,
        span: Span,
    },
    #[error("unterminated string literal (detected at line {})", .span.line)]
    UnterminatedString { span: Span },
    #[error("unterminated triple-quoted string literal (detected at line {})", .span.line)]
    UnterminatedTripleQuote { span: Span },
}

impl TokenizerError {
    pub fn line(&self) -> usize {
        match self {
            TokenizerError::ParseError { span, .. }
            | TokenizerError::UnterminatedString { span }
            | TokenizerError::UnterminatedTripleQuote { span } => span.line,
        }
    }
}
