//! Token-level parser combinators and the grammar built from them.

pub mod combinators;
pub mod core;
pub mod parsers;
pub mod prelude;

pub use core::ParseError;
pub use core::ParseResult;
pub use core::Parser;

use thiserror::Error;

use crate::{
    ast::{Expression, Statement},
    preprocessor::{LogicalTokens, PreprocessError, Preprocessor},
    tokenizer::{
        symbol::Delimiter,
        token::{Token, Tokenizer, TokenizerError},
    },
};
use prelude::{many, terminated};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzeError {
    #[error(transparent)]
    Tokenize(#[from] TokenizerError),
    #[error(transparent)]
    Layout(#[from] PreprocessError),
    #[error("{message} (line {line})")]
    Syntax { message: String, line: usize },
}

impl AnalyzeError {
    pub fn line(&self) -> usize {
        match self {
            AnalyzeError::Tokenize(e) => e.line(),
            AnalyzeError::Layout(PreprocessError::InconsistentDedent { line }) => *line,
            AnalyzeError::Syntax { line, .. } => *line,
        }
    }
}

/// Tokenizes, lays out and parses a whole source fragment.
#[tracing::instrument(level = "debug", skip(source))]
pub fn parse_program(source: &str) -> Result<Vec<Statement>, AnalyzeError> {
    let spans = Tokenizer::new().tokenize(source)?;
    let logical = Preprocessor::new().process(spans)?;
    parse_logical_program(&logical)
}

pub fn parse_logical_program(logical: &LogicalTokens) -> Result<Vec<Statement>, AnalyzeError> {
    let input = &logical.tokens;
    let (pos, groups) = many(parsers::parse_statement())
        .parse(input, 0)
        .map_err(|e| syntax_error(logical, &e))?;
    if pos < input.len() {
        // `many` stops silently; rerun the failing statement for its error.
        let error = parsers::parse_statement()
            .parse(input, pos)
            .err()
            .unwrap_or(ParseError::Mismatch { position: pos });
        return Err(syntax_error(logical, &error));
    }
    Ok(groups.into_iter().flatten().collect())
}

/// Parses a single expression list, as used by f-string fields.
pub fn parse_expression_source(source: &str) -> Result<Expression, AnalyzeError> {
    let spans = Tokenizer::new().tokenize(source)?;
    let logical = Preprocessor::new().process(spans)?;
    let input = &logical.tokens;
    match terminated(parsers::parse_expression_list(), parsers::common::newline()).parse(input, 0)
    {
        Ok((pos, expression)) if pos == input.len() => Ok(expression),
        Ok((pos, _)) => Err(syntax_error(&logical, &ParseError::Mismatch { position: pos })),
        Err(e) => Err(syntax_error(&logical, &e)),
    }
}

fn syntax_error(logical: &LogicalTokens, error: &ParseError) -> AnalyzeError {
    let position = error.position();
    let tokens = &logical.tokens;
    let after_block_header = position >= 2
        && tokens.get(position - 1) == Some(&Token::Newline)
        && tokens.get(position - 2) == Some(&Token::Delimiter(Delimiter::Colon));
    let message = match (tokens.get(position), error.message()) {
        (Some(Token::Indent), _) => "unexpected indent".to_string(),
        (_, _) if after_block_header => "expected an indented block".to_string(),
        (_, Some(message)) => message.to_string(),
        (Some(Token::Newline) | None, None) => "invalid syntax".to_string(),
        (Some(token), None) => format!("invalid syntax near {}", token.describe()),
    };
    AnalyzeError::Syntax {
        message,
        line: logical.line_at(position),
    }
}
