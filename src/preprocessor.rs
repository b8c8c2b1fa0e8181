//! Turns the raw token stream into logical lines.
//!
//! Trivia (whitespace, comments, continuations) is dropped. Newlines inside
//! brackets are dropped too. Changes in leading indentation become
//! [`Token::Indent`] and [`Token::Dedent`] markers, so the parser never looks at
//! columns.

use thiserror::Error;

use crate::tokenizer::{
    token::{Token, TokenSpan},
    whitespace::indentation_width,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("unindent does not match any outer indentation level (line {line})")]
    InconsistentDedent { line: usize },
}

/// Tokens ready for parsing, with the source line of each token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalTokens {
    pub tokens: Vec<Token>,
    pub lines: Vec<usize>,
}

impl LogicalTokens {
    fn push(&mut self, token: Token, line: usize) {
        self.tokens.push(token);
        self.lines.push(line);
    }

    pub fn line_at(&self, pos: usize) -> usize {
        self.lines
            .get(pos)
            .or_else(|| self.lines.last())
            .copied()
            .unwrap_or(1)
    }
}

#[derive(Debug, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, spans: Vec<TokenSpan>) -> Result<LogicalTokens, PreprocessError> {
        let mut output = LogicalTokens::default();
        let mut indents = vec![0usize];
        let mut depth = 0i32;
        let mut at_line_start = true;
        let mut pending_indent = 0usize;
        let mut line_has_code = false;
        let mut last_line = 1;

        for span in spans {
            last_line = span.line;
            match span.token {
                Token::Whitespace(ws) => {
                    if at_line_start && depth == 0 {
                        pending_indent = indentation_width(&ws);
                    }
                }
                Token::Comment(_) | Token::Continuation => {}
                Token::Newline => {
                    if depth == 0 {
                        if line_has_code {
                            output.push(Token::Newline, span.line);
                            line_has_code = false;
                        }
                        at_line_start = true;
                        pending_indent = 0;
                    }
                }
                token => {
                    if at_line_start {
                        let top = indents.last().copied().unwrap_or(0);
                        if pending_indent > top {
                            indents.push(pending_indent);
                            output.push(Token::Indent, span.line);
                        } else if pending_indent < top {
                            while indents.last().is_some_and(|&level| pending_indent < level) {
                                indents.pop();
                                output.push(Token::Dedent, span.line);
                            }
                            if indents.last().copied().unwrap_or(0) != pending_indent {
                                return Err(PreprocessError::InconsistentDedent { line: span.line });
                            }
                        }
                        at_line_start = false;
                    }
                    if let Token::Delimiter(delimiter) = &token {
                        depth = (depth + delimiter.depth_change()).max(0);
                    }
                    line_has_code = true;
                    output.push(token, span.line);
                }
            }
        }

        if line_has_code {
            output.push(Token::Newline, last_line);
        }
        while indents.len() > 1 {
            indents.pop();
            output.push(Token::Dedent, last_line);
        }
        Ok(output)
    }
}
