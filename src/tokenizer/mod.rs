//! # Tokenizer
//!
//! Lexical analysis of script source into a stream of [`TokenSpan`](token::TokenSpan)s.
//!
//! Whitespace, comments and newlines are kept as tokens so that the
//! [`preprocessor`](crate::preprocessor) can derive the indentation structure
//! from them. Each token records its byte range, line and column.
//!
//! ## Component Structure
//!
//! * [`token`]: token types and the [`Tokenizer`](token::Tokenizer) driver
//! * [`keyword`]: reserved words
//! * [`symbol`]: operators and delimiters
//! * [`literal`]: strings, f-strings and numbers
//! * [`whitespace`]: spaces, line continuations and newlines
//! * [`comment`]: `#` comments
//!
//! ## Unterminated strings
//!
//! A string that reaches the end of input is reported with a dedicated
//! [`TokenizerError`](token::TokenizerError) variant. An open triple-quoted string
//! is how the backend tells "needs more lines" apart from a real syntax error.

pub mod comment;
pub mod keyword;
pub mod literal;
pub mod symbol;
pub mod token;
pub mod whitespace;
