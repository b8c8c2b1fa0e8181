//! The evaluation backend contract and the bundled script interpreter.
//!
//! A backend is fed one source line at a time, like an interactive console.
//! It buffers lines until they form a complete statement, then runs that
//! statement against the namespace it is handed.

use thiserror::Error;
use tracing::debug;

use crate::{
    analyzer::parse_program,
    eval::{context::Namespace, EvalError, Evaluator},
    governor::{Budget, ResourceExceeded},
    tokenizer::{
        symbol::Delimiter,
        token::{Token, Tokenizer, TokenizerError},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// The buffered statement ran, or nothing is buffered.
    Complete,
    /// More lines are needed before the statement can run.
    NeedsMore,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("{message}")]
    Runtime { message: String, trace: String },
    #[error(transparent)]
    Resource(#[from] ResourceExceeded),
}

/// Line-oriented evaluator for one session.
///
/// The namespace is owned by the session and lent for each call, so a
/// backend keeps no variables of its own between calls, only its partial
/// input buffer and the output it has not handed back yet.
#[mockall::automock]
pub trait EvalBackend: Send {
    /// Feeds one line of source.
    ///
    /// # Parameters
    ///
    /// * `line` - A single line without its terminator. An empty line closes
    ///   an open compound statement.
    /// * `namespace` - Variables the statement reads and writes
    /// * `budget` - Resource budget of the current call
    ///
    /// # Returns
    ///
    /// [`LineStatus::Complete`] once the buffered statement has run, or
    /// [`LineStatus::NeedsMore`] while it is still incomplete. On error the
    /// buffer is cleared.
    fn push_line(
        &mut self,
        line: &str,
        namespace: &mut Namespace,
        budget: &Budget,
    ) -> Result<LineStatus, BackendError>;

    /// Returns the text written since the last call, including error reports.
    fn take_output(&mut self) -> String;

    /// Discards buffered partial input.
    fn reset_buffer(&mut self);
}

/// [`EvalBackend`] for the bundled script language.
#[derive(Debug, Default)]
pub struct ScriptBackend {
    buffer: Vec<String>,
    output: String,
    evaluator: Evaluator,
}

impl ScriptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_buffering(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn run(
        &mut self,
        source: &str,
        namespace: &mut Namespace,
        budget: &Budget,
    ) -> Result<LineStatus, BackendError> {
        let program = match parse_program(source) {
            Ok(program) => program,
            Err(e) => return Err(self.syntax_error(e.to_string())),
        };
        let evaluation = self.evaluator.eval_program(&program, namespace, budget);
        self.output.push_str(&evaluation.output);
        match evaluation.result {
            Ok(()) => Ok(LineStatus::Complete),
            Err(EvalError::Exception(exception)) => {
                let trace = exception.traceback();
                self.output.push_str(&trace);
                self.output.push('\n');
                Err(BackendError::Runtime {
                    message: exception.to_string(),
                    trace,
                })
            }
            Err(EvalError::Resource(exceeded)) => Err(BackendError::Resource(exceeded)),
        }
    }

    fn syntax_error(&mut self, detail: String) -> BackendError {
        let error = BackendError::Syntax(detail);
        self.output.push_str(&error.to_string());
        self.output.push('\n');
        error
    }
}

impl EvalBackend for ScriptBackend {
    fn push_line(
        &mut self,
        line: &str,
        namespace: &mut Namespace,
        budget: &Budget,
    ) -> Result<LineStatus, BackendError> {
        if self.buffer.is_empty() && line.trim().is_empty() {
            return Ok(LineStatus::Complete);
        }
        self.buffer.push(line.to_string());
        let source = self.buffer.join("\n");

        match completeness(&source, line) {
            Ok(LineStatus::NeedsMore) => {
                debug!("Buffering line {}", self.buffer.len());
                return Ok(LineStatus::NeedsMore);
            }
            Ok(LineStatus::Complete) => {}
            Err(e) => {
                self.buffer.clear();
                return Err(self.syntax_error(e.to_string()));
            }
        }

        self.buffer.clear();
        debug!("Running {} buffered bytes", source.len());
        self.run(&source, namespace, budget)
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn reset_buffer(&mut self) {
        self.buffer.clear();
    }
}

/// Decides whether `source` can run yet: open brackets, an open
/// triple-quoted string or a trailing backslash ask for more, and a block
/// header keeps the statement open until a blank line arrives.
fn completeness(source: &str, last_line: &str) -> Result<LineStatus, TokenizerError> {
    if last_line.ends_with('\\') {
        return Ok(LineStatus::NeedsMore);
    }
    let spans = match Tokenizer::new().tokenize(source) {
        Ok(spans) => spans,
        Err(TokenizerError::UnterminatedTripleQuote { .. }) => return Ok(LineStatus::NeedsMore),
        Err(e) => return Err(e),
    };

    let mut depth = 0usize;
    let mut compound = false;
    let mut line_end: Option<&Token> = None;
    for span in &spans {
        match &span.token {
            Token::Delimiter(
                Delimiter::OpenParen | Delimiter::OpenBracket | Delimiter::OpenBrace,
            ) => depth += 1,
            Token::Delimiter(
                Delimiter::CloseParen | Delimiter::CloseBracket | Delimiter::CloseBrace,
            ) => depth = depth.saturating_sub(1),
            _ => {}
        }
        match &span.token {
            Token::Newline if depth == 0 => {
                compound |= matches!(line_end, Some(Token::Delimiter(Delimiter::Colon)));
                line_end = None;
            }
            token if token.is_trivia() || matches!(token, Token::Newline) => {}
            token => line_end = Some(token),
        }
    }
    compound |= matches!(line_end, Some(Token::Delimiter(Delimiter::Colon)));

    if depth > 0 || (compound && !last_line.trim().is_empty()) {
        Ok(LineStatus::NeedsMore)
    } else {
        Ok(LineStatus::Complete)
    }
}
