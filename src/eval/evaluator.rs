use std::fmt;

use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::debug;

use super::{
    context::{ExecutionContext, Namespace},
    statement::{ControlFlow, StatementEvaluator, StatementResult},
    value::{RenderError, Unhashable, Value},
};
use crate::{
    ast::{Expression, Statement},
    governor::{Budget, ResourceExceeded},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ExceptionKind {
    AssertionError,
    AttributeError,
    IndexError,
    KeyError,
    ModuleNotFoundError,
    NameError,
    OverflowError,
    RecursionError,
    RuntimeError,
    TypeError,
    UnboundLocalError,
    ValueError,
    ZeroDivisionError,
}

/// A raised runtime error, with the functions it unwound through.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    /// Outermost first.
    pub frames: Vec<String>,
}

/// Consecutive identical frames printed before the rest are summarized.
const REPEATED_FRAMES_SHOWN: usize = 3;

impl Exception {
    pub fn traceback(&self) -> String {
        let mut trace = String::from("Traceback (most recent call last):\n  in <module>\n");
        let mut frames = self.frames.iter().peekable();
        while let Some(frame) = frames.next() {
            let mut run = 1;
            while frames.next_if_eq(&frame).is_some() {
                run += 1;
            }
            for _ in 0..run.min(REPEATED_FRAMES_SHOWN) {
                trace.push_str("  in ");
                trace.push_str(frame);
                trace.push('\n');
            }
            if run > REPEATED_FRAMES_SHOWN {
                let more = run - REPEATED_FRAMES_SHOWN;
                trace.push_str(&format!(
                    "  [Previous line repeated {} more time{}]\n",
                    more,
                    if more == 1 { "" } else { "s" }
                ));
            }
        }
        trace.push_str(&self.to_string());
        trace
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0}")]
    Exception(Exception),
    #[error(transparent)]
    Resource(#[from] ResourceExceeded),
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn exception(kind: ExceptionKind, message: impl Into<String>) -> Self {
        EvalError::Exception(Exception {
            kind,
            message: message.into(),
            frames: Vec::new(),
        })
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exception(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::exception(ExceptionKind::ValueError, message)
    }

    pub fn kind(&self) -> Option<ExceptionKind> {
        match self {
            EvalError::Exception(exception) => Some(exception.kind),
            EvalError::Resource(_) => None,
        }
    }

    /// Records that the error left the named function.
    pub fn unwound_from(mut self, function: &str) -> Self {
        if let EvalError::Exception(exception) = &mut self {
            exception.frames.insert(0, function.to_string());
        }
        self
    }
}

impl From<RenderError> for EvalError {
    fn from(e: RenderError) -> Self {
        Self::exception(ExceptionKind::RecursionError, e.to_string())
    }
}

impl From<Unhashable> for EvalError {
    fn from(e: Unhashable) -> Self {
        Self::type_error(e.to_string())
    }
}

/// Result of running a program: what it printed plus how it ended.
#[derive(Debug)]
pub struct Evaluation {
    pub output: String,
    pub result: EvalResult<()>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator {
    statement_evaluator: StatementEvaluator,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs top-level statements against `namespace`, echoing the repr of
    /// every non-`None` expression statement the way a console does.
    ///
    /// Statements that completed before an error keep their effects.
    pub fn eval_program(
        &self,
        program: &[Statement],
        namespace: &mut Namespace,
        budget: &Budget,
    ) -> Evaluation {
        let mut ctx = ExecutionContext::new(namespace, budget);
        let result = self.eval_top_level(program, &mut ctx);
        if let Err(e) = &result {
            debug!("Program stopped: {}", e);
        }
        Evaluation {
            output: ctx.take_output(),
            result,
        }
    }

    fn eval_top_level(&self, program: &[Statement], ctx: &mut ExecutionContext) -> EvalResult<()> {
        for statement in program {
            match self.statement_evaluator.eval_statement(statement, ctx)? {
                StatementResult::Value(value) => {
                    if matches!(statement, Statement::Expression(_))
                        && !matches!(value, Value::None)
                    {
                        let mut line = value.repr()?;
                        line.push('\n');
                        ctx.write_output(&line)?;
                    }
                }
                StatementResult::Control(ControlFlow::Return(_)) => {
                    return Err(EvalError::exception(
                        ExceptionKind::RuntimeError,
                        "'return' outside function",
                    ))
                }
                StatementResult::Control(_) => {
                    return Err(EvalError::exception(
                        ExceptionKind::RuntimeError,
                        "'break' or 'continue' outside loop",
                    ))
                }
            }
            ctx.sample()?;
        }
        Ok(())
    }

    /// Evaluates a single expression without echo.
    pub fn eval_expression(
        &self,
        expression: &Expression,
        namespace: &mut Namespace,
        budget: &Budget,
    ) -> EvalResult<Value> {
        let mut ctx = ExecutionContext::new(namespace, budget);
        self.statement_evaluator
            .expression_evaluator()
            .eval_expression(expression, &mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyzer::parse_program, governor::ResourceLimits};

    fn run(source: &str, namespace: &mut Namespace) -> Evaluation {
        let program = parse_program(source).unwrap();
        let budget = Budget::new(ResourceLimits::default());
        Evaluator::new().eval_program(&program, namespace, &budget)
    }

    #[test]
    fn test_console_echo() {
        let mut namespace = Namespace::with_builtins(&["print"]);
        let evaluation = run("1 + 2\nNone\nprint('hi')\nx = 5\n'a'\n", &mut namespace);
        assert!(evaluation.result.is_ok());
        assert_eq!(evaluation.output, "3\nhi\n'a'\n");
    }

    #[test]
    fn test_effects_before_error_are_kept() {
        let mut namespace = Namespace::new();
        let evaluation = run("a = 1\nb = 1 / 0\nc = 3\n", &mut namespace);
        let error = evaluation.result.unwrap_err();
        assert_eq!(error.to_string(), "ZeroDivisionError: division by zero");
        assert!(namespace.contains("a"));
        assert!(!namespace.contains("b"));
        assert!(!namespace.contains("c"));
    }

    #[test]
    fn test_traceback_lists_frames() {
        let mut namespace = Namespace::new();
        let source = "def inner():\n    return missing\ndef outer():\n    return inner()\nouter()\n";
        let evaluation = run(source, &mut namespace);
        let EvalError::Exception(exception) = evaluation.result.unwrap_err() else {
            panic!("expected an exception");
        };
        assert_eq!(
            exception.traceback(),
            "Traceback (most recent call last):\n  in <module>\n  in outer\n  in inner\nNameError: name 'missing' is not defined"
        );
    }

    #[test]
    fn test_traceback_collapses_recursion() {
        let mut namespace = Namespace::new();
        let program = parse_program(
            "def r(n):\n    return r(n + 1)\ndef main():\n    return r(0)\nmain()\n",
        )
        .unwrap();
        let budget = Budget::new(ResourceLimits {
            max_recursion_depth: 10,
            ..ResourceLimits::default()
        });
        let evaluation = Evaluator::new().eval_program(&program, &mut namespace, &budget);
        let EvalError::Exception(exception) = evaluation.result.unwrap_err() else {
            panic!("expected an exception");
        };
        assert_eq!(exception.frames.len(), 10);
        assert_eq!(
            exception.traceback(),
            "Traceback (most recent call last):\n  in <module>\n  in main\n  in r\n  in r\n  in r\n  [Previous line repeated 6 more times]\nRecursionError: maximum recursion depth exceeded"
        );
    }

    #[test]
    fn test_traceback_counts_single_repeat() {
        let exception = Exception {
            kind: ExceptionKind::ValueError,
            message: String::new(),
            frames: ["f", "f", "f", "f", "g"].map(String::from).to_vec(),
        };
        assert_eq!(
            exception.traceback(),
            "Traceback (most recent call last):\n  in <module>\n  in f\n  in f\n  in f\n  [Previous line repeated 1 more time]\n  in g\nValueError"
        );
    }

    #[test]
    fn test_return_outside_function() {
        let mut namespace = Namespace::new();
        let evaluation = run("return 1\n", &mut namespace);
        assert_eq!(
            evaluation.result.unwrap_err().kind(),
            Some(ExceptionKind::RuntimeError)
        );
    }
}
