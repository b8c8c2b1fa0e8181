//! Script Evaluation
//!
//! Runs parsed programs against a session [`Namespace`](context::Namespace)
//! under a [`Budget`](crate::governor::Budget).
//!
//! # Core Components
//!
//! ## Evaluator
//! Entry point for whole programs. Echoes the repr of top-level expression
//! statements and collects printed output.
//!
//! ## Statement Evaluator
//! Control flow, assignment targets and function definitions.
//!
//! ## Expression Evaluator
//! Operators, calls, subscripts, comprehensions and f-strings.
//!
//! ## Execution Context
//! Call frames, comprehension scopes and resource accounting over a borrowed
//! namespace.
//!
//! # Value Semantics
//!
//! Lists and dicts are shared: assignment, argument passing and storing them
//! inside another container all alias the same storage, held behind a
//! [`Shared`](value::Shared) handle. Strings and tuples are immutable and
//! copied freely.

pub mod builtins;
pub mod context;
pub mod evaluator;
pub mod expression;
pub mod format;
pub mod methods;
pub mod operators;
pub mod statement;
pub mod value;

pub use context::{ExecutionContext, Namespace};
pub use evaluator::{EvalError, EvalResult, Evaluation, Evaluator, Exception, ExceptionKind};
pub use value::{Builtin, Dict, Value};
