//! # Scratchpad: a sandboxed execution engine
//!
//! Scratchpad keeps a persistent scripting session alive across requests.
//! Each request carries source text; the engine checks it, runs it under
//! per-call resource ceilings and answers with the printed output plus a
//! JSON view of every visible variable.
//!
//! ## Request Pipeline
//!
//! ```text
//! Source → Policy Validator → Resource Governor → Backend → History → Response
//! ```
//!
//! - [`policy`]: static checks on the raw text (length, deny patterns,
//!   nesting, assigned variable count)
//! - [`governor`]: runs one call on a dedicated worker thread with a
//!   [`governor::Budget`] for time and memory
//! - [`backend`]: the line-oriented [`backend::EvalBackend`] contract and the
//!   bundled [`backend::ScriptBackend`]
//! - [`session`]: scope, history and durable snapshots of one session
//! - [`orchestrator`]: sequences the stages and records every attempt
//!
//! ## Script Language
//!
//! The bundled backend interprets an indentation-sensitive, Python-flavoured
//! subset:
//!
//! ```text
//! Source Code → Tokenizer → Preprocessor → Analyzer → Evaluator
//! ```
//!
//! - Tokenization ([`tokenizer`]) turns text into tokens with positions
//! - The [`preprocessor`] turns indentation into block tokens and drops trivia
//! - The [`analyzer`] builds the [`ast`] with parser combinators
//! - The [`eval`] module executes statements against a namespace
//!
//! ## Hosting
//!
//! [`sandbox::Sandbox`] is the async surface: one lock per session, blocking
//! work moved to the tokio blocking pool. [`sandbox::SandboxRegistry`] hosts
//! many sessions in one process.

pub mod analyzer;
pub mod ast;
pub mod backend;
pub mod config;
pub mod error;
pub mod eval;
pub mod governor;
pub mod markdown;
pub mod orchestrator;
pub mod policy;
pub mod preprocessor;
pub mod sandbox;
pub mod session;
pub mod timestamp;
pub mod tokenizer;

// Re-exports
pub use backend::{BackendError, EvalBackend, LineStatus, ScriptBackend};
pub use config::SandboxConfig;
pub use error::*;
pub use orchestrator::{ExecutionError, ExecutionOutcome, Orchestrator};
pub use sandbox::{Sandbox, SandboxError, SandboxRegistry};
pub use session::{History, Session, SessionId};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
