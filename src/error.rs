use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::{
    analyzer::AnalyzeError,
    backend::BackendError,
    config::ConfigError,
    eval::EvalError,
    governor::{GovernorError, ResourceExceeded},
    orchestrator::ExecutionError,
    policy::PolicyViolation,
    sandbox::SandboxError,
    session::{SerializerError, StateError},
    tokenizer::token::TokenizerError,
};

/// Category of a failed execution, as recorded in history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
pub enum ErrorKind {
    SecurityViolation,
    LengthExceeded,
    NestingExceeded,
    TooManyVariables,
    IncompleteInput,
    SyntaxError,
    ResourceExceeded,
    RuntimeFault,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyViolation),
    #[error("Resource exceeded: {0}")]
    Resource(#[from] ResourceExceeded),
    #[error("Governor error: {0}")]
    Governor(#[from] GovernorError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Serializer error: {0}")]
    Serializer(#[from] SerializerError),
    // per-call outcome
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    // front end
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("Parse error: {0}")]
    Parse(#[from] AnalyzeError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
