//! Per-request sequencing: validate, govern, evaluate, record, respond.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value as JsonValue;
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    backend::{BackendError, EvalBackend, LineStatus, ScriptBackend},
    config::{ConfigResult, SandboxConfig},
    error::ErrorKind,
    governor::{Budget, GovernorError, ResourceGovernor, ResourceLimits},
    policy::{Policy, PolicyValidator, PolicyViolation},
    session::{
        ExecutionRecord, SerializerError, Session, SessionId, SessionSerializer, StateEngine,
        StateError,
    },
};

/// Lines starting with these words open an indented block.
const BLOCK_KEYWORDS: &[&str] = &["def", "if", "elif", "else", "for", "while"];
/// Lines starting with these words continue the block above them.
const CONTINUATION_KEYWORDS: &[&str] = &["elif", "else", "except", "finally"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    Idle,
    Validating,
    Limiting,
    Evaluating,
    Recording,
    Rejected,
    ResourceFailed,
    Faulted,
}

#[derive(Debug)]
struct StageTracker {
    current: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Stage::Idle,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("Stage {} -> {}", self.current, next);
        self.current = next;
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("SecurityViolation: {0}")]
    SecurityViolation(String),
    #[error("LengthExceeded: code length {length} exceeds the maximum of {max} characters")]
    LengthExceeded { length: usize, max: usize },
    #[error("NestingExceeded: nesting depth {depth} exceeds the maximum of {max}")]
    NestingExceeded { depth: usize, max: usize },
    #[error("TooManyVariables: {count} assigned variables exceed the maximum of {max}")]
    TooManyVariables { count: usize, max: usize },
    #[error("IncompleteInput: the submission ends inside an unfinished statement")]
    IncompleteInput,
    #[error("SyntaxError: {0}")]
    SyntaxError(String),
    #[error("ResourceExceeded: {0}")]
    ResourceExceeded(String),
    #[error("{message}")]
    RuntimeFault { message: String, trace: String },
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::SecurityViolation(_) => ErrorKind::SecurityViolation,
            ExecutionError::LengthExceeded { .. } => ErrorKind::LengthExceeded,
            ExecutionError::NestingExceeded { .. } => ErrorKind::NestingExceeded,
            ExecutionError::TooManyVariables { .. } => ErrorKind::TooManyVariables,
            ExecutionError::IncompleteInput => ErrorKind::IncompleteInput,
            ExecutionError::SyntaxError(_) => ErrorKind::SyntaxError,
            ExecutionError::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
            ExecutionError::RuntimeFault { .. } => ErrorKind::RuntimeFault,
        }
    }

    fn failed_stage(&self) -> Stage {
        match self.kind() {
            ErrorKind::ResourceExceeded => Stage::ResourceFailed,
            _ => Stage::Faulted,
        }
    }
}

impl From<PolicyViolation> for ExecutionError {
    fn from(violation: PolicyViolation) -> Self {
        match violation {
            PolicyViolation::LengthExceeded { length, max } => {
                ExecutionError::LengthExceeded { length, max }
            }
            PolicyViolation::SecurityViolation { .. } => {
                ExecutionError::SecurityViolation(violation.to_string())
            }
            PolicyViolation::NestingExceeded { depth, max } => {
                ExecutionError::NestingExceeded { depth, max }
            }
            PolicyViolation::TooManyVariables { count, max } => {
                ExecutionError::TooManyVariables { count, max }
            }
        }
    }
}

impl From<BackendError> for ExecutionError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Syntax(detail) => ExecutionError::SyntaxError(detail),
            BackendError::Runtime { message, trace } => {
                ExecutionError::RuntimeFault { message, trace }
            }
            BackendError::Resource(exceeded) => {
                ExecutionError::ResourceExceeded(exceeded.to_string())
            }
        }
    }
}

impl From<GovernorError> for ExecutionError {
    fn from(error: GovernorError) -> Self {
        match error {
            GovernorError::Exceeded(exceeded) => {
                ExecutionError::ResourceExceeded(exceeded.to_string())
            }
            GovernorError::Worker(_) => ExecutionError::RuntimeFault {
                message: error.to_string(),
                trace: String::new(),
            },
        }
    }
}

impl From<StateError> for ExecutionError {
    fn from(error: StateError) -> Self {
        match error {
            StateError::PrivateName(_) => ExecutionError::SecurityViolation(error.to_string()),
            StateError::NotFound(_) => ExecutionError::RuntimeFault {
                message: error.to_string(),
                trace: String::new(),
            },
        }
    }
}

/// How one call ended. Failures still carry whatever was printed before
/// the error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        output: String,
        scope: BTreeMap<String, JsonValue>,
    },
    Failure {
        output: String,
        error: ExecutionError,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            ExecutionOutcome::Success { output, .. } | ExecutionOutcome::Failure { output, .. } => {
                output
            }
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { error, .. } => Some(error),
        }
    }

    fn record(&self, code: &str) -> ExecutionRecord {
        match self {
            ExecutionOutcome::Success { output, .. } => ExecutionRecord::success(code, output),
            ExecutionOutcome::Failure { output, error } => {
                ExecutionRecord::failure(code, output, error.to_string(), error.kind())
            }
        }
    }
}

pub type BackendFactory = Arc<dyn Fn() -> Box<dyn EvalBackend> + Send + Sync>;

/// Owns one live session and runs every request against it.
pub struct Orchestrator {
    config: SandboxConfig,
    validator: PolicyValidator,
    governor: ResourceGovernor,
    serializer: SessionSerializer,
    backend_factory: BackendFactory,
    session: Session,
}

impl Orchestrator {
    /// Builds an orchestrator evaluating with [`ScriptBackend`].
    pub fn new(config: SandboxConfig) -> ConfigResult<Self> {
        Self::with_backend(config, || Box::new(ScriptBackend::new()))
    }

    /// Builds an orchestrator whose sessions get a backend from `factory`.
    pub fn with_backend<F>(config: SandboxConfig, factory: F) -> ConfigResult<Self>
    where
        F: Fn() -> Box<dyn EvalBackend> + Send + Sync + 'static,
    {
        config.validate()?;
        let validator = PolicyValidator::new(Policy::from_config(&config)?);
        let governor = ResourceGovernor::new(ResourceLimits::from_config(&config));
        let serializer = SessionSerializer::new(config.session.session_dir.clone());
        let backend_factory: BackendFactory = Arc::new(factory);
        let session = fresh_session(&config, &validator, &backend_factory, SessionId::new());
        info!("Created session {}", session.id());

        Ok(Self {
            config,
            validator,
            governor,
            serializer,
            backend_factory,
            session,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    pub fn serializer(&self) -> &SessionSerializer {
        &self.serializer
    }

    /// Runs one submission and appends exactly one history record for it.
    #[tracing::instrument(level = "debug", skip(self, source), fields(session = %self.session.id()))]
    pub fn execute(&mut self, source: &str) -> ExecutionOutcome {
        let mut stages = StageTracker::new();
        let outcome = run_submission(
            &self.validator,
            &self.governor,
            &mut self.session,
            source,
            &mut stages,
        );
        stages.advance(Stage::Recording);
        self.session.history_mut().append(outcome.record(source));
        stages.advance(Stage::Idle);
        outcome
    }

    /// Replaces the session with an empty one under a new id.
    pub fn reset(&mut self) -> &SessionId {
        let previous = self.session.id().clone();
        self.session = self.new_session(SessionId::new());
        info!("Reset session {} to {}", previous, self.session.id());
        self.session.id()
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, SerializerError> {
        self.serializer.save(&self.session, path)
    }

    /// Restores the session saved at `path` by replaying its successful
    /// records. The live session is only replaced once the document has been
    /// read; a record that fails on replay is skipped.
    pub fn load(&mut self, path: &Path) -> Result<SessionId, SerializerError> {
        let validator = &self.validator;
        let governor = &self.governor;
        let staged = self.serializer.load(
            path,
            |id| self.new_session(id),
            |session, code| {
                let mut stages = StageTracker::new();
                match run_submission(validator, governor, session, code, &mut stages) {
                    ExecutionOutcome::Success { .. } => Ok(()),
                    ExecutionOutcome::Failure { error, .. } => Err(error.to_string()),
                }
            },
        )?;
        self.session = staged;
        Ok(self.session.id().clone())
    }

    fn new_session(&self, id: SessionId) -> Session {
        fresh_session(&self.config, &self.validator, &self.backend_factory, id)
    }
}

fn fresh_session(
    config: &SandboxConfig,
    validator: &PolicyValidator,
    factory: &BackendFactory,
    id: SessionId,
) -> Session {
    let state = StateEngine::new(
        config.security.private_prefix.clone(),
        validator.policy().allowed_builtins(),
    );
    Session::new(id, state, factory())
}

fn run_submission(
    validator: &PolicyValidator,
    governor: &ResourceGovernor,
    session: &mut Session,
    source: &str,
    stages: &mut StageTracker,
) -> ExecutionOutcome {
    stages.advance(Stage::Validating);
    if let Err(violation) = validator.validate(source) {
        stages.advance(Stage::Rejected);
        return ExecutionOutcome::Failure {
            output: String::new(),
            error: violation.into(),
        };
    }

    stages.advance(Stage::Limiting);
    let (state, backend) = session.split_mut();
    let checkpoint = state.checkpoint();

    stages.advance(Stage::Evaluating);
    let run = governor.run_with_limits(|budget| feed(source, &mut *state, &mut *backend, budget));
    let mut rollback = matches!(
        run,
        Err(GovernorError::Worker(_)) | Ok(Err(ExecutionError::SecurityViolation(_)))
    );
    let mut result = run.map_err(ExecutionError::from).and_then(|fed| fed);
    if !rollback {
        // picks up writes made after the last complete step
        if let Err(e) = state.sync() {
            result = Err(e.into());
            rollback = true;
        }
    }

    if result.is_err() {
        backend.reset_buffer();
    }
    let output = backend.take_output().trim().to_string();
    if rollback {
        state.restore(checkpoint);
    } else {
        state.release(checkpoint);
    }

    match result {
        Ok(()) => ExecutionOutcome::Success {
            output,
            scope: state.snapshot(),
        },
        Err(error) => {
            stages.advance(error.failed_stage());
            ExecutionOutcome::Failure { output, error }
        }
    }
}

/// Feeds `source` to the backend line by line, the way a console user
/// would type it.
fn feed(
    source: &str,
    state: &mut StateEngine,
    backend: &mut dyn EvalBackend,
    budget: &Budget,
) -> Result<(), ExecutionError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut open: Option<&str> = None;

    for (index, &line) in lines.iter().enumerate() {
        if let Some(first) = open.filter(|first| opens_block(first)) {
            if line.trim().is_empty() {
                let body_continues = lines[index + 1..]
                    .iter()
                    .find(|next| !next.trim().is_empty())
                    .is_some_and(|next| is_indented(next));
                if body_continues {
                    continue;
                }
            } else if !is_indented(line) && !starts_with_keyword(line, CONTINUATION_KEYWORDS) {
                debug!("Closing block opened by {:?}", first);
                if step("", state, backend, budget)? == LineStatus::Complete {
                    open = None;
                }
            }
        }

        match step(line, state, backend, budget)? {
            LineStatus::NeedsMore => {
                open.get_or_insert(line);
            }
            LineStatus::Complete => open = None,
        }
    }

    if open.is_some() && step("", state, backend, budget)? == LineStatus::NeedsMore {
        return Err(ExecutionError::IncompleteInput);
    }
    Ok(())
}

fn step(
    line: &str,
    state: &mut StateEngine,
    backend: &mut dyn EvalBackend,
    budget: &Budget,
) -> Result<LineStatus, ExecutionError> {
    debug!("Feeding line {:?}", line);
    let status = backend.push_line(line, state.namespace_mut(), budget)?;
    if status == LineStatus::Complete {
        state.sync()?;
    }
    Ok(status)
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

fn opens_block(line: &str) -> bool {
    starts_with_keyword(line, BLOCK_KEYWORDS)
}

fn starts_with_keyword(line: &str, keywords: &[&str]) -> bool {
    let word = line
        .trim_start()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    keywords.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockEvalBackend;
    use mockall::predicate::{always, eq};
    use pretty_assertions::assert_eq;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(SandboxConfig::default()).unwrap()
    }

    fn error_kind(outcome: &ExecutionOutcome) -> Option<ErrorKind> {
        outcome.error().map(ExecutionError::kind)
    }

    #[test]
    fn test_persistence_across_calls() {
        let mut orchestrator = orchestrator();
        assert!(orchestrator.execute("x = 42").is_success());
        let outcome = orchestrator.execute("print(x)");
        assert_eq!(outcome.output(), "42");
        assert_eq!(orchestrator.session().history().len(), 2);
    }

    #[test]
    fn test_multiline_function_with_blank_lines() {
        let mut orchestrator = orchestrator();
        let source = "def fibonacci(n):\n    if n < 2:\n        return n\n\n    return fibonacci(n - 1) + fibonacci(n - 2)\nresult = fibonacci(10)\nprint(result)";
        let outcome = orchestrator.execute(source);
        assert_eq!(outcome.output(), "55");
        let ExecutionOutcome::Success { scope, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(scope["result"], serde_json::json!(55));
        assert_eq!(scope["fibonacci"], serde_json::json!("<function fibonacci>"));
    }

    #[test]
    fn test_else_continues_block() {
        let mut orchestrator = orchestrator();
        let outcome = orchestrator.execute("if 1 > 2:\n    y = 'a'\nelse:\n    y = 'b'\nprint(y)");
        assert_eq!(outcome.output(), "b");
    }

    #[test]
    fn test_policy_rejection_is_recorded() {
        let mut orchestrator = orchestrator();
        let outcome = orchestrator.execute("import os");
        assert_eq!(error_kind(&outcome), Some(ErrorKind::SecurityViolation));
        let record = &orchestrator.session().history().all()[0];
        assert!(!record.success);
        assert_eq!(record.error_kind, Some(ErrorKind::SecurityViolation));
    }

    #[test]
    fn test_private_name_rolls_back_submission() {
        let mut orchestrator = orchestrator();
        orchestrator.execute("a = 1");
        let outcome = orchestrator.execute("a = 2\nb = 3\n_secret = 4");
        assert_eq!(error_kind(&outcome), Some(ErrorKind::SecurityViolation));
        let state = orchestrator.session().state();
        assert_eq!(state.get("a").unwrap().repr().unwrap(), "1");
        assert!(state.get("b").is_err());
        assert!(!state.snapshot().contains_key("_secret"));
        assert!(!state.namespace().contains("_secret"));
    }

    #[test]
    fn test_runtime_fault_keeps_completed_statements() {
        let mut orchestrator = orchestrator();
        let outcome = orchestrator.execute("kept = 1\n1 / 0");
        assert_eq!(error_kind(&outcome), Some(ErrorKind::RuntimeFault));
        assert!(outcome.output().contains("ZeroDivisionError: division by zero"));
        assert!(orchestrator.session().state().get("kept").is_ok());
    }

    #[test]
    fn test_incomplete_input() {
        let mut orchestrator = orchestrator();
        let outcome = orchestrator.execute("text = '''never closed");
        assert_eq!(error_kind(&outcome), Some(ErrorKind::IncompleteInput));
        assert!(orchestrator.execute("z = 1").is_success());
    }

    #[test]
    fn test_reset_starts_over() {
        let mut orchestrator = orchestrator();
        orchestrator.execute("x = 1");
        let before = orchestrator.session_id().clone();
        let after = orchestrator.reset().clone();
        assert_ne!(before, after);
        assert!(orchestrator.session().history().is_empty());
        assert!(orchestrator.session().state().is_empty());
    }

    #[test]
    fn test_backend_lines_follow_feeding_rules() {
        let mut orchestrator = Orchestrator::with_backend(SandboxConfig::default(), move || {
            let mut backend = MockEvalBackend::new();
            for (line, status) in [
                ("for i in range(2):", LineStatus::NeedsMore),
                ("    print(i)", LineStatus::NeedsMore),
                ("", LineStatus::Complete),
                ("done = True", LineStatus::Complete),
            ] {
                backend
                    .expect_push_line()
                    .with(eq(line), always(), always())
                    .times(1)
                    .return_const(Ok(status));
            }
            backend.expect_take_output().return_const("0\n1\n".to_string());
            backend.expect_reset_buffer().return_const(());
            Box::new(backend)
        })
        .unwrap();
        let outcome = orchestrator.execute("for i in range(2):\n    print(i)\ndone = True");
        assert_eq!(outcome.output(), "0\n1");
        assert!(outcome.is_success());
    }

    #[test]
    fn test_backend_error_maps_to_kind() {
        let mut orchestrator = Orchestrator::with_backend(SandboxConfig::default(), || {
            let mut backend = MockEvalBackend::new();
            backend
                .expect_push_line()
                .returning(|_, _, _| Err(BackendError::Syntax("invalid syntax".to_string())));
            backend
                .expect_take_output()
                .return_const("SyntaxError: invalid syntax\n".to_string());
            backend.expect_reset_buffer().return_const(());
            Box::new(backend)
        })
        .unwrap();
        let outcome = orchestrator.execute("x = = 1");
        assert_eq!(
            outcome.error(),
            Some(&ExecutionError::SyntaxError("invalid syntax".to_string()))
        );
        assert_eq!(outcome.output(), "SyntaxError: invalid syntax");
    }

    #[test]
    fn test_keyword_helpers() {
        assert!(opens_block("def f():"));
        assert!(opens_block("while(x):"));
        assert!(!opens_block("definitely = 1"));
        assert!(starts_with_keyword("else:", CONTINUATION_KEYWORDS));
        assert!(!is_indented("x"));
        assert!(is_indented("\tx"));
    }
}
