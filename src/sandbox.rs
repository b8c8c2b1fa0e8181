//! Async request surface over an [`Orchestrator`].
//!
//! Each [`Sandbox`] guards one session with a single lock held for the whole
//! request, and runs the blocking work on tokio's blocking pool. Distinct
//! sandboxes never wait on each other.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::{sync::Mutex, task};
use tracing::{debug, info};

use crate::{
    config::{ConfigError, SandboxConfig},
    error::ErrorKind,
    markdown::extract_code_blocks,
    orchestrator::{ExecutionOutcome, Orchestrator},
    session::{ExecutionRecord, SerializerError, SessionId, StateError, VariableDetail},
};

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("variable '{0}' not found")]
    NotFound(String),
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Serializer(#[from] SerializerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Blocking task failed: {0}")]
    Join(#[from] task::JoinError),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub scope_snapshot: BTreeMap<String, JsonValue>,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeResponse {
    pub scope_snapshot: BTreeMap<String, JsonValue>,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub records: Vec<ExecutionRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub history_count: usize,
    pub scope_size: usize,
}

/// One fenced block of a prompt and how it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBlock {
    pub code: String,
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub output: String,
    pub blocks: Vec<PromptBlock>,
    pub variables: BTreeMap<String, JsonValue>,
}

#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<Mutex<Orchestrator>>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        Ok(Self::from_orchestrator(Orchestrator::new(config)?))
    }

    pub fn from_orchestrator(orchestrator: Orchestrator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(orchestrator)),
        }
    }

    /// Runs `f` on the blocking pool while holding the session lock.
    async fn with_orchestrator<T, F>(&self, f: F) -> SandboxResult<T>
    where
        F: FnOnce(&mut Orchestrator) -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.inner.clone().lock_owned().await;
        Ok(task::spawn_blocking(move || f(&mut guard)).await?)
    }

    pub async fn execute(&self, source: impl Into<String>) -> SandboxResult<ExecuteResponse> {
        let source = source.into();
        self.with_orchestrator(move |orchestrator| {
            let outcome = orchestrator.execute(&source);
            execute_response(orchestrator, outcome)
        })
        .await
    }

    /// Runs a script file as one submission.
    pub async fn execute_file(&self, path: impl AsRef<Path>) -> SandboxResult<ExecuteResponse> {
        let path = path.as_ref().to_path_buf();
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SandboxError::Io {
                path: path.clone(),
                source,
            })?;
        debug!("Executing {} ({} bytes)", path.display(), source.len());
        self.execute(source).await
    }

    /// Runs every fenced block of `prompt` in order, all under one lock.
    pub async fn execute_prompt(&self, prompt: &str) -> SandboxResult<PromptResponse> {
        let blocks = extract_code_blocks(prompt);
        self.with_orchestrator(move |orchestrator| {
            let mut output = String::new();
            let mut results = Vec::with_capacity(blocks.len());
            for code in blocks {
                let outcome = orchestrator.execute(&code);
                output.push_str(outcome.output());
                output.push('\n');
                results.push(PromptBlock {
                    output: outcome.output().to_string(),
                    success: outcome.is_success(),
                    error: outcome.error().map(ToString::to_string),
                    code,
                });
            }
            PromptResponse {
                output: output.trim().to_string(),
                blocks: results,
                variables: orchestrator.session().state().snapshot(),
            }
        })
        .await
    }

    pub async fn scope(&self) -> SandboxResult<ScopeResponse> {
        self.with_orchestrator(|orchestrator| ScopeResponse {
            scope_snapshot: orchestrator.session().state().snapshot(),
            session_id: orchestrator.session_id().clone(),
        })
        .await
    }

    pub async fn variable_detail(&self, name: &str) -> SandboxResult<VariableDetail> {
        let name = name.to_string();
        self.with_orchestrator(move |orchestrator| {
            orchestrator
                .session()
                .state()
                .variable_detail(&name)
                .map_err(|e| match e {
                    StateError::NotFound(name) | StateError::PrivateName(name) => {
                        SandboxError::NotFound(name)
                    }
                })
        })
        .await?
    }

    /// The last `limit` records, or all of them.
    pub async fn history(&self, limit: Option<usize>) -> SandboxResult<HistoryResponse> {
        self.with_orchestrator(move |orchestrator| {
            let history = orchestrator.session().history();
            let records = match limit {
                Some(limit) => history.tail(limit),
                None => history.all(),
            };
            HistoryResponse {
                records: records.to_vec(),
                total: history.len(),
            }
        })
        .await
    }

    pub async fn reset(&self) -> SandboxResult<ResetResponse> {
        self.with_orchestrator(|orchestrator| ResetResponse {
            session_id: orchestrator.reset().clone(),
        })
        .await
    }

    pub async fn save_session(&self, path: Option<PathBuf>) -> SandboxResult<SaveResponse> {
        self.with_orchestrator(move |orchestrator| orchestrator.save(path.as_deref()))
            .await?
            .map(|path| SaveResponse { path })
            .map_err(SandboxError::from)
    }

    pub async fn load_session(&self, path: impl Into<PathBuf>) -> SandboxResult<LoadResponse> {
        let path = path.into();
        self.with_orchestrator(move |orchestrator| orchestrator.load(&path))
            .await?
            .map(|session_id| LoadResponse { session_id })
            .map_err(SandboxError::from)
    }

    pub async fn session_info(&self) -> SandboxResult<SessionInfo> {
        self.with_orchestrator(|orchestrator| {
            let session = orchestrator.session();
            SessionInfo {
                session_id: session.id().clone(),
                history_count: session.history().len(),
                scope_size: session.state().len(),
            }
        })
        .await
    }
}

fn execute_response(orchestrator: &Orchestrator, outcome: ExecutionOutcome) -> ExecuteResponse {
    let session = orchestrator.session();
    let session_id = session.id().clone();
    match outcome {
        ExecutionOutcome::Success { output, scope } => ExecuteResponse {
            output,
            success: true,
            error: None,
            error_kind: None,
            scope_snapshot: scope,
            session_id,
        },
        ExecutionOutcome::Failure { output, error } => ExecuteResponse {
            output,
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            scope_snapshot: session.state().snapshot(),
            session_id,
        },
    }
}

/// Many sandboxes in one process, keyed by the id each started with.
#[derive(Clone, Default)]
pub struct SandboxRegistry {
    sandboxes: Arc<DashMap<SessionId, Sandbox>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sandbox and registers it under its initial session id.
    pub async fn create(&self, config: SandboxConfig) -> SandboxResult<(SessionId, Sandbox)> {
        let sandbox = Sandbox::new(config)?;
        let id = sandbox.session_info().await?.session_id;
        self.sandboxes.insert(id.clone(), sandbox.clone());
        info!("Registered sandbox {}", id);
        Ok((id, sandbox))
    }

    pub fn get(&self, id: &SessionId) -> SandboxResult<Sandbox> {
        self.sandboxes
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SandboxError::UnknownSession(id.clone()))
    }

    pub fn remove(&self, id: &SessionId) -> Option<Sandbox> {
        self.sandboxes.remove(id).map(|(_, sandbox)| sandbox)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sandboxes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sandboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }
}
