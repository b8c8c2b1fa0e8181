//! A session is one persistent scripting context: its variables, its
//! history and the backend that evaluates against them.

pub mod history;
pub mod serializer;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{backend::EvalBackend, timestamp::Timestamp};

pub use history::{ExecutionRecord, History};
pub use serializer::{SerializerError, SessionDocument, SessionSerializer};
pub use state::{Checkpoint, Scope, StateEngine, StateError, VariableDetail};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

pub struct Session {
    id: SessionId,
    state: StateEngine,
    history: History,
    backend: Box<dyn EvalBackend>,
    created_at: Timestamp,
}

impl Session {
    pub fn new(id: SessionId, state: StateEngine, backend: Box<dyn EvalBackend>) -> Self {
        Self {
            id,
            state,
            history: History::new(),
            backend,
            created_at: Timestamp::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn state(&self) -> &StateEngine {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateEngine {
        &mut self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Borrows the state and the backend together, for a single evaluation
    /// call that needs both.
    pub fn split_mut(&mut self) -> (&mut StateEngine, &mut dyn EvalBackend) {
        (&mut self.state, self.backend.as_mut())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("variables", &self.state.len())
            .field("history", &self.history.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
