//! Durable session snapshots.
//!
//! A saved document carries the full history. Loading replays the successful
//! records into a staged session, which the caller adopts only once the whole
//! document has been read. A record that no longer succeeds is logged and
//! skipped, since the submission it depended on may have failed part way.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{History, Session, SessionId};
use crate::timestamp::Timestamp;

#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed session document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SerializerError {
    fn io(path: &Path, source: io::Error) -> Self {
        SerializerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk form of a session. The snapshot is informational; loading
/// rebuilds the scope from the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session_id: SessionId,
    pub history: History,
    #[serde(default)]
    pub scope_snapshot: BTreeMap<String, JsonValue>,
    pub saved_at: Timestamp,
}

impl SessionDocument {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id().clone(),
            history: session.history().clone(),
            scope_snapshot: session.state().snapshot(),
            saved_at: Timestamp::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSerializer {
    session_dir: PathBuf,
}

impl SessionSerializer {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_dir: session_dir.into(),
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn default_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir.join(format!("session_{}.json", id))
    }

    /// Writes `session` to `path` (or the default location) through a
    /// temporary file in the same directory, so readers never see a partial
    /// document.
    pub fn save(&self, session: &Session, path: Option<&Path>) -> Result<PathBuf, SerializerError> {
        let document = SessionDocument::from_session(session);
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_path(&document.session_id));
        self.write(&document, &path)?;
        info!(
            "Saved session {} ({} records) to {}",
            document.session_id,
            document.history.len(),
            path.display()
        );
        Ok(path)
    }

    pub fn write(&self, document: &SessionDocument, path: &Path) -> Result<(), SerializerError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| SerializerError::io(dir, e))?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| SerializerError::io(dir, e))?;
        serde_json::to_writer_pretty(&mut file, document)?;
        file.write_all(b"\n")
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| SerializerError::io(path, e))?;
        file.persist(path)
            .map_err(|e| SerializerError::io(path, e.error))?;
        Ok(())
    }

    pub fn read(&self, path: &Path) -> Result<SessionDocument, SerializerError> {
        let file = File::open(path).map_err(|e| SerializerError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Rebuilds the session stored at `path`.
    ///
    /// # Parameters
    ///
    /// * `fresh` - Creates an empty session with the given id
    /// * `replay` - Runs one recorded submission without recording it,
    ///   returning the failure reason if it no longer succeeds
    ///
    /// # Returns
    ///
    /// The staged session with the document's full history. Nothing outside
    /// the staged session is touched, so when the document cannot be read the
    /// caller's live session stays as it was.
    pub fn load<F, R>(&self, path: &Path, fresh: F, mut replay: R) -> Result<Session, SerializerError>
    where
        F: FnOnce(SessionId) -> Session,
        R: FnMut(&mut Session, &str) -> Result<(), String>,
    {
        let document = self.read(path)?;
        let mut staged = fresh(document.session_id.clone());

        let mut skipped = 0;
        for (index, record) in document.history.all().iter().enumerate() {
            if !record.success {
                continue;
            }
            debug!("Replaying record {}", index);
            if let Err(reason) = replay(&mut staged, &record.code) {
                warn!(
                    "Record {} (`{}`) failed on replay and was skipped: {}",
                    index, record.code, reason
                );
                skipped += 1;
            }
        }

        *staged.history_mut() = document.history;
        info!(
            "Loaded session {} from {} ({} records, {} skipped on replay)",
            staged.id(),
            path.display(),
            staged.history().len(),
            skipped
        );
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::ScriptBackend,
        eval::Value,
        session::{history::ExecutionRecord, state::StateEngine},
    };
    use pretty_assertions::assert_eq;

    fn fresh(id: SessionId) -> Session {
        Session::new(
            id,
            StateEngine::new("_", &["print"]),
            Box::new(ScriptBackend::new()),
        )
    }

    fn bind_replay(session: &mut Session, code: &str) -> Result<(), String> {
        let (name, value) = code.split_once(" = ").ok_or("not an assignment")?;
        let value: i64 = value.parse().map_err(|_| "not a number".to_string())?;
        session
            .state_mut()
            .bind(name, Value::Int(value))
            .map_err(|e| e.to_string())
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = SessionSerializer::new(dir.path().join("nested/sessions"));
        let mut session = fresh(SessionId::new());
        session.history_mut().append(ExecutionRecord::success("a = 1", ""));

        let path = serializer.save(&session, None).unwrap();
        assert_eq!(path, serializer.default_path(session.id()));
        let document = serializer.read(&path).unwrap();
        assert_eq!(&document.session_id, session.id());
        assert_eq!(document.history.len(), 1);
    }

    #[test]
    fn test_load_replays_successful_records() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = SessionSerializer::new(dir.path());
        let mut session = fresh(SessionId::new());
        session.history_mut().append(ExecutionRecord::success("a = 1", ""));
        session.history_mut().append(ExecutionRecord::failure(
            "broken",
            "",
            "nope",
            crate::error::ErrorKind::RuntimeFault,
        ));
        session.history_mut().append(ExecutionRecord::success("b = 2", ""));
        let path = serializer.save(&session, None).unwrap();

        let loaded = serializer.load(&path, fresh, bind_replay).unwrap();
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.history().len(), 3);
        assert_eq!(loaded.state().len(), 2);
    }

    #[test]
    fn test_replay_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = SessionSerializer::new(dir.path());
        let mut session = fresh(SessionId::new());
        session.history_mut().append(ExecutionRecord::success("a = 1", ""));
        session.history_mut().append(ExecutionRecord::success("print(a)", "1"));
        session.history_mut().append(ExecutionRecord::success("b = 2", ""));
        let path = serializer.save(&session, None).unwrap();

        let loaded = serializer.load(&path, fresh, bind_replay).unwrap();
        assert_eq!(loaded.history().len(), 3);
        assert_eq!(loaded.state().len(), 2);
        assert!(loaded.state().get("b").is_ok());
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = SessionSerializer::new(dir.path());
        assert!(matches!(
            serializer.read(&dir.path().join("absent.json")),
            Err(SerializerError::Io { .. })
        ));
        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(matches!(
            serializer.read(&garbage),
            Err(SerializerError::Parse(_))
        ));
    }
}
