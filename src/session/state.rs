//! The session's variable scope and the rules around it.
//!
//! The backend works on a [`Namespace`]. After each step the engine mirrors
//! the names it wrote into the tracked [`Scope`], refusing private names and
//! hiding reserved `__x__` ones. Lists and dicts in the scope share storage
//! with the namespace, so in-place mutations show without a write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

use crate::eval::{methods::method_names, value::RENDER_DEPTH_LIMIT, Namespace, Value};

/// Visible variables, ordered by name.
pub type Scope = BTreeMap<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("private name '{0}' is not allowed")]
    PrivateName(String),
    #[error("variable '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDetail {
    pub name: String,
    pub type_name: String,
    pub string_value: String,
    pub is_serializable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_names: Option<Vec<String>>,
}

/// Marks the start of a revertible submission. Hand it back to
/// [`StateEngine::restore`] or [`StateEngine::release`].
#[must_use]
#[derive(Debug)]
pub struct Checkpoint {
    bindings: usize,
}

#[derive(Debug)]
pub struct StateEngine {
    namespace: Namespace,
    scope: Scope,
    private_prefix: String,
}

impl StateEngine {
    pub fn new<S: AsRef<str>>(private_prefix: impl Into<String>, builtins: &[S]) -> Self {
        Self {
            namespace: Namespace::with_builtins(builtins),
            scope: Scope::new(),
            private_prefix: private_prefix.into(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The working namespace lent to the backend.
    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.scope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_empty()
    }

    pub fn is_private(&self, name: &str) -> bool {
        !self.private_prefix.is_empty()
            && !is_reserved(name)
            && name.starts_with(&self.private_prefix)
    }

    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), StateError> {
        if is_reserved(name) {
            return Ok(());
        }
        if self.is_private(name) {
            return Err(StateError::PrivateName(name.to_string()));
        }
        self.namespace.set(name, value.clone());
        self.namespace.take_dirty();
        self.scope.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Value, StateError> {
        self.scope
            .get(name)
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }

    /// JSON view of every visible variable.
    pub fn snapshot(&self) -> BTreeMap<String, JsonValue> {
        self.scope
            .iter()
            .map(|(name, value)| (name.clone(), encode_value(value)))
            .collect()
    }

    pub fn variable_detail(&self, name: &str) -> Result<VariableDetail, StateError> {
        let value = self.get(name)?;
        let attributes = method_names(value);
        Ok(VariableDetail {
            name: name.to_string(),
            type_name: value.type_name().to_string(),
            string_value: value.to_str().unwrap_or_else(|_| placeholder(value)),
            is_serializable: to_json(value, 0).is_some(),
            length: value.len(),
            attribute_names: (!attributes.is_empty())
                .then(|| attributes.iter().map(|name| name.to_string()).collect()),
        })
    }

    pub fn checkpoint(&mut self) -> Checkpoint {
        self.namespace.begin();
        Checkpoint {
            bindings: self.scope.len(),
        }
    }

    /// Reverts the namespace and the scope to `checkpoint`.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        let touched = self.namespace.rollback();
        self.namespace.take_dirty();
        for name in &touched {
            self.mirror(name);
        }
        debug!(
            "Restored {} names, scope back to {} bindings (was {} at checkpoint)",
            touched.len(),
            self.scope.len(),
            checkpoint.bindings
        );
    }

    /// Keeps everything done since `checkpoint`.
    pub fn release(&mut self, _checkpoint: Checkpoint) {
        self.namespace.commit();
    }

    /// Mirrors the names the backend wrote since the last sync.
    pub fn sync(&mut self) -> Result<(), StateError> {
        let dirty = self.namespace.take_dirty();
        self.pull(dirty)
    }

    /// Copies `names` from the namespace into the scope; names no longer
    /// bound there are dropped. Nothing is copied if any name is private.
    pub fn pull<I>(&mut self, names: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = String>,
    {
        let names: Vec<String> = names.into_iter().collect();
        if let Some(private) = names.iter().find(|name| self.is_private(name)) {
            return Err(StateError::PrivateName(private.clone()));
        }
        for name in &names {
            self.mirror(name);
        }
        Ok(())
    }

    fn mirror(&mut self, name: &str) {
        if is_reserved(name) || self.is_private(name) {
            return;
        }
        match self.namespace.get(name) {
            Some(value) => {
                self.scope.insert(name.to_string(), value.clone());
            }
            None => {
                self.scope.remove(name);
            }
        }
    }
}

/// `__name__` style names, which never reach the scope.
pub fn is_reserved(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Encodes a value for a snapshot: lossless JSON when possible, otherwise
/// its `str()` rendering, otherwise a `<type object>` placeholder.
pub fn encode_value(value: &Value) -> JsonValue {
    to_json(value, 0)
        .or_else(|| value.to_str().ok().map(JsonValue::String))
        .unwrap_or_else(|| JsonValue::String(placeholder(value)))
}

fn placeholder(value: &Value) -> String {
    format!("<{} object>", value.type_name())
}

fn to_json(value: &Value, depth: usize) -> Option<JsonValue> {
    if depth > RENDER_DEPTH_LIMIT {
        return None;
    }
    match value {
        Value::None => Some(JsonValue::Null),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::Int(n) => Some(JsonValue::Number((*n).into())),
        Value::Float(x) => Number::from_f64(*x).map(JsonValue::Number),
        Value::Str(s) => Some(JsonValue::String(s.clone())),
        Value::List(list) => items_to_json(&list.snapshot(), depth),
        Value::Tuple(items) => items_to_json(items, depth),
        Value::Dict(dict) => dict
            .snapshot()
            .iter()
            .map(|(key, value)| match key {
                Value::Str(key) => Some((key.clone(), to_json(value, depth + 1)?)),
                _ => None,
            })
            .collect::<Option<Map<String, JsonValue>>>()
            .map(JsonValue::Object),
        _ => None,
    }
}

fn items_to_json(items: &[Value], depth: usize) -> Option<JsonValue> {
    items
        .iter()
        .map(|item| to_json(item, depth + 1))
        .collect::<Option<Vec<_>>>()
        .map(JsonValue::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Dict;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine() -> StateEngine {
        StateEngine::new("_", &["print", "len"])
    }

    #[test]
    fn test_bind_rules() {
        let mut engine = engine();
        assert_eq!(engine.bind("x", Value::Int(1)), Ok(()));
        assert_eq!(
            engine.bind("_secret", Value::Int(2)),
            Err(StateError::PrivateName("_secret".to_string()))
        );
        assert_eq!(engine.bind("__doc__", Value::str("ignored")), Ok(()));
        assert_eq!(engine.snapshot(), BTreeMap::from([("x".to_string(), json!(1))]));
        assert_eq!(
            engine.get("nope").unwrap_err(),
            StateError::NotFound("nope".to_string())
        );
    }

    #[test]
    fn test_empty_prefix_allows_everything() {
        let mut engine = StateEngine::new("", &[] as &[&str]);
        assert_eq!(engine.bind("_x", Value::Int(1)), Ok(()));
        assert!(engine.get("_x").is_ok());
    }

    #[test]
    fn test_snapshot_ladder() {
        let mut engine = engine();
        let mut dict = Dict::new();
        dict.insert(Value::str("k"), Value::Tuple(vec![Value::Int(1), Value::Float(0.5)]))
            .unwrap();
        engine.bind("d", Value::dict(dict)).unwrap();
        let mut numbered = Dict::new();
        numbered.insert(Value::Int(1), Value::Int(2)).unwrap();
        engine.bind("n", Value::dict(numbered)).unwrap();
        engine
            .bind("r", Value::Range { start: 0, stop: 3, step: 1 })
            .unwrap();
        engine.bind("inf", Value::Float(f64::INFINITY)).unwrap();
        let mut deep = Value::list(vec![]);
        for _ in 0..150 {
            deep = Value::list(vec![deep]);
        }
        engine.bind("deep", deep).unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot["d"], json!({"k": [1, 0.5]}));
        assert_eq!(snapshot["n"], json!("{1: 2}"));
        assert_eq!(snapshot["r"], json!("range(0, 3)"));
        assert_eq!(snapshot["inf"], json!("inf"));
        assert_eq!(snapshot["deep"], json!("<list object>"));
        assert_eq!(engine.snapshot(), snapshot);
    }

    #[test]
    fn test_sync_mirrors_writes_and_deletes() {
        let mut engine = engine();
        engine.namespace_mut().set("a", Value::Int(1));
        engine.namespace_mut().set("b", Value::Int(2));
        engine.namespace_mut().set("__name__", Value::str("main"));
        engine.sync().unwrap();
        assert_eq!(engine.len(), 2);

        engine.namespace_mut().remove("a");
        engine.sync().unwrap();
        assert!(engine.get("a").is_err());
        assert_eq!(engine.get("b").unwrap().repr().unwrap(), "2");
    }

    #[test]
    fn test_private_name_rolls_back() {
        let mut engine = engine();
        engine.bind("kept", Value::Int(1)).unwrap();

        let checkpoint = engine.checkpoint();
        engine.namespace_mut().set("kept", Value::Int(99));
        engine.namespace_mut().set("fresh", Value::Int(2));
        engine.sync().unwrap();
        engine.namespace_mut().set("_hidden", Value::Int(3));
        assert_eq!(
            engine.sync(),
            Err(StateError::PrivateName("_hidden".to_string()))
        );
        engine.restore(checkpoint);

        assert_eq!(engine.get("kept").unwrap().repr().unwrap(), "1");
        assert!(engine.get("fresh").is_err());
        assert!(!engine.namespace().contains("_hidden"));
        assert!(!engine.namespace().contains("fresh"));
        assert_eq!(engine.snapshot().len(), 1);
    }

    #[test]
    fn test_restore_reverts_in_place_mutation() {
        let mut engine = engine();
        engine.bind("xs", Value::list(vec![Value::Int(1)])).unwrap();

        let checkpoint = engine.checkpoint();
        if let Some(Value::List(list)) = engine.namespace().get("xs") {
            list.write(|items| items.push(Value::Int(2)));
        }
        assert_eq!(engine.snapshot()["xs"], json!([1, 2]));
        engine.restore(checkpoint);

        assert_eq!(engine.snapshot()["xs"], json!([1]));
    }

    #[test]
    fn test_release_keeps_changes() {
        let mut engine = engine();
        let checkpoint = engine.checkpoint();
        engine.namespace_mut().set("x", Value::Int(5));
        engine.sync().unwrap();
        engine.release(checkpoint);
        assert_eq!(engine.get("x").unwrap().repr().unwrap(), "5");
    }

    #[test]
    fn test_variable_detail() {
        let mut engine = engine();
        engine
            .bind("xs", Value::list(vec![Value::Int(1), Value::Int(2)]))
            .unwrap();
        engine.bind("n", Value::Int(7)).unwrap();

        let detail = engine.variable_detail("xs").unwrap();
        assert_eq!(detail.type_name, "list");
        assert_eq!(detail.string_value, "[1, 2]");
        assert!(detail.is_serializable);
        assert_eq!(detail.length, Some(2));
        assert!(detail
            .attribute_names
            .as_ref()
            .is_some_and(|names| names.contains(&"append".to_string())));

        let detail = engine.variable_detail("n").unwrap();
        assert_eq!(detail.length, None);
        assert_eq!(detail.attribute_names, None);
        assert_eq!(
            serde_json::to_value(&detail).unwrap(),
            json!({"name": "n", "typeName": "int", "stringValue": "7", "isSerializable": true})
        );
    }
}
