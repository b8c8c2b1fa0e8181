use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    str::FromStr,
    sync::Arc,
};

use tracing::trace;

use super::{
    evaluator::{EvalError, EvalResult, ExceptionKind},
    value::{footprint, Builtin, Function, Value, ValueIter},
};
use crate::governor::{Budget, ResourceExceeded};

/// Values nested deeper than this are refused when sampled.
pub const MAX_VALUE_DEPTH: usize = 1000;
/// Minimum number of ticks between two footprint samples.
const SAMPLE_INTERVAL: usize = 1024;

/// Global variables of one interpreter session.
///
/// Every write marks the name dirty so the session layer can mirror it.
/// Mutations made through a shared list or dict are not writes to any name.
/// A checkpoint therefore saves a deep copy of all bindings, which makes a
/// whole submission revertible.
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: BTreeMap<String, Value>,
    builtins: HashMap<String, Value>,
    dirty: BTreeSet<String>,
    saved: Option<BTreeMap<String, Value>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A namespace exposing the named builtins. Unknown names are skipped.
    pub fn with_builtins<S: AsRef<str>>(names: &[S]) -> Self {
        let builtins = names
            .iter()
            .filter_map(|name| {
                let builtin = Builtin::from_str(name.as_ref()).ok()?;
                Some((name.as_ref().to_string(), Value::Builtin(builtin)))
            })
            .collect();
        Self {
            builtins,
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn builtin(&self, name: &str) -> Option<&Value> {
        self.builtins.get(name)
    }

    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtins.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.touch(&name);
        self.bindings.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        if !self.bindings.contains_key(name) {
            return None;
        }
        self.touch(name);
        self.bindings.remove(name)
    }

    /// Mutable access, counted as a write.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if !self.bindings.contains_key(name) {
            return None;
        }
        self.touch(name);
        self.bindings.get_mut(name)
    }

    /// Names written since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty)
    }

    /// Saves a copy of every binding so it can be restored. Containers shared
    /// between names stay shared in the copy.
    pub fn begin(&mut self) {
        let mut copies = HashMap::new();
        self.saved = Some(
            self.bindings
                .iter()
                .map(|(name, value)| (name.clone(), value.deep_copy(&mut copies)))
                .collect(),
        );
    }

    pub fn commit(&mut self) {
        self.saved = None;
    }

    /// Puts back the bindings saved by [`Namespace::begin`] and returns every
    /// name bound before or after.
    pub fn rollback(&mut self) -> BTreeSet<String> {
        let Some(saved) = self.saved.take() else {
            return BTreeSet::new();
        };
        let mut touched: BTreeSet<String> = self.bindings.keys().cloned().collect();
        touched.extend(saved.keys().cloned());
        self.bindings = saved;
        self.dirty.retain(|name| !touched.contains(name));
        touched
    }

    fn touch(&mut self, name: &str) {
        if !self.dirty.contains(name) {
            self.dirty.insert(name.to_string());
        }
    }
}

/// One active user function call.
#[derive(Debug)]
pub struct Frame {
    pub function: Arc<Function>,
    pub locals: HashMap<String, Value>,
    pub globals: HashSet<String>,
}

impl Frame {
    pub fn new(function: Arc<Function>, locals: HashMap<String, Value>) -> Self {
        Self {
            function,
            locals,
            globals: HashSet::new(),
        }
    }
}

/// Everything a running program can reach.
pub struct ExecutionContext<'a> {
    namespace: &'a mut Namespace,
    budget: &'a Budget,
    frames: Vec<Frame>,
    /// Comprehension variables, tagged with the frame depth they belong to.
    comprehensions: Vec<(usize, HashMap<String, Value>)>,
    output: String,
    ticks_until_sample: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(namespace: &'a mut Namespace, budget: &'a Budget) -> Self {
        Self {
            namespace,
            budget,
            frames: Vec::new(),
            comprehensions: Vec::new(),
            output: String::new(),
            ticks_until_sample: SAMPLE_INTERVAL,
        }
    }

    pub fn budget(&self) -> &Budget {
        self.budget
    }

    pub fn namespace(&self) -> &Namespace {
        self.namespace
    }

    pub fn push_frame(&mut self, frame: Frame) -> EvalResult<()> {
        let limit = self.budget.limits().max_recursion_depth;
        if self.frames.len() >= limit {
            return Err(EvalError::exception(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn declare_global(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.globals.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| !frame.globals.contains(name))
    }

    /// Resolves a name: locals, then the enclosing closure, then globals,
    /// then builtins.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.comprehension_binding(name) {
            return Some(value);
        }
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(value) = frame.locals.get(name) {
                    return Some(value);
                }
                if let Some(value) = frame
                    .function
                    .closure
                    .as_ref()
                    .and_then(|closure| closure.get(name))
                {
                    return Some(value);
                }
            }
        }
        self.namespace
            .get(name)
            .or_else(|| self.namespace.builtin(name))
    }

    /// Like [`ExecutionContext::lookup`], with a function able to see its
    /// own name even when it was defined inside another function.
    pub fn load(&self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.lookup(name) {
            return Ok(value.clone());
        }
        for frame in self.frames.iter().rev() {
            if frame.function.name == name && frame.function.closure.is_some() {
                return Ok(Value::Function(frame.function.clone()));
            }
        }
        Err(EvalError::exception(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        ))
    }

    pub fn assign(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.comprehension_binding_mut(name) {
            *slot = value;
        } else if self.is_local(name) {
            if let Some(frame) = self.frames.last_mut() {
                frame.locals.insert(name.to_string(), value);
            }
        } else {
            self.namespace.set(name, value);
        }
    }

    pub fn delete(&mut self, name: &str) -> EvalResult<()> {
        let removed = if self.is_local(name) {
            self.frames
                .last_mut()
                .and_then(|frame| frame.locals.remove(name))
        } else {
            self.namespace.remove(name)
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(EvalError::exception(
                ExceptionKind::NameError,
                format!("name '{}' is not defined", name),
            )),
        }
    }

    /// Mutable binding for in-place updates. Closure and builtin bindings are
    /// read-only.
    pub fn binding_mut(&mut self, name: &str) -> EvalResult<&mut Value> {
        if self.comprehension_binding(name).is_some() {
            return self.comprehension_binding_mut(name).ok_or_else(|| {
                EvalError::exception(
                    ExceptionKind::NameError,
                    format!("name '{}' is not defined", name),
                )
            });
        }
        let local = self.is_local(name);
        let found = if local {
            self.frames
                .last_mut()
                .and_then(|frame| frame.locals.get_mut(name))
        } else {
            self.namespace.get_mut(name)
        };
        found.ok_or_else(|| {
            let kind = if local {
                ExceptionKind::UnboundLocalError
            } else {
                ExceptionKind::NameError
            };
            EvalError::exception(kind, format!("name '{}' is not defined", name))
        })
    }

    /// Whether `name` can be updated in place, as opposed to a closure or
    /// builtin binding.
    pub fn has_binding(&self, name: &str) -> bool {
        if self.comprehension_binding(name).is_some() {
            return true;
        }
        if self.is_local(name) {
            self.frames
                .last()
                .is_some_and(|frame| frame.locals.contains_key(name))
        } else {
            self.namespace.contains(name)
        }
    }

    /// Snapshot of the variables visible from the current function, for a
    /// function or lambda defined here. `None` at module level.
    pub fn capture(&self) -> Option<Arc<HashMap<String, Value>>> {
        let frame = self.frames.last()?;
        let mut captured: HashMap<String, Value> =
            frame.function.closure.as_deref().cloned().unwrap_or_default();
        captured.extend(
            frame
                .locals
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        for (_, scope) in self.current_comprehensions() {
            captured.extend(scope.iter().map(|(name, value)| (name.clone(), value.clone())));
        }
        Some(Arc::new(captured))
    }

    pub fn push_comprehension(&mut self) {
        self.comprehensions
            .push((self.frames.len(), HashMap::new()));
    }

    pub fn pop_comprehension(&mut self) {
        self.comprehensions.pop();
    }

    pub fn bind_comprehension(&mut self, name: &str, value: Value) {
        if let Some((_, scope)) = self.comprehensions.last_mut() {
            scope.insert(name.to_string(), value);
        } else {
            self.assign(name, value);
        }
    }

    fn current_comprehensions(&self) -> impl Iterator<Item = &(usize, HashMap<String, Value>)> {
        let depth = self.frames.len();
        self.comprehensions
            .iter()
            .rev()
            .take_while(move |(scope_depth, _)| *scope_depth == depth)
    }

    fn comprehension_binding(&self, name: &str) -> Option<&Value> {
        self.current_comprehensions()
            .find_map(|(_, scope)| scope.get(name))
    }

    fn comprehension_binding_mut(&mut self, name: &str) -> Option<&mut Value> {
        let depth = self.frames.len();
        self.comprehensions
            .iter_mut()
            .rev()
            .take_while(|(scope_depth, _)| *scope_depth == depth)
            .find_map(|(_, scope)| scope.get_mut(name))
    }

    pub fn write_output(&mut self, text: &str) -> EvalResult<()> {
        self.budget.reserve(text.len())?;
        self.output.push_str(text);
        Ok(())
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Counts one evaluation step. Every so often the working set is
    /// measured against the memory ceiling.
    pub fn tick(&mut self) -> EvalResult<()> {
        self.budget.tick()?;
        self.ticks_until_sample = self.ticks_until_sample.saturating_sub(1);
        if self.ticks_until_sample == 0 {
            self.sample()?;
        }
        Ok(())
    }

    /// Claims memory for a value about to be built, re-measuring once when
    /// earlier reservations crowd it out.
    pub fn reserve(&mut self, bytes: usize) -> EvalResult<()> {
        if self.budget.reserve(bytes).is_ok() {
            return Ok(());
        }
        self.sample()?;
        self.budget.reserve(bytes).map_err(EvalError::from)
    }

    /// Measures globals, every frame and the captured output.
    pub fn sample(&mut self) -> EvalResult<()> {
        let roots = self
            .namespace
            .iter()
            .map(|(_, value)| value)
            .chain(self.frames.iter().flat_map(|frame| frame.locals.values()))
            .chain(self.comprehensions.iter().flat_map(|(_, scope)| scope.values()));
        let measured = footprint(roots);
        let values = measured.bytes / std::mem::size_of::<Value>().max(1);
        self.ticks_until_sample = SAMPLE_INTERVAL.max(values);
        trace!(
            "Sampled {} bytes, depth {}",
            measured.bytes,
            measured.depth
        );
        if measured.depth > MAX_VALUE_DEPTH {
            return Err(ResourceExceeded::DepthExceeded {
                limit: MAX_VALUE_DEPTH,
            }
            .into());
        }
        self.budget
            .account(measured.bytes.saturating_add(self.output.len()))?;
        Ok(())
    }

    /// Iterates `value`, or raises the language's TypeError.
    pub fn iterate(&self, value: &Value) -> EvalResult<ValueIter> {
        value.iter_values().ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' object is not iterable",
                value.type_name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::value::{FunctionBody, Shared};
    use crate::governor::ResourceLimits;
    use std::time::Duration;

    fn budget() -> Budget {
        Budget::new(ResourceLimits {
            max_execution_time: Duration::from_secs(5),
            max_memory_usage: 1 << 20,
            max_recursion_depth: 3,
        })
    }

    fn function(name: &str) -> Arc<Function> {
        Arc::new(Function {
            name: name.to_string(),
            params: vec![],
            body: FunctionBody::Block(vec![]),
            closure: None,
        })
    }

    #[test]
    fn test_builtins_follow_allow_list() {
        let namespace = Namespace::with_builtins(&["len", "set", "print"]);
        let mut names: Vec<&str> = namespace.builtin_names().collect();
        names.sort();
        assert_eq!(names, vec!["len", "print"]);
        assert!(namespace.is_empty());
    }

    #[test]
    fn test_dirty_names() {
        let mut namespace = Namespace::new();
        namespace.set("a", Value::Int(1));
        namespace.set("b", Value::Int(2));
        assert_eq!(namespace.take_dirty().len(), 2);
        namespace.get_mut("a");
        assert_eq!(
            namespace.take_dirty().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string()]
        );
        assert!(namespace.remove("missing").is_none());
        assert!(namespace.take_dirty().is_empty());
    }

    #[test]
    fn test_rollback_restores_previous_bindings() {
        let mut namespace = Namespace::new();
        namespace.set("kept", Value::Int(1));
        namespace.take_dirty();

        namespace.begin();
        namespace.set("kept", Value::Int(2));
        namespace.set("kept", Value::Int(3));
        namespace.set("fresh", Value::Int(4));
        let touched = namespace.rollback();

        assert_eq!(touched.len(), 2);
        assert!(matches!(namespace.get("kept"), Some(Value::Int(1))));
        assert!(namespace.get("fresh").is_none());
        assert!(namespace.take_dirty().is_empty());
    }

    #[test]
    fn test_rollback_undoes_shared_mutation() {
        let shared = Shared::new(vec![Value::Int(1)]);
        let mut namespace = Namespace::new();
        namespace.set("a", Value::List(shared.clone()));
        namespace.set("b", Value::List(shared.clone()));

        namespace.begin();
        shared.write(|items| items.push(Value::Int(2)));
        assert_eq!(namespace.get("b").unwrap().repr().unwrap(), "[1, 2]");
        namespace.rollback();

        assert_eq!(namespace.get("a").unwrap().repr().unwrap(), "[1]");
        let (Some(Value::List(a)), Some(Value::List(b))) = (namespace.get("a"), namespace.get("b"))
        else {
            panic!("lists expected");
        };
        assert!(a.ptr_eq(b));
        assert!(!a.ptr_eq(&shared));
    }

    #[test]
    fn test_locals_shadow_globals() {
        let mut namespace = Namespace::new();
        namespace.set("x", Value::Int(1));
        let budget = budget();
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);

        let mut locals = HashMap::new();
        locals.insert("x".to_string(), Value::Int(2));
        ctx.push_frame(Frame::new(function("f"), locals)).unwrap();
        assert!(matches!(ctx.load("x"), Ok(Value::Int(2))));

        ctx.declare_global("x");
        ctx.assign("x", Value::Int(3));
        ctx.pop_frame();
        assert!(matches!(ctx.load("x"), Ok(Value::Int(3))));
    }

    #[test]
    fn test_recursion_limit() {
        let mut namespace = Namespace::new();
        let budget = budget();
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        for _ in 0..3 {
            ctx.push_frame(Frame::new(function("f"), HashMap::new()))
                .unwrap();
        }
        let error = ctx
            .push_frame(Frame::new(function("f"), HashMap::new()))
            .unwrap_err();
        assert_eq!(error.kind(), Some(ExceptionKind::RecursionError));
    }

    #[test]
    fn test_comprehension_scope_is_private() {
        let mut namespace = Namespace::new();
        namespace.set("x", Value::Int(1));
        let budget = budget();
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        ctx.push_comprehension();
        ctx.bind_comprehension("x", Value::Int(9));
        assert!(matches!(ctx.load("x"), Ok(Value::Int(9))));
        assert!(ctx.has_binding("x"));
        ctx.pop_comprehension();
        assert!(matches!(ctx.load("x"), Ok(Value::Int(1))));
    }

    #[test]
    fn test_unknown_name() {
        let mut namespace = Namespace::new();
        let budget = budget();
        let ctx = ExecutionContext::new(&mut namespace, &budget);
        let error = ctx.load("y").unwrap_err();
        assert_eq!(error.to_string(), "NameError: name 'y' is not defined");
    }

    #[test]
    fn test_sample_rejects_deep_values() {
        let mut value = Value::list(vec![]);
        for _ in 0..MAX_VALUE_DEPTH + 5 {
            value = Value::list(vec![value]);
        }
        let mut namespace = Namespace::new();
        namespace.set("deep", value);
        let budget = budget();
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        assert!(matches!(
            ctx.sample(),
            Err(EvalError::Resource(ResourceExceeded::DepthExceeded { .. }))
        ));
    }
}
