//! Runtime values of the script language.
//!
//! Lists and dicts live behind a [`Shared`] handle, so assignment and argument
//! passing alias the same storage. Strings and tuples are immutable and are
//! plain owned data.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::ast::{Expression, Statement};

/// Containers nested deeper than this do not render.
pub const RENDER_DEPTH_LIMIT: usize = 100;
/// Equality gives up (unequal) past this nesting depth.
const COMPARE_DEPTH_LIMIT: usize = 1000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("maximum recursion depth exceeded while getting the repr of an object")]
pub struct RenderError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unhashable type: '{0}'")]
pub struct Unhashable(pub &'static str);

/// Callables provided by the runtime. Only the ones named in the allow-list
/// are bound into a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Abs,
    All,
    Any,
    Bin,
    Bool,
    Chr,
    Dict,
    Divmod,
    Enumerate,
    Filter,
    Float,
    Hex,
    Int,
    Len,
    List,
    Map,
    Max,
    Min,
    Oct,
    Ord,
    Pow,
    Print,
    Range,
    Repr,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
    Type,
    Zip,
}

impl Builtin {
    /// Builtins that are also types, so they render as `<class '...'>`.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Bool
                | Builtin::Dict
                | Builtin::Float
                | Builtin::Int
                | Builtin::List
                | Builtin::Range
                | Builtin::Str
                | Builtin::Tuple
                | Builtin::Type
        )
    }
}

/// Mutable storage behind a list or dict. Clones are aliases.
///
/// The lock is only held inside [`Shared::read`] and [`Shared::write`]; the
/// closures passed there must not lock another handle.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Self(Arc::new(Mutex::new(inner)))
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn ptr_eq(&self, other: &Shared<T>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the storage, stable while any alias is alive.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    // A panicking worker may leave the lock poisoned; the data is still whole.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Shared<T> {
    /// Shallow copy of the contents, taken without holding the lock after.
    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:#x})", self.id())
    }
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Statement>),
    Lambda(Expression),
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    /// Parameter names with their default values, evaluated at definition.
    pub params: Vec<(String, Option<Value>)>,
    pub body: FunctionBody,
    /// Enclosing function locals, captured when defined inside another function.
    pub closure: Option<Arc<HashMap<String, Value>>>,
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Shared<Vec<Value>>),
    Tuple(Vec<Value>),
    Dict(Shared<Dict>),
    Range { start: i64, stop: i64, step: i64 },
    Function(Arc<Function>),
    Builtin(Builtin),
    BoundMethod(Box<Value>, String),
    /// A type with no constructor exposed, such as `NoneType`.
    Class(&'static str),
}

/// Numeric view used by arithmetic and comparisons. `bool` counts as `int`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    pub fn numeric_eq(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                float_to_int_exact(f) == Some(i)
            }
            (Number::Float(a), Number::Float(b)) => a == b,
        }
    }

    pub fn partial_cmp(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// `Some(n)` when `x` is integral and fits an `i64`.
pub fn float_to_int_exact(x: f64) -> Option<i64> {
    if x.is_finite() && x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Some(x as i64)
    } else {
        None
    }
}

impl Value {
    pub fn str(text: impl Into<String>) -> Value {
        Value::Str(text.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Shared::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Shared::new(dict))
    }

    /// Elements of a list or tuple, copied out of the container.
    pub fn sequence_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.snapshot()),
            Value::Tuple(items) => Some(items.clone()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range { .. } => "range",
            Value::Function(_) => "function",
            Value::Builtin(builtin) if builtin.is_type() => "type",
            Value::Builtin(_) | Value::BoundMethod(..) => "builtin_function_or_method",
            Value::Class(_) => "type",
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(list) => list.read(|items| !items.is_empty()),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => dict.read(|dict| !dict.is_empty()),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// Equality with the language's rules: `1 == 1.0 == True`.
    pub fn py_eq(&self, other: &Value) -> bool {
        self.eq_within(other, 0)
    }

    fn eq_within(&self, other: &Value, depth: usize) -> bool {
        if depth > COMPARE_DEPTH_LIMIT {
            return false;
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.ptr_eq(b) || items_eq(&a.snapshot(), &b.snapshot(), depth)
            }
            (Value::Tuple(a), Value::Tuple(b)) => items_eq(a, b, depth),
            (Value::Dict(a), Value::Dict(b)) => {
                a.ptr_eq(b) || a.snapshot().eq_within(&b.snapshot(), depth)
            }
            (
                Value::Range { start, stop, step },
                Value::Range {
                    start: other_start,
                    stop: other_stop,
                    step: other_step,
                },
            ) => {
                let len = range_len(*start, *stop, *step);
                len == range_len(*other_start, *other_stop, *other_step)
                    && (len == 0 || (start == other_start && (len == 1 || step == other_step)))
            }
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.numeric_eq(b),
                _ => false,
            },
        }
    }

    /// `is` comparison. Lists and dicts compare by identity, immutable
    /// scalars by value, and tuples never match.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            _ => false,
        }
    }

    pub fn repr(&self) -> Result<String, RenderError> {
        let mut out = String::new();
        self.write_repr(&mut out, 0, &mut Vec::new())?;
        Ok(out)
    }

    /// `str()` rendering: strings stay bare, everything else is its repr.
    pub fn to_str(&self) -> Result<String, RenderError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            other => other.repr(),
        }
    }

    /// `open` holds the containers being rendered further up, so a list
    /// holding itself renders as `[...]`.
    fn write_repr(
        &self,
        out: &mut String,
        depth: usize,
        open: &mut Vec<usize>,
    ) -> Result<(), RenderError> {
        if depth > RENDER_DEPTH_LIMIT {
            return Err(RenderError);
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(x) => out.push_str(&float_repr(*x)),
            Value::Str(s) => out.push_str(&string_repr(s)),
            Value::List(list) if open.contains(&list.id()) => out.push_str("[...]"),
            Value::List(list) => {
                open.push(list.id());
                out.push('[');
                write_items(out, &list.snapshot(), depth, open)?;
                out.push(']');
                open.pop();
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(out, items, depth, open)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(dict) if open.contains(&dict.id()) => out.push_str("{...}"),
            Value::Dict(shared) => {
                open.push(shared.id());
                out.push('{');
                for (i, (key, value)) in shared.snapshot().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, depth + 1, open)?;
                    out.push_str(": ");
                    value.write_repr(out, depth + 1, open)?;
                }
                out.push('}');
                open.pop();
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    out.push_str(&format!("range({}, {})", start, stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", start, stop, step));
                }
            }
            Value::Function(function) => out.push_str(&format!("<function {}>", function.name)),
            Value::Builtin(builtin) if builtin.is_type() => {
                out.push_str(&format!("<class '{}'>", builtin))
            }
            Value::Builtin(builtin) => out.push_str(&format!("<built-in function {}>", builtin)),
            Value::BoundMethod(receiver, name) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                name,
                receiver.type_name()
            )),
            Value::Class(name) => out.push_str(&format!("<class '{}'>", name)),
        }
        Ok(())
    }

    /// Iterates a value the way a `for` loop does. `None` if not iterable.
    pub fn iter_values(&self) -> Option<ValueIter> {
        match self {
            Value::List(list) => Some(ValueIter::Items(list.snapshot().into_iter())),
            Value::Tuple(items) => Some(ValueIter::Items(items.clone().into_iter())),
            Value::Dict(dict) => Some(ValueIter::Items(
                dict.read(|dict| dict.keys().cloned().collect::<Vec<_>>())
                    .into_iter(),
            )),
            Value::Str(s) => Some(ValueIter::Chars(s.chars().collect::<Vec<_>>().into_iter())),
            Value::Range { start, stop, step } => Some(ValueIter::Range {
                next: *start,
                stop: *stop,
                step: *step,
            }),
            _ => None,
        }
    }

    /// Number of elements when the value has a length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(list) => Some(list.read(Vec::len)),
            Value::Tuple(items) => Some(items.len()),
            Value::Dict(dict) => Some(dict.read(Dict::len)),
            Value::Range { start, stop, step } => {
                Some(usize::try_from(range_len(*start, *stop, *step)).unwrap_or(usize::MAX))
            }
            _ => None,
        }
    }

    /// Copy sharing no storage with `self`. Aliasing inside the value,
    /// cycles included, carries over to the copy through `copies`, which maps
    /// original storage ids to their replacements.
    pub fn deep_copy(&self, copies: &mut HashMap<usize, Value>) -> Value {
        match self {
            Value::List(list) => {
                if let Some(copy) = copies.get(&list.id()) {
                    return copy.clone();
                }
                let fresh = Shared::new(Vec::new());
                copies.insert(list.id(), Value::List(fresh.clone()));
                let items: Vec<Value> = list
                    .snapshot()
                    .iter()
                    .map(|item| item.deep_copy(copies))
                    .collect();
                fresh.write(|slot| *slot = items);
                Value::List(fresh)
            }
            Value::Dict(dict) => {
                if let Some(copy) = copies.get(&dict.id()) {
                    return copy.clone();
                }
                let fresh = Shared::new(Dict::new());
                copies.insert(dict.id(), Value::Dict(fresh.clone()));
                let copied = dict.snapshot().map_values(|value| value.deep_copy(copies));
                fresh.write(|slot| *slot = copied);
                Value::Dict(fresh)
            }
            Value::Tuple(items) => {
                Value::Tuple(items.iter().map(|item| item.deep_copy(copies)).collect())
            }
            Value::BoundMethod(receiver, name) => {
                Value::BoundMethod(Box::new(receiver.deep_copy(copies)), name.clone())
            }
            other => other.clone(),
        }
    }
}

fn items_eq(a: &[Value], b: &[Value], depth: usize) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.is_same(y) || x.eq_within(y, depth + 1))
}

fn write_items(
    out: &mut String,
    items: &[Value],
    depth: usize,
    open: &mut Vec<usize>,
) -> Result<(), RenderError> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1, open)?;
    }
    Ok(())
}

pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let len = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Shortest round-trip float text, switching to exponent form outside
/// `1e-4 <= |x| < 1e16`.
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let scientific = format!("{:e}", x);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if x == 0.0 || (-4..16).contains(&exponent) {
        let plain = format!("{}", x);
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

pub fn string_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range { next: i64, stop: i64, step: i64 },
    Chars(std::vec::IntoIter<char>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(items) => items.next(),
            ValueIter::Range { next, stop, step } => {
                let more = (*step > 0 && *next < *stop) || (*step < 0 && *next > *stop);
                if !more {
                    return None;
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
            ValueIter::Chars(chars) => chars.next().map(|c| Value::Str(c.to_string())),
        }
    }
}

/// Hashable projection of a value, used to index dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Int(i64),
    Float(u64),
    Str(String),
    Tuple(Vec<Key>),
    Builtin(Builtin),
    Class(&'static str),
    Function(usize),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key, Unhashable> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Int(*b as i64),
            Value::Int(n) => Key::Int(*n),
            Value::Float(x) => match float_to_int_exact(*x) {
                Some(n) => Key::Int(n),
                None => Key::Float(x.to_bits()),
            },
            Value::Str(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Function(function) => Key::Function(Arc::as_ptr(function) as usize),
            Value::Builtin(builtin) => Key::Builtin(*builtin),
            Value::Class(name) => Key::Class(name),
            other => return Err(Unhashable(other.type_name())),
        })
    }
}

/// Insertion ordered dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<Key, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn get(&self, key: &Value) -> Result<Option<&Value>, Unhashable> {
        let key = Key::from_value(key)?;
        Ok(self.index.get(&key).map(|&i| &self.entries[i].1))
    }

    pub fn get_mut(&mut self, key: &Value) -> Result<Option<&mut Value>, Unhashable> {
        let key = Key::from_value(key)?;
        Ok(match self.index.get(&key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        })
    }

    /// Inserts or updates. An existing entry keeps its original key object.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>, Unhashable> {
        let hashed = Key::from_value(&key)?;
        match self.index.get(&hashed) {
            Some(&i) => Ok(Some(std::mem::replace(&mut self.entries[i].1, value))),
            None => {
                self.index.insert(hashed, self.entries.len());
                self.entries.push((key, value));
                Ok(None)
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Unhashable> {
        let hashed = Key::from_value(key)?;
        let Some(i) = self.index.remove(&hashed) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(i);
        for position in self.index.values_mut() {
            if *position > i {
                *position -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        let (key, value) = self.entries.pop()?;
        if let Ok(hashed) = Key::from_value(&key) {
            self.index.remove(&hashed);
        }
        Some((key, value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Same keys in the same order, each value replaced by `f(value)`.
    pub fn map_values(&self, mut f: impl FnMut(&Value) -> Value) -> Dict {
        Dict {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), f(value)))
                .collect(),
            index: self.index.clone(),
        }
    }

    fn eq_within(&self, other: &Dict, depth: usize) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, value)| {
                matches!(
                    other.get(key),
                    Ok(Some(other_value))
                        if value.is_same(other_value) || value.eq_within(other_value, depth + 1)
                )
            })
    }
}

/// Approximate size and depth of a set of values, walked without recursion.
/// Storage reachable through several aliases is counted once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub bytes: usize,
    pub depth: usize,
}

pub fn footprint<'a>(roots: impl IntoIterator<Item = &'a Value>) -> Footprint {
    let slot = std::mem::size_of::<Value>();
    let mut result = Footprint::default();
    let mut pending: Vec<(Value, usize)> = Vec::new();
    let mut seen = HashSet::new();
    for root in roots {
        measure_inline(root, 1, &mut result, &mut pending);
    }
    while let Some((value, depth)) = pending.pop() {
        match &value {
            Value::List(list) if seen.insert(list.id()) => list.read(|items| {
                result.bytes = result.bytes.saturating_add(slot + items.len() * slot);
                result.depth = result.depth.max(depth);
                for item in items {
                    measure_inline(item, depth + 1, &mut result, &mut pending);
                }
            }),
            Value::Dict(dict) if seen.insert(dict.id()) => dict.read(|dict| {
                result.bytes = result.bytes.saturating_add(slot + dict.len() * 3 * slot);
                result.depth = result.depth.max(depth);
                for (key, item) in dict.iter() {
                    measure_inline(key, depth + 1, &mut result, &mut pending);
                    measure_inline(item, depth + 1, &mut result, &mut pending);
                }
            }),
            _ => {}
        }
    }
    result
}

/// Measures the data owned directly by `root`. Shared storage is queued on
/// `pending` instead of being locked here.
fn measure_inline(
    root: &Value,
    depth: usize,
    result: &mut Footprint,
    pending: &mut Vec<(Value, usize)>,
) {
    let slot = std::mem::size_of::<Value>();
    let mut stack = vec![(root, depth)];
    while let Some((value, depth)) = stack.pop() {
        let owned = match value {
            Value::List(_) | Value::Dict(_) => {
                pending.push((value.clone(), depth));
                continue;
            }
            Value::Str(s) => s.len(),
            Value::Tuple(items) => {
                stack.extend(items.iter().map(|item| (item, depth + 1)));
                items.len() * slot
            }
            Value::BoundMethod(receiver, _) => {
                stack.push((receiver, depth + 1));
                0
            }
            _ => 0,
        };
        result.bytes = result.bytes.saturating_add(slot + owned);
        result.depth = result.depth.max(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float_repr(3.0), "3.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn test_string_repr_quotes() {
        assert_eq!(string_repr("hi"), "'hi'");
        assert_eq!(string_repr("it's"), "\"it's\"");
        assert_eq!(string_repr("a'b\"c"), "'a\\'b\"c'");
        assert_eq!(string_repr("line\n"), "'line\\n'");
    }

    #[test]
    fn test_container_repr() {
        let mut dict = Dict::new();
        dict.insert(Value::str("a"), Value::list(vec![Value::Int(1), Value::None]))
            .unwrap();
        assert_eq!(Value::dict(dict).repr().unwrap(), "{'a': [1, None]}");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr().unwrap(), "(1,)");
        assert_eq!(
            Value::Range {
                start: 0,
                stop: 10,
                step: 2
            }
            .repr()
            .unwrap(),
            "range(0, 10, 2)"
        );
        assert_eq!(Value::Builtin(Builtin::Len).repr().unwrap(), "<built-in function len>");
        assert_eq!(Value::Builtin(Builtin::Int).repr().unwrap(), "<class 'int'>");
    }

    #[test]
    fn test_render_depth_limit() {
        let mut value = Value::list(vec![]);
        for _ in 0..=RENDER_DEPTH_LIMIT + 1 {
            value = Value::list(vec![value]);
        }
        assert_eq!(value.repr(), Err(RenderError));
    }

    #[test]
    fn test_self_containing_list_renders() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(shared) = &list {
            shared.write(|items| items.push(list.clone()));
        }
        assert_eq!(list.repr().unwrap(), "[1, [...]]");
        assert!(list.py_eq(&list.clone()));
        assert!(footprint([&list]).depth <= 2);
    }

    #[test]
    fn test_clones_alias_storage() {
        let list = Value::list(vec![]);
        let alias = list.clone();
        if let Value::List(shared) = &alias {
            shared.write(|items| items.push(Value::Int(7)));
        }
        assert_eq!(list.repr().unwrap(), "[7]");
        assert!(list.is_same(&alias));
        assert!(!list.is_same(&Value::list(vec![Value::Int(7)])));
        assert!(list.py_eq(&Value::list(vec![Value::Int(7)])));
    }

    #[test]
    fn test_deep_copy_keeps_aliasing() {
        let inner = Value::list(vec![Value::Int(1)]);
        let mut dict = Dict::new();
        dict.insert(Value::str("a"), inner.clone()).unwrap();
        dict.insert(Value::str("b"), inner.clone()).unwrap();
        let original = Value::dict(dict);

        let copy = original.deep_copy(&mut HashMap::new());
        assert!(!copy.is_same(&original));
        let Value::Dict(copied) = &copy else {
            panic!("expected a dict");
        };
        let (a, b) = copied.read(|dict| {
            (
                dict.get(&Value::str("a")).unwrap().cloned().unwrap(),
                dict.get(&Value::str("b")).unwrap().cloned().unwrap(),
            )
        });
        assert!(a.is_same(&b));
        assert!(!a.is_same(&inner));

        if let Value::List(shared) = &inner {
            shared.write(|items| items.clear());
        }
        assert_eq!(copy.repr().unwrap(), "{'a': [1], 'b': [1]}");
        assert_eq!(original.repr().unwrap(), "{'a': [], 'b': []}");
    }

    #[test]
    fn test_footprint_counts_shared_storage_once() {
        let big = Value::list(vec![Value::str("x".repeat(1000))]);
        let once = footprint([&big]).bytes;
        let twice = footprint([&Value::list(vec![big.clone(), big.clone()])]).bytes;
        assert!(twice < once * 2);
    }

    #[test]
    fn test_numeric_equality() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
        assert!(Value::Tuple(vec![Value::Int(1)]).py_eq(&Value::Tuple(vec![Value::Float(1.0)])));
        assert!(!Value::list(vec![]).py_eq(&Value::Tuple(vec![])));
    }

    #[test]
    fn test_dict_keys_follow_equality() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("one")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("uno")).unwrap();
        assert_eq!(dict.len(), 1);
        assert!(matches!(dict.get(&Value::Bool(true)), Ok(Some(Value::Str(s))) if s == "uno"));
        assert_eq!(
            dict.insert(Value::list(vec![]), Value::None).unwrap_err(),
            Unhashable("list")
        );
    }

    #[test]
    fn test_dict_remove_keeps_order() {
        let mut dict = Dict::new();
        for key in ["a", "b", "c"] {
            dict.insert(Value::str(key), Value::None).unwrap();
        }
        dict.remove(&Value::str("a")).unwrap();
        let keys: Vec<String> = dict.keys().map(|k| k.to_str().unwrap()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert!(dict.get(&Value::str("c")).unwrap().is_some());
    }

    #[test]
    fn test_range_iteration() {
        let values: Vec<i64> = Value::Range {
            start: 5,
            stop: 0,
            step: -2,
        }
        .iter_values()
        .unwrap()
        .map(|v| match v {
            Value::Int(n) => n,
            _ => unreachable!(),
        })
        .collect();
        assert_eq!(values, vec![5, 3, 1]);
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(0, -10, 1), 0);
    }

    #[test]
    fn test_footprint_depth() {
        let nested = Value::list(vec![Value::list(vec![Value::str("abc")])]);
        let measured = footprint([&nested]);
        assert_eq!(measured.depth, 3);
        assert!(measured.bytes >= 3);
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(Builtin::from_str("sorted").unwrap(), Builtin::Sorted);
        assert!(Builtin::from_str("open").is_err());
        assert_eq!(Builtin::Divmod.to_string(), "divmod");
    }
}
