//! Methods of `str`, `list` and `dict`.

use super::{
    builtins::{as_index, collect_items, pairs_to_dict, sort_with_key, CallArgs},
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult, ExceptionKind},
    expression::ExpressionEvaluator,
    format::str_format,
    value::{Dict, Shared, Value},
};

const STR_METHODS: &[&str] = &[
    "capitalize", "center", "count", "endswith", "find", "format", "index", "isalnum", "isalpha",
    "isdigit", "islower", "isspace", "isupper", "join", "ljust", "lower", "lstrip", "replace",
    "rfind", "rjust", "rstrip", "split", "splitlines", "startswith", "strip", "title", "upper",
    "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const DICT_METHODS: &[&str] = &[
    "clear", "copy", "get", "items", "keys", "pop", "popitem", "setdefault", "update", "values",
];

/// Sorted method names of a value's type. Empty for types without methods.
pub fn method_names(receiver: &Value) -> &'static [&'static str] {
    match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => &[],
    }
}

pub fn has_method(receiver: &Value, name: &str) -> bool {
    method_names(receiver).binary_search(&name).is_ok()
}

pub fn no_attribute(receiver: &Value, name: &str) -> EvalError {
    EvalError::exception(
        ExceptionKind::AttributeError,
        format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            name
        ),
    )
}

pub fn call_method(
    receiver: &Value,
    name: &str,
    args: CallArgs,
    ctx: &mut ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> EvalResult<Value> {
    ctx.tick()?;
    match receiver {
        Value::Str(text) => str_method(text, name, args, ctx),
        Value::List(list) => list_method(list, name, args, ctx, evaluator),
        Value::Dict(dict) => dict_method(dict, name, args, ctx),
        other => Err(no_attribute(other, name)),
    }
}

fn expect_str(value: Option<Value>, method: &str) -> EvalResult<String> {
    match value {
        Some(Value::Str(text)) => Ok(text),
        Some(other) => Err(EvalError::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            other.type_name()
        ))),
        None => Err(EvalError::type_error(format!(
            "{}() missing required argument",
            method
        ))),
    }
}

fn char_index(text: &str, byte_index: usize) -> i64 {
    text[..byte_index].chars().count() as i64
}

fn strip_set(chars: Option<Value>, method: &str) -> EvalResult<Option<Vec<char>>> {
    match chars {
        None | Some(Value::None) => Ok(None),
        Some(value) => Ok(Some(expect_str(Some(value), method)?.chars().collect())),
    }
}

fn justify(args: CallArgs, method: &str) -> EvalResult<(usize, char)> {
    args.arity(method, 1, 2)?;
    let [width, fill] = args.take::<2>();
    let width = usize::try_from(as_index(&width.unwrap_or(Value::None))?).unwrap_or(0);
    let fill = match fill {
        None => ' ',
        Some(value) => {
            let fill = expect_str(Some(value), method)?;
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(EvalError::type_error(
                        "The fill character must be exactly one character long",
                    ))
                }
            }
        }
    };
    Ok((width, fill))
}

fn str_method(
    text: &str,
    name: &str,
    mut args: CallArgs,
    ctx: &mut ExecutionContext,
) -> EvalResult<Value> {
    if name == "format" {
        let keywords = std::mem::take(&mut args.keywords);
        return Ok(Value::Str(str_format(text, &args.positional, &keywords)?));
    }
    let maxsplit = args.keyword("maxsplit");
    let sep_keyword = args.keyword("sep");
    args.no_keywords(name)?;

    let all_chars = |test: fn(char) -> bool| Value::Bool(!text.is_empty() && text.chars().all(test));

    match name {
        "upper" | "lower" | "title" | "capitalize" => {
            args.arity(name, 0, 0)?;
            Ok(Value::Str(match name {
                "upper" => text.to_uppercase(),
                "lower" => text.to_lowercase(),
                "title" => title_case(text),
                _ => {
                    let mut chars = text.chars();
                    match chars.next() {
                        Some(first) => first
                            .to_uppercase()
                            .chain(chars.flat_map(char::to_lowercase))
                            .collect(),
                        None => String::new(),
                    }
                }
            }))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.arity(name, 0, 1)?;
            let [chars] = args.take::<1>();
            let set = strip_set(chars, name)?;
            let matches = |c: char| match &set {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Ok(Value::Str(
                match name {
                    "strip" => text.trim_matches(matches),
                    "lstrip" => text.trim_start_matches(matches),
                    _ => text.trim_end_matches(matches),
                }
                .to_string(),
            ))
        }
        "split" => {
            args.arity(name, 0, 2)?;
            let [sep, positional_max] = args.take::<2>();
            let sep = match sep_keyword.or(sep) {
                None | Some(Value::None) => None,
                Some(value) => Some(expect_str(Some(value), name)?),
            };
            let limit = match maxsplit.or(positional_max) {
                Some(value) => as_index(&value)?,
                None => -1,
            };
            let limit = usize::try_from(limit).ok();
            ctx.reserve(text.len() * 2)?;
            let parts: Vec<Value> = match sep {
                Some(sep) if sep.is_empty() => {
                    return Err(EvalError::value_error("empty separator"))
                }
                Some(sep) => match limit {
                    Some(limit) => text.splitn(limit + 1, sep.as_str()).map(Value::str).collect(),
                    None => text.split(sep.as_str()).map(Value::str).collect(),
                },
                None => split_whitespace(text, limit),
            };
            Ok(Value::list(parts))
        }
        "splitlines" => {
            args.arity(name, 0, 0)?;
            Ok(Value::list(text.lines().map(Value::str).collect()))
        }
        "join" => {
            args.arity(name, 1, 1)?;
            let [iterable] = args.take::<1>();
            let items = collect_items(&iterable.unwrap_or(Value::None), ctx)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )))
                    }
                }
            }
            let total: usize = parts.iter().map(String::len).sum::<usize>()
                + text.len() * parts.len().saturating_sub(1);
            ctx.reserve(total)?;
            Ok(Value::Str(parts.join(text)))
        }
        "replace" => {
            args.arity(name, 2, 3)?;
            let [old, new, count] = args.take::<3>();
            let old = expect_str(old, name)?;
            let new = expect_str(new, name)?;
            let count = match count {
                Some(value) => as_index(&value)?,
                None => -1,
            };
            let occurrences = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old.as_str()).count()
            };
            ctx.reserve(text.len() + occurrences.saturating_mul(new.len()))?;
            Ok(Value::Str(match usize::try_from(count) {
                Ok(count) => text.replacen(old.as_str(), &new, count),
                Err(_) => text.replace(old.as_str(), &new),
            }))
        }
        "startswith" | "endswith" => {
            args.arity(name, 1, 1)?;
            let [affix] = args.take::<1>();
            let candidates = match affix.unwrap_or(Value::None) {
                Value::Str(s) => vec![s],
                Value::Tuple(items) => items
                    .into_iter()
                    .map(|item| expect_str(Some(item), name))
                    .collect::<EvalResult<Vec<_>>>()?,
                other => {
                    return Err(EvalError::type_error(format!(
                        "{} first arg must be str or a tuple of str, not {}",
                        name,
                        other.type_name()
                    )))
                }
            };
            let found = candidates.iter().any(|affix| {
                if name == "startswith" {
                    text.starts_with(affix.as_str())
                } else {
                    text.ends_with(affix.as_str())
                }
            });
            Ok(Value::Bool(found))
        }
        "find" | "rfind" | "index" | "count" => {
            args.arity(name, 1, 1)?;
            let [needle] = args.take::<1>();
            let needle = expect_str(needle, name)?;
            let position = match name {
                "count" => {
                    let count = if needle.is_empty() {
                        text.chars().count() + 1
                    } else {
                        text.matches(needle.as_str()).count()
                    };
                    return Ok(Value::Int(count as i64));
                }
                "rfind" => text.rfind(needle.as_str()),
                _ => text.find(needle.as_str()),
            };
            match (position, name) {
                (Some(at), _) => Ok(Value::Int(char_index(text, at))),
                (None, "index") => Err(EvalError::value_error("substring not found")),
                (None, _) => Ok(Value::Int(-1)),
            }
        }
        "isdigit" => Ok(all_chars(|c| c.is_ascii_digit())),
        "isalpha" => Ok(all_chars(char::is_alphabetic)),
        "isalnum" => Ok(all_chars(char::is_alphanumeric)),
        "isspace" => Ok(all_chars(char::is_whitespace)),
        "isupper" | "islower" => {
            let cased: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
            let upper = name == "isupper";
            Ok(Value::Bool(
                !cased.is_empty()
                    && cased
                        .iter()
                        .all(|c| if upper { !c.is_lowercase() } else { !c.is_uppercase() }),
            ))
        }
        "zfill" => {
            args.arity(name, 1, 1)?;
            let [width] = args.take::<1>();
            let width = usize::try_from(as_index(&width.unwrap_or(Value::None))?).unwrap_or(0);
            ctx.reserve(width)?;
            let len = text.chars().count();
            if len >= width {
                return Ok(Value::str(text));
            }
            let (sign, digits) = match text.chars().next() {
                Some(c @ ('+' | '-')) => (c.to_string(), &text[1..]),
                _ => (String::new(), text),
            };
            Ok(Value::Str(format!(
                "{}{}{}",
                sign,
                "0".repeat(width - len),
                digits
            )))
        }
        "center" | "ljust" | "rjust" => {
            let (width, fill) = justify(args, name)?;
            ctx.reserve(width)?;
            let len = text.chars().count();
            if len >= width {
                return Ok(Value::str(text));
            }
            let padding = width - len;
            let run = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
            Ok(Value::Str(match name {
                "ljust" => format!("{}{}", text, run(padding)),
                "rjust" => format!("{}{}", run(padding), text),
                _ => {
                    let left = padding / 2 + (padding & width & 1);
                    format!("{}{}{}", run(left), text, run(padding - left))
                }
            }))
        }
        _ => Err(no_attribute(&Value::Str(String::new()), name)),
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(c);
            previous_cased = false;
        }
    }
    out
}

fn split_whitespace(text: &str, limit: Option<usize>) -> Vec<Value> {
    let Some(limit) = limit else {
        return text.split_whitespace().map(Value::str).collect();
    };
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if parts.len() == limit {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

fn normalize_index(index: i64, len: usize, clamp_high: bool) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    if clamp_high {
        Some(index.clamp(0, len) as usize)
    } else if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

fn list_method(
    list: &Shared<Vec<Value>>,
    name: &str,
    mut args: CallArgs,
    ctx: &mut ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> EvalResult<Value> {
    let slot = std::mem::size_of::<Value>();
    if name == "sort" {
        let key = args.keyword("key");
        let reverse = args.keyword("reverse").is_some_and(|v| v.is_truthy());
        args.no_keywords(name)?;
        args.arity(name, 0, 0)?;
        let sorted = sort_with_key(list.snapshot(), key, reverse, ctx, evaluator)?;
        list.write(|items| *items = sorted);
        return Ok(Value::None);
    }
    args.no_keywords(name)?;

    match name {
        "append" => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            ctx.reserve(slot)?;
            list.write(|items| items.push(value.unwrap_or(Value::None)));
            Ok(Value::None)
        }
        "extend" => {
            args.arity(name, 1, 1)?;
            let [iterable] = args.take::<1>();
            let more = collect_items(&iterable.unwrap_or(Value::None), ctx)?;
            list.write(|items| items.extend(more));
            Ok(Value::None)
        }
        "insert" => {
            args.arity(name, 2, 2)?;
            let [index, value] = args.take::<2>();
            let index = as_index(&index.unwrap_or(Value::None))?;
            ctx.reserve(slot)?;
            list.write(|items| {
                let position = normalize_index(index, items.len(), true).unwrap_or(0);
                items.insert(position, value.unwrap_or(Value::None));
            });
            Ok(Value::None)
        }
        "pop" => {
            args.arity(name, 0, 1)?;
            let [index] = args.take::<1>();
            let index = match index {
                Some(index) => as_index(&index)?,
                None => -1,
            };
            list.write(|items| -> EvalResult<Value> {
                if items.is_empty() {
                    return Err(EvalError::exception(
                        ExceptionKind::IndexError,
                        "pop from empty list",
                    ));
                }
                let position = normalize_index(index, items.len(), false).ok_or_else(|| {
                    EvalError::exception(ExceptionKind::IndexError, "pop index out of range")
                })?;
                Ok(items.remove(position))
            })
        }
        "remove" | "index" | "count" => {
            args.arity(name, 1, 1)?;
            let [needle] = args.take::<1>();
            let needle = needle.unwrap_or(Value::None);
            // compared outside the lock: the needle may be this very list
            let items = list.snapshot();
            let matches = |item: &Value| item.is_same(&needle) || item.py_eq(&needle);
            if name == "count" {
                let count = items.iter().filter(|&item| matches(item)).count();
                return Ok(Value::Int(count as i64));
            }
            let position = items.iter().position(matches);
            match (position, name) {
                (Some(at), "remove") => {
                    list.write(|items| items.remove(at));
                    Ok(Value::None)
                }
                (Some(at), _) => Ok(Value::Int(at as i64)),
                (None, "remove") => Err(EvalError::value_error("list.remove(x): x not in list")),
                (None, _) => Err(EvalError::value_error(format!(
                    "{} is not in list",
                    needle.repr()?
                ))),
            }
        }
        "reverse" => {
            args.arity(name, 0, 0)?;
            list.write(|items| items.reverse());
            Ok(Value::None)
        }
        "clear" => {
            args.arity(name, 0, 0)?;
            list.write(Vec::clear);
            Ok(Value::None)
        }
        "copy" => {
            args.arity(name, 0, 0)?;
            let items = list.snapshot();
            ctx.reserve(items.len() * slot)?;
            Ok(Value::list(items))
        }
        _ => Err(no_attribute(&Value::list(vec![]), name)),
    }
}

fn dict_method(
    dict: &Shared<Dict>,
    name: &str,
    mut args: CallArgs,
    ctx: &mut ExecutionContext,
) -> EvalResult<Value> {
    let slot = std::mem::size_of::<Value>();
    if name == "update" {
        args.arity(name, 0, 1)?;
        let keywords = std::mem::take(&mut args.keywords);
        let [other] = args.take::<1>();
        let other = match other {
            None => Dict::new(),
            Some(Value::Dict(other)) => other.snapshot(),
            Some(value) => pairs_to_dict(collect_items(&value, ctx)?)?,
        };
        ctx.reserve((other.len() + keywords.len()) * 3 * slot)?;
        dict.write(|dict| {
            for (key, value) in other.iter() {
                dict.insert(key.clone(), value.clone())?;
            }
            for (key, value) in keywords {
                dict.insert(Value::Str(key), value)?;
            }
            Ok::<_, EvalError>(())
        })?;
        return Ok(Value::None);
    }
    args.no_keywords(name)?;

    match name {
        "keys" | "values" | "items" => {
            args.arity(name, 0, 0)?;
            ctx.reserve(dict.read(Dict::len) * slot)?;
            Ok(Value::list(dict.read(|dict| match name {
                "keys" => dict.keys().cloned().collect(),
                "values" => dict.values().cloned().collect(),
                _ => dict
                    .iter()
                    .map(|(key, value)| Value::Tuple(vec![key.clone(), value.clone()]))
                    .collect(),
            })))
        }
        "get" => {
            args.arity(name, 1, 2)?;
            let [key, default] = args.take::<2>();
            let key = key.unwrap_or(Value::None);
            let found = dict.read(|dict| dict.get(&key).map(|found| found.cloned()))?;
            Ok(found.unwrap_or(default.unwrap_or(Value::None)))
        }
        "pop" => {
            args.arity(name, 1, 2)?;
            let [key, default] = args.take::<2>();
            let key = key.unwrap_or(Value::None);
            match (dict.write(|dict| dict.remove(&key))?, default) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default),
                (None, None) => Err(missing_key(&key)),
            }
        }
        "popitem" => {
            args.arity(name, 0, 0)?;
            let (key, value) = dict.write(Dict::pop_last).ok_or_else(|| {
                EvalError::exception(
                    ExceptionKind::KeyError,
                    "'popitem(): dictionary is empty'",
                )
            })?;
            Ok(Value::Tuple(vec![key, value]))
        }
        "setdefault" => {
            args.arity(name, 1, 2)?;
            let [key, default] = args.take::<2>();
            let key = key.unwrap_or(Value::None);
            if let Some(existing) = dict.read(|dict| dict.get(&key).map(|found| found.cloned()))? {
                return Ok(existing);
            }
            let default = default.unwrap_or(Value::None);
            ctx.reserve(3 * slot)?;
            dict.write(|dict| dict.insert(key, default.clone()))?;
            Ok(default)
        }
        "clear" => {
            args.arity(name, 0, 0)?;
            dict.write(Dict::clear);
            Ok(Value::None)
        }
        "copy" => {
            args.arity(name, 0, 0)?;
            let copy = dict.snapshot();
            ctx.reserve(copy.len() * 3 * slot)?;
            Ok(Value::dict(copy))
        }
        _ => Err(no_attribute(&Value::dict(Dict::new()), name)),
    }
}

/// Message for a missing dictionary key, as the language renders it.
pub fn missing_key(key: &Value) -> EvalError {
    match key.repr() {
        Ok(text) => EvalError::exception(ExceptionKind::KeyError, text),
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eval::context::Namespace,
        governor::{Budget, ResourceLimits},
    };
    use pretty_assertions::assert_eq;

    fn call(receiver: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let mut namespace = Namespace::new();
        let budget = Budget::new(ResourceLimits::default());
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        call_method(receiver, name, CallArgs::new(args), &mut ctx, &ExpressionEvaluator)
    }

    fn text(value: &str, name: &str, args: Vec<Value>) -> String {
        call(&Value::str(value), name, args)
            .unwrap()
            .repr()
            .unwrap()
    }

    #[test]
    fn test_tables_are_sorted() {
        for table in [STR_METHODS, LIST_METHODS, DICT_METHODS] {
            let mut sorted = table.to_vec();
            sorted.sort();
            assert_eq!(sorted, table.to_vec());
        }
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(text("  hi  ", "strip", vec![]), "'hi'");
        assert_eq!(text("a,b,,c", "split", vec![Value::str(",")]), "['a', 'b', '', 'c']");
        assert_eq!(text(" a  b ", "split", vec![]), "['a', 'b']");
        assert_eq!(
            text("a b c", "split", vec![Value::None, Value::Int(1)]),
            "['a', 'b c']"
        );
        assert_eq!(
            text("-", "join", vec![Value::list(vec![Value::str("x"), Value::str("y")])]),
            "'x-y'"
        );
        assert_eq!(text("héllo", "find", vec![Value::str("l")]), "2");
        assert_eq!(text("hello world", "title", vec![]), "'Hello World'");
        assert_eq!(text("-42", "zfill", vec![Value::Int(5)]), "'-0042'");
        assert_eq!(text("ab", "center", vec![Value::Int(6), Value::str("*")]), "'**ab**'");
        assert_eq!(text("abc", "isalpha", vec![]), "True");
        assert_eq!(text("", "isdigit", vec![]), "False");
    }

    #[test]
    fn test_string_index_not_found() {
        let error = call(&Value::str("abc"), "index", vec![Value::str("z")]).unwrap_err();
        assert_eq!(error.to_string(), "ValueError: substring not found");
    }

    #[test]
    fn test_list_methods_mutate_receiver() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1)]);
        call(&list, "append", vec![Value::Int(2)]).unwrap();
        call(&list, "sort", vec![]).unwrap();
        assert_eq!(list.repr().unwrap(), "[1, 2, 3]");
        let popped = call(&list, "pop", vec![Value::Int(0)]).unwrap();
        assert_eq!(popped.repr().unwrap(), "1");
        call(&list, "insert", vec![Value::Int(-1), Value::str("x")]).unwrap();
        assert_eq!(list.repr().unwrap(), "[2, 'x', 3]");
        let error = call(&list, "remove", vec![Value::Int(9)]).unwrap_err();
        assert_eq!(error.to_string(), "ValueError: list.remove(x): x not in list");
    }

    #[test]
    fn test_dict_methods() {
        let dict = Value::dict(Dict::new());
        call(&dict, "setdefault", vec![Value::str("a"), Value::Int(1)]).unwrap();
        let got = call(&dict, "get", vec![Value::str("b"), Value::Int(0)]).unwrap();
        assert_eq!(got.repr().unwrap(), "0");
        let items = call(&dict, "items", vec![]).unwrap();
        assert_eq!(items.repr().unwrap(), "[('a', 1)]");
        let error = call(&dict, "pop", vec![Value::str("zz")]).unwrap_err();
        assert_eq!(error.to_string(), "KeyError: 'zz'");
    }

    #[test]
    fn test_method_tables() {
        for table in [STR_METHODS, LIST_METHODS, DICT_METHODS] {
            assert!(table.windows(2).all(|pair| pair[0] < pair[1]));
        }
        assert!(method_names(&Value::Int(1)).is_empty());
        assert!(has_method(&Value::str(""), "upper"));
        assert!(!has_method(&Value::Int(1), "upper"));
    }
}
