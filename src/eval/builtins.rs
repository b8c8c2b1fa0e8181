//! Builtin functions.

use super::{
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult, ExceptionKind},
    expression::ExpressionEvaluator,
    operators::{binary_op, less_than, numeric_op, sort_values},
    value::{float_to_int_exact, Builtin, Dict, Number, Value},
};
use crate::ast::BinaryOperator;

/// Evaluated arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Removes and returns a keyword argument.
    pub fn keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(key, _)| key == name)?;
        Some(self.keywords.remove(index).1)
    }

    pub fn no_keywords(&self, function: &str) -> EvalResult<()> {
        match self.keywords.first() {
            Some((key, _)) => Err(EvalError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                function, key
            ))),
            None => Ok(()),
        }
    }

    pub fn arity(&self, function: &str, min: usize, max: usize) -> EvalResult<()> {
        let given = self.positional.len();
        if given < min {
            return Err(EvalError::type_error(format!(
                "{} expected at least {} argument{}, got {}",
                function,
                min,
                if min == 1 { "" } else { "s" },
                given
            )));
        }
        if given > max {
            return Err(EvalError::type_error(format!(
                "{} expected at most {} argument{}, got {}",
                function,
                max,
                if max == 1 { "" } else { "s" },
                given
            )));
        }
        Ok(())
    }

    /// Positional arguments in order, padded with `None` up to `count`.
    pub fn take<const N: usize>(self) -> [Option<Value>; N] {
        let mut slots: [Option<Value>; N] = std::array::from_fn(|_| None);
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        slots
    }
}

/// Materializes any iterable into a vector, counting every element.
pub fn collect_items(value: &Value, ctx: &mut ExecutionContext) -> EvalResult<Vec<Value>> {
    let slot = std::mem::size_of::<Value>();
    if let Some(items) = value.sequence_items() {
        ctx.reserve(items.len() * slot)?;
        return Ok(items);
    }
    if let Some(len) = value.len() {
        ctx.reserve(len.saturating_mul(slot))?;
    }
    let mut items = Vec::new();
    for item in ctx.iterate(value)? {
        ctx.tick()?;
        items.push(item);
    }
    Ok(items)
}

pub fn as_index(value: &Value) -> EvalResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(EvalError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// The type object of a value, as returned by `type()`.
pub fn type_of(value: &Value) -> Value {
    let builtin = match value {
        Value::Bool(_) => Builtin::Bool,
        Value::Int(_) => Builtin::Int,
        Value::Float(_) => Builtin::Float,
        Value::Str(_) => Builtin::Str,
        Value::List(_) => Builtin::List,
        Value::Tuple(_) => Builtin::Tuple,
        Value::Dict(_) => Builtin::Dict,
        Value::Range { .. } => Builtin::Range,
        Value::Builtin(b) if b.is_type() => Builtin::Type,
        Value::Class(_) => Builtin::Type,
        other => return Value::Class(other.type_name()),
    };
    Value::Builtin(builtin)
}

pub fn call_builtin(
    builtin: Builtin,
    mut args: CallArgs,
    ctx: &mut ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> EvalResult<Value> {
    let name = builtin.as_ref();
    match builtin {
        Builtin::Print => {
            let sep = text_keyword(&mut args, "sep", " ")?;
            let end = text_keyword(&mut args, "end", "\n")?;
            args.no_keywords(name)?;
            let mut line = String::new();
            for (i, value) in args.positional.iter().enumerate() {
                if i > 0 {
                    line.push_str(&sep);
                }
                line.push_str(&value.to_str()?);
            }
            line.push_str(&end);
            ctx.write_output(&line)?;
            Ok(Value::None)
        }
        Builtin::Sorted => {
            let key = args.keyword("key");
            let reverse = args.keyword("reverse").is_some_and(|v| v.is_truthy());
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            let [iterable] = args.take::<1>();
            let items = collect_items(&iterable.unwrap_or(Value::None), ctx)?;
            sort_with_key(items, key, reverse, ctx, evaluator).map(Value::list)
        }
        Builtin::Max | Builtin::Min => {
            let key = args.keyword("key");
            let default = args.keyword("default");
            args.no_keywords(name)?;
            args.arity(name, 1, usize::MAX)?;
            let items = if args.len() == 1 {
                let [iterable] = args.take::<1>();
                collect_items(&iterable.unwrap_or(Value::None), ctx)?
            } else {
                args.positional
            };
            extremum(builtin == Builtin::Max, items, key, default, ctx, evaluator)
        }
        Builtin::Map => {
            args.no_keywords(name)?;
            args.arity(name, 2, usize::MAX)?;
            let mut positional = args.positional.into_iter();
            let function = positional.next().unwrap_or(Value::None);
            let columns = positional
                .map(|iterable| collect_items(&iterable, ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut mapped = Vec::with_capacity(rows);
            for row in 0..rows {
                let call_args = columns.iter().map(|column| column[row].clone()).collect();
                mapped.push(evaluator.call_value(&function, CallArgs::new(call_args), ctx)?);
            }
            Ok(Value::list(mapped))
        }
        Builtin::Filter => {
            args.no_keywords(name)?;
            args.arity(name, 2, 2)?;
            let [function, iterable] = args.take::<2>();
            let function = function.unwrap_or(Value::None);
            let mut kept = Vec::new();
            for item in collect_items(&iterable.unwrap_or(Value::None), ctx)? {
                let keep = match &function {
                    Value::None => item.is_truthy(),
                    f => evaluator
                        .call_value(f, CallArgs::new(vec![item.clone()]), ctx)?
                        .is_truthy(),
                };
                if keep {
                    kept.push(item);
                }
            }
            Ok(Value::list(kept))
        }
        Builtin::Sum => {
            let start = args.keyword("start");
            args.no_keywords(name)?;
            args.arity(name, 1, 2)?;
            let [iterable, positional_start] = args.take::<2>();
            let mut total = start.or(positional_start).unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(EvalError::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            for item in collect_items(&iterable.unwrap_or(Value::None), ctx)? {
                ctx.tick()?;
                total = binary_op(BinaryOperator::Add, total, item, ctx)?;
            }
            Ok(total)
        }
        Builtin::All | Builtin::Any => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            let [iterable] = args.take::<1>();
            let want = builtin == Builtin::Any;
            for item in ctx.iterate(&iterable.unwrap_or(Value::None))? {
                ctx.tick()?;
                if item.is_truthy() == want {
                    return Ok(Value::Bool(want));
                }
            }
            Ok(Value::Bool(!want))
        }
        Builtin::Enumerate => {
            let keyword_start = args.keyword("start");
            args.no_keywords(name)?;
            args.arity(name, 1, 2)?;
            let [iterable, start] = args.take::<2>();
            let mut index = match keyword_start.or(start) {
                Some(value) => as_index(&value)?,
                None => 0,
            };
            let items = collect_items(&iterable.unwrap_or(Value::None), ctx)?;
            let mut pairs = Vec::with_capacity(items.len());
            for item in items {
                pairs.push(Value::Tuple(vec![Value::Int(index), item]));
                index = index.saturating_add(1);
            }
            Ok(Value::list(pairs))
        }
        Builtin::Zip => {
            args.no_keywords(name)?;
            let columns = args
                .positional
                .iter()
                .map(|iterable| collect_items(iterable, ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut zipped = Vec::with_capacity(rows);
            for row in 0..rows {
                ctx.tick()?;
                zipped.push(Value::Tuple(
                    columns.iter().map(|column| column[row].clone()).collect(),
                ));
            }
            Ok(Value::list(zipped))
        }
        _ => {
            if builtin != Builtin::Dict {
                args.no_keywords(name)?;
            }
            call_simple(builtin, args, ctx)
        }
    }
}

/// Builtins that never call back into user code.
fn call_simple(builtin: Builtin, args: CallArgs, ctx: &mut ExecutionContext) -> EvalResult<Value> {
    let name = builtin.as_ref();
    match builtin {
        Builtin::Len => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            let value = value.unwrap_or(Value::None);
            let len = value.len().ok_or_else(|| {
                EvalError::type_error(format!(
                    "object of type '{}' has no len()",
                    value.type_name()
                ))
            })?;
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        Builtin::Abs => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            let value = value.unwrap_or(Value::None);
            match value.as_number() {
                Some(Number::Int(n)) => Ok(Value::Int(n.checked_abs().ok_or_else(|| {
                    EvalError::exception(ExceptionKind::OverflowError, "integer overflow")
                })?)),
                Some(Number::Float(x)) => Ok(Value::Float(x.abs())),
                None => Err(EvalError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    value.type_name()
                ))),
            }
        }
        Builtin::Bin | Builtin::Hex | Builtin::Oct => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            let n = as_index(&value.unwrap_or(Value::None))?;
            let magnitude = n.unsigned_abs();
            let digits = match builtin {
                Builtin::Bin => format!("0b{:b}", magnitude),
                Builtin::Hex => format!("0x{:x}", magnitude),
                _ => format!("0o{:o}", magnitude),
            };
            Ok(Value::Str(if n < 0 {
                format!("-{}", digits)
            } else {
                digits
            }))
        }
        Builtin::Bool => {
            args.arity(name, 0, 1)?;
            let [value] = args.take::<1>();
            Ok(Value::Bool(value.is_some_and(|v| v.is_truthy())))
        }
        Builtin::Chr => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            let n = as_index(&value.unwrap_or(Value::None))?;
            u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| EvalError::value_error("chr() arg not in range(0x110000)"))
        }
        Builtin::Ord => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            match value.unwrap_or(Value::None) {
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Int(c as i64)),
                        _ => Err(EvalError::type_error(format!(
                            "ord() expected a character, but string of length {} found",
                            s.chars().count()
                        ))),
                    }
                }
                other => Err(EvalError::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    other.type_name()
                ))),
            }
        }
        Builtin::Divmod => {
            args.arity(name, 2, 2)?;
            let [a, b] = args.take::<2>();
            let (a, b) = (a.unwrap_or(Value::None), b.unwrap_or(Value::None));
            match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Tuple(vec![
                    numeric_op(BinaryOperator::FloorDivide, x, y)?,
                    numeric_op(BinaryOperator::Modulo, x, y)?,
                ])),
                _ => Err(EvalError::type_error(format!(
                    "unsupported operand type(s) for divmod(): '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
        Builtin::Pow => {
            args.arity(name, 2, 3)?;
            let [base, exponent, modulus] = args.take::<3>();
            let (base, exponent) = (base.unwrap_or(Value::None), exponent.unwrap_or(Value::None));
            match modulus {
                Some(modulus) => modular_pow(&base, &exponent, &modulus),
                None => binary_op(BinaryOperator::Power, base, exponent, ctx),
            }
        }
        Builtin::Float => {
            args.arity(name, 0, 1)?;
            let [value] = args.take::<1>();
            match value {
                None => Ok(Value::Float(0.0)),
                Some(value) => to_float(&value).map(Value::Float),
            }
        }
        Builtin::Int => {
            args.arity(name, 0, 2)?;
            let [value, base] = args.take::<2>();
            match (value, base) {
                (None, _) => Ok(Value::Int(0)),
                (Some(Value::Str(text)), base) => {
                    let base = match base {
                        Some(base) => as_index(&base)?,
                        None => 10,
                    };
                    parse_int(&text, base).map(Value::Int)
                }
                (Some(_), Some(_)) => Err(EvalError::type_error(
                    "int() can't convert non-string with explicit base",
                )),
                (Some(value), None) => to_int(&value).map(Value::Int),
            }
        }
        Builtin::Str => {
            args.arity(name, 0, 1)?;
            let [value] = args.take::<1>();
            Ok(Value::Str(match value {
                Some(value) => value.to_str()?,
                None => String::new(),
            }))
        }
        Builtin::Repr => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            Ok(Value::Str(value.unwrap_or(Value::None).repr()?))
        }
        Builtin::List | Builtin::Tuple => {
            args.arity(name, 0, 1)?;
            let [value] = args.take::<1>();
            let items = match value {
                Some(value) => collect_items(&value, ctx)?,
                None => Vec::new(),
            };
            Ok(if builtin == Builtin::List {
                Value::list(items)
            } else {
                Value::Tuple(items)
            })
        }
        Builtin::Dict => {
            args.arity(name, 0, 1)?;
            let keywords = args.keywords.clone();
            let [value] = args.take::<1>();
            let mut dict = match value {
                None => Dict::new(),
                Some(Value::Dict(source)) => source.snapshot(),
                Some(value) => pairs_to_dict(collect_items(&value, ctx)?)?,
            };
            for (key, value) in keywords {
                dict.insert(Value::Str(key), value)?;
            }
            Ok(Value::dict(dict))
        }
        Builtin::Range => {
            args.arity(name, 1, 3)?;
            let bounds = args
                .positional
                .iter()
                .map(as_index)
                .collect::<EvalResult<Vec<_>>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(EvalError::type_error("range expected 1 to 3 arguments")),
            };
            if step == 0 {
                return Err(EvalError::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        Builtin::Round => {
            args.arity(name, 1, 2)?;
            let [value, digits] = args.take::<2>();
            let value = value.unwrap_or(Value::None);
            let digits = match digits {
                Some(Value::None) | None => None,
                Some(digits) => Some(as_index(&digits)?),
            };
            round(&value, digits)
        }
        Builtin::Type => {
            args.arity(name, 1, 1)?;
            let [value] = args.take::<1>();
            Ok(type_of(&value.unwrap_or(Value::None)))
        }
        other => Err(EvalError::type_error(format!(
            "{}() is not supported here",
            other
        ))),
    }
}

fn text_keyword(args: &mut CallArgs, key: &str, default: &str) -> EvalResult<String> {
    match args.keyword(key) {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(text)) => Ok(text),
        Some(other) => Err(EvalError::type_error(format!(
            "{} must be None or a string, not {}",
            key,
            other.type_name()
        ))),
    }
}

pub fn pairs_to_dict(items: Vec<Value>) -> EvalResult<Dict> {
    let mut dict = Dict::new();
    for (i, item) in items.into_iter().enumerate() {
        match item.sequence_items() {
            Some(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                if let (Some(key), Some(value)) = (pair.next(), pair.next()) {
                    dict.insert(key, value)?;
                }
            }
            _ => {
                return Err(EvalError::value_error(format!(
                    "dictionary update sequence element #{} has length {}; 2 is required",
                    i,
                    item.len().unwrap_or(1)
                )))
            }
        }
    }
    Ok(dict)
}

pub fn sort_with_key(
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
    ctx: &mut ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> EvalResult<Vec<Value>> {
    let keys = match key {
        None | Some(Value::None) => items.clone(),
        Some(function) => items
            .iter()
            .map(|item| evaluator.call_value(&function, CallArgs::new(vec![item.clone()]), ctx))
            .collect::<EvalResult<Vec<_>>>()?,
    };
    sort_values(items, &keys, reverse, ctx.budget())
}

fn extremum(
    want_max: bool,
    items: Vec<Value>,
    key: Option<Value>,
    default: Option<Value>,
    ctx: &mut ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> EvalResult<Value> {
    let name = if want_max { "max" } else { "min" };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        ctx.tick()?;
        let rank = match &key {
            None | Some(Value::None) => item.clone(),
            Some(function) => {
                evaluator.call_value(function, CallArgs::new(vec![item.clone()]), ctx)?
            }
        };
        let better = match &best {
            None => true,
            Some((best_rank, _)) if want_max => less_than(best_rank, &rank)?,
            Some((best_rank, _)) => less_than(&rank, best_rank)?,
        };
        if better {
            best = Some((rank, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(EvalError::value_error(format!(
            "{}() arg is an empty sequence",
            name
        ))),
    }
}

fn modular_pow(base: &Value, exponent: &Value, modulus: &Value) -> EvalResult<Value> {
    let (Value::Int(base), Value::Int(exponent), Value::Int(modulus)) = (base, exponent, modulus)
    else {
        return Err(EvalError::type_error(
            "pow() 3rd argument not allowed unless all arguments are integers",
        ));
    };
    if *modulus == 0 {
        return Err(EvalError::value_error("pow() 3rd argument cannot be 0"));
    }
    if *exponent < 0 {
        return Err(EvalError::value_error(
            "pow() negative exponent not supported with a modulus",
        ));
    }
    let m = *modulus as i128;
    let mut result: i128 = 1 % m;
    let mut base = (*base as i128).rem_euclid(m);
    let mut exponent = *exponent;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exponent >>= 1;
    }
    if result != 0 && (result < 0) != (m < 0) {
        result += m;
    }
    Ok(Value::Int(result as i64))
}

pub fn to_float(value: &Value) -> EvalResult<f64> {
    match value {
        Value::Str(text) => {
            let cleaned = text.trim().replace('_', "");
            let lowered = cleaned.to_ascii_lowercase();
            let parsed = match lowered.trim_start_matches(['+', '-']) {
                "inf" | "infinity" | "nan" => lowered
                    .replace("infinity", "inf")
                    .parse::<f64>()
                    .ok(),
                _ => cleaned.parse::<f64>().ok(),
            };
            parsed.ok_or_else(|| {
                EvalError::value_error(format!(
                    "could not convert string to float: {}",
                    super::value::string_repr(text)
                ))
            })
        }
        other => other.as_number().map(Number::as_f64).ok_or_else(|| {
            EvalError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

pub fn to_int(value: &Value) -> EvalResult<i64> {
    match value.as_number() {
        Some(Number::Int(n)) => Ok(n),
        Some(Number::Float(x)) if x.is_nan() => {
            Err(EvalError::value_error("cannot convert float NaN to integer"))
        }
        Some(Number::Float(x)) if x.is_infinite() => Err(EvalError::exception(
            ExceptionKind::OverflowError,
            "cannot convert float infinity to integer",
        )),
        Some(Number::Float(x)) => float_to_int_exact(x.trunc()).ok_or_else(|| {
            EvalError::exception(ExceptionKind::OverflowError, "integer overflow")
        }),
        None => match value {
            Value::Str(text) => parse_int(text, 10),
            other => Err(EvalError::type_error(format!(
                "int() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn parse_int(text: &str, base: i64) -> EvalResult<i64> {
    let invalid = || {
        EvalError::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            super::value::string_repr(text)
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(EvalError::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lowered = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lowered.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lowered[2..]),
        (0 | 8, Some("0o")) => (8, &lowered[2..]),
        (0 | 2, Some("0b")) => (2, &lowered[2..]),
        (0, _) => (10, lowered.as_str()),
        (base, _) => (base as u32, lowered.as_str()),
    };
    let digits = digits.strip_prefix('_').unwrap_or(digits);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__")
    {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(&digits.replace('_', ""), radix).map_err(|_| invalid())?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed)
        .map_err(|_| EvalError::exception(ExceptionKind::OverflowError, "integer overflow"))
}

fn round(value: &Value, digits: Option<i64>) -> EvalResult<Value> {
    match (value.as_number(), digits) {
        (Some(Number::Int(n)), None) => Ok(Value::Int(n)),
        (Some(Number::Int(n)), Some(digits)) if digits >= 0 => Ok(Value::Int(n)),
        (Some(Number::Int(n)), Some(digits)) => {
            let factor = 10f64.powi(i32::try_from(-digits).unwrap_or(i32::MAX));
            let rounded = (n as f64 / factor).round_ties_even() * factor;
            Ok(Value::Int(float_to_int_exact(rounded).unwrap_or(0)))
        }
        (Some(Number::Float(x)), None) => to_int(&Value::Float(x.round_ties_even())).map(Value::Int),
        (Some(Number::Float(x)), Some(digits)) => {
            let digits = i32::try_from(digits.clamp(-308, 308)).unwrap_or(0);
            let factor = 10f64.powi(digits);
            let scaled = x * factor;
            if !scaled.is_finite() {
                return Ok(Value::Float(x));
            }
            Ok(Value::Float(scaled.round_ties_even() / factor))
        }
        (None, _) => Err(EvalError::type_error(format!(
            "type {} doesn't define __round__ method",
            value.type_name()
        ))),
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

    fn call(builtin: Builtin, args: Vec<Value>) -> EvalResult<Value> {
        call_with(builtin, CallArgs::new(args)).map(|(value, _)| value)
    }

    fn call_with(builtin: Builtin, args: CallArgs) -> EvalResult<(Value, String)> {
        let mut namespace = Namespace::new();
        let budget = Budget::new(ResourceLimits::default());
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        let value = call_builtin(builtin, args, &mut ctx, &ExpressionEvaluator)?;
        Ok((value, ctx.take_output()))
    }

    fn repr(result: EvalResult<Value>) -> String {
        result.unwrap().repr().unwrap()
    }

    #[test]
    fn test_print_keywords() {
        let args = CallArgs {
            positional: vec![Value::Int(1), Value::str("a")],
            keywords: vec![
                ("sep".to_string(), Value::str("-")),
                ("end".to_string(), Value::str("!")),
            ],
        };
        let (_, output) = call_with(Builtin::Print, args).unwrap();
        assert_eq!(output, "1-a!");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(repr(call(Builtin::Int, vec![Value::str(" -42 ")])), "-42");
        assert_eq!(repr(call(Builtin::Int, vec![Value::str("ff"), Value::Int(16)])), "255");
        assert_eq!(repr(call(Builtin::Int, vec![Value::Float(-3.9)])), "-3");
        assert_eq!(repr(call(Builtin::Float, vec![Value::str("1e3")])), "1000.0");
        assert_eq!(repr(call(Builtin::Hex, vec![Value::Int(-255)])), "'-0xff'");
        let error = call(Builtin::Int, vec![Value::str("abc")]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn test_round_uses_bankers_rounding() {
        assert_eq!(repr(call(Builtin::Round, vec![Value::Float(2.5)])), "2");
        assert_eq!(repr(call(Builtin::Round, vec![Value::Float(3.5)])), "4");
        assert_eq!(
            repr(call(Builtin::Round, vec![Value::Float(3.14159), Value::Int(2)])),
            "3.14"
        );
        assert_eq!(repr(call(Builtin::Round, vec![Value::Int(1250), Value::Int(-2)])), "1200");
    }

    #[test]
    fn test_sequences() {
        let range = call(Builtin::Range, vec![Value::Int(3)]).unwrap();
        assert_eq!(repr(call(Builtin::List, vec![range.clone()])), "[0, 1, 2]");
        assert_eq!(repr(call(Builtin::Sum, vec![range.clone()])), "3");
        assert_eq!(
            repr(call(Builtin::Enumerate, vec![Value::str("ab")])),
            "[(0, 'a'), (1, 'b')]"
        );
        assert_eq!(
            repr(call(Builtin::Zip, vec![range, Value::str("xy")])),
            "[(0, 'x'), (1, 'y')]"
        );
        assert_eq!(repr(call(Builtin::Max, vec![Value::Int(3), Value::Int(9), Value::Int(4)])), "9");
        assert!(call(Builtin::Range, vec![Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_min_of_empty() {
        let error = call(Builtin::Min, vec![Value::list(vec![])]).unwrap_err();
        assert_eq!(error.to_string(), "ValueError: min() arg is an empty sequence");
    }

    #[test]
    fn test_sum_rejects_strings() {
        let error = call(
            Builtin::Sum,
            vec![Value::list(vec![]), Value::str("")],
        )
        .unwrap_err();
        assert_eq!(error.kind(), Some(ExceptionKind::TypeError));
    }

    #[test]
    fn test_type_and_len() {
        assert_eq!(repr(call(Builtin::Type, vec![Value::Int(1)])), "<class 'int'>");
        assert_eq!(repr(call(Builtin::Type, vec![Value::None])), "<class 'NoneType'>");
        let error = call(Builtin::Len, vec![Value::Int(1)]).unwrap_err();
        assert_eq!(error.to_string(), "TypeError: object of type 'int' has no len()");
    }

    #[test]
    fn test_modular_pow() {
        assert_eq!(
            repr(call(Builtin::Pow, vec![Value::Int(3), Value::Int(200), Value::Int(7)])),
            "2"
        );
    }

    #[test]
    fn test_pow_negative_exponent_is_float() {
        assert_eq!(repr(call(Builtin::Pow, vec![Value::Int(2), Value::Int(-1)])), "0.5");
        assert_eq!(repr(call(Builtin::Pow, vec![Value::Int(-2), Value::Int(-2)])), "0.25");
    }

    #[test]
    fn test_dict_from_pairs() {
        let pairs = Value::list(vec![Value::Tuple(vec![Value::str("a"), Value::Int(1)])]);
        assert_eq!(repr(call(Builtin::Dict, vec![pairs])), "{'a': 1}");
    }
}
