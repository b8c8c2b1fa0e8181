//! Arithmetic, comparison and ordering.

use std::cmp::Ordering;

use super::{
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult, ExceptionKind},
    format::percent_format,
    value::{float_to_int_exact, range_len, Number, Value},
};
use crate::{
    ast::{BinaryOperator, CompareOperator, UnaryOperator},
    governor::Budget,
};

fn overflow() -> EvalError {
    EvalError::exception(ExceptionKind::OverflowError, "integer overflow")
}

fn zero_division(message: &str) -> EvalError {
    EvalError::exception(ExceptionKind::ZeroDivisionError, message)
}

fn unsupported(op: BinaryOperator, left: &Value, right: &Value) -> EvalError {
    let symbol = if op == BinaryOperator::Power {
        "** or pow()".to_string()
    } else {
        op.to_string()
    };
    EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

pub fn binary_op(
    op: BinaryOperator,
    left: Value,
    right: Value,
    ctx: &mut ExecutionContext,
) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return numeric_op(op, a, b);
    }
    match (op, left, right) {
        (BinaryOperator::Add, Value::Str(mut a), Value::Str(b)) => {
            ctx.reserve(b.len())?;
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (BinaryOperator::Add, Value::List(a), Value::List(b)) => {
            let (mut joined, tail) = (a.snapshot(), b.snapshot());
            ctx.reserve((joined.len() + tail.len()) * std::mem::size_of::<Value>())?;
            joined.extend(tail);
            Ok(Value::list(joined))
        }
        (BinaryOperator::Add, Value::Tuple(mut a), Value::Tuple(b)) => {
            ctx.reserve(b.len() * std::mem::size_of::<Value>())?;
            a.extend(b);
            Ok(Value::Tuple(a))
        }
        (BinaryOperator::Add, left @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)), right) => {
            Err(EvalError::type_error(format!(
                "can only concatenate {} (not \"{}\") to {}",
                left.type_name(),
                right.type_name(),
                left.type_name()
            )))
        }
        (BinaryOperator::Multiply, sequence, Value::Int(n))
        | (BinaryOperator::Multiply, Value::Int(n), sequence)
            if is_sequence(&sequence) =>
        {
            repeat(sequence, n, ctx)
        }
        (BinaryOperator::Multiply, sequence, Value::Bool(b))
        | (BinaryOperator::Multiply, Value::Bool(b), sequence)
            if is_sequence(&sequence) =>
        {
            repeat(sequence, b as i64, ctx)
        }
        (BinaryOperator::Modulo, Value::Str(template), args) => {
            Ok(Value::Str(percent_format(&template, &args)?))
        }
        (op, left, right) => Err(unsupported(op, &left, &right)),
    }
}

fn is_sequence(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::List(_) | Value::Tuple(_))
}

fn repeat(sequence: Value, times: i64, ctx: &mut ExecutionContext) -> EvalResult<Value> {
    let times = usize::try_from(times).unwrap_or(0);
    let unit = match &sequence {
        Value::Str(s) => s.len(),
        other => other.len().unwrap_or(0) * std::mem::size_of::<Value>(),
    };
    ctx.reserve(unit.checked_mul(times).unwrap_or(usize::MAX))?;
    Ok(match sequence {
        Value::Str(s) => Value::Str(s.repeat(times)),
        Value::List(list) => Value::list(repeat_items(&list.snapshot(), times)),
        Value::Tuple(items) => Value::Tuple(repeat_items(&items, times)),
        other => other,
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    let mut repeated = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        repeated.extend_from_slice(items);
    }
    repeated
}

fn floor_div_int(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(zero_division("integer division or modulo by zero"));
    }
    let quotient = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn modulo_int(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(zero_division("integer modulo by zero"));
    }
    if b == -1 {
        return Ok(0);
    }
    let remainder = a % b;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

fn modulo_float(a: f64, b: f64) -> EvalResult<f64> {
    if b == 0.0 {
        return Err(zero_division("float modulo"));
    }
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

pub fn numeric_op(op: BinaryOperator, a: Number, b: Number) -> EvalResult<Value> {
    use Number::{Float, Int};

    if let (Int(x), Int(y)) = (a, b) {
        let result = match op {
            BinaryOperator::Add => x.checked_add(y).ok_or_else(overflow)?,
            BinaryOperator::Subtract => x.checked_sub(y).ok_or_else(overflow)?,
            BinaryOperator::Multiply => x.checked_mul(y).ok_or_else(overflow)?,
            BinaryOperator::FloorDivide => floor_div_int(x, y)?,
            BinaryOperator::Modulo => modulo_int(x, y)?,
            BinaryOperator::Power if y >= 0 => {
                let exponent = u32::try_from(y).map_err(|_| overflow())?;
                x.checked_pow(exponent).ok_or_else(overflow)?
            }
            BinaryOperator::Power => return float_op(op, x as f64, y as f64),
            BinaryOperator::Divide => {
                if y == 0 {
                    return Err(zero_division("division by zero"));
                }
                return Ok(Value::Float(x as f64 / y as f64));
            }
        };
        return Ok(Value::Int(result));
    }
    float_op(op, a.as_f64(), b.as_f64())
}

fn float_op(op: BinaryOperator, x: f64, y: f64) -> EvalResult<Value> {
    let result = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Subtract => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide => {
            if y == 0.0 {
                return Err(zero_division("division by zero"));
            }
            x / y
        }
        BinaryOperator::FloorDivide => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinaryOperator::Modulo => modulo_float(x, y)?,
        BinaryOperator::Power => {
            if x == 0.0 && y < 0.0 {
                return Err(zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            let result = x.powf(y);
            if result.is_nan() && x < 0.0 {
                return Err(EvalError::value_error(
                    "math domain error: negative number raised to a fractional power",
                ));
            }
            result
        }
    };
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(EvalError::exception(
            ExceptionKind::OverflowError,
            "numerical result out of range",
        ));
    }
    Ok(Value::Float(result))
}

pub fn unary_op(op: UnaryOperator, operand: Value) -> EvalResult<Value> {
    match (op, operand.as_number()) {
        (UnaryOperator::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOperator::Negate, Some(Number::Int(n))) => {
            Ok(Value::Int(n.checked_neg().ok_or_else(overflow)?))
        }
        (UnaryOperator::Negate, Some(Number::Float(x))) => Ok(Value::Float(-x)),
        (UnaryOperator::Plus, Some(Number::Int(n))) => Ok(Value::Int(n)),
        (UnaryOperator::Plus, Some(Number::Float(x))) => Ok(Value::Float(x)),
        (op, None) => Err(EvalError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            op,
            operand.type_name()
        ))),
    }
}

/// Ordering between two values, `None` when unordered (NaN).
pub fn compare_order(symbol: &str, left: &Value, right: &Value) -> EvalResult<Option<Ordering>> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return Ok(a.partial_cmp(b));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(_), Value::List(_)) | (Value::Tuple(_), Value::Tuple(_)) => {
            let a = left.sequence_items().unwrap_or_default();
            let b = right.sequence_items().unwrap_or_default();
            for (x, y) in a.iter().zip(&b) {
                if !x.is_same(y) && !x.py_eq(y) {
                    return compare_order(symbol, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(EvalError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(list) => Ok(list
            .snapshot()
            .iter()
            .any(|x| x.is_same(item) || x.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|x| x.is_same(item) || x.py_eq(item))),
        Value::Dict(dict) => Ok(dict.read(|dict| dict.get(item).map(|found| found.is_some()))?),
        Value::Range { start, stop, step } => {
            let n = match item.as_number() {
                Some(Number::Int(n)) => n,
                Some(Number::Float(x)) => match float_to_int_exact(x) {
                    Some(n) => n,
                    None => return Ok(false),
                },
                None => return Ok(false),
            };
            let offset = n as i128 - *start as i128;
            let index = offset / *step as i128;
            Ok(offset % *step as i128 == 0
                && index >= 0
                && index < range_len(*start, *stop, *step) as i128)
        }
        other => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CompareOperator, left: &Value, right: &Value) -> EvalResult<bool> {
    let ordered = |test: fn(Ordering) -> bool| -> EvalResult<bool> {
        Ok(compare_order(&op.to_string(), left, right)?.is_some_and(test))
    };
    match op {
        CompareOperator::Equal => Ok(left.py_eq(right)),
        CompareOperator::NotEqual => Ok(!left.py_eq(right)),
        CompareOperator::Less => ordered(Ordering::is_lt),
        CompareOperator::LessEqual => ordered(Ordering::is_le),
        CompareOperator::Greater => ordered(Ordering::is_gt),
        CompareOperator::GreaterEqual => ordered(Ordering::is_ge),
        CompareOperator::In => contains(right, left),
        CompareOperator::NotIn => contains(right, left).map(|found| !found),
        CompareOperator::Is => Ok(left.is_same(right)),
        CompareOperator::IsNot => Ok(!left.is_same(right)),
    }
}

pub fn less_than(left: &Value, right: &Value) -> EvalResult<bool> {
    Ok(compare_order("<", left, right)?.is_some_and(Ordering::is_lt))
}

/// Stable sort of `values` by `keys`. The comparison can fail, so the
/// standard library sort (which requires a total order) is not used.
pub fn sort_values(
    values: Vec<Value>,
    keys: &[Value],
    reverse: bool,
    budget: &Budget,
) -> EvalResult<Vec<Value>> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    let mut buffer = Vec::with_capacity(order.len());
    let mut less = |a: usize, b: usize| -> EvalResult<bool> {
        budget.tick()?;
        if reverse {
            less_than(&keys[b], &keys[a])
        } else {
            less_than(&keys[a], &keys[b])
        }
    };
    merge_sort(&mut order, &mut buffer, &mut less)?;

    let mut slots: Vec<Option<Value>> = values.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

fn merge_sort<F>(order: &mut [usize], buffer: &mut Vec<usize>, less: &mut F) -> EvalResult<()>
where
    F: FnMut(usize, usize) -> EvalResult<bool>,
{
    let len = order.len();
    if len <= 1 {
        return Ok(());
    }
    let mid = len / 2;
    merge_sort(&mut order[..mid], buffer, less)?;
    merge_sort(&mut order[mid..], buffer, less)?;

    buffer.clear();
    let (mut i, mut j) = (0, mid);
    while i < mid && j < len {
        if less(order[j], order[i])? {
            buffer.push(order[j]);
            j += 1;
        } else {
            buffer.push(order[i]);
            i += 1;
        }
    }
    buffer.extend_from_slice(&order[i..mid]);
    buffer.extend_from_slice(&order[j..len]);
    order.copy_from_slice(buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{eval::context::Namespace, governor::ResourceLimits};

    fn with_ctx<T>(f: impl FnOnce(&mut ExecutionContext) -> T) -> T {
        let mut namespace = Namespace::new();
        let budget = Budget::new(ResourceLimits {
            max_memory_usage: 4096,
            ..ResourceLimits::default()
        });
        let mut ctx = ExecutionContext::new(&mut namespace, &budget);
        f(&mut ctx)
    }

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert!(matches!(
            numeric_op(BinaryOperator::FloorDivide, Number::Int(-7), Number::Int(2)),
            Ok(Value::Int(-4))
        ));
        assert!(matches!(
            numeric_op(BinaryOperator::Modulo, Number::Int(-7), Number::Int(3)),
            Ok(Value::Int(2))
        ));
        assert!(matches!(
            numeric_op(BinaryOperator::Divide, Number::Int(7), Number::Int(2)),
            Ok(Value::Float(x)) if x == 3.5
        ));
        assert!(matches!(
            numeric_op(BinaryOperator::Power, Number::Int(2), Number::Int(-1)),
            Ok(Value::Float(x)) if x == 0.5
        ));
    }

    #[test]
    fn test_division_by_zero_messages() {
        let error = numeric_op(BinaryOperator::Divide, Number::Int(1), Number::Int(0)).unwrap_err();
        assert_eq!(error.to_string(), "ZeroDivisionError: division by zero");
        let error = numeric_op(BinaryOperator::Modulo, Number::Int(1), Number::Int(0)).unwrap_err();
        assert_eq!(error.to_string(), "ZeroDivisionError: integer modulo by zero");
    }

    #[test]
    fn test_overflow_is_an_error() {
        let error = numeric_op(BinaryOperator::Power, Number::Int(10), Number::Int(30)).unwrap_err();
        assert_eq!(error.kind(), Some(ExceptionKind::OverflowError));
    }

    #[test]
    fn test_concatenation_type_error() {
        let error = with_ctx(|ctx| binary_op(BinaryOperator::Add, Value::str("a"), int(1), ctx))
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "TypeError: can only concatenate str (not \"int\") to str"
        );
    }

    #[test]
    fn test_repetition_reserves_memory() {
        let repeated = with_ctx(|ctx| binary_op(BinaryOperator::Multiply, int(3), Value::str("ab"), ctx));
        assert!(matches!(repeated, Ok(Value::Str(s)) if s == "ababab"));

        let huge = with_ctx(|ctx| {
            binary_op(BinaryOperator::Multiply, Value::list(vec![int(0)]), int(1 << 40), ctx)
        });
        assert!(matches!(huge, Err(EvalError::Resource(_))));
    }

    #[test]
    fn test_ordering() {
        assert!(compare(CompareOperator::Less, &int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(
            CompareOperator::Less,
            &Value::list(vec![int(1), int(2)]),
            &Value::list(vec![int(1), int(3)])
        )
        .unwrap());
        let error = compare(CompareOperator::Less, &int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
        assert!(!compare(CompareOperator::Less, &Value::Float(f64::NAN), &int(1)).unwrap());
    }

    #[test]
    fn test_membership() {
        let range = Value::Range {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert!(contains(&range, &int(9)).unwrap());
        assert!(!contains(&range, &int(4)).unwrap());
        assert!(contains(&Value::str("hello"), &Value::str("ell")).unwrap());
        assert!(contains(&Value::str("hello"), &int(1)).is_err());
        assert!(contains(&int(3), &int(1)).is_err());
    }

    #[test]
    fn test_sort_is_stable_and_fallible() {
        let budget = Budget::new(ResourceLimits::default());
        let values = vec![int(3), int(1), int(2), int(1)];
        let keys = vec![int(1), int(0), int(1), int(0)];
        let sorted = sort_values(values, &keys, false, &budget).unwrap();
        let sorted: Vec<i64> = sorted
            .iter()
            .map(|v| match v {
                Value::Int(n) => *n,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(sorted, vec![1, 1, 3, 2]);

        let mixed = vec![int(1), Value::str("a")];
        assert!(sort_values(mixed.clone(), &mixed, false, &budget).is_err());
    }
}
