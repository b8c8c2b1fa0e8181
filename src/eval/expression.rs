use std::{borrow::Cow, collections::HashMap, sync::Arc};

use super::{
    builtins::{as_index, call_builtin, collect_items, CallArgs},
    context::{ExecutionContext, Frame},
    evaluator::{EvalError, EvalResult, ExceptionKind},
    format::format_field,
    methods::{call_method, has_method, missing_key, no_attribute},
    operators::{binary_op, compare, unary_op},
    statement::{ControlFlow, StatementEvaluator, StatementResult},
    value::{range_len, Builtin, Dict, Function, FunctionBody, Value},
};
use crate::ast::{
    Argument, BoolOperator, Comprehension, Constant, Expression, FStringPart, Index, Parameter,
    Target,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn eval_expression(
        &self,
        expression: &Expression,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        match expression {
            Expression::Constant(constant) => Ok(constant_value(constant)),
            Expression::FString(parts) => self.eval_fstring(parts, ctx),
            Expression::Name(name) => ctx.load(name),
            Expression::List(items) => Ok(Value::list(self.eval_items(items, ctx)?)),
            Expression::Tuple(items) => Ok(Value::Tuple(self.eval_items(items, ctx)?)),
            Expression::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval_expression(key, ctx)?;
                    let value = self.eval_expression(value, ctx)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expression::ListComp {
                element,
                generators,
            } => {
                let mut items = Vec::new();
                ctx.push_comprehension();
                let result = self.comprehend(element, generators, ctx, &mut items);
                ctx.pop_comprehension();
                result.map(|_| Value::list(items))
            }
            Expression::BinaryOp { op, left, right } => {
                let left = self.eval_expression(left, ctx)?;
                let right = self.eval_expression(right, ctx)?;
                binary_op(*op, left, right, ctx)
            }
            Expression::UnaryOp { op, operand } => {
                let operand = self.eval_expression(operand, ctx)?;
                unary_op(*op, operand)
            }
            Expression::BoolOp { op, left, right } => {
                let left = self.eval_expression(left, ctx)?;
                let short_circuit = match op {
                    BoolOperator::And => !left.is_truthy(),
                    BoolOperator::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expression(right, ctx)
                }
            }
            Expression::Compare { left, comparisons } => {
                self.eval_comparison(left, comparisons, ctx)
            }
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_expression(condition, ctx)?.is_truthy() {
                    self.eval_expression(then, ctx)
                } else {
                    self.eval_expression(otherwise, ctx)
                }
            }
            Expression::Lambda { params, body } => {
                let function = self.make_function(
                    "<lambda>",
                    params,
                    FunctionBody::Lambda((**body).clone()),
                    ctx,
                )?;
                Ok(Value::Function(function))
            }
            Expression::Call {
                function,
                arguments,
            } => self.eval_call(function, arguments, ctx),
            Expression::Attribute { value, name } => {
                let value = self.eval_expression(value, ctx)?;
                if has_method(&value, name) {
                    Ok(Value::BoundMethod(Box::new(value), name.clone()))
                } else {
                    Err(no_attribute(&value, name))
                }
            }
            Expression::Subscript { value, index } => self.eval_subscript(value, index, ctx),
        }
    }

    fn eval_items(&self, items: &[Expression], ctx: &mut ExecutionContext) -> EvalResult<Vec<Value>> {
        items
            .iter()
            .map(|item| self.eval_expression(item, ctx))
            .collect()
    }

    /// Evaluates an operand, borrowing it when it is a plain name so large
    /// containers are not copied just to be read.
    fn operand<'c>(
        &self,
        expression: &Expression,
        ctx: &'c mut ExecutionContext,
    ) -> EvalResult<Cow<'c, Value>> {
        if let Expression::Name(name) = expression {
            return match ctx.lookup(name) {
                Some(value) => Ok(Cow::Borrowed(value)),
                None => ctx.load(name).map(Cow::Owned),
            };
        }
        self.eval_expression(expression, ctx).map(Cow::Owned)
    }

    fn eval_fstring(&self, parts: &[FStringPart], ctx: &mut ExecutionContext) -> EvalResult<Value> {
        let mut text = String::new();
        for part in parts {
            match part {
                FStringPart::Text(literal) => text.push_str(literal),
                FStringPart::Field {
                    expression,
                    conversion,
                    format_spec,
                } => {
                    let value = self.eval_expression(expression, ctx)?;
                    let rendered = format_field(&value, *conversion, format_spec.as_deref())?;
                    ctx.reserve(rendered.len())?;
                    text.push_str(&rendered);
                }
            }
        }
        Ok(Value::Str(text))
    }

    fn eval_comparison(
        &self,
        left: &Expression,
        comparisons: &[(crate::ast::CompareOperator, Expression)],
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        let mut current = self.eval_expression(left, ctx)?;
        let last = comparisons.len().saturating_sub(1);
        for (i, (op, right)) in comparisons.iter().enumerate() {
            let right = self.operand(right, ctx)?;
            if !compare(*op, &current, &right)? {
                return Ok(Value::Bool(false));
            }
            if i < last {
                current = right.into_owned();
            }
        }
        Ok(Value::Bool(true))
    }

    fn comprehend(
        &self,
        element: &Expression,
        generators: &[Comprehension],
        ctx: &mut ExecutionContext,
        items: &mut Vec<Value>,
    ) -> EvalResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            let value = self.eval_expression(element, ctx)?;
            ctx.reserve(std::mem::size_of::<Value>())?;
            items.push(value);
            return Ok(());
        };
        let iterable = self.eval_expression(&first.iter, ctx)?;
        for item in ctx.iterate(&iterable)? {
            ctx.tick()?;
            self.bind_target(&first.target, item, ctx, true)?;
            if let Some(condition) = &first.condition {
                if !self.eval_expression(condition, ctx)?.is_truthy() {
                    continue;
                }
            }
            self.comprehend(element, rest, ctx, items)?;
        }
        Ok(())
    }

    pub(crate) fn make_function(
        &self,
        name: &str,
        params: &[Parameter],
        body: FunctionBody,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Arc<Function>> {
        let mut evaluated = Vec::with_capacity(params.len());
        for param in params {
            let default = match &param.default {
                Some(default) => Some(self.eval_expression(default, ctx)?),
                None => None,
            };
            evaluated.push((param.name.clone(), default));
        }
        Ok(Arc::new(Function {
            name: name.to_string(),
            params: evaluated,
            body,
            closure: ctx.capture(),
        }))
    }

    fn eval_arguments(
        &self,
        arguments: &[Argument],
        ctx: &mut ExecutionContext,
    ) -> EvalResult<CallArgs> {
        let mut args = CallArgs::default();
        for argument in arguments {
            match argument {
                Argument::Positional(expression) => {
                    args.positional.push(self.eval_expression(expression, ctx)?)
                }
                Argument::Keyword(name, expression) => {
                    if args.keywords.iter().any(|(key, _)| key == name) {
                        return Err(EvalError::type_error(format!(
                            "keyword argument repeated: {}",
                            name
                        )));
                    }
                    let value = self.eval_expression(expression, ctx)?;
                    args.keywords.push((name.clone(), value));
                }
            }
        }
        Ok(args)
    }

    fn eval_call(
        &self,
        function: &Expression,
        arguments: &[Argument],
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        ctx.tick()?;
        if let Expression::Attribute { value, name } = function {
            return self.call_method_on(value, name, arguments, ctx);
        }
        let callee = self.eval_expression(function, ctx)?;

        // len(name) reads the binding in place.
        if let (Value::Builtin(Builtin::Len), [Argument::Positional(argument)]) =
            (&callee, arguments)
        {
            let operand = self.operand(argument, ctx)?;
            let len = operand.len().ok_or_else(|| {
                EvalError::type_error(format!(
                    "object of type '{}' has no len()",
                    operand.type_name()
                ))
            })?;
            return Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)));
        }

        let args = self.eval_arguments(arguments, ctx)?;
        self.call_value(&callee, args, ctx)
    }

    /// Calls `object.name(...)` without building a bound method first.
    fn call_method_on(
        &self,
        object: &Expression,
        name: &str,
        arguments: &[Argument],
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        let receiver = self.eval_expression(object, ctx)?;
        if !has_method(&receiver, name) {
            return Err(no_attribute(&receiver, name));
        }
        let args = self.eval_arguments(arguments, ctx)?;
        call_method(&receiver, name, args, ctx, self)
    }

    pub fn call_value(
        &self,
        callee: &Value,
        args: CallArgs,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        match callee {
            Value::Builtin(builtin) => call_builtin(*builtin, args, ctx, self),
            Value::Function(function) => self.call_function(function, args, ctx),
            Value::BoundMethod(receiver, name) => call_method(receiver, name, args, ctx, self),
            Value::Class(name) => Err(EvalError::type_error(format!(
                "cannot create '{}' instances",
                name
            ))),
            other => Err(EvalError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &self,
        function: &Arc<Function>,
        args: CallArgs,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        let locals = bind_parameters(function, args)?;
        ctx.push_frame(Frame::new(function.clone(), locals))?;
        let result = match &function.body {
            FunctionBody::Lambda(body) => self.eval_expression(body, ctx),
            FunctionBody::Block(body) => {
                match StatementEvaluator::default().eval_block(body, ctx) {
                    Ok(StatementResult::Control(ControlFlow::Return(value))) => Ok(value),
                    Ok(StatementResult::Control(_)) => Err(EvalError::exception(
                        ExceptionKind::RuntimeError,
                        "'break' or 'continue' outside loop",
                    )),
                    Ok(StatementResult::Value(_)) => Ok(Value::None),
                    Err(e) => Err(e),
                }
            }
        };
        ctx.pop_frame();
        result.map_err(|e| e.unwound_from(&function.name))
    }

    fn eval_subscript(
        &self,
        value: &Expression,
        index: &Index,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<Value> {
        match index {
            Index::Single(key) => {
                let key = self.eval_expression(key, ctx)?;
                let container = self.operand(value, ctx)?;
                get_item(&container, &key)
            }
            Index::Slice { lower, upper, step } => {
                let bounds = self.eval_slice_bounds(lower, upper, step, ctx)?;
                let container = self.operand(value, ctx)?;
                get_slice(&container, bounds)
            }
        }
    }

    fn eval_slice_bounds(
        &self,
        lower: &Option<Expression>,
        upper: &Option<Expression>,
        step: &Option<Expression>,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<SliceBounds> {
        let mut bound = |expression: &Option<Expression>| -> EvalResult<Option<i64>> {
            match expression {
                None => Ok(None),
                Some(expression) => match self.eval_expression(expression, ctx)? {
                    Value::None => Ok(None),
                    value => as_index(&value).map(Some).map_err(|_| {
                        EvalError::type_error(
                            "slice indices must be integers or None or have an __index__ method",
                        )
                    }),
                },
            }
        };
        Ok(SliceBounds {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        })
    }

    /// Binds `value` to an assignment or loop target. Names bound by a
    /// comprehension stay private to it.
    pub(crate) fn bind_target(
        &self,
        target: &Target,
        value: Value,
        ctx: &mut ExecutionContext,
        comprehension: bool,
    ) -> EvalResult<()> {
        match target {
            Target::Name(name) if comprehension => {
                ctx.bind_comprehension(name, value);
                Ok(())
            }
            Target::Name(name) => {
                ctx.assign(name, value);
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = unpack(value, targets.len(), ctx)?;
                for (target, item) in targets.iter().zip(items) {
                    self.bind_target(target, item, ctx, comprehension)?;
                }
                Ok(())
            }
            Target::Subscript { value: object, index } => {
                let container = self.eval_expression(object, ctx)?;
                match index {
                    Index::Single(key) => {
                        let key = self.eval_expression(key, ctx)?;
                        set_item(&container, key, value)
                    }
                    Index::Slice { lower, upper, step } => {
                        let bounds = self.eval_slice_bounds(lower, upper, step, ctx)?;
                        let items = collect_items(&value, ctx)?;
                        set_slice(&container, bounds, items)
                    }
                }
            }
            Target::Attribute { value: object, name } => {
                let object = self.eval_expression(object, ctx)?;
                Err(no_attribute(&object, name))
            }
        }
    }

    pub(crate) fn delete_target(&self, target: &Target, ctx: &mut ExecutionContext) -> EvalResult<()> {
        match target {
            Target::Name(name) => ctx.delete(name),
            Target::Tuple(targets) => {
                for target in targets {
                    self.delete_target(target, ctx)?;
                }
                Ok(())
            }
            Target::Subscript { value: object, index } => {
                let container = self.eval_expression(object, ctx)?;
                match index {
                    Index::Single(key) => {
                        let key = self.eval_expression(key, ctx)?;
                        del_item(&container, &key)
                    }
                    Index::Slice { lower, upper, step } => {
                        let bounds = self.eval_slice_bounds(lower, upper, step, ctx)?;
                        del_slice(&container, bounds)
                    }
                }
            }
            Target::Attribute { value: object, name } => {
                let object = self.eval_expression(object, ctx)?;
                Err(no_attribute(&object, name))
            }
        }
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Boolean(b) => Value::Bool(*b),
        Constant::Integer(n) => Value::Int(*n),
        Constant::Float(x) => Value::Float(*x),
        Constant::Str(s) => Value::Str(s.clone()),
    }
}

fn bind_parameters(function: &Function, args: CallArgs) -> EvalResult<HashMap<String, Value>> {
    let name = &function.name;
    let params = &function.params;
    if args.positional.len() > params.len() {
        return Err(EvalError::type_error(format!(
            "{}() takes {} positional argument{} but {} {} given",
            name,
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.positional.len(),
            if args.positional.len() == 1 { "was" } else { "were" }
        )));
    }
    let mut locals = HashMap::with_capacity(params.len());
    for ((param, _), value) in params.iter().zip(args.positional) {
        locals.insert(param.clone(), value);
    }
    for (key, value) in args.keywords {
        if !params.iter().any(|(param, _)| *param == key) {
            return Err(EvalError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                name, key
            )));
        }
        if locals.contains_key(&key) {
            return Err(EvalError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                name, key
            )));
        }
        locals.insert(key, value);
    }
    let mut missing = Vec::new();
    for (param, default) in params {
        if locals.contains_key(param) {
            continue;
        }
        match default {
            Some(default) => {
                locals.insert(param.clone(), default.clone());
            }
            None => missing.push(format!("'{}'", param)),
        }
    }
    if !missing.is_empty() {
        let listed = match missing.len() {
            1 => missing[0].clone(),
            2 => format!("{} and {}", missing[0], missing[1]),
            n => format!("{}, and {}", missing[..n - 1].join(", "), missing[n - 1]),
        };
        return Err(EvalError::type_error(format!(
            "{}() missing {} required positional argument{}: {}",
            name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            listed
        )));
    }
    Ok(locals)
}

fn unpack(value: Value, expected: usize, ctx: &mut ExecutionContext) -> EvalResult<Vec<Value>> {
    let items = match value.sequence_items() {
        Some(items) => items,
        None if value.len().is_none() => {
            return Err(EvalError::type_error(format!(
                "cannot unpack non-iterable {} object",
                value.type_name()
            )))
        }
        None => collect_items(&value, ctx)?,
    };
    if items.len() > expected {
        return Err(EvalError::value_error(format!(
            "too many values to unpack (expected {})",
            expected
        )));
    }
    if items.len() < expected {
        return Err(EvalError::value_error(format!(
            "not enough values to unpack (expected {}, got {})",
            expected,
            items.len()
        )));
    }
    Ok(items)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SliceBounds {
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
}

impl SliceBounds {
    /// Concrete `(start, stop, step)` for a sequence of `len` items.
    fn resolve(self, len: usize) -> EvalResult<(i64, i64, i64)> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(EvalError::value_error("slice step cannot be zero"));
        }
        let clamp = |bound: i64| {
            let bound = if bound < 0 {
                bound.saturating_add(len)
            } else {
                bound
            };
            if step > 0 {
                bound.clamp(0, len)
            } else {
                bound.clamp(-1, len - 1)
            }
        };
        let (default_start, default_stop) = if step > 0 { (0, len) } else { (len - 1, -1) };
        Ok((
            self.lower.map(clamp).unwrap_or(default_start),
            self.upper.map(clamp).unwrap_or(default_stop),
            step,
        ))
    }

    fn indices(self, len: usize) -> EvalResult<Vec<usize>> {
        let (start, stop, step) = self.resolve(len)?;
        let mut indices = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            indices.push(i as usize);
            i += step;
        }
        Ok(indices)
    }
}

fn sequence_index(index: i64, len: usize, kind: &str) -> EvalResult<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(EvalError::exception(
            ExceptionKind::IndexError,
            format!("{} index out of range", kind),
        ))
    }
}

fn index_key(type_name: &str, key: &Value) -> EvalResult<i64> {
    match key {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        other if type_name == "str" => Err(EvalError::type_error(format!(
            "string indices must be integers, not '{}'",
            other.type_name()
        ))),
        other => Err(EvalError::type_error(format!(
            "{} indices must be integers or slices, not {}",
            type_name,
            other.type_name()
        ))),
    }
}

fn sequence_item(items: &[Value], kind: &str, key: &Value) -> EvalResult<Value> {
    let index = sequence_index(index_key(kind, key)?, items.len(), kind)?;
    Ok(items[index].clone())
}

pub fn get_item(container: &Value, key: &Value) -> EvalResult<Value> {
    match container {
        Value::List(list) => list.read(|items| sequence_item(items, "list", key)),
        Value::Tuple(items) => sequence_item(items, "tuple", key),
        Value::Dict(dict) => match dict.read(|dict| dict.get(key).map(|found| found.cloned()))? {
            Some(value) => Ok(value),
            None => Err(missing_key(key)),
        },
        Value::Str(text) => {
            let index = index_key("str", key)?;
            let len = text.chars().count();
            let index = sequence_index(index, len, "string")?;
            Ok(text
                .chars()
                .nth(index)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::None))
        }
        Value::Range { start, stop, step } => {
            let index = index_key("range", key)?;
            let len = usize::try_from(range_len(*start, *stop, *step)).unwrap_or(usize::MAX);
            let index = sequence_index(index, len, "range object")? as i64;
            Ok(Value::Int(start + index * step))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn get_slice(container: &Value, bounds: SliceBounds) -> EvalResult<Value> {
    match container {
        Value::List(list) => list
            .read(|items| -> EvalResult<Vec<Value>> {
                Ok(bounds
                    .indices(items.len())?
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect())
            })
            .map(Value::list),
        Value::Tuple(items) => Ok(Value::Tuple(
            bounds
                .indices(items.len())?
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::Str(
                bounds
                    .indices(chars.len())?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        Value::Range { start, stop, step } => {
            let len = usize::try_from(range_len(*start, *stop, *step)).unwrap_or(usize::MAX);
            let (from, to, by) = bounds.resolve(len)?;
            Ok(Value::Range {
                start: start.saturating_add(from.saturating_mul(*step)),
                stop: start.saturating_add(to.saturating_mul(*step)),
                step: step.saturating_mul(by),
            })
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn not_assignable(container: &Value) -> EvalError {
    match container {
        Value::Str(_) | Value::Tuple(_) | Value::Range { .. } => EvalError::type_error(format!(
            "'{}' object does not support item assignment",
            container.type_name()
        )),
        other => EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        )),
    }
}

pub(crate) fn set_item(container: &Value, key: Value, value: Value) -> EvalResult<()> {
    match container {
        Value::List(list) => {
            let index = index_key("list", &key)?;
            list.write(|items| -> EvalResult<()> {
                let index = sequence_index(index, items.len(), "list assignment")?;
                items[index] = value;
                Ok(())
            })
        }
        Value::Dict(dict) => {
            dict.write(|dict| dict.insert(key, value))?;
            Ok(())
        }
        other => Err(not_assignable(other)),
    }
}

fn set_slice(container: &Value, bounds: SliceBounds, replacement: Vec<Value>) -> EvalResult<()> {
    let Value::List(list) = container else {
        return Err(not_assignable(container));
    };
    list.write(|items| -> EvalResult<()> {
        let (start, stop, step) = bounds.resolve(items.len())?;
        if step == 1 {
            let start = start as usize;
            let stop = (stop as usize).max(start);
            items.splice(start..stop, replacement);
            return Ok(());
        }
        let indices = bounds.indices(items.len())?;
        if indices.len() != replacement.len() {
            return Err(EvalError::value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                replacement.len(),
                indices.len()
            )));
        }
        for (index, value) in indices.into_iter().zip(replacement) {
            items[index] = value;
        }
        Ok(())
    })
}

fn no_deletion(container: &Value) -> EvalError {
    EvalError::type_error(format!(
        "'{}' object doesn't support item deletion",
        container.type_name()
    ))
}

fn del_slice(container: &Value, bounds: SliceBounds) -> EvalResult<()> {
    let Value::List(list) = container else {
        return Err(no_deletion(container));
    };
    list.write(|items| -> EvalResult<()> {
        let mut doomed = bounds.indices(items.len())?;
        doomed.sort_unstable();
        for index in doomed.into_iter().rev() {
            items.remove(index);
        }
        Ok(())
    })
}

fn del_item(container: &Value, key: &Value) -> EvalResult<()> {
    match container {
        Value::List(list) => {
            let index = index_key("list", key)?;
            list.write(|items| -> EvalResult<()> {
                let index = sequence_index(index, items.len(), "list assignment")?;
                items.remove(index);
                Ok(())
            })
        }
        Value::Dict(dict) => match dict.write(|dict| dict.remove(key))? {
            Some(_) => Ok(()),
            None => Err(missing_key(key)),
        },
        other => Err(no_deletion(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyzer::parse_expression_source,
        eval::context::Namespace,
        governor::{Budget, ResourceLimits},
    };
    use pretty_assertions::assert_eq;

    fn eval_in(namespace: &mut Namespace, source: &str) -> EvalResult<Value> {
        let expression = parse_expression_source(source).unwrap();
        let budget = Budget::new(ResourceLimits::default());
        let mut ctx = ExecutionContext::new(namespace, &budget);
        ExpressionEvaluator.eval_expression(&expression, &mut ctx)
    }

    fn eval(source: &str) -> String {
        let mut namespace = Namespace::with_builtins(&["len", "range", "str", "sorted"]);
        eval_in(&mut namespace, source).unwrap().repr().unwrap()
    }

    fn eval_err(source: &str) -> String {
        let mut namespace = Namespace::with_builtins(&["len", "range"]);
        eval_in(&mut namespace, source).unwrap_err().to_string()
    }

    #[test]
    fn test_arithmetic_and_logic() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("2 ** 3 ** 2"), "512");
        assert_eq!(eval("-7 // 2"), "-4");
        assert_eq!(eval("0 or 'x'"), "'x'");
        assert_eq!(eval("1 and 0"), "0");
        assert_eq!(eval("1 < 2 < 3"), "True");
        assert_eq!(eval("1 < 3 < 2"), "False");
        assert_eq!(eval("'a' if 0 else 'b'"), "'b'");
    }

    #[test]
    fn test_collections() {
        assert_eq!(eval("[1, 2][-1]"), "2");
        assert_eq!(eval("'hello'[1:4]"), "'ell'");
        assert_eq!(eval("[0, 1, 2, 3, 4][::-2]"), "[4, 2, 0]");
        assert_eq!(eval("{'a': 1}['a']"), "1");
        assert_eq!(eval("(1,)"), "(1,)");
        assert_eq!(eval("range(10)[2:5]"), "range(2, 5)");
        assert_eq!(eval("3 in [1, 2, 3]"), "True");
    }

    #[test]
    fn test_comprehension_and_lambda() {
        assert_eq!(eval("[x * x for x in range(5) if x % 2 == 0]"), "[0, 4, 16]");
        assert_eq!(eval("(lambda a, b=2: a + b)(1)"), "3");
        assert_eq!(eval("sorted([3, 1, 2], key=lambda v: -v)"), "[3, 2, 1]");
        assert_eq!(eval("[(a, b) for a in range(2) for b in 'xy']"), "[(0, 'x'), (0, 'y'), (1, 'x'), (1, 'y')]");
    }

    #[test]
    fn test_comprehension_does_not_leak() {
        let mut namespace = Namespace::with_builtins(&["range"]);
        eval_in(&mut namespace, "[x for x in range(3)]").unwrap();
        assert!(!namespace.contains("x"));
    }

    #[test]
    fn test_fstring() {
        assert_eq!(eval("f'{1 + 1}:{7:>3}'"), "'2:  7'");
        assert_eq!(eval("f'{3.14159:.2f}'"), "'3.14'");
    }

    #[test]
    fn test_method_on_temporary() {
        assert_eq!(eval("'a,b'.split(',')"), "['a', 'b']");
        assert_eq!(eval("{'k': 1}.get('z', 0)"), "0");
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval_err("[1][5]"), "IndexError: list index out of range");
        assert_eq!(eval_err("{}['k']"), "KeyError: 'k'");
        assert_eq!(eval_err("(1).foo"), "AttributeError: 'int' object has no attribute 'foo'");
        assert_eq!(eval_err("5()"), "TypeError: 'int' object is not callable");
        assert_eq!(eval_err("len(3)"), "TypeError: object of type 'int' has no len()");
        assert_eq!(
            eval_err("(lambda a: a)()"),
            "TypeError: <lambda>() missing 1 required positional argument: 'a'"
        );
        assert_eq!(eval_err("{[1]: 2}"), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn test_slice_bounds() {
        let bounds = SliceBounds {
            lower: Some(-100),
            upper: Some(100),
            step: None,
        };
        assert_eq!(bounds.resolve(5).unwrap(), (0, 5, 1));
        let reversed = SliceBounds {
            lower: None,
            upper: None,
            step: Some(-1),
        };
        assert_eq!(reversed.indices(3).unwrap(), vec![2, 1, 0]);
    }
}
