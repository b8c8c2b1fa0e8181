use super::{
    builtins::collect_items,
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult, ExceptionKind},
    expression::{get_item, set_item, ExpressionEvaluator},
    methods::no_attribute,
    operators::binary_op,
    value::{FunctionBody, Value},
};
use crate::ast::{BinaryOperator, Expression, IfBranch, Index, Statement, Target};

/// Outcome of a single statement.
#[derive(Debug, Clone)]
pub enum StatementResult {
    /// Normal completion. Expression statements carry their value.
    Value(Value),

    /// Control leaving the enclosing loop or function.
    Control(ControlFlow),
}

#[derive(Debug, Clone)]
pub enum ControlFlow {
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatementEvaluator {
    expression_evaluator: ExpressionEvaluator,
}

impl StatementEvaluator {
    pub fn expression_evaluator(&self) -> &ExpressionEvaluator {
        &self.expression_evaluator
    }

    pub fn eval_statement(
        &self,
        statement: &Statement,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<StatementResult> {
        ctx.tick()?;
        let expressions = &self.expression_evaluator;
        match statement {
            Statement::Expression(expression) => Ok(StatementResult::Value(
                expressions.eval_expression(expression, ctx)?,
            )),
            Statement::Assign { targets, value } => {
                let value = expressions.eval_expression(value, ctx)?;
                if let Some((last, rest)) = targets.split_last() {
                    for target in rest {
                        expressions.bind_target(target, value.clone(), ctx, false)?;
                    }
                    expressions.bind_target(last, value, ctx, false)?;
                }
                Ok(none())
            }
            Statement::AugAssign { target, op, value } => {
                self.eval_aug_assign(target, *op, value, ctx)?;
                Ok(none())
            }
            Statement::If {
                branches,
                otherwise,
            } => self.eval_if(branches, otherwise.as_deref(), ctx),
            Statement::While { condition, body } => {
                loop {
                    ctx.tick()?;
                    if !expressions.eval_expression(condition, ctx)?.is_truthy() {
                        break;
                    }
                    match self.eval_block(body, ctx)? {
                        StatementResult::Control(ControlFlow::Break) => break,
                        StatementResult::Control(ControlFlow::Return(value)) => {
                            return Ok(StatementResult::Control(ControlFlow::Return(value)))
                        }
                        _ => {}
                    }
                }
                Ok(none())
            }
            Statement::For { target, iter, body } => {
                let iterable = expressions.eval_expression(iter, ctx)?;
                for item in ctx.iterate(&iterable)? {
                    ctx.tick()?;
                    expressions.bind_target(target, item, ctx, false)?;
                    match self.eval_block(body, ctx)? {
                        StatementResult::Control(ControlFlow::Break) => break,
                        StatementResult::Control(ControlFlow::Return(value)) => {
                            return Ok(StatementResult::Control(ControlFlow::Return(value)))
                        }
                        _ => {}
                    }
                }
                Ok(none())
            }
            Statement::FunctionDef { name, params, body } => {
                let function = expressions.make_function(
                    name,
                    params,
                    FunctionBody::Block(body.clone()),
                    ctx,
                )?;
                ctx.assign(name, Value::Function(function));
                Ok(none())
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(value) => expressions.eval_expression(value, ctx)?,
                    None => Value::None,
                };
                Ok(StatementResult::Control(ControlFlow::Return(value)))
            }
            Statement::Pass => Ok(none()),
            Statement::Break => Ok(StatementResult::Control(ControlFlow::Break)),
            Statement::Continue => Ok(StatementResult::Control(ControlFlow::Continue)),
            Statement::Global(names) => {
                for name in names {
                    ctx.declare_global(name);
                }
                Ok(none())
            }
            Statement::Import(modules) => {
                let module = modules.first().map(String::as_str).unwrap_or_default();
                let package = module.split('.').next().unwrap_or(module);
                Err(EvalError::exception(
                    ExceptionKind::ModuleNotFoundError,
                    format!("No module named '{}'", package),
                ))
            }
            Statement::Delete(targets) => {
                for target in targets {
                    expressions.delete_target(target, ctx)?;
                }
                Ok(none())
            }
            Statement::Assert { condition, message } => {
                if expressions.eval_expression(condition, ctx)?.is_truthy() {
                    return Ok(none());
                }
                let message = match message {
                    Some(message) => expressions.eval_expression(message, ctx)?.to_str()?,
                    None => String::new(),
                };
                Err(EvalError::exception(ExceptionKind::AssertionError, message))
            }
            Statement::Raise(None) => Err(EvalError::exception(
                ExceptionKind::RuntimeError,
                "No active exception to reraise",
            )),
            Statement::Raise(Some(value)) => {
                expressions.eval_expression(value, ctx)?;
                Err(EvalError::type_error(
                    "exceptions must derive from BaseException",
                ))
            }
        }
    }

    /// Runs statements until one transfers control.
    pub fn eval_block(
        &self,
        body: &[Statement],
        ctx: &mut ExecutionContext,
    ) -> EvalResult<StatementResult> {
        for statement in body {
            if let StatementResult::Control(flow) = self.eval_statement(statement, ctx)? {
                return Ok(StatementResult::Control(flow));
            }
        }
        Ok(none())
    }

    fn eval_if(
        &self,
        branches: &[IfBranch],
        otherwise: Option<&[Statement]>,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<StatementResult> {
        for branch in branches {
            if self
                .expression_evaluator
                .eval_expression(&branch.condition, ctx)?
                .is_truthy()
            {
                return self.eval_block(&branch.body, ctx);
            }
        }
        match otherwise {
            Some(body) => self.eval_block(body, ctx),
            None => Ok(none()),
        }
    }

    fn eval_aug_assign(
        &self,
        target: &Target,
        op: BinaryOperator,
        value: &Expression,
        ctx: &mut ExecutionContext,
    ) -> EvalResult<()> {
        let expressions = &self.expression_evaluator;
        match target {
            Target::Name(name) => {
                let rhs = expressions.eval_expression(value, ctx)?;
                let Some(rhs) = push_str_in_place(name, op, rhs, ctx)? else {
                    return Ok(());
                };
                let current = ctx.load(name)?;
                let updated = augment(op, current, rhs, ctx)?;
                ctx.assign(name, updated);
                Ok(())
            }
            Target::Subscript {
                value: object,
                index: Index::Single(key),
            } => {
                let container = expressions.eval_expression(object, ctx)?;
                let key = expressions.eval_expression(key, ctx)?;
                let current = get_item(&container, &key)?;
                let rhs = expressions.eval_expression(value, ctx)?;
                let updated = augment(op, current, rhs, ctx)?;
                set_item(&container, key, updated)
            }
            Target::Subscript { .. } => {
                let current = expressions.eval_expression(&target_expression(target), ctx)?;
                let rhs = expressions.eval_expression(value, ctx)?;
                let updated = binary_op(op, current, rhs, ctx)?;
                expressions.bind_target(target, updated, ctx, false)
            }
            Target::Attribute { value: object, name } => {
                let object = expressions.eval_expression(object, ctx)?;
                Err(no_attribute(&object, name))
            }
            Target::Tuple(_) => Err(EvalError::exception(
                ExceptionKind::RuntimeError,
                "illegal expression for augmented assignment",
            )),
        }
    }
}

fn none() -> StatementResult {
    StatementResult::Value(Value::None)
}

/// `current op= rhs`. A list grows in place, so every alias of it sees the
/// new items.
fn augment(
    op: BinaryOperator,
    current: Value,
    rhs: Value,
    ctx: &mut ExecutionContext,
) -> EvalResult<Value> {
    match (&current, op) {
        (Value::List(list), BinaryOperator::Add) => {
            let items = collect_items(&rhs, ctx)?;
            ctx.reserve(items.len() * std::mem::size_of::<Value>())?;
            list.write(|stored| stored.extend(items));
            Ok(current)
        }
        _ => binary_op(op, current, rhs, ctx),
    }
}

/// `name += "..."` on a string variable, appending to the stored value.
/// Hands `rhs` back when the generic path has to run instead.
fn push_str_in_place(
    name: &str,
    op: BinaryOperator,
    rhs: Value,
    ctx: &mut ExecutionContext,
) -> EvalResult<Option<Value>> {
    if op != BinaryOperator::Add || !ctx.has_binding(name) {
        return Ok(Some(rhs));
    }
    let is_str = matches!(ctx.lookup(name), Some(Value::Str(_)));
    match rhs {
        Value::Str(suffix) if is_str => {
            ctx.reserve(suffix.len())?;
            if let Value::Str(text) = ctx.binding_mut(name)? {
                text.push_str(&suffix);
            }
            Ok(None)
        }
        rhs => Ok(Some(rhs)),
    }
}

fn target_expression(target: &Target) -> Expression {
    match target {
        Target::Name(name) => Expression::Name(name.clone()),
        Target::Tuple(items) => Expression::Tuple(items.iter().map(target_expression).collect()),
        Target::Subscript { value, index } => Expression::Subscript {
            value: Box::new(value.clone()),
            index: Box::new(index.clone()),
        },
        Target::Attribute { value, name } => Expression::Attribute {
            value: Box::new(value.clone()),
            name: name.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analyzer::parse_program,
        eval::{context::Namespace, evaluator::Evaluator, value::Value},
        governor::{Budget, ResourceLimits},
    };
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Namespace, String, Result<(), String>) {
        let program = parse_program(source).unwrap();
        let mut namespace = Namespace::with_builtins(&["len", "range", "print", "str", "list"]);
        let budget = Budget::new(ResourceLimits::default());
        let evaluation = Evaluator::new().eval_program(&program, &mut namespace, &budget);
        let result = evaluation.result.map_err(|e| e.to_string());
        (namespace, evaluation.output, result)
    }

    fn value_of(namespace: &Namespace, name: &str) -> String {
        namespace.get(name).unwrap().repr().unwrap()
    }

    #[test]
    fn test_loops() {
        let source = "total = 0\nfor i in range(10):\n    if i == 7:\n        break\n    if i % 2:\n        continue\n    total += i\nn = 0\nwhile n < 5:\n    n += 1\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "total"), "12");
        assert_eq!(value_of(&namespace, "n"), "5");
        assert_eq!(value_of(&namespace, "i"), "7");
    }

    #[test]
    fn test_recursion_and_closures() {
        let source = "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\n\ndef adder(k):\n    def add(x):\n        return x + k\n    return add\n\nr = fact(10)\nplus2 = adder(2)\ns = plus2(40)\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "r"), "3628800");
        assert_eq!(value_of(&namespace, "s"), "42");
    }

    #[test]
    fn test_nested_item_assignment() {
        let source = "grid = [[0, 0], [0, 0]]\ngrid[1][0] = 5\ngrid[0][1] += 2\nd = {'a': []}\nd['a'].append(1)\nd['b'] = d.get('b', 0) + 1\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "grid"), "[[0, 2], [5, 0]]");
        assert_eq!(value_of(&namespace, "d"), "{'a': [1], 'b': 1}");
    }

    #[test]
    fn test_assignment_aliases_containers() {
        let (namespace, _, result) = run("a = [1]\nb = a\nb.append(2)\na += [3]\nc = a + [4]\n");
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "a"), "[1, 2, 3]");
        assert_eq!(value_of(&namespace, "b"), "[1, 2, 3]");
        assert_eq!(value_of(&namespace, "c"), "[1, 2, 3, 4]");
    }

    #[test]
    fn test_functions_mutate_arguments_and_globals() {
        let source = "def add(l):\n    l.append(1)\nxs = []\nadd(xs)\nd = {}\ndef put(k):\n    d[k] = 1\nput('a')\ngrid = [[0]]\nrow = grid[0]\nrow[0] = 9\nrow += [7]\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "xs"), "[1]");
        assert_eq!(value_of(&namespace, "d"), "{'a': 1}");
        assert_eq!(value_of(&namespace, "grid"), "[[9, 7]]");
    }

    #[test]
    fn test_copies_do_not_alias() {
        let source = "a = [1]\nb = a.copy()\nc = a[:]\nd = list(a)\nb.append(2)\nc.append(3)\nd.append(4)\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "a"), "[1]");
        assert_eq!(value_of(&namespace, "b"), "[1, 2]");
    }

    #[test]
    fn test_self_reference() {
        let (namespace, output, result) = run("a = [1]\na.append(a)\nprint(a)\nprint(a == a)\n");
        assert_eq!(result, Ok(()));
        assert_eq!(output, "[1, [...]]\nTrue\n");
        assert_eq!(value_of(&namespace, "a"), "[1, [...]]");
    }

    #[test]
    fn test_unpacking_and_delete() {
        let source = "a, b = 1, 2\na, b = b, a\nxs = [1, 2, 3, 4]\ndel xs[0]\ndel xs[::2]\ngone = 1\ndel gone\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "a"), "2");
        assert_eq!(value_of(&namespace, "b"), "1");
        assert_eq!(value_of(&namespace, "xs"), "[3]");
        assert!(!namespace.contains("gone"));
    }

    #[test]
    fn test_global_declaration() {
        let source = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\n";
        let (namespace, _, result) = run(source);
        assert_eq!(result, Ok(()));
        assert_eq!(value_of(&namespace, "count"), "2");
    }

    #[test]
    fn test_function_locals_stay_local() {
        let (namespace, output, _) = run("def f():\n    y = 3\n    print(y)\nf()\n");
        assert_eq!(output, "3\n");
        assert!(!namespace.contains("y"));
        assert!(matches!(namespace.get("f"), Some(Value::Function(_))));
    }

    #[test]
    fn test_statement_errors() {
        assert_eq!(
            run("import os.path\n").2,
            Err("ModuleNotFoundError: No module named 'os'".to_string())
        );
        assert_eq!(
            run("assert 1 == 2, 'nope'\n").2,
            Err("AssertionError: nope".to_string())
        );
        assert_eq!(run("assert False\n").2, Err("AssertionError".to_string()));
        assert_eq!(
            run("raise\n").2,
            Err("RuntimeError: No active exception to reraise".to_string())
        );
        assert_eq!(
            run("a, b = [1, 2, 3]\n").2,
            Err("ValueError: too many values to unpack (expected 2)".to_string())
        );
        assert_eq!(
            run("'abc'[0] = 'z'\n").2,
            Err("TypeError: 'str' object does not support item assignment".to_string())
        );
    }
}
