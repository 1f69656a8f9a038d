//! The bounded evaluator
//!
//! One exhaustive match over [`OpCode`] drives evaluation. Every operator
//! application charges the operation counter, every loop iteration charges
//! the iteration counter, and every function application holds a recursion
//! frame for its duration. The first ceiling hit unwinds the whole call;
//! partial results are never returned.

use std::rc::Rc;

use tracing::debug;

use crate::budget::{BudgetMeter, ExecutionBudget, Usage};
use crate::env::Environment;
use crate::error::EvalError;
use crate::expr::{Expr, OpCode};
use crate::value::{Lambda, Value};

/// Evaluate `expr` against `env` under `budget`.
///
/// Returns the outcome together with the resources consumed, whether the
/// evaluation succeeded or aborted. Deterministic: the same (expr, env,
/// budget) always produces the same result and the same usage.
pub fn evaluate(
    expr: &Expr,
    env: Rc<Environment>,
    budget: &ExecutionBudget,
) -> (Result<Value, EvalError>, Usage) {
    let mut meter = BudgetMeter::new(budget);
    let result = eval_node(expr, &env, &mut meter);
    let usage = meter.usage();
    debug!(
        operations = usage.operations,
        iterations = usage.iterations,
        peak_recursion = usage.peak_recursion,
        ok = result.is_ok(),
        "evaluation finished"
    );
    (result, usage)
}

fn eval_node(
    expr: &Expr,
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => env
            .lookup(name)
            .ok_or_else(|| EvalError::UnknownIdentifier { name: name.clone() }),
        Expr::Apply { op, args } => {
            meter.charge_operation()?;
            apply_op(*op, args, env, meter)
        }
    }
}

fn apply_op(
    op: OpCode,
    args: &[Expr],
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<Value, EvalError> {
    // `parse_expr` already enforces arity, but `Expr` is a public type and
    // `evaluate` a public entry point; a hand-built node must error, not
    // index out of bounds.
    let (min, max) = op.arity();
    if args.len() < min || max.is_some_and(|m| args.len() > m) {
        return Err(EvalError::Malformed(format!(
            "operator {} applied to {} argument(s)",
            op.name(),
            args.len()
        )));
    }

    match op {
        // ------------------------------------------------------------------
        // arithmetic
        // ------------------------------------------------------------------
        OpCode::Add => {
            let mut acc = 0.0;
            for arg in args {
                acc += eval_number(arg, env, meter)?;
            }
            Ok(Value::Number(acc))
        }
        OpCode::Sub => {
            let a = eval_number(&args[0], env, meter)?;
            let b = eval_number(&args[1], env, meter)?;
            Ok(Value::Number(a - b))
        }
        OpCode::Mul => {
            let mut acc = 1.0;
            for arg in args {
                acc *= eval_number(arg, env, meter)?;
            }
            Ok(Value::Number(acc))
        }
        OpCode::Div => {
            let a = eval_number(&args[0], env, meter)?;
            let b = eval_number(&args[1], env, meter)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        OpCode::Mod => {
            let a = eval_number(&args[0], env, meter)?;
            let b = eval_number(&args[1], env, meter)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a % b))
        }
        OpCode::Pow => {
            let a = eval_number(&args[0], env, meter)?;
            let b = eval_number(&args[1], env, meter)?;
            let result = a.powf(b);
            if result.is_nan() {
                return Err(EvalError::type_mismatch("real-valued power", "NaN result"));
            }
            Ok(Value::Number(result))
        }
        OpCode::Neg => Ok(Value::Number(-eval_number(&args[0], env, meter)?)),
        OpCode::Abs => Ok(Value::Number(eval_number(&args[0], env, meter)?.abs())),
        OpCode::Sqrt => {
            let n = eval_number(&args[0], env, meter)?;
            if n < 0.0 {
                return Err(EvalError::type_mismatch(
                    "non-negative number",
                    "negative number",
                ));
            }
            Ok(Value::Number(n.sqrt()))
        }
        OpCode::Log => {
            let n = eval_number(&args[0], env, meter)?;
            if n <= 0.0 {
                return Err(EvalError::type_mismatch(
                    "positive number",
                    "non-positive number",
                ));
            }
            Ok(Value::Number(n.ln()))
        }
        OpCode::Sin => Ok(Value::Number(eval_number(&args[0], env, meter)?.sin())),
        OpCode::Cos => Ok(Value::Number(eval_number(&args[0], env, meter)?.cos())),
        OpCode::Tan => Ok(Value::Number(eval_number(&args[0], env, meter)?.tan())),
        OpCode::Floor => Ok(Value::Number(eval_number(&args[0], env, meter)?.floor())),
        OpCode::Ceil => Ok(Value::Number(eval_number(&args[0], env, meter)?.ceil())),
        OpCode::Round => Ok(Value::Number(eval_number(&args[0], env, meter)?.round())),
        OpCode::Min => {
            let numbers = collect_numbers(args, env, meter)?;
            numbers
                .into_iter()
                .reduce(f64::min)
                .map(Value::Number)
                .ok_or_else(|| EvalError::type_mismatch("non-empty list", "empty list"))
        }
        OpCode::Max => {
            let numbers = collect_numbers(args, env, meter)?;
            numbers
                .into_iter()
                .reduce(f64::max)
                .map(Value::Number)
                .ok_or_else(|| EvalError::type_mismatch("non-empty list", "empty list"))
        }
        OpCode::Sum => {
            let numbers = collect_numbers(args, env, meter)?;
            Ok(Value::Number(numbers.into_iter().sum()))
        }

        // ------------------------------------------------------------------
        // boolean (and/or short-circuit left to right)
        // ------------------------------------------------------------------
        OpCode::And => {
            for arg in args {
                if !eval_bool(arg, env, meter)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        OpCode::Or => {
            for arg in args {
                if eval_bool(arg, env, meter)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        OpCode::Not => Ok(Value::Bool(!eval_bool(&args[0], env, meter)?)),
        OpCode::Xor => {
            let a = eval_bool(&args[0], env, meter)?;
            let b = eval_bool(&args[1], env, meter)?;
            Ok(Value::Bool(a ^ b))
        }

        // ------------------------------------------------------------------
        // comparison
        // ------------------------------------------------------------------
        OpCode::Eq => {
            let a = eval_node(&args[0], env, meter)?;
            let b = eval_node(&args[1], env, meter)?;
            Ok(Value::Bool(a.equals(&b)))
        }
        OpCode::Ne => {
            let a = eval_node(&args[0], env, meter)?;
            let b = eval_node(&args[1], env, meter)?;
            Ok(Value::Bool(!a.equals(&b)))
        }
        OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge => {
            let a = eval_node(&args[0], env, meter)?;
            let b = eval_node(&args[1], env, meter)?;
            let ordering = compare(&a, &b)?;
            let result = match op {
                OpCode::Lt => ordering.is_lt(),
                OpCode::Gt => ordering.is_gt(),
                OpCode::Le => ordering.is_le(),
                OpCode::Ge => ordering.is_ge(),
                _ => unreachable!("only ordering operators reach here"),
            };
            Ok(Value::Bool(result))
        }

        // ------------------------------------------------------------------
        // control
        // ------------------------------------------------------------------
        OpCode::If => {
            if eval_bool(&args[0], env, meter)? {
                eval_node(&args[1], env, meter)
            } else if let Some(otherwise) = args.get(2) {
                eval_node(otherwise, env, meter)
            } else {
                Ok(Value::Null)
            }
        }
        OpCode::Cond => {
            let mut i = 0;
            while i + 1 < args.len() {
                if eval_bool(&args[i], env, meter)? {
                    return eval_node(&args[i + 1], env, meter);
                }
                i += 2;
            }
            // An odd trailing argument is the default branch.
            if args.len() % 2 == 1 {
                eval_node(&args[args.len() - 1], env, meter)
            } else {
                Ok(Value::Null)
            }
        }
        OpCode::Do => {
            let mut last = Value::Null;
            for arg in args {
                last = eval_node(arg, env, meter)?;
            }
            Ok(last)
        }

        // ------------------------------------------------------------------
        // binding
        // ------------------------------------------------------------------
        OpCode::Let => {
            let name = name_arg(&args[0], "let")?;
            let value = eval_node(&args[1], env, meter)?;
            env.define(name, value.clone());
            Ok(value)
        }
        OpCode::Set => {
            let name = name_arg(&args[0], "set")?;
            let value = eval_node(&args[1], env, meter)?;
            if env.assign(name, value.clone()) {
                Ok(value)
            } else {
                Err(EvalError::UnknownIdentifier {
                    name: name.to_string(),
                })
            }
        }

        // ------------------------------------------------------------------
        // functions
        // ------------------------------------------------------------------
        OpCode::Def => {
            let name = name_arg(&args[0], "def")?;
            let params = param_list(&args[1])?;
            // The closure captures the defining environment itself, so the
            // binding inserted below is visible at call time: recursion.
            let function = Value::Function(Rc::new(Lambda {
                params,
                body: args[2].clone(),
                captured: Rc::clone(env),
            }));
            env.define(name, function.clone());
            Ok(function)
        }
        OpCode::Lambda => {
            let params = param_list(&args[0])?;
            Ok(Value::Function(Rc::new(Lambda {
                params,
                body: args[1].clone(),
                captured: Rc::clone(env),
            })))
        }
        OpCode::Call => {
            let function = eval_callable(&args[0], env, meter)?;
            let mut call_args = Vec::with_capacity(args.len() - 1);
            for arg in &args[1..] {
                call_args.push(eval_node(arg, env, meter)?);
            }
            apply_function(&function, call_args, meter)
        }

        // ------------------------------------------------------------------
        // bounded iteration
        // ------------------------------------------------------------------
        OpCode::For => {
            let name = name_arg(&args[0], "for")?;
            let start = eval_node(&args[1], env, meter)?.as_whole()?;
            let end = eval_node(&args[2], env, meter)?.as_whole()?;
            let mut collected = Vec::new();
            let mut i = start;
            while i < end {
                meter.charge_iteration()?;
                let frame = Environment::child(env);
                frame.define(name, Value::Number(i as f64));
                collected.push(eval_node(&args[3], &frame, meter)?);
                i += 1;
            }
            Ok(Value::List(collected))
        }
        OpCode::While => {
            let mut last = Value::Null;
            loop {
                meter.charge_iteration()?;
                if !eval_bool(&args[0], env, meter)? {
                    break;
                }
                last = eval_node(&args[1], env, meter)?;
            }
            Ok(last)
        }

        // ------------------------------------------------------------------
        // sequences
        // ------------------------------------------------------------------
        OpCode::List => {
            let mut items = Vec::with_capacity(args.len());
            for arg in args {
                items.push(eval_node(arg, env, meter)?);
            }
            Ok(Value::List(items))
        }
        OpCode::Map => {
            let function = eval_callable(&args[0], env, meter)?;
            let items = eval_node(&args[1], env, meter)?.as_list()?.to_vec();
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                meter.charge_iteration()?;
                mapped.push(apply_function(&function, vec![item], meter)?);
            }
            Ok(Value::List(mapped))
        }
        OpCode::Filter => {
            let function = eval_callable(&args[0], env, meter)?;
            let items = eval_node(&args[1], env, meter)?.as_list()?.to_vec();
            let mut kept = Vec::new();
            for item in items {
                meter.charge_iteration()?;
                if apply_function(&function, vec![item.clone()], meter)?.as_bool()? {
                    kept.push(item);
                }
            }
            Ok(Value::List(kept))
        }
        OpCode::Reduce => {
            let function = eval_callable(&args[0], env, meter)?;
            let items = eval_node(&args[1], env, meter)?.as_list()?.to_vec();
            let mut iter = items.into_iter();
            let mut acc = match args.get(2) {
                Some(init) => eval_node(init, env, meter)?,
                None => iter
                    .next()
                    .ok_or_else(|| EvalError::type_mismatch("non-empty list", "empty list"))?,
            };
            for item in iter {
                meter.charge_iteration()?;
                acc = apply_function(&function, vec![acc, item], meter)?;
            }
            Ok(acc)
        }
    }
}

/// Apply a closure: child frame over the captured environment, one
/// recursion frame held for the duration of the body.
fn apply_function(
    lambda: &Rc<Lambda>,
    args: Vec<Value>,
    meter: &mut BudgetMeter,
) -> Result<Value, EvalError> {
    if args.len() != lambda.params.len() {
        return Err(EvalError::type_mismatch(
            format!("{} argument(s)", lambda.params.len()),
            format!("{} argument(s)", args.len()),
        ));
    }
    meter.enter_call()?;
    let frame = Environment::child(&lambda.captured);
    for (param, arg) in lambda.params.iter().zip(args) {
        frame.define(param, arg);
    }
    let result = eval_node(&lambda.body, &frame, meter);
    meter.exit_call();
    result
}

fn eval_number(
    expr: &Expr,
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<f64, EvalError> {
    eval_node(expr, env, meter)?.as_number()
}

fn eval_bool(
    expr: &Expr,
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<bool, EvalError> {
    eval_node(expr, env, meter)?.as_bool()
}

/// Resolve a callable position: a literal string is a name lookup, anything
/// else must evaluate to a function value.
fn eval_callable(
    expr: &Expr,
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<Rc<Lambda>, EvalError> {
    if let Expr::Literal(Value::Str(name)) = expr {
        let value = env
            .lookup(name)
            .ok_or_else(|| EvalError::UnknownIdentifier { name: name.clone() })?;
        return value.as_function().map(Rc::clone);
    }
    eval_node(expr, env, meter)?.as_function().map(Rc::clone)
}

/// A name position (`let`, `set`, `def`, `for`) must be a literal string.
fn name_arg<'a>(expr: &'a Expr, op: &str) -> Result<&'a str, EvalError> {
    match expr {
        Expr::Literal(Value::Str(name)) => Ok(name),
        _ => Err(EvalError::Malformed(format!(
            "{op} expects a literal name in its first argument"
        ))),
    }
}

/// A parameter list is a literal list of strings.
fn param_list(expr: &Expr) -> Result<Vec<String>, EvalError> {
    let Expr::Literal(Value::List(items)) = expr else {
        return Err(EvalError::Malformed(
            "parameter list must be a literal list of names".into(),
        ));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Str(name) => Ok(name.clone()),
            other => Err(EvalError::Malformed(format!(
                "parameter name must be a string, got {}",
                other.type_name()
            ))),
        })
        .collect()
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| EvalError::type_mismatch("comparable numbers", "NaN")),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(EvalError::type_mismatch(
            "two numbers or two strings",
            format!("{} and {}", a.type_name(), b.type_name()),
        )),
    }
}

fn collect_numbers(
    args: &[Expr],
    env: &Rc<Environment>,
    meter: &mut BudgetMeter,
) -> Result<Vec<f64>, EvalError> {
    // A single list argument aggregates over its elements; otherwise each
    // argument is one number.
    if args.len() == 1 {
        let value = eval_node(&args[0], env, meter)?;
        if let Value::List(items) = value {
            return items.iter().map(Value::as_number).collect();
        }
        return Ok(vec![value.as_number()?]);
    }
    args.iter()
        .map(|arg| eval_number(arg, env, meter))
        .collect()
}
