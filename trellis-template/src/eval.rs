//! Tree-walking evaluator for compiled expressions.

use std::rc::Rc;

use trellis_core::{Scope, Value};

use crate::error::EvalError;
use crate::expr_ast::{Accessor, AssignOp, BinaryOp, Expr, LogicalOp, Target, UnaryOp};

/// What an expression can see while it runs: positional parameters first,
/// then the scope chain.
pub(crate) struct Env<'a> {
    pub scope: &'a Scope,
    pub params: &'a [String],
    pub args: &'a [Value],
}

impl Env<'_> {
    fn param(&self, name: &str) -> Option<Value> {
        self.params
            .iter()
            .position(|p| p == name)
            .map(|i| self.args.get(i).cloned().unwrap_or_default())
    }

    fn lookup(&self, name: &str) -> Value {
        self.param(name).unwrap_or_else(|| self.scope.lookup(name))
    }
}

pub(crate) fn evaluate(expr: &Expr, env: &Env<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::from),
        Expr::Object(props) => {
            let mut entries = Vec::with_capacity(props.len());
            for (key, value) in props {
                entries.push((key.clone(), evaluate(value, env)?));
            }
            Ok(Value::object(entries))
        }
        Expr::Ident(name) => Ok(env.lookup(name)),
        Expr::Member(object, field) => {
            let object = evaluate(object, env)?;
            read_property(&object, field)
        }
        Expr::Index(object, key) => {
            let object = evaluate(object, env)?;
            let key = evaluate(key, env)?;
            read_property(&object, &property_key(&key))
        }
        Expr::Call(callee, args) => {
            let func = evaluate(callee, env)?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(&func, callee, &args)
        }
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, env)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.truthy()),
                UnaryOp::Neg => Value::Number(-to_number(&value)),
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, env)?;
            let rhs = evaluate(rhs, env)?;
            Ok(binary(*op, &lhs, &rhs))
        }
        Expr::Logical(op, lhs, rhs) => {
            let lhs = evaluate(lhs, env)?;
            let take_lhs = match op {
                LogicalOp::And => !lhs.truthy(),
                LogicalOp::Or => lhs.truthy(),
                LogicalOp::Nullish => !lhs.is_null(),
            };
            if take_lhs { Ok(lhs) } else { evaluate(rhs, env) }
        }
        Expr::Conditional(test, then, otherwise) => {
            if evaluate(test, env)?.truthy() {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
        Expr::Assign(op, target, value) => assign(*op, target, value, env),
    }
}

/// Call `func` with `args`. `callee` is only used to describe failures.
pub(crate) fn call(func: &Value, callee: &Expr, args: &[Value]) -> Result<Value, EvalError> {
    match func {
        Value::Function(f) => f.call(args).map_err(|message| EvalError::Host {
            function: f.name().to_string(),
            message,
        }),
        _ => Err(EvalError::NotCallable {
            callee: callee.describe(),
        }),
    }
}

fn read_property(object: &Value, property: &str) -> Result<Value, EvalError> {
    if object.is_null() {
        return Err(EvalError::NullAccess {
            property: property.to_string(),
        });
    }
    Ok(object.get(property))
}

fn property_key(key: &Value) -> String {
    match key {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => format!("{}", *n as u64),
        other => other.to_display_string(),
    }
}

pub(crate) fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(items) if items.is_empty() => 0.0,
        Value::Array(items) if items.len() == 1 => to_number(&items[0]),
        _ => f64::NAN,
    }
}

fn is_textual(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
    )
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add if is_textual(lhs) || is_textual(rhs) => {
            Value::String(lhs.to_display_string() + &rhs.to_display_string())
        }
        BinaryOp::Add => Value::Number(to_number(lhs) + to_number(rhs)),
        BinaryOp::Sub => Value::Number(to_number(lhs) - to_number(rhs)),
        BinaryOp::Mul => Value::Number(to_number(lhs) * to_number(rhs)),
        BinaryOp::Div => Value::Number(to_number(lhs) / to_number(rhs)),
        BinaryOp::Rem => Value::Number(to_number(lhs) % to_number(rhs)),
        BinaryOp::StrictEq => Value::Bool(lhs == rhs),
        BinaryOp::StrictNe => Value::Bool(lhs != rhs),
        BinaryOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs, |o| o.is_lt())),
        BinaryOp::Le => Value::Bool(compare(lhs, rhs, |o| o.is_le())),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs, |o| o.is_gt())),
        BinaryOp::Ge => Value::Bool(compare(lhs, rhs, |o| o.is_ge())),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(_) | Value::Object(_) | Value::Function(_), _)
        | (_, Value::Array(_) | Value::Object(_) | Value::Function(_)) => lhs == rhs,
        _ => to_number(lhs) == to_number(rhs),
    }
}

fn compare(lhs: &Value, rhs: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(lhs).partial_cmp(&to_number(rhs)),
    };
    ordering.is_some_and(test)
}

enum Key {
    Field(String),
    Index(usize),
}

fn assign(op: AssignOp, target: &Target, value: &Expr, env: &Env<'_>) -> Result<Value, EvalError> {
    if env.param(&target.root).is_some() {
        return Err(EvalError::AssignToParameter {
            name: target.root.clone(),
        });
    }

    let keys = target
        .path
        .iter()
        .map(|step| match step {
            Accessor::Field(name) => Ok(Key::Field(name.clone())),
            Accessor::Index(expr) => Ok(match evaluate(expr, env)? {
                Value::Number(n) if n.fract() == 0.0 && n >= 0.0 => Key::Index(n as usize),
                other => Key::Field(other.to_display_string()),
            }),
        })
        .collect::<Result<Vec<_>, EvalError>>()?;

    let incoming = evaluate(value, env)?;
    let root = env.scope.lookup(&target.root);
    let next = match op {
        AssignOp::Set => incoming,
        AssignOp::Add => binary(BinaryOp::Add, &read_path(&root, &keys)?, &incoming),
        AssignOp::Sub => binary(BinaryOp::Sub, &read_path(&root, &keys)?, &incoming),
    };

    let updated = write_path(root, &keys, next.clone())?;
    env.scope
        .assign(&target.root, updated)
        .map_err(|message| EvalError::WriteBack {
            name: target.root.clone(),
            message,
        })?;
    Ok(next)
}

fn read_path(root: &Value, keys: &[Key]) -> Result<Value, EvalError> {
    let mut current = root.clone();
    for key in keys {
        current = match key {
            Key::Field(name) => read_property(&current, name)?,
            Key::Index(i) => read_property(&current, &i.to_string())?,
        };
    }
    Ok(current)
}

/// Rebuild `container` with `value` stored at `keys`. Containers are shared
/// until written, so untouched siblings are not copied.
fn write_path(container: Value, keys: &[Key], value: Value) -> Result<Value, EvalError> {
    let Some((key, rest)) = keys.split_first() else {
        return Ok(value);
    };
    match (container, key) {
        (Value::Object(mut map), Key::Field(name)) => {
            let child = map.get(name).cloned().unwrap_or_default();
            let child = write_path(child, rest, value)?;
            Rc::make_mut(&mut map).insert(name.clone(), child);
            Ok(Value::Object(map))
        }
        (Value::Object(mut map), Key::Index(i)) => {
            let name = i.to_string();
            let child = map.get(&name).cloned().unwrap_or_default();
            let child = write_path(child, rest, value)?;
            Rc::make_mut(&mut map).insert(name, child);
            Ok(Value::Object(map))
        }
        (Value::Array(mut items), Key::Index(i)) => {
            let len = items.len();
            if *i > len {
                return Err(EvalError::IndexOutOfRange { index: *i, len });
            }
            let child = items.get(*i).cloned().unwrap_or_default();
            let child = write_path(child, rest, value)?;
            let items_mut = Rc::make_mut(&mut items);
            if *i == len {
                items_mut.push(child);
            } else {
                items_mut[*i] = child;
            }
            Ok(Value::Array(items))
        }
        (other, key) => Err(EvalError::SetProperty {
            property: match key {
                Key::Field(name) => name.clone(),
                Key::Index(i) => i.to_string(),
            },
            target: other.type_name().to_string(),
        }),
    }
}
