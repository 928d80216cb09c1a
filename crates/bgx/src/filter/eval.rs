//! ⚖️ The evaluator: walks the tree against one decoded record.
//!
//! Values are borrowed from the record whenever possible, so `level == "error"`
//! never clones the `level` field. Missing fields are `null`, not errors.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;

use super::FilterError;
use super::parser::{BinaryOp, Expr, Function, UnaryOp};

type Evaluated<'a> = Cow<'a, Value>;

pub(crate) fn evaluate<'a>(expr: &'a Expr, record: &'a Value) -> Result<Evaluated<'a>, FilterError> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Borrowed(value)),
        Expr::Field(name) => Ok(lookup_member(Cow::Borrowed(record), name)),
        Expr::Member(target, name) => Ok(lookup_member(evaluate(target, record)?, name)),
        Expr::Index(target, index) => {
            let container = evaluate(target, record)?;
            let index = evaluate(index, record)?;
            Ok(lookup_index(container, &index))
        }
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, record).map(Cow::into_owned))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Cow::Owned(Value::Array(values)))
        }
        Expr::Unary(op, operand) => {
            let operand = evaluate(operand, record)?;
            match (op, operand.as_ref()) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Cow::Owned(Value::Bool(!b))),
                (UnaryOp::Negate, Value::Number(n)) => number(-as_f64(n)),
                (UnaryOp::Not, other) => Err(eval_error(format!("cannot apply '!' to {}", kind(other)))),
                (UnaryOp::Negate, other) => {
                    Err(eval_error(format!("cannot negate {}", kind(other))))
                }
            }
        }
        Expr::And(lhs, rhs) => {
            if !expect_bool(evaluate(lhs, record)?.as_ref(), "&&")? {
                return Ok(Cow::Owned(Value::Bool(false)));
            }
            let rhs = expect_bool(evaluate(rhs, record)?.as_ref(), "&&")?;
            Ok(Cow::Owned(Value::Bool(rhs)))
        }
        Expr::Or(lhs, rhs) => {
            if expect_bool(evaluate(lhs, record)?.as_ref(), "||")? {
                return Ok(Cow::Owned(Value::Bool(true)));
            }
            let rhs = expect_bool(evaluate(rhs, record)?.as_ref(), "||")?;
            Ok(Cow::Owned(Value::Bool(rhs)))
        }
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if expect_bool(evaluate(condition, record)?.as_ref(), "?:")? {
                evaluate(then, record)
            } else {
                evaluate(otherwise, record)
            }
        }
        Expr::Regex {
            target,
            pattern,
            negated,
        } => {
            let target = evaluate(target, record)?;
            let hit = match target.as_ref() {
                Value::String(s) => pattern.is_match(s),
                Value::Null => false,
                other => {
                    return Err(eval_error(format!("cannot regex-match {}", kind(other))));
                }
            };
            Ok(Cow::Owned(Value::Bool(hit != *negated)))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, record)?;
            let rhs = evaluate(rhs, record)?;
            binary(*op, &lhs, &rhs).map(Cow::Owned)
        }
        Expr::Call(Function::Contains, args) => {
            let haystack = evaluate(&args[0], record)?;
            let needle = evaluate(&args[1], record)?;
            match (haystack.as_ref(), needle.as_ref()) {
                (Value::String(h), Value::String(n)) => Ok(Cow::Owned(Value::Bool(
                    h.to_lowercase().contains(&n.to_lowercase()),
                ))),
                (h, n) => Err(eval_error(format!(
                    "contains() expects two strings, got {} and {}",
                    kind(h),
                    kind(n)
                ))),
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, FilterError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loosely_equal(lhs, rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!loosely_equal(lhs, rhs))),
        BinaryOp::Lt => ordering(lhs, rhs, "<").map(|o| Value::Bool(o == Some(Ordering::Less))),
        BinaryOp::Le => ordering(lhs, rhs, "<=")
            .map(|o| Value::Bool(matches!(o, Some(Ordering::Less | Ordering::Equal)))),
        BinaryOp::Gt => ordering(lhs, rhs, ">").map(|o| Value::Bool(o == Some(Ordering::Greater))),
        BinaryOp::Ge => ordering(lhs, rhs, ">=")
            .map(|o| Value::Bool(matches!(o, Some(Ordering::Greater | Ordering::Equal)))),
        BinaryOp::In => match rhs {
            Value::Array(items) => Ok(Value::Bool(items.iter().any(|i| loosely_equal(lhs, i)))),
            Value::Null => Ok(Value::Bool(false)),
            other => Err(eval_error(format!("'in' expects an array, got {}", kind(other)))),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Number(a), Value::Number(b)) => number(as_f64(a) + as_f64(b)).map(Cow::into_owned),
            (a, b) => Err(eval_error(format!("cannot add {} and {}", kind(a), kind(b)))),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => {
                let (a, b) = (as_f64(a), as_f64(b));
                let out = match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                number(out).map(Cow::into_owned)
            }
            (a, b) => Err(eval_error(format!(
                "arithmetic needs numbers, got {} and {}",
                kind(a),
                kind(b)
            ))),
        },
    }
}

/// 🟰 Numbers compare by value (so `1 == 1.0`), everything else structurally.
fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => as_f64(a) == as_f64(b),
        _ => lhs == rhs,
    }
}

/// 📏 `None` means "null was involved, the comparison is simply false".
fn ordering(lhs: &Value, rhs: &Value, symbol: &str) -> Result<Option<Ordering>, FilterError> {
    match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Number(a), Value::Number(b)) => Ok(as_f64(a).partial_cmp(&as_f64(b))),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (a, b) => Err(eval_error(format!(
            "cannot compare {} {symbol} {}",
            kind(a),
            kind(b)
        ))),
    }
}

fn lookup_member<'a>(target: Evaluated<'a>, name: &str) -> Evaluated<'a> {
    match target {
        Cow::Borrowed(value) => value
            .get(name)
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Owned(Value::Null)),
        Cow::Owned(value) => Cow::Owned(value.get(name).cloned().unwrap_or(Value::Null)),
    }
}

fn lookup_index<'a>(container: Evaluated<'a>, index: &Value) -> Evaluated<'a> {
    match container {
        Cow::Borrowed(value) => index_into(value, index)
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Owned(Value::Null)),
        Cow::Owned(value) => Cow::Owned(index_into(&value, index).cloned().unwrap_or(Value::Null)),
    }
}

fn index_into<'v>(value: &'v Value, index: &Value) -> Option<&'v Value> {
    match (value, index) {
        (Value::Array(items), Value::Number(n)) => {
            let position = as_f64(n);
            if position >= 0.0 && position.fract() == 0.0 {
                items.get(position as usize)
            } else {
                None
            }
        }
        (Value::Object(map), Value::String(key)) => map.get(key),
        _ => None,
    }
}

pub(crate) fn expect_bool(value: &Value, context: &str) -> Result<bool, FilterError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(eval_error(format!(
            "'{context}' needs a bool, got {}",
            kind(other)
        ))),
    }
}

fn number<'a>(n: f64) -> Result<Evaluated<'a>, FilterError> {
    serde_json::Number::from_f64(n)
        .map(|n| Cow::Owned(Value::Number(n)))
        .ok_or_else(|| eval_error("arithmetic produced a non-finite number"))
}

fn as_f64(n: &serde_json::Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn eval_error(message: impl Into<String>) -> FilterError {
    FilterError::Eval(message.into())
}
