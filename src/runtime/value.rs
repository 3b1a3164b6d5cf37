//! Value semantics for the view-script runtime.
//!
//! Runtime values are plain `serde_json::Value`s: the data context arrives
//! as one, directive callables take and return them, and `json_encode` only
//! has to walk them. Loose comparison, truthiness and arithmetic follow the
//! usual dynamic-template conventions (numeric strings compare as numbers,
//! integer overflow widens to float).

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::{Result, TemplateError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => float(f),
        }
    }
}

/// A float value; non-finite results have no JSON form and become null.
pub fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text written by `echo`.
pub fn to_output(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_text(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
    })
}

fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(|f| f.to_string()).unwrap_or_default()
    }
}

fn number(n: &Number) -> Num {
    match n.as_i64() {
        Some(i) => Num::Int(i),
        None => Num::Float(n.as_f64().unwrap_or(0.0)),
    }
}

fn parse_numeric(text: &str) -> Option<Num> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Num::Int(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Num::Float)
}

/// Numeric view of numbers and numeric strings only.
pub fn as_numeric(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => Some(number(n)),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Coerce an arithmetic operand; booleans and null count as 0/1.
pub fn to_number(value: &Value) -> Result<Num> {
    match value {
        Value::Null => Ok(Num::Int(0)),
        Value::Bool(b) => Ok(Num::Int(i64::from(*b))),
        other => as_numeric(other).ok_or_else(|| {
            TemplateError::render(format!(
                "unsupported operand of type {} in arithmetic",
                type_name(other)
            ))
        }),
    }
}

pub fn to_int(value: &Value) -> Result<i64> {
    Ok(match to_number(value)? {
        Num::Int(i) => i,
        Num::Float(f) => f as i64,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

pub fn arithmetic(op: Arith, left: &Value, right: &Value) -> Result<Value> {
    let (a, b) = (to_number(left)?, to_number(right)?);

    if matches!(op, Arith::Div | Arith::Rem) && b.as_f64() == 0.0 {
        return Err(TemplateError::render("division by zero"));
    }

    let result = match (op, a, b) {
        (Arith::Rem, _, _) => {
            let (x, y) = (to_int(left)?, to_int(right)?);
            if y == 0 {
                return Err(TemplateError::render("modulo by zero"));
            }
            Num::Int(x.checked_rem(y).unwrap_or(0))
        }
        (Arith::Div, Num::Int(x), Num::Int(y)) if x.checked_rem(y) == Some(0) => {
            x.checked_div(y).map_or(Num::Float(x as f64 / y as f64), Num::Int)
        }
        (Arith::Div, _, _) => Num::Float(a.as_f64() / b.as_f64()),
        (_, Num::Int(x), Num::Int(y)) => {
            let checked = match op {
                Arith::Add => x.checked_add(y),
                Arith::Sub => x.checked_sub(y),
                _ => x.checked_mul(y),
            };
            checked.map_or_else(|| Num::Float(float_op(op, x as f64, y as f64)), Num::Int)
        }
        _ => Num::Float(float_op(op, a.as_f64(), b.as_f64())),
    };

    Ok(result.into_value())
}

fn float_op(op: Arith, x: f64, y: f64) -> f64 {
    match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::Rem => x % y,
    }
}

pub fn negate(value: &Value) -> Result<Value> {
    Ok(match to_number(value)? {
        Num::Int(i) => i.checked_neg().map_or(float(-(i as f64)), Value::from),
        Num::Float(f) => float(-f),
    })
}

/// `==`
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other) && !is_zero_string(other),
        (Value::Bool(b), other) | (other, Value::Bool(b)) => *b == is_truthy(other),
        (Value::String(a), Value::String(b)) => match (parse_numeric(a), parse_numeric(b)) {
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => match (as_numeric(left), as_numeric(right)) {
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
    }
}

fn is_zero_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == "0")
}

/// `===`: same type and same value.
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    left == right
}

pub fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => match (parse_numeric(a), parse_numeric(b)) {
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()),
            _ => Some(a.cmp(b)),
        },
        (Value::Array(a), Value::Array(b)) => Some(a.len().cmp(&b.len())),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => match (to_number(left), to_number(right)) {
            (Ok(x), Ok(y)) => x.as_f64().partial_cmp(&y.as_f64()),
            _ => None,
        },
    };

    ordering.ok_or_else(|| {
        TemplateError::render(format!(
            "cannot compare {} with {}",
            type_name(left),
            type_name(right)
        ))
    })
}
