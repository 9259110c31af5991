//! Compile-once / evaluate-many expression evaluator
//!
//! [`CompiledExpr`] wraps a parsed [`Expr`] tree; callers compile a rule's,
//! transition's, workflow step's, or webhook's expression string exactly
//! once and cache the result on the owning metadata object (an `OnceLock`
//! field), never recompiling per request.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::parser::parse;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("failed to parse expression '{expr}': {reason}")]
    Parse { expr: String, reason: String },
    #[error("type error evaluating expression: {0}")]
    Type(String),
}

/// A compiled expression, cheap to clone (wraps an `Arc` of the AST).
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: std::sync::Arc<Expr>,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let ast = parse(source).map_err(|reason| ExpressionError::Parse { expr: source.to_string(), reason })?;
        Ok(Self { source: source.to_string(), ast: std::sync::Arc::new(ast) })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate_any(&self, env: &Env) -> Result<JsonValue, ExpressionError> {
        eval(&self.ast, env)
    }

    pub fn evaluate_bool(&self, env: &Env) -> Result<bool, ExpressionError> {
        let value = self.evaluate_any(env)?;
        Ok(truthy(&value))
    }
}

/// The evaluation environment: a set of named roots (`record`, `old`,
/// `context`, `user`, `action`), each an arbitrary JSON value.
#[derive(Debug, Clone, Default)]
pub struct Env {
    roots: HashMap<String, JsonValue>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.roots.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        self.roots.insert(key.into(), value);
    }

    /// Resolve a dot-path against the roots. Missing paths yield `Null`
    /// rather than an error, per the spec's "defined empty value" rule.
    pub fn resolve(&self, path: &[String]) -> JsonValue {
        let Some((head, rest)) = path.split_first() else {
            return JsonValue::Null;
        };
        let mut current = match self.roots.get(head) {
            Some(v) => v,
            None => return JsonValue::Null,
        };
        for segment in rest {
            match current.get(segment) {
                Some(v) => current = v,
                None => return JsonValue::Null,
            }
        }
        current.clone()
    }
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsonValue::Null => Some(0.0),
        _ => None,
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        if matches!(a, JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null)
            || matches!(b, JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null)
        {
            return x == y;
        }
    }
    a == b
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn eval(expr: &Expr, env: &Env) -> Result<JsonValue, ExpressionError> {
    Ok(match expr {
        Expr::Null => JsonValue::Null,
        Expr::Bool(b) => JsonValue::Bool(*b),
        Expr::Number(n) => serde_json::Number::from_f64(*n).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Expr::String(s) => JsonValue::String(s.clone()),
        Expr::Path(path) => env.resolve(path),
        Expr::List(items) => {
            let values = items.iter().map(|e| eval(e, env)).collect::<Result<Vec<_>, _>>()?;
            JsonValue::Array(values)
        }
        Expr::Unary(UnaryOp::Not, inner) => JsonValue::Bool(!truthy(&eval(inner, env)?)),
        Expr::Unary(UnaryOp::Neg, inner) => {
            let n = as_number(&eval(inner, env)?).ok_or_else(|| ExpressionError::Type("cannot negate non-numeric value".into()))?;
            serde_json::Number::from_f64(-n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
        }
        Expr::In(needle, haystack) => {
            let needle = eval(needle, env)?;
            let mut found = false;
            for item in haystack {
                if values_equal(&needle, &eval(item, env)?) {
                    found = true;
                    break;
                }
            }
            JsonValue::Bool(found)
        }
        Expr::Binary(lhs, op, rhs) => eval_binary(lhs, *op, rhs, env)?,
    })
}

fn eval_binary(lhs: &Expr, op: BinaryOp, rhs: &Expr, env: &Env) -> Result<JsonValue, ExpressionError> {
    if matches!(op, BinaryOp::And) {
        let left = eval(lhs, env)?;
        if !truthy(&left) {
            return Ok(JsonValue::Bool(false));
        }
        return Ok(JsonValue::Bool(truthy(&eval(rhs, env)?)));
    }
    if matches!(op, BinaryOp::Or) {
        let left = eval(lhs, env)?;
        if truthy(&left) {
            return Ok(JsonValue::Bool(true));
        }
        return Ok(JsonValue::Bool(truthy(&eval(rhs, env)?)));
    }

    let left = eval(lhs, env)?;
    let right = eval(rhs, env)?;

    Ok(match op {
        BinaryOp::Eq => JsonValue::Bool(values_equal(&left, &right)),
        BinaryOp::Ne => JsonValue::Bool(!values_equal(&left, &right)),
        BinaryOp::Lt => JsonValue::Bool(compare(&left, &right).map(|o| o.is_lt()).unwrap_or(false)),
        BinaryOp::Le => JsonValue::Bool(compare(&left, &right).map(|o| o.is_le()).unwrap_or(false)),
        BinaryOp::Gt => JsonValue::Bool(compare(&left, &right).map(|o| o.is_gt()).unwrap_or(false)),
        BinaryOp::Ge => JsonValue::Bool(compare(&left, &right).map(|o| o.is_ge()).unwrap_or(false)),
        BinaryOp::Add => {
            if let (JsonValue::String(a), JsonValue::String(b)) = (&left, &right) {
                JsonValue::String(format!("{a}{b}"))
            } else {
                arithmetic(&left, &right, |a, b| a + b)?
            }
        }
        BinaryOp::Sub => arithmetic(&left, &right, |a, b| a - b)?,
        BinaryOp::Mul => arithmetic(&left, &right, |a, b| a * b)?,
        BinaryOp::Div => arithmetic(&left, &right, |a, b| a / b)?,
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    })
}

fn arithmetic(left: &JsonValue, right: &JsonValue, op: impl Fn(f64, f64) -> f64) -> Result<JsonValue, ExpressionError> {
    let a = as_number(left).ok_or_else(|| ExpressionError::Type(format!("expected number, got {left}")))?;
    let b = as_number(right).ok_or_else(|| ExpressionError::Type(format!("expected number, got {right}")))?;
    Ok(serde_json::Number::from_f64(op(a, b)).map(JsonValue::Number).unwrap_or(JsonValue::Null))
}
