//! Compile-once expression language (spec: field rules, guards, workflow
//! conditions, webhook filters all share this one grammar).
//!
//! Literals (`null`, booleans, numbers, strings), dot-path access into the
//! evaluation environment, comparisons, logical `&&`/`||`/`!`, arithmetic,
//! `in [...]` membership, and list literals. A string is tokenized and
//! parsed exactly once via [`CompiledExpr::compile`]; the owning metadata
//! object caches the result in a `OnceLock` and re-evaluates the same AST
//! against a fresh [`Env`] on every request.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{CompiledExpr, Env, ExpressionError};

/// Compile `source` if `cell` is empty, then evaluate against `env` as a bool.
///
/// Shared by rules, state machine guards, workflow conditions, and webhook
/// filters so each call site doesn't hand-roll the same get-or-init dance.
pub fn evaluate_bool_cached(
    cell: &std::sync::OnceLock<CompiledExpr>,
    source: &str,
    env: &Env,
) -> Result<bool, ExpressionError> {
    let compiled = compiled_or_init(cell, source)?;
    compiled.evaluate_bool(env)
}

pub fn evaluate_any_cached(
    cell: &std::sync::OnceLock<CompiledExpr>,
    source: &str,
    env: &Env,
) -> Result<serde_json::Value, ExpressionError> {
    let compiled = compiled_or_init(cell, source)?;
    compiled.evaluate_any(env)
}

fn compiled_or_init<'a>(
    cell: &'a std::sync::OnceLock<CompiledExpr>,
    source: &str,
) -> Result<&'a CompiledExpr, ExpressionError> {
    if let Some(existing) = cell.get() {
        return Ok(existing);
    }
    let compiled = CompiledExpr::compile(source)?;
    Ok(cell.get_or_init(|| compiled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_with_record(record: serde_json::Value) -> Env {
        Env::new().with("record", record)
    }

    #[test]
    fn compares_numbers_and_paths() {
        let expr = CompiledExpr::compile("record.total > 100 && record.status == 'open'").unwrap();
        let env = env_with_record(json!({"total": 150, "status": "open"}));
        assert!(expr.evaluate_bool(&env).unwrap());
    }

    #[test]
    fn missing_path_is_falsy_not_an_error() {
        let expr = CompiledExpr::compile("record.missing == null").unwrap();
        let env = env_with_record(json!({}));
        assert!(expr.evaluate_bool(&env).unwrap());
    }

    #[test]
    fn membership_operator() {
        let expr = CompiledExpr::compile("record.role in ['admin', 'owner']").unwrap();
        let env = env_with_record(json!({"role": "owner"}));
        assert!(expr.evaluate_bool(&env).unwrap());

        let env = env_with_record(json!({"role": "guest"}));
        assert!(!expr.evaluate_bool(&env).unwrap());
    }

    #[test]
    fn arithmetic_and_negation() {
        let expr = CompiledExpr::compile("-record.a + record.b * 2 == 5").unwrap();
        let env = env_with_record(json!({"a": 3, "b": 4}));
        assert!(expr.evaluate_bool(&env).unwrap());
    }

    #[test]
    fn compiles_once_via_oncelock_helper() {
        let cell = std::sync::OnceLock::new();
        let env = env_with_record(json!({"x": 1}));
        assert!(evaluate_bool_cached(&cell, "record.x == 1", &env).unwrap());
        assert!(cell.get().is_some());
        assert!(evaluate_bool_cached(&cell, "record.x == 1", &env).unwrap());
    }
}
