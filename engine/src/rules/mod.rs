//! Rule Engine (spec §4.4)
//!
//! Runs inside the write transaction's `before_write`/`before_delete` hook,
//! in three ordered passes: field rules, then expression rules (inverted —
//! `true` means "violated"), then computed rules (only if nothing failed
//! so far). Returns the accumulated [`ErrorDetail`] list; a non-empty list
//! aborts the write with `VALIDATION_FAILED`.

use crate::database::{attribute_map_to_json, AttributeMap, AttributeValue, FieldType};
use crate::error::{ErrorDetail, RocketError};
use crate::expr::{evaluate_any_cached, evaluate_bool_cached, Env};
use crate::metadata::{FieldOperator, Rule, RuleDefinition};

/// Everything a rule sees besides the record itself: `{old, action, user, context}`.
pub struct RuleContext<'a> {
    pub old: Option<&'a AttributeMap>,
    pub action: &'a str,
    pub user: serde_json::Value,
    pub context: serde_json::Value,
}

fn build_env(record: &AttributeMap, ctx: &RuleContext) -> Env {
    Env::new()
        .with("record", attribute_map_to_json(record))
        .with("old", ctx.old.map(attribute_map_to_json).unwrap_or(serde_json::Value::Null))
        .with("action", serde_json::Value::String(ctx.action.to_string()))
        .with("user", ctx.user.clone())
        .with("context", ctx.context.clone())
}

/// Run every active rule for `(entity, hook)` against `record`, mutating
/// computed fields in place. Returns accumulated validation errors.
pub fn run_rules(rules: &[Rule], record: &mut AttributeMap, ctx: &RuleContext) -> Result<Vec<ErrorDetail>, RocketError> {
    let mut errors = Vec::new();

    for rule in rules {
        let RuleDefinition::Field { field, operator, value, message } = &rule.definition else { continue };
        if let Some(detail) = check_field_rule(rule, field, *operator, value, message, record) {
            errors.push(detail);
        }
    }

    let mut stopped = false;
    for rule in rules {
        if stopped {
            break;
        }
        let RuleDefinition::Expression { expression, message, stop_on_fail, compiled } = &rule.definition else { continue };
        let env = build_env(record, ctx);
        let violated =
            evaluate_bool_cached(compiled, expression, &env).map_err(|e| RocketError::internal(e.to_string()))?;
        if violated {
            errors.push(ErrorDetail { field: String::new(), rule: rule.id.clone(), message: message.clone() });
            if *stop_on_fail {
                stopped = true;
            }
        }
    }

    if errors.is_empty() {
        for rule in rules {
            let RuleDefinition::Computed { field, expression, compiled } = &rule.definition else { continue };
            let env = build_env(record, ctx);
            let value =
                evaluate_any_cached(compiled, expression, &env).map_err(|e| RocketError::internal(e.to_string()))?;
            let attr = AttributeValue::from_json(&value, FieldType::Json).unwrap_or(AttributeValue::Null);
            record.insert(field.clone(), attr);
        }
    }

    Ok(errors)
}

fn check_field_rule(
    rule: &Rule,
    field: &str,
    operator: FieldOperator,
    bound: &serde_json::Value,
    message: &str,
    record: &AttributeMap,
) -> Option<ErrorDetail> {
    let value = record.get(field)?;
    if matches!(value, AttributeValue::Null) {
        return None;
    }

    let passes = match operator {
        FieldOperator::Min => numeric(value).zip(bound.as_f64()).map(|(v, b)| v >= b).unwrap_or(true),
        FieldOperator::Max => numeric(value).zip(bound.as_f64()).map(|(v, b)| v <= b).unwrap_or(true),
        FieldOperator::MinLength => text_len(value).zip(bound.as_u64()).map(|(v, b)| v as u64 >= b).unwrap_or(true),
        FieldOperator::MaxLength => text_len(value).zip(bound.as_u64()).map(|(v, b)| v as u64 <= b).unwrap_or(true),
        FieldOperator::Pattern => match (value.as_str(), bound.as_str()) {
            (Some(text), Some(pattern)) => glob_match(pattern, text),
            _ => true,
        },
    };

    if passes {
        None
    } else {
        Some(ErrorDetail { field: field.to_string(), rule: rule.id.clone(), message: message.to_string() })
    }
}

/// Numeric coercion across floats and integers, per spec's "defined
/// numeric coercion" requirement.
fn numeric(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Int(i) => Some(*i as f64),
        AttributeValue::Float(f) => Some(*f),
        AttributeValue::Decimal(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

fn text_len(value: &AttributeValue) -> Option<usize> {
    value.as_str().map(|s| s.chars().count())
}

/// `*`-wildcard glob match — the engine doesn't pull in a full regex crate
/// for this one field operator.
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => {
                if i == 0 && pos != 0 {
                    return false;
                }
                rest = &rest[pos + part.len()..];
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Hook;
    use indexmap::IndexMap;

    fn ctx<'a>() -> RuleContext<'a> {
        RuleContext { old: None, action: "create", user: serde_json::Value::Null, context: serde_json::Value::Null }
    }

    fn field_rule(field: &str, operator: FieldOperator, value: serde_json::Value) -> Rule {
        Rule {
            id: "r1".into(),
            entity: "order".into(),
            hook: Hook::BeforeWrite,
            priority: 0,
            active: true,
            definition: RuleDefinition::Field { field: field.into(), operator, value, message: "bad".into() },
        }
    }

    #[test]
    fn field_rule_min_rejects_low_value() {
        let rule = field_rule("total", FieldOperator::Min, serde_json::json!(10));
        let mut record: AttributeMap = IndexMap::new();
        record.insert("total".into(), AttributeValue::Int(3));
        let errors = run_rules(&[rule], &mut record, &ctx()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "total");
    }

    #[test]
    fn missing_field_passes_field_rule() {
        let rule = field_rule("total", FieldOperator::Min, serde_json::json!(10));
        let mut record: AttributeMap = IndexMap::new();
        let errors = run_rules(&[rule], &mut record, &ctx()).unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn computed_rule_sets_field_when_no_errors() {
        let rule = Rule {
            id: "computed".into(),
            entity: "order".into(),
            hook: Hook::BeforeWrite,
            priority: 0,
            active: true,
            definition: RuleDefinition::Computed {
                field: "total_with_tax".into(),
                expression: "record.total * 1.1".into(),
                compiled: Default::default(),
            },
        };
        let mut record: AttributeMap = IndexMap::new();
        record.insert("total".into(), AttributeValue::Float(100.0));
        let errors = run_rules(&[rule], &mut record, &ctx()).unwrap();
        assert!(errors.is_empty());
        assert!(record.contains_key("total_with_tax"));
    }

    #[test]
    fn expression_rule_violation_produces_error() {
        let rule = Rule {
            id: "expr1".into(),
            entity: "order".into(),
            hook: Hook::BeforeWrite,
            priority: 0,
            active: true,
            definition: RuleDefinition::Expression {
                expression: "record.total < 0".into(),
                message: "total must not be negative".into(),
                stop_on_fail: false,
                compiled: Default::default(),
            },
        };
        let mut record: AttributeMap = IndexMap::new();
        record.insert("total".into(), AttributeValue::Int(-5));
        let errors = run_rules(&[rule], &mut record, &ctx()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "expr1");
    }
}
