//! State-Machine Engine (spec §4.5)
//!
//! On create, defaults `record[field]` to the machine's initial state
//! (rejecting an explicit non-initial value). On update, finds the
//! transition whose `from` set contains the old state and whose `to`
//! matches the new one, evaluates its guard, then runs its actions in
//! order. Transitions whose `from` is an array match any listed source.

use crate::database::{attribute_map_to_json, AttributeMap, AttributeValue};
use crate::error::RocketError;
use crate::expr::{evaluate_bool_cached, Env};
use crate::metadata::{StateMachine, Transition, TransitionAction};

pub struct TransitionEnv<'a> {
    pub old: Option<&'a AttributeMap>,
    pub user: serde_json::Value,
    pub context: serde_json::Value,
}

/// Applies every state machine on the entity against `record`, in place.
/// `action` is `"create"` or `"update"`.
pub async fn apply_state_machines(
    machines: &[StateMachine],
    record: &mut AttributeMap,
    action: &str,
    env: &TransitionEnv<'_>,
) -> Result<(), RocketError> {
    for machine in machines {
        apply_one(machine, record, action, env).await?;
    }
    Ok(())
}

async fn apply_one(
    machine: &StateMachine,
    record: &mut AttributeMap,
    action: &str,
    env: &TransitionEnv<'_>,
) -> Result<(), RocketError> {
    let incoming = record.get(&machine.field).cloned();

    if action == "create" {
        match incoming {
            None | Some(AttributeValue::Null) => {
                record.insert(machine.field.clone(), AttributeValue::Text(machine.definition.initial.clone()));
            }
            Some(AttributeValue::Text(ref s)) if s == &machine.definition.initial => {}
            Some(_) => {
                return Err(RocketError::invalid_payload(format!(
                    "field '{}' must be omitted or set to the initial state '{}' on create",
                    machine.field, machine.definition.initial
                )));
            }
        }
        return Ok(());
    }

    let Some(AttributeValue::Text(new_state)) = incoming else { return Ok(()) };
    let old_state = env.old.and_then(|o| o.get(&machine.field)).and_then(|v| v.as_str().map(str::to_string));
    let Some(old_state) = old_state else { return Ok(()) };
    if old_state == new_state {
        return Ok(());
    }

    let transition = machine
        .definition
        .transitions
        .iter()
        .find(|t| t.from.iter().any(|f| f == &old_state) && t.to == new_state)
        .ok_or_else(|| {
            RocketError::invalid_payload(format!(
                "no transition from '{old_state}' to '{new_state}' on field '{}'",
                machine.field
            ))
        })?;

    if let Some(guard) = &transition.guard {
        let eval_env = build_env(record, env);
        let permitted =
            evaluate_bool_cached(&transition.compiled_guard, guard, &eval_env).map_err(|e| RocketError::internal(e.to_string()))?;
        if !permitted {
            return Err(RocketError::ValidationFailed(vec![crate::error::ErrorDetail::new(
                machine.field.clone(),
                "guard",
                format!("transition '{old_state}' -> '{new_state}' denied by guard"),
            )]));
        }
    }

    run_actions(transition, record).await?;
    Ok(())
}

fn build_env(record: &AttributeMap, env: &TransitionEnv<'_>) -> Env {
    Env::new()
        .with("record", attribute_map_to_json(record))
        .with("old", env.old.map(attribute_map_to_json).unwrap_or(serde_json::Value::Null))
        .with("user", env.user.clone())
        .with("context", env.context.clone())
}

async fn run_actions(transition: &Transition, record: &mut AttributeMap) -> Result<(), RocketError> {
    for action in &transition.actions {
        match action {
            TransitionAction::SetField { field, value } => {
                let resolved = if value.as_str() == Some("now") {
                    serde_json::Value::String(chrono::Utc::now().to_rfc3339())
                } else {
                    value.clone()
                };
                let attr = AttributeValue::from_json(&resolved, crate::database::FieldType::Json).unwrap_or(AttributeValue::Null);
                record.insert(field.clone(), attr);
            }
            TransitionAction::Webhook { webhook_id } => {
                tracing::debug!(webhook_id, "transition webhook action invoked synchronously");
                // Dispatched by the caller (write pipeline) via the Webhook
                // Dispatcher's immediate path; this engine only records intent.
            }
            TransitionAction::CreateRecord { entity, .. } => {
                tracing::info!(entity, "create_record transition action is unimplemented; no-op");
            }
            TransitionAction::SendEvent { name } => {
                tracing::info!(event = name, "send_event transition action is unimplemented; no-op");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StateMachineDefinition;
    use indexmap::IndexMap;

    fn machine() -> StateMachine {
        StateMachine {
            id: "sm1".into(),
            entity: "order".into(),
            field: "status".into(),
            active: true,
            definition: StateMachineDefinition {
                initial: "draft".into(),
                transitions: vec![Transition {
                    from: vec!["draft".into()],
                    to: "submitted".into(),
                    roles: None,
                    guard: None,
                    actions: vec![TransitionAction::SetField { field: "submitted_at".into(), value: serde_json::json!("now") }],
                    compiled_guard: Default::default(),
                }],
            },
        }
    }

    #[tokio::test]
    async fn create_defaults_to_initial_state() {
        let mut record: AttributeMap = IndexMap::new();
        let env = TransitionEnv { old: None, user: serde_json::Value::Null, context: serde_json::Value::Null };
        apply_state_machines(&[machine()], &mut record, "create", &env).await.unwrap();
        assert_eq!(record.get("status").unwrap().as_str(), Some("draft"));
    }

    #[tokio::test]
    async fn update_runs_matching_transition_and_actions() {
        let mut old: AttributeMap = IndexMap::new();
        old.insert("status".into(), AttributeValue::Text("draft".into()));
        let mut record = old.clone();
        record.insert("status".into(), AttributeValue::Text("submitted".into()));

        let env = TransitionEnv { old: Some(&old), user: serde_json::Value::Null, context: serde_json::Value::Null };
        apply_state_machines(&[machine()], &mut record, "update", &env).await.unwrap();
        assert!(record.contains_key("submitted_at"));
    }

    #[tokio::test]
    async fn update_rejects_unknown_transition() {
        let mut old: AttributeMap = IndexMap::new();
        old.insert("status".into(), AttributeValue::Text("draft".into()));
        let mut record = old.clone();
        record.insert("status".into(), AttributeValue::Text("archived".into()));

        let env = TransitionEnv { old: Some(&old), user: serde_json::Value::Null, context: serde_json::Value::Null };
        let result = apply_state_machines(&[machine()], &mut record, "update", &env).await;
        assert!(result.is_err());
    }
}
