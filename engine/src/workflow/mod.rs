//! Metadata-driven workflow engine (spec §4.11)
//!
//! A workflow is a step graph keyed by id. `action` steps run their
//! [`TransitionAction`]s and advance to `then`; `condition` steps evaluate
//! an expression against the instance's resolved `context` and branch to
//! `on_true`/`on_false`; `approval` steps pause the instance until
//! [`approve`]/[`reject`] resumes it, or until the scheduler's timeout
//! sweep finds it past `current_step_deadline`. The sentinel step id
//! `"end"` terminates the instance successfully. Failure mid-advance marks
//! the instance `failed` without touching the triggering write, which has
//! already committed by the time a workflow runs.

use crate::database::{attribute_map_to_json, AttributeMap, AttributeValue, DbConnection};
use crate::error::RocketError;
use crate::expr::{evaluate_bool_cached, Env};
use crate::metadata::entities::workflow_instances;
use crate::metadata::{Entity, Registry, TransitionAction, Workflow, WorkflowStep, WorkflowTrigger};
use crate::write::executor::{pk_field_type, update_row};
use indexmap::IndexMap;
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const END_STEP: &str = "end";
const MAX_STEPS_PER_ADVANCE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Running,
    WaitingApproval,
    Completed,
    Failed,
    Rejected,
}

impl InstanceStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::WaitingApproval => "waiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "running" => Self::Running,
            "waiting_approval" => Self::WaitingApproval,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: String,
    pub at: String,
    pub outcome: String,
}

/// Checks every field on `record` that differs from `old` (or is simply
/// present, on create) against the registry's state-change triggers and
/// starts a new instance for each workflow that matches.
pub async fn trigger_on_state_change(
    db: &DbConnection,
    registry: &Registry,
    entity: &Entity,
    record: &AttributeMap,
    old: Option<&AttributeMap>,
) -> Result<(), RocketError> {
    for field in &entity.fields {
        let Some(new_value) = record.get(&field.name).and_then(|v| v.as_str()) else { continue };
        if let Some(old_value) = old.and_then(|o| o.get(&field.name)).and_then(|v| v.as_str()) {
            if old_value == new_value {
                continue;
            }
        }
        let workflows = registry.get_workflows_for_trigger(&entity.name, &field.name, new_value);
        for workflow in &workflows {
            start_instance(db, registry, workflow, entity, record).await?;
        }
    }
    Ok(())
}

fn trigger_root(entity: &Entity, record: &AttributeMap) -> JsonValue {
    serde_json::json!({
        "record_id": record.get(&entity.primary_key.field).map(|v| v.to_json()).unwrap_or(JsonValue::Null),
        "record": attribute_map_to_json(record),
    })
}

fn resolve_dot_path(root: &JsonValue, path: &str) -> JsonValue {
    let mut current = root;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) => current = v,
            None => return JsonValue::Null,
        }
    }
    current.clone()
}

fn resolve_context(workflow: &Workflow, trigger: &JsonValue) -> JsonValue {
    let mut out = serde_json::Map::new();
    for (key, path) in &workflow.context {
        out.insert(key.clone(), resolve_dot_path(trigger, path));
    }
    JsonValue::Object(out)
}

async fn start_instance(db: &DbConnection, registry: &Registry, workflow: &Workflow, entity: &Entity, record: &AttributeMap) -> Result<(), RocketError> {
    let Some(first) = workflow.steps.first() else { return Ok(()) };

    let trigger = trigger_root(entity, record);
    let context = resolve_context(workflow, &trigger);
    let now = chrono::Utc::now().naive_utc();

    let active = workflow_instances::ActiveModel {
        id: ActiveValue::NotSet,
        workflow_id: Set(workflow.id.clone()),
        workflow_name: Set(workflow.name.clone()),
        status: Set(InstanceStatus::Running.as_str().to_string()),
        current_step: Set(first.id().to_string()),
        current_step_deadline: Set(None),
        context: Set(serde_json::to_string(&context).unwrap_or_default()),
        history: Set("[]".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = active.insert(db.inner()).await?;

    advance(db, registry, workflow, inserted.id).await
}

struct LoadedInstance {
    context: JsonValue,
    history: Vec<HistoryEntry>,
    current_step: String,
}

async fn load_instance(db: &DbConnection, instance_id: i64) -> Result<LoadedInstance, RocketError> {
    let row = workflow_instances::Entity::find_by_id(instance_id)
        .one(db.inner())
        .await?
        .ok_or_else(|| RocketError::not_found(format!("workflow instance {instance_id}")))?;
    let context = serde_json::from_str(&row.context).unwrap_or(JsonValue::Null);
    let history = serde_json::from_str(&row.history).unwrap_or_default();
    Ok(LoadedInstance { context, history, current_step: row.current_step })
}

async fn persist_instance(
    db: &DbConnection,
    instance_id: i64,
    status: InstanceStatus,
    current_step: &str,
    deadline: Option<chrono::NaiveDateTime>,
    context: &JsonValue,
    history: &[HistoryEntry],
) -> Result<(), RocketError> {
    let active = workflow_instances::ActiveModel {
        id: Set(instance_id),
        status: Set(status.as_str().to_string()),
        current_step: Set(current_step.to_string()),
        current_step_deadline: Set(deadline),
        context: Set(serde_json::to_string(context).unwrap_or_default()),
        history: Set(serde_json::to_string(history).unwrap_or_default()),
        updated_at: Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    };
    active.update(db.inner()).await?;
    Ok(())
}

/// Drives one instance forward from its `current_step` until it reaches
/// `"end"`, pauses on an approval step, or fails.
pub async fn advance(db: &DbConnection, registry: &Registry, workflow: &Workflow, instance_id: i64) -> Result<(), RocketError> {
    let loaded = load_instance(db, instance_id).await?;
    let mut context = loaded.context;
    let mut history = loaded.history;
    let mut current = loaded.current_step;

    for _ in 0..MAX_STEPS_PER_ADVANCE {
        if current == END_STEP {
            persist_instance(db, instance_id, InstanceStatus::Completed, END_STEP, None, &context, &history).await?;
            return Ok(());
        }

        let Some(step) = workflow.step(&current) else {
            history.push(HistoryEntry { step: current.clone(), at: now_rfc3339(), outcome: "unknown step".into() });
            persist_instance(db, instance_id, InstanceStatus::Failed, &current, None, &context, &history).await?;
            return Err(RocketError::internal(format!("workflow '{}' references unknown step '{current}'", workflow.id)));
        };

        match step {
            WorkflowStep::Action { id, actions, then } => {
                run_step_actions(db, registry, workflow, actions, &mut context).await?;
                history.push(HistoryEntry { step: id.clone(), at: now_rfc3339(), outcome: "ran".into() });
                current = then.clone();
            }
            WorkflowStep::Condition { id, expression, on_true, on_false, compiled } => {
                let env = Env::new().with("context", context.clone());
                let result = evaluate_bool_cached(compiled, expression, &env).map_err(|e| RocketError::internal(e.to_string()))?;
                history.push(HistoryEntry { step: id.clone(), at: now_rfc3339(), outcome: result.to_string() });
                current = if result { on_true.clone() } else { on_false.clone() };
            }
            WorkflowStep::Approval { id, timeout, .. } => {
                let deadline = timeout.as_deref().and_then(parse_duration).map(|d| chrono::Utc::now().naive_utc() + d);
                history.push(HistoryEntry { step: id.clone(), at: now_rfc3339(), outcome: "waiting".into() });
                persist_instance(db, instance_id, InstanceStatus::WaitingApproval, id, deadline, &context, &history).await?;
                return Ok(());
            }
        }
    }

    history.push(HistoryEntry { step: current.clone(), at: now_rfc3339(), outcome: "step budget exceeded".into() });
    persist_instance(db, instance_id, InstanceStatus::Failed, &current, None, &context, &history).await?;
    Err(RocketError::internal(format!("workflow '{}' exceeded {MAX_STEPS_PER_ADVANCE} steps without reaching 'end'", workflow.id)))
}

/// Runs one action step's transition actions in order. `set_field` resolves
/// `record_id` from the instance's `context` and issues a targeted UPDATE
/// against the entity the workflow triggers on (spec §4.11); it also mirrors
/// the value into `context` so later condition steps can branch on it
/// without a re-fetch. `webhook`/`create_record`/`send_event` dispatch is out
/// of scope for the interpreter itself (same stance as the state-machine
/// engine) and only logs intent.
async fn run_step_actions(
    db: &DbConnection,
    registry: &Registry,
    workflow: &Workflow,
    actions: &[TransitionAction],
    context: &mut JsonValue,
) -> Result<(), RocketError> {
    for action in actions {
        match action {
            TransitionAction::SetField { field, value } => {
                let resolved = if value.as_str() == Some("now") { JsonValue::String(chrono::Utc::now().to_rfc3339()) } else { value.clone() };
                if let JsonValue::Object(map) = context {
                    map.insert(field.clone(), resolved.clone());
                }
                apply_set_field_to_record(db, registry, workflow, context, field, &resolved).await?;
            }
            TransitionAction::Webhook { webhook_id } => {
                tracing::debug!(webhook_id, "workflow action step: webhook dispatch is unimplemented; no-op");
            }
            TransitionAction::CreateRecord { entity, .. } => {
                tracing::info!(entity, "workflow action step: create_record is unimplemented; no-op");
            }
            TransitionAction::SendEvent { name } => {
                tracing::info!(event = name, "workflow action step: send_event is unimplemented; no-op");
            }
        }
    }
    Ok(())
}

/// Resolves the entity the workflow triggers on and the business record id
/// from `context.record_id`, then issues one UPDATE through the same
/// executor helper the write pipeline uses for relation children.
async fn apply_set_field_to_record(
    db: &DbConnection,
    registry: &Registry,
    workflow: &Workflow,
    context: &JsonValue,
    field: &str,
    value: &JsonValue,
) -> Result<(), RocketError> {
    let WorkflowTrigger::StateChange { entity: entity_name, .. } = &workflow.trigger;
    let entity = registry
        .get_entity(entity_name)
        .ok_or_else(|| RocketError::internal(format!("workflow '{}' triggers on unknown entity '{entity_name}'", workflow.id)))?;
    let record_id = context
        .get("record_id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| RocketError::internal(format!("workflow '{}' has no 'record_id' in context for a set_field action", workflow.id)))?;
    let pk = AttributeValue::from_json(record_id, pk_field_type(&entity)).map_err(RocketError::invalid_payload)?;

    let field_type = entity.fields.iter().find(|f| f.name == field).map(|f| f.field_type).unwrap_or(crate::database::FieldType::Json);
    let attr = AttributeValue::from_json(value, field_type).unwrap_or(AttributeValue::Null);
    let mut fields: AttributeMap = IndexMap::new();
    fields.insert(field.to_string(), attr);

    update_row(db.inner(), db, &entity, &pk, &fields).await
}

/// Resumes a `waiting_approval` instance down its `on_approve` branch.
pub async fn approve(db: &DbConnection, registry: &Registry, workflow: &Workflow, instance_id: i64) -> Result<(), RocketError> {
    resume_approval(db, registry, workflow, instance_id, |step| match step {
        WorkflowStep::Approval { on_approve, .. } => Some(on_approve.clone()),
        _ => None,
    })
    .await
}

/// Resumes a `waiting_approval` instance down its `on_reject` branch.
pub async fn reject(db: &DbConnection, registry: &Registry, workflow: &Workflow, instance_id: i64) -> Result<(), RocketError> {
    resume_approval(db, registry, workflow, instance_id, |step| match step {
        WorkflowStep::Approval { on_reject, .. } => Some(on_reject.clone()),
        _ => None,
    })
    .await
}

async fn resume_approval(
    db: &DbConnection,
    registry: &Registry,
    workflow: &Workflow,
    instance_id: i64,
    branch: impl Fn(&WorkflowStep) -> Option<String>,
) -> Result<(), RocketError> {
    let row = workflow_instances::Entity::find_by_id(instance_id)
        .one(db.inner())
        .await?
        .ok_or_else(|| RocketError::not_found(format!("workflow instance {instance_id}")))?;
    if InstanceStatus::parse(&row.status) != Some(InstanceStatus::WaitingApproval) {
        return Err(RocketError::conflict(format!("workflow instance {instance_id} is not waiting on approval")));
    }
    let step = workflow
        .step(&row.current_step)
        .ok_or_else(|| RocketError::internal(format!("workflow '{}' references unknown step '{}'", workflow.id, row.current_step)))?;
    let next = branch(step).ok_or_else(|| RocketError::conflict(format!("step '{}' is not an approval step", row.current_step)))?;

    let context: JsonValue = serde_json::from_str(&row.context).unwrap_or(JsonValue::Null);
    let mut history: Vec<HistoryEntry> = serde_json::from_str(&row.history).unwrap_or_default();
    history.push(HistoryEntry { step: row.current_step.clone(), at: now_rfc3339(), outcome: "resolved".into() });
    persist_instance(db, instance_id, InstanceStatus::Running, &next, None, &context, &history).await?;

    advance(db, registry, workflow, instance_id).await
}

/// Called by the scheduler's approval-timeout sweep for one instance past
/// its deadline; takes `on_timeout` if set, otherwise marks the instance
/// `failed`.
pub async fn resume_on_timeout(db: &DbConnection, registry: &Registry, workflow: &Workflow, instance_id: i64) -> Result<(), RocketError> {
    let row = workflow_instances::Entity::find_by_id(instance_id)
        .one(db.inner())
        .await?
        .ok_or_else(|| RocketError::not_found(format!("workflow instance {instance_id}")))?;
    let Some(WorkflowStep::Approval { on_timeout, .. }) = workflow.step(&row.current_step) else {
        return Ok(());
    };
    let context: JsonValue = serde_json::from_str(&row.context).unwrap_or(JsonValue::Null);
    let mut history: Vec<HistoryEntry> = serde_json::from_str(&row.history).unwrap_or_default();
    history.push(HistoryEntry { step: row.current_step.clone(), at: now_rfc3339(), outcome: "timed out".into() });

    match on_timeout {
        Some(next) => {
            persist_instance(db, instance_id, InstanceStatus::Running, next, None, &context, &history).await?;
            advance(db, registry, workflow, instance_id).await
        }
        None => persist_instance(db, instance_id, InstanceStatus::Failed, &row.current_step, None, &context, &history).await,
    }
}

/// Finds every `waiting_approval` instance past its deadline, across every
/// workflow the registry knows about. Used by the scheduler's fixed
/// 60-second sweep.
pub async fn find_timed_out_instances(db: &DbConnection) -> Result<Vec<(String, i64)>, RocketError> {
    let now = chrono::Utc::now().naive_utc();
    let rows = workflow_instances::Entity::find()
        .filter(workflow_instances::Column::Status.eq(InstanceStatus::WaitingApproval.as_str()))
        .filter(workflow_instances::Column::CurrentStepDeadline.lte(now))
        .all(db.inner())
        .await?;
    Ok(rows.into_iter().map(|r| (r.workflow_id, r.id)).collect())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parses simple durations like `"72h"`, `"30m"`, `"1d"`.
fn parse_duration(raw: &str) -> Option<chrono::Duration> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let amount: i64 = digits.parse().ok()?;
    match unit {
        "s" => Some(chrono::Duration::seconds(amount)),
        "m" => Some(chrono::Duration::minutes(amount)),
        "h" => Some(chrono::Duration::hours(amount)),
        "d" => Some(chrono::Duration::days(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_handles_hours() {
        assert_eq!(parse_duration("72h"), Some(chrono::Duration::hours(72)));
        assert_eq!(parse_duration("30m"), Some(chrono::Duration::minutes(30)));
        assert_eq!(parse_duration("nonsense"), None);
    }

    #[test]
    fn resolve_dot_path_handles_missing_segments() {
        let root = serde_json::json!({"trigger": {"record": {"id": "abc"}}});
        assert_eq!(resolve_dot_path(&root, "trigger.record.id"), serde_json::json!("abc"));
        assert_eq!(resolve_dot_path(&root, "trigger.record.missing"), JsonValue::Null);
    }

    #[test]
    fn instance_status_round_trips() {
        for s in ["running", "waiting_approval", "completed", "failed", "rejected"] {
            assert_eq!(InstanceStatus::parse(s).unwrap().as_str(), s);
        }
    }
}
