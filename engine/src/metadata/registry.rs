//! Per-app metadata cache
//!
//! Single-writer / many-reader: reads go through a [`std::sync::RwLock`]
//! and never block each other; a reload acquires the write lock only long
//! enough to swap in freshly-queried indices. Reloads are triggered by
//! admin mutations against the `_entities`/`_relations`/... tables and must
//! run after the SQL change committed.

use crate::database::DbConnection;
use crate::error::RocketError;
use crate::metadata::entities as sys;
use crate::metadata::types::{Entity, Hook, Permission, Relation, Rule, StateMachine, Webhook, Workflow};
use sea_orm::EntityTrait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Indices {
    entities: HashMap<String, Entity>,
    relations: HashMap<String, Relation>,
    rules: HashMap<String, Vec<Rule>>,
    state_machines: HashMap<String, Vec<StateMachine>>,
    workflows: Vec<Workflow>,
    permissions: HashMap<(String, String), Permission>,
    webhooks: HashMap<(String, Hook), Vec<Webhook>>,
}

pub struct Registry {
    indices: RwLock<Indices>,
}

impl Registry {
    pub fn empty() -> Self {
        Self { indices: RwLock::new(Indices::default()) }
    }

    /// Re-query every system table and atomically replace all indices.
    pub async fn reload(&self, db: &DbConnection) -> Result<(), RocketError> {
        let entity_rows = sys::entities::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let relation_rows = sys::relations::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let rule_rows = sys::rules::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let sm_rows = sys::state_machines::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let workflow_rows = sys::workflows::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let permission_rows = sys::permissions::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;
        let webhook_rows = sys::webhooks::Entity::find()
            .all(db.inner())
            .await
            .map_err(|e| RocketError::internal(e.to_string()))?;

        let mut entities = HashMap::new();
        for row in entity_rows {
            let parsed: Entity = serde_json::from_str(&row.definition)
                .map_err(|e| RocketError::internal(format!("corrupt _entities row '{}': {e}", row.name)))?;
            entities.insert(row.name, parsed);
        }

        let mut relations = HashMap::new();
        for row in relation_rows {
            let parsed: Relation = serde_json::from_str(&row.definition)
                .map_err(|e| RocketError::internal(format!("corrupt _relations row '{}': {e}", row.name)))?;
            relations.insert(row.name, parsed);
        }

        let mut rules: HashMap<String, Vec<Rule>> = HashMap::new();
        for row in rule_rows {
            if !row.active {
                continue;
            }
            let rule = decode_rule(&row)?;
            rules.entry(rule.entity.clone()).or_default().push(rule);
        }
        for list in rules.values_mut() {
            list.sort_by_key(|r| r.priority);
        }

        let mut state_machines: HashMap<String, Vec<StateMachine>> = HashMap::new();
        for row in sm_rows {
            if !row.active {
                continue;
            }
            let definition = serde_json::from_str(&row.definition)
                .map_err(|e| RocketError::internal(format!("corrupt _state_machines row '{}': {e}", row.id)))?;
            state_machines.entry(row.entity.clone()).or_default().push(StateMachine {
                id: row.id,
                entity: row.entity,
                field: row.field,
                definition,
                active: row.active,
            });
        }

        let mut workflows = Vec::new();
        for row in workflow_rows {
            if !row.active {
                continue;
            }
            let trigger = serde_json::from_str(&row.trigger)
                .map_err(|e| RocketError::internal(format!("corrupt _workflows.trigger row '{}': {e}", row.id)))?;
            let context = serde_json::from_str(&row.context)
                .map_err(|e| RocketError::internal(format!("corrupt _workflows.context row '{}': {e}", row.id)))?;
            let steps = serde_json::from_str(&row.steps)
                .map_err(|e| RocketError::internal(format!("corrupt _workflows.steps row '{}': {e}", row.id)))?;
            workflows.push(Workflow { id: row.id, name: row.name, active: row.active, trigger, context, steps });
        }

        let mut permissions = HashMap::new();
        for row in permission_rows {
            let roles = serde_json::from_str(&row.roles)
                .map_err(|e| RocketError::internal(format!("corrupt _permissions.roles row '{}': {e}", row.id)))?;
            let conditions = row.conditions.clone();
            permissions.insert(
                (row.entity.clone(), row.action.clone()),
                Permission { id: row.id, entity: row.entity, action: row.action, roles, conditions },
            );
        }

        let mut webhooks: HashMap<(String, Hook), Vec<Webhook>> = HashMap::new();
        for row in webhook_rows {
            if !row.active {
                continue;
            }
            let webhook = decode_webhook(&row)?;
            webhooks.entry((webhook.entity.clone(), webhook.hook)).or_default().push(webhook);
        }

        let mut guard = self.indices.write().expect("registry lock poisoned");
        *guard = Indices { entities, relations, rules, state_machines, workflows, permissions, webhooks };
        Ok(())
    }

    pub fn get_entity(&self, name: &str) -> Option<Entity> {
        self.indices.read().expect("registry lock poisoned").entities.get(name).cloned()
    }

    pub fn all_entities(&self) -> Vec<Entity> {
        self.indices.read().expect("registry lock poisoned").entities.values().cloned().collect()
    }

    pub fn get_relation(&self, name: &str) -> Option<Relation> {
        self.indices.read().expect("registry lock poisoned").relations.get(name).cloned()
    }

    pub fn get_relations_for_source(&self, entity: &str) -> Vec<Relation> {
        self.indices
            .read()
            .expect("registry lock poisoned")
            .relations
            .values()
            .filter(|r| r.source == entity)
            .cloned()
            .collect()
    }

    /// Match by relation name, by `target` as an implicit alias, or the
    /// `{entity}_{alias}` convention.
    pub fn find_relation_for_entity(&self, name: &str, entity: &str) -> Option<Relation> {
        let guard = self.indices.read().expect("registry lock poisoned");
        guard
            .relations
            .values()
            .find(|r| {
                r.source == entity
                    && (r.name == name || r.target == name || format!("{}_{}", r.target, r.name) == format!("{entity}_{name}"))
            })
            .cloned()
    }

    pub fn get_rules_for_entity(&self, entity: &str, hook: Hook) -> Vec<Rule> {
        self.indices
            .read()
            .expect("registry lock poisoned")
            .rules
            .get(entity)
            .map(|rules| rules.iter().filter(|r| r.hook == hook).cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_state_machines_for_entity(&self, entity: &str) -> Vec<StateMachine> {
        self.indices.read().expect("registry lock poisoned").state_machines.get(entity).cloned().unwrap_or_default()
    }

    pub fn get_workflows_for_trigger(&self, entity: &str, field: &str, to_state: &str) -> Vec<Workflow> {
        use crate::metadata::types::WorkflowTrigger;
        self.indices
            .read()
            .expect("registry lock poisoned")
            .workflows
            .iter()
            .filter(|w| match &w.trigger {
                WorkflowTrigger::StateChange { entity: e, field: f, to } => e == entity && f == field && to == to_state,
            })
            .cloned()
            .collect()
    }

    pub fn get_permissions(&self, entity: &str, action: &str) -> Option<Permission> {
        self.indices.read().expect("registry lock poisoned").permissions.get(&(entity.to_string(), action.to_string())).cloned()
    }

    pub fn get_webhooks_for_entity_hook(&self, entity: &str, hook: Hook) -> Vec<Webhook> {
        self.indices
            .read()
            .expect("registry lock poisoned")
            .webhooks
            .get(&(entity.to_string(), hook))
            .cloned()
            .unwrap_or_default()
    }

    /// Looks up one webhook by id, regardless of entity/hook. Used by the
    /// scheduler's retry sweep, which only has a `_webhook_logs.webhook_id`
    /// to go on.
    pub fn get_webhook(&self, id: &str) -> Option<Webhook> {
        self.indices.read().expect("registry lock poisoned").webhooks.values().flatten().find(|w| w.id == id).cloned()
    }

    /// Looks up one workflow by id. Used by the scheduler's approval
    /// timeout sweep, which only has a `_workflow_instances.workflow_id`.
    pub fn get_workflow(&self, id: &str) -> Option<Workflow> {
        self.indices.read().expect("registry lock poisoned").workflows.iter().find(|w| w.id == id).cloned()
    }
}

fn decode_rule(row: &sys::rules::Model) -> Result<Rule, RocketError> {
    let definition = serde_json::from_str(&row.definition)
        .map_err(|e| RocketError::internal(format!("corrupt _rules row '{}': {e}", row.id)))?;
    let hook = serde_json::from_value(serde_json::Value::String(row.hook.clone()))
        .map_err(|e| RocketError::internal(format!("invalid hook on rule '{}': {e}", row.id)))?;
    Ok(Rule { id: row.id.clone(), entity: row.entity.clone(), hook, priority: row.priority, active: row.active, definition })
}

fn decode_webhook(row: &sys::webhooks::Model) -> Result<Webhook, RocketError> {
    let hook = serde_json::from_value(serde_json::Value::String(row.hook.clone()))
        .map_err(|e| RocketError::internal(format!("invalid hook on webhook '{}': {e}", row.id)))?;
    let method = serde_json::from_value(serde_json::Value::String(row.method.clone()))
        .map_err(|e| RocketError::internal(format!("invalid method on webhook '{}': {e}", row.id)))?;
    let headers = serde_json::from_str(&row.headers)
        .map_err(|e| RocketError::internal(format!("corrupt _webhooks.headers row '{}': {e}", row.id)))?;
    let retry = serde_json::from_str(&row.retry)
        .map_err(|e| RocketError::internal(format!("corrupt _webhooks.retry row '{}': {e}", row.id)))?;
    Ok(Webhook {
        id: row.id.clone(),
        entity: row.entity.clone(),
        hook,
        url: row.url.clone(),
        method,
        headers,
        condition: row.condition.clone(),
        is_async: row.is_async,
        retry,
        active: row.active,
        compiled_condition: std::sync::OnceLock::new(),
    })
}
