//! Write-request orchestration (spec §5)
//!
//! Fixed ordering for every create/update/delete: rules, then state
//! machines, then the parent row, then child relations, then any sync
//! (`before_*`) webhook, then commit, then the post-commit steps — fetch
//! the final row, advance any triggered workflow, fire async webhooks.

use crate::database::{attribute_map_to_json, raw, AttributeMap, AttributeValue, DbConnection};
use crate::error::RocketError;
use crate::metadata::{Entity, Hook, Registry};
use crate::rules::{run_rules, RuleContext};
use crate::state_machine::{apply_state_machines, TransitionEnv};
use crate::webhook::{self, WebhookPayload};
use crate::write::executor::apply_relation_writes;
use crate::write::fetch::fetch_one;
use crate::write::plan::plan_write;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub struct CreateRequest {
    pub entity: String,
    pub body: JsonValue,
    pub user: JsonValue,
    pub context: JsonValue,
}

pub struct UpdateRequest {
    pub entity: String,
    pub id: String,
    pub body: JsonValue,
    pub user: JsonValue,
    pub context: JsonValue,
}

pub struct DeleteRequest {
    pub entity: String,
    pub id: String,
    pub user: JsonValue,
    pub context: JsonValue,
}

/// Runs the full write pipeline for one app. Holds the app's database
/// connection, its metadata registry, and the HTTP client used to dispatch
/// webhooks.
#[derive(Clone)]
pub struct WritePipeline {
    db: DbConnection,
    registry: Arc<Registry>,
    http: reqwest::Client,
}

impl WritePipeline {
    pub fn new(db: DbConnection, registry: Arc<Registry>) -> Self {
        Self { db, registry, http: reqwest::Client::new() }
    }

    fn entity(&self, name: &str) -> Result<Entity, RocketError> {
        self.registry.get_entity(name).ok_or_else(|| RocketError::unknown_entity(name))
    }

    pub async fn create(&self, req: CreateRequest) -> Result<AttributeMap, RocketError> {
        let entity = self.entity(&req.entity)?;
        let plan = plan_write(&entity, &self.registry, &req.body, true)?;
        let mut record = plan.fields;

        self.apply_timestamps(&entity, &mut record, true);

        let rule_ctx = RuleContext { old: None, action: "create", user: req.user.clone(), context: req.context.clone() };
        let rules = self.registry.get_rules_for_entity(&entity.name, Hook::BeforeWrite);
        let errors = run_rules(&rules, &mut record, &rule_ctx)?;
        if !errors.is_empty() {
            return Err(RocketError::ValidationFailed(errors));
        }

        let machines = self.registry.get_state_machines_for_entity(&entity.name);
        let sm_env = TransitionEnv { old: None, user: req.user.clone(), context: req.context.clone() };
        apply_state_machines(&machines, &mut record, "create", &sm_env).await?;

        let txn = self.db.inner().begin().await.map_err(|e| RocketError::database(e.to_string()))?;

        let attempt = async {
            let parent_id = self.insert_parent(&txn, &entity, &record).await?;
            record.insert(entity.primary_key.field.clone(), parent_id.clone());
            apply_relation_writes(&txn, &self.db, &self.registry, &parent_id, &plan.relations).await?;
            self.dispatch_sync_webhooks(&txn, &entity, Hook::BeforeWrite, "create", &record, None, &req.user, &parent_id).await?;
            Ok::<_, RocketError>(parent_id)
        }
        .await;

        let parent_id = self.commit_or_rollback(txn, attempt).await?;

        let final_row = fetch_one(&self.db, &entity, &parent_id)
            .await?
            .ok_or_else(|| RocketError::internal("record vanished immediately after insert"))?;

        self.on_committed(&entity, None, &final_row, &req.user, &parent_id);

        Ok(final_row)
    }

    pub async fn update(&self, req: UpdateRequest) -> Result<AttributeMap, RocketError> {
        let entity = self.entity(&req.entity)?;
        let id_attr = parse_path_id(&req.id, &entity)?;

        let old_row = fetch_one(&self.db, &entity, &id_attr).await?.ok_or_else(|| RocketError::not_found(format!("{} {}", entity.name, req.id)))?;

        let plan = plan_write(&entity, &self.registry, &req.body, false)?;
        let mut record = old_row.clone();
        for (k, v) in &plan.fields {
            record.insert(k.clone(), v.clone());
        }
        self.apply_timestamps(&entity, &mut record, false);

        let rule_ctx = RuleContext { old: Some(&old_row), action: "update", user: req.user.clone(), context: req.context.clone() };
        let rules = self.registry.get_rules_for_entity(&entity.name, Hook::BeforeWrite);
        let errors = run_rules(&rules, &mut record, &rule_ctx)?;
        if !errors.is_empty() {
            return Err(RocketError::ValidationFailed(errors));
        }

        let machines = self.registry.get_state_machines_for_entity(&entity.name);
        let sm_env = TransitionEnv { old: Some(&old_row), user: req.user.clone(), context: req.context.clone() };
        apply_state_machines(&machines, &mut record, "update", &sm_env).await?;

        let txn = self.db.inner().begin().await.map_err(|e| RocketError::database(e.to_string()))?;

        let attempt = async {
            self.update_parent(&txn, &entity, &id_attr, &old_row, &record).await?;
            apply_relation_writes(&txn, &self.db, &self.registry, &id_attr, &plan.relations).await?;
            self.dispatch_sync_webhooks(&txn, &entity, Hook::BeforeWrite, "update", &record, Some(&old_row), &req.user, &id_attr).await?;
            Ok::<_, RocketError>(())
        }
        .await;

        self.commit_or_rollback(txn, attempt).await?;

        let final_row = fetch_one(&self.db, &entity, &id_attr).await?.ok_or_else(|| RocketError::not_found(format!("{} {}", entity.name, req.id)))?;

        self.on_committed(&entity, Some(&old_row), &final_row, &req.user, &id_attr);

        Ok(final_row)
    }

    pub async fn delete(&self, req: DeleteRequest) -> Result<(), RocketError> {
        let entity = self.entity(&req.entity)?;
        let id_attr = parse_path_id(&req.id, &entity)?;
        let old_row = fetch_one(&self.db, &entity, &id_attr).await?.ok_or_else(|| RocketError::not_found(format!("{} {}", entity.name, req.id)))?;

        let txn = self.db.inner().begin().await.map_err(|e| RocketError::database(e.to_string()))?;

        let attempt = async {
            self.dispatch_sync_webhooks(&txn, &entity, Hook::BeforeDelete, "delete", &old_row, None, &req.user, &id_attr).await?;

            if entity.soft_delete {
                let sql = format!(
                    "UPDATE {} SET deleted_at = {} WHERE {} = {}",
                    self.db.dialect().quote_ident(&entity.table),
                    self.db.dialect().now_expr(),
                    self.db.dialect().quote_ident(&entity.primary_key.field),
                    self.db.dialect().placeholder(1),
                );
                raw::execute(&txn, &sql, vec![id_attr.clone()]).await?;
            } else {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = {}",
                    self.db.dialect().quote_ident(&entity.table),
                    self.db.dialect().quote_ident(&entity.primary_key.field),
                    self.db.dialect().placeholder(1),
                );
                raw::execute(&txn, &sql, vec![id_attr.clone()]).await?;
            }
            Ok::<_, RocketError>(())
        }
        .await;

        self.commit_or_rollback(txn, attempt).await?;

        let after_webhooks = self.registry.get_webhooks_for_entity_hook(&entity.name, Hook::AfterDelete);
        let payload = self.build_payload(&entity, Hook::AfterDelete, "delete", &old_row, None, &req.user);
        let record_id = req.id.clone();
        let pipeline = self.clone();
        tokio::spawn(async move {
            for wh in after_webhooks {
                webhook::dispatch_async(&pipeline.http, &pipeline.db, &wh, &payload, &record_id).await;
            }
        });

        Ok(())
    }

    fn apply_timestamps(&self, entity: &Entity, record: &mut AttributeMap, is_create: bool) {
        use crate::metadata::AutoTimestamp;
        let now = chrono::Utc::now().naive_utc();
        for field in &entity.fields {
            match field.auto {
                AutoTimestamp::Create if is_create => {
                    record.insert(field.name.clone(), AttributeValue::DateTime(now));
                }
                AutoTimestamp::Update => {
                    record.insert(field.name.clone(), AttributeValue::DateTime(now));
                }
                _ => {}
            }
        }
    }

    async fn insert_parent(&self, txn: &DatabaseTransaction, entity: &Entity, record: &AttributeMap) -> Result<AttributeValue, RocketError> {
        use crate::metadata::PrimaryKeyType;
        let mut fields = record.clone();
        let generate_id = entity.primary_key.generated && !fields.contains_key(&entity.primary_key.field);

        let pk_value = if generate_id && entity.primary_key.kind == PrimaryKeyType::Uuid {
            let id = AttributeValue::Text(uuid::Uuid::new_v4().to_string());
            fields.insert(entity.primary_key.field.clone(), id.clone());
            id
        } else if generate_id {
            AttributeValue::Null
        } else {
            fields.get(&entity.primary_key.field).cloned().unwrap_or(AttributeValue::Null)
        };

        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.db.dialect().placeholder(i)).collect();
        let quoted: Vec<String> = columns.iter().map(|c| self.db.dialect().quote_ident(c)).collect();
        let values: Vec<AttributeValue> = fields.values().cloned().collect();
        let sql = format!("INSERT INTO {} ({}) VALUES ({})", self.db.dialect().quote_ident(&entity.table), quoted.join(", "), placeholders.join(", "));
        raw::execute(txn, &sql, values).await?;

        if generate_id && matches!(entity.primary_key.kind, PrimaryKeyType::Int | PrimaryKeyType::Bigint) {
            let row = raw::query_one(
                txn,
                &format!("SELECT MAX({}) as id FROM {}", self.db.dialect().quote_ident(&entity.primary_key.field), self.db.dialect().quote_ident(&entity.table)),
                vec![],
                &[("id", pk_field_type(entity))],
            )
            .await?;
            return row.and_then(|r| r.get("id").cloned()).ok_or_else(|| RocketError::internal("failed to determine generated id"));
        }

        Ok(pk_value)
    }

    async fn update_parent(&self, txn: &DatabaseTransaction, entity: &Entity, id: &AttributeValue, old_row: &AttributeMap, record: &AttributeMap) -> Result<(), RocketError> {
        let mut set_clauses = Vec::new();
        let mut values: Vec<AttributeValue> = Vec::new();
        for (name, value) in record {
            if name == &entity.primary_key.field {
                continue;
            }
            if old_row.get(name) == Some(value) {
                continue;
            }
            values.push(value.clone());
            set_clauses.push(format!("{} = {}", self.db.dialect().quote_ident(name), self.db.dialect().placeholder(values.len())));
        }
        if set_clauses.is_empty() {
            return Ok(());
        }
        values.push(id.clone());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.db.dialect().quote_ident(&entity.table),
            set_clauses.join(", "),
            self.db.dialect().quote_ident(&entity.primary_key.field),
            self.db.dialect().placeholder(values.len())
        );
        raw::execute(txn, &sql, values).await?;
        Ok(())
    }

    /// Commits the write transaction on success, otherwise rolls it back
    /// explicitly and propagates the original error.
    async fn commit_or_rollback<T>(&self, txn: DatabaseTransaction, attempt: Result<T, RocketError>) -> Result<T, RocketError> {
        match attempt {
            Ok(value) => {
                txn.commit().await.map_err(|e| RocketError::database(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(error = %rollback_err, "failed to roll back write transaction");
                }
                Err(e)
            }
        }
    }

    fn build_payload(
        &self,
        entity: &Entity,
        hook: Hook,
        action: &str,
        record: &AttributeMap,
        old: Option<&AttributeMap>,
        user: &JsonValue,
    ) -> WebhookPayload {
        WebhookPayload {
            entity: entity.name.clone(),
            hook: format!("{hook:?}"),
            action: action.to_string(),
            record: attribute_map_to_json(record),
            old: old.map(attribute_map_to_json).unwrap_or(JsonValue::Null),
            user: user.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn dispatch_sync_webhooks(
        &self,
        txn: &DatabaseTransaction,
        entity: &Entity,
        hook: Hook,
        action: &str,
        record: &AttributeMap,
        old: Option<&AttributeMap>,
        user: &JsonValue,
        id: &AttributeValue,
    ) -> Result<(), RocketError> {
        let webhooks = self.registry.get_webhooks_for_entity_hook(&entity.name, hook);
        if webhooks.is_empty() {
            return Ok(());
        }
        let payload = self.build_payload(entity, hook, action, record, old, user);
        let record_id = pk_as_string(id);
        for wh in webhooks {
            webhook::dispatch_sync(&self.http, txn, &self.db, &wh, &payload, &record_id).await?;
        }
        Ok(())
    }

    /// Post-commit fan-out: fire `after_*` webhooks and advance any
    /// workflow whose trigger matches this write, neither of which should
    /// block the caller or roll back the already-committed write on failure.
    fn on_committed(&self, entity: &Entity, old: Option<&AttributeMap>, record: &AttributeMap, user: &JsonValue, id: &AttributeValue) {
        let action = if old.is_some() { "update" } else { "create" };
        let after_webhooks = self.registry.get_webhooks_for_entity_hook(&entity.name, Hook::AfterWrite);
        let payload = self.build_payload(entity, Hook::AfterWrite, action, record, old, user);
        let record_id = pk_as_string(id);

        let pipeline = self.clone();
        let record_clone = record.clone();
        let old_clone = old.cloned();
        let entity_clone = entity.clone();
        tokio::spawn(async move {
            for wh in after_webhooks {
                webhook::dispatch_async(&pipeline.http, &pipeline.db, &wh, &payload, &record_id).await;
            }
            if let Err(e) = crate::workflow::trigger_on_state_change(&pipeline.db, &pipeline.registry, &entity_clone, &record_clone, old_clone.as_ref()).await {
                tracing::error!(entity = %entity_clone.name, error = %e, "workflow trigger failed");
            }
        });
    }
}

fn pk_field_type(entity: &Entity) -> crate::database::FieldType {
    use crate::metadata::PrimaryKeyType;
    match entity.primary_key.kind {
        PrimaryKeyType::Uuid => crate::database::FieldType::Uuid,
        PrimaryKeyType::Int | PrimaryKeyType::Bigint => crate::database::FieldType::Integer,
        PrimaryKeyType::String => crate::database::FieldType::String,
    }
}

/// Parses a path parameter (always a string in the URL) into the
/// [`AttributeValue`] matching the entity's declared primary-key type.
pub fn parse_path_id(raw: &str, entity: &Entity) -> Result<AttributeValue, RocketError> {
    use crate::metadata::PrimaryKeyType;
    match entity.primary_key.kind {
        PrimaryKeyType::Uuid => uuid::Uuid::parse_str(raw)
            .map(AttributeValue::Uuid)
            .map_err(|_| RocketError::invalid_payload(format!("'{raw}' is not a valid uuid"))),
        PrimaryKeyType::Int | PrimaryKeyType::Bigint => raw
            .parse::<i64>()
            .map(AttributeValue::Int)
            .map_err(|_| RocketError::invalid_payload(format!("'{raw}' is not a valid integer id"))),
        PrimaryKeyType::String => Ok(AttributeValue::Text(raw.to_string())),
    }
}

fn pk_as_string(value: &AttributeValue) -> String {
    value.as_str().map(str::to_string).or_else(|| value.as_i64().map(|i| i.to_string())).unwrap_or_default()
}
