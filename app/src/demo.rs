//! Seeds the `shop` tenant used to exercise spec §8 scenarios S1-S3, S5-S6
//! against a running server: entity/relation/rule/state-machine/webhook rows
//! in the metadata tables, plus the physical business tables those rows
//! describe (the engine reads/writes them dynamically — it doesn't generate
//! DDL for business data, so provisioning them is this seed's job, same as
//! an operator would run migrations for their own schema).

use chrono::Utc;
use rocket_engine::metadata::entities::{entities, relations, rules, state_machines, webhooks};
use rocket_engine::metadata::{
    Backoff, Entity, Field, FieldOperator, Hook, PrimaryKey, PrimaryKeyType, Relation, RelationType, RetryPolicy, Rule, RuleDefinition, StateMachine,
    StateMachineDefinition, Transition, TransitionAction, Webhook, WriteMode,
};
use rocket_engine::database::FieldType;
use rocket_engine::{AppContext, RocketError};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};

pub async fn seed(ctx: &AppContext) -> Result<(), RocketError> {
    create_business_tables(ctx).await?;

    insert_entity(ctx, order_entity()).await?;
    insert_entity(ctx, order_item_entity()).await?;
    insert_entity(ctx, invoice_entity()).await?;
    insert_entity(ctx, post_entity()).await?;
    insert_entity(ctx, tag_entity()).await?;

    insert_relation(ctx, order_items_relation()).await?;
    insert_relation(ctx, post_tags_relation()).await?;

    insert_rule(ctx, invoice_total_rule()).await?;
    insert_state_machine(ctx, invoice_status_machine()).await?;
    insert_webhook(ctx, order_webhook()).await?;

    ctx.registry.reload(&ctx.db).await?;
    tracing::info!(app = %ctx.name, "seeded demo metadata");
    Ok(())
}

async fn create_business_tables(ctx: &AppContext) -> Result<(), RocketError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS \"order\" (
            id TEXT PRIMARY KEY,
            customer TEXT NOT NULL,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS order_item (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            sku TEXT NOT NULL,
            qty INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS invoice (
            id TEXT PRIMARY KEY,
            total REAL NOT NULL,
            status TEXT NOT NULL,
            sent_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS post (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS tag (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS post_tag (
            post_id TEXT NOT NULL,
            tag_id TEXT NOT NULL
        )",
    ];
    for sql in statements {
        ctx.db.inner().execute_unprepared(sql).await.map_err(RocketError::from)?;
    }
    Ok(())
}

fn uuid_pk(field: &str) -> PrimaryKey {
    PrimaryKey { field: field.to_string(), kind: PrimaryKeyType::Uuid, generated: true }
}

fn field(name: &str, field_type: FieldType) -> Field {
    Field { name: name.to_string(), field_type, required: false, unique: false, nullable: true, default: None, enum_values: None, auto: Default::default() }
}

/// **S1** (spec.md §8): `order` is soft-deleted and owns `items` via a
/// one-to-many `diff`-mode relation.
fn order_entity() -> Entity {
    Entity { name: "order".into(), table: "order".into(), primary_key: uuid_pk("id"), soft_delete: true, slug: None, fields: vec![field("customer", FieldType::String)] }
}

fn order_item_entity() -> Entity {
    Entity {
        name: "order_item".into(),
        table: "order_item".into(),
        primary_key: uuid_pk("id"),
        soft_delete: false,
        slug: None,
        fields: vec![field("order_id", FieldType::String), field("sku", FieldType::String), field("qty", FieldType::Integer)],
    }
}

fn order_items_relation() -> Relation {
    Relation {
        name: "items".into(),
        relation_type: RelationType::OneToMany,
        source: "order".into(),
        target: "order_item".into(),
        source_key: "id".into(),
        target_key: "order_id".into(),
        join_table: None,
        source_join_key: None,
        target_join_key: None,
        ownership: rocket_engine::metadata::Ownership::None,
        on_delete: rocket_engine::metadata::OnDelete::Restrict,
        fetch: Default::default(),
        write_mode: WriteMode::Diff,
    }
}

/// **S2/S3**: a `min` rule plus a guarded `draft -> sent` transition on
/// `invoice.status`.
fn invoice_entity() -> Entity {
    Entity {
        name: "invoice".into(),
        table: "invoice".into(),
        primary_key: uuid_pk("id"),
        soft_delete: false,
        slug: None,
        fields: vec![field("total", FieldType::Float), field("status", FieldType::String), field("sent_at", FieldType::DateTime)],
    }
}

fn invoice_total_rule() -> Rule {
    Rule {
        id: "invoice-total-min".into(),
        entity: "invoice".into(),
        hook: Hook::BeforeWrite,
        priority: 0,
        active: true,
        definition: RuleDefinition::Field { field: "total".into(), operator: FieldOperator::Min, value: serde_json::json!(0), message: "total must be at least 0".into() },
    }
}

fn invoice_status_machine() -> StateMachine {
    StateMachine {
        id: "invoice-status".into(),
        entity: "invoice".into(),
        field: "status".into(),
        active: true,
        definition: StateMachineDefinition {
            initial: "draft".into(),
            transitions: vec![Transition {
                from: vec!["draft".into()],
                to: "sent".into(),
                roles: None,
                guard: Some("record.total > 0".into()),
                actions: vec![TransitionAction::SetField { field: "sent_at".into(), value: serde_json::json!("now") }],
                compiled_guard: Default::default(),
            }],
        },
    }
}

/// **S5**: `post.tags` is a many-to-many `replace`-mode relation through
/// `post_tag`.
fn post_entity() -> Entity {
    Entity { name: "post".into(), table: "post".into(), primary_key: uuid_pk("id"), soft_delete: false, slug: None, fields: vec![field("title", FieldType::String)] }
}

fn tag_entity() -> Entity {
    Entity { name: "tag".into(), table: "tag".into(), primary_key: uuid_pk("id"), soft_delete: false, slug: None, fields: vec![field("name", FieldType::String)] }
}

fn post_tags_relation() -> Relation {
    Relation {
        name: "tags".into(),
        relation_type: RelationType::ManyToMany,
        source: "post".into(),
        target: "tag".into(),
        source_key: "id".into(),
        target_key: "id".into(),
        join_table: Some("post_tag".into()),
        source_join_key: Some("post_id".into()),
        target_join_key: Some("tag_id".into()),
        ownership: rocket_engine::metadata::Ownership::None,
        on_delete: rocket_engine::metadata::OnDelete::Restrict,
        fetch: Default::default(),
        write_mode: WriteMode::Replace,
    }
}

/// **S6**: async webhook with exponential backoff against a URL that
/// returns 500, so the scheduler's retry sweep has something to chew on.
fn order_webhook() -> Webhook {
    Webhook {
        id: "order-after-write".into(),
        entity: "order".into(),
        hook: Hook::AfterWrite,
        url: "https://example.invalid/hooks/order".into(),
        method: rocket_engine::metadata::HttpMethod::Post,
        headers: Default::default(),
        condition: None,
        is_async: true,
        retry: RetryPolicy { max_attempts: 3, backoff: Backoff::Exponential },
        active: true,
        compiled_condition: Default::default(),
    }
}

async fn insert_entity(ctx: &AppContext, entity: Entity) -> Result<(), RocketError> {
    let now = Utc::now().naive_utc();
    let active = entities::ActiveModel {
        name: Set(entity.name.clone()),
        definition: Set(serde_json::to_string(&entity).map_err(|e| RocketError::internal(e.to_string()))?),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active.insert(ctx.db.inner()).await.map_err(RocketError::from)?;
    Ok(())
}

async fn insert_relation(ctx: &AppContext, relation: Relation) -> Result<(), RocketError> {
    let now = Utc::now().naive_utc();
    let active = relations::ActiveModel {
        name: Set(relation.name.clone()),
        definition: Set(serde_json::to_string(&relation).map_err(|e| RocketError::internal(e.to_string()))?),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active.insert(ctx.db.inner()).await.map_err(RocketError::from)?;
    Ok(())
}

async fn insert_rule(ctx: &AppContext, rule: Rule) -> Result<(), RocketError> {
    let now = Utc::now().naive_utc();
    let active = rules::ActiveModel {
        id: Set(rule.id.clone()),
        entity: Set(rule.entity.clone()),
        hook: Set(serde_json::to_value(rule.hook).unwrap().as_str().unwrap().to_string()),
        kind: Set("field".into()),
        definition: Set(serde_json::to_string(&rule).map_err(|e| RocketError::internal(e.to_string()))?),
        priority: Set(rule.priority),
        active: Set(rule.active),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active.insert(ctx.db.inner()).await.map_err(RocketError::from)?;
    Ok(())
}

async fn insert_state_machine(ctx: &AppContext, machine: StateMachine) -> Result<(), RocketError> {
    let now = Utc::now().naive_utc();
    let active = state_machines::ActiveModel {
        id: Set(machine.id.clone()),
        entity: Set(machine.entity.clone()),
        field: Set(machine.field.clone()),
        definition: Set(serde_json::to_string(&machine).map_err(|e| RocketError::internal(e.to_string()))?),
        active: Set(machine.active),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active.insert(ctx.db.inner()).await.map_err(RocketError::from)?;
    Ok(())
}

async fn insert_webhook(ctx: &AppContext, webhook: Webhook) -> Result<(), RocketError> {
    let now = Utc::now().naive_utc();
    let active = webhooks::ActiveModel {
        id: Set(webhook.id.clone()),
        entity: Set(webhook.entity.clone()),
        hook: Set(serde_json::to_value(webhook.hook).unwrap().as_str().unwrap().to_string()),
        url: Set(webhook.url.clone()),
        method: Set(serde_json::to_value(webhook.method).unwrap().as_str().unwrap().to_string()),
        headers: Set(serde_json::to_string(&webhook.headers).map_err(|e| RocketError::internal(e.to_string()))?),
        condition: Set(webhook.condition.clone()),
        is_async: Set(webhook.is_async),
        retry: Set(serde_json::to_string(&webhook.retry).map_err(|e| RocketError::internal(e.to_string()))?),
        active: Set(webhook.active),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active.insert(ctx.db.inner()).await.map_err(RocketError::from)?;
    Ok(())
}
