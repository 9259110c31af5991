//! Child-Write Executor (spec §4.7) — the richest algorithm
//!
//! Applies one [`RelationWrite`] inside the parent transaction, after the
//! parent row exists (create) or is located (update). Behavior is keyed
//! off `relation.write_mode` (default `diff`) and `relation.type`.

use crate::database::{raw, AttributeMap, AttributeValue, DbConnection};
use crate::error::RocketError;
use crate::metadata::{OnDelete, Ownership, Registry, RelationType, WriteMode};
use crate::write::plan::{plan_write, RelationWrite};
use sea_orm::ConnectionTrait;
use std::collections::HashSet;

/// Apply every relation write for one parent row. `conn` is the open write
/// transaction; `db` is consulted only for its SQL dialect.
pub async fn apply_relation_writes<C: ConnectionTrait>(
    conn: &C,
    db: &DbConnection,
    registry: &Registry,
    parent_id: &AttributeValue,
    writes: &[RelationWrite],
) -> Result<(), RocketError> {
    for write in writes {
        apply_one(conn, db, registry, parent_id, write).await?;
    }
    Ok(())
}

async fn apply_one<C: ConnectionTrait>(conn: &C, db: &DbConnection, registry: &Registry, parent_id: &AttributeValue, write: &RelationWrite) -> Result<(), RocketError> {
    let relation = &write.relation;
    match relation.relation_type {
        RelationType::OneToOne | RelationType::OneToMany => apply_to_many(conn, db, registry, parent_id, write).await,
        RelationType::ManyToMany => apply_many_to_many(conn, db, registry, parent_id, write).await,
    }
}

async fn apply_to_many<C: ConnectionTrait>(conn: &C, db: &DbConnection, registry: &Registry, parent_id: &AttributeValue, write: &RelationWrite) -> Result<(), RocketError> {
    let relation = &write.relation;
    let target = registry
        .get_entity(&relation.target)
        .ok_or_else(|| RocketError::unknown_entity(relation.target.clone()))?;

    let mut incoming_ids: HashSet<String> = HashSet::new();

    for payload in &write.payloads {
        let pk_value = payload.get(&target.primary_key.field).cloned();
        let mut plan = plan_write(&target, registry, payload, pk_value.is_none())?;
        plan.fields.insert(relation.target_key.clone(), parent_id.clone());

        match pk_value {
            Some(raw_pk) => {
                let pk_attr = AttributeValue::from_json(&raw_pk, pk_field_type(&target))
                    .map_err(|e| RocketError::invalid_payload(e))?;
                let existing = raw::query_one(
                    conn,
                    &format!(
                        "SELECT {} FROM {} WHERE {} = {}",
                        db.dialect().quote_ident(&relation.target_key),
                        db.dialect().quote_ident(&target.table),
                        db.dialect().quote_ident(&target.primary_key.field),
                        db.dialect().placeholder(1)
                    ),
                    vec![pk_attr.clone()],
                    &[(relation.target_key.as_str(), pk_field_type(&target))],
                )
                .await
                .map_err(RocketError::from)?;

                let linked = existing.as_ref().and_then(|r| r.get(&relation.target_key)).map(|v| v == parent_id).unwrap_or(false);

                if existing.is_some() && linked {
                    update_row(conn, db, &target, &pk_attr, &plan.fields).await?;
                    apply_relation_writes_recursive(conn, db, registry, &pk_attr, &plan.relations).await?;
                } else if existing.is_some() && relation.ownership == Ownership::Source {
                    update_row(conn, db, &target, &pk_attr, &plan.fields).await?;
                    apply_relation_writes_recursive(conn, db, registry, &pk_attr, &plan.relations).await?;
                } else {
                    let new_id = insert_row(conn, db, &target, &plan.fields).await?;
                    apply_relation_writes_recursive(conn, db, registry, &new_id, &plan.relations).await?;
                }
                incoming_ids.insert(pk_as_string(&pk_attr));
            }
            None => {
                let new_id = insert_row(conn, db, &target, &plan.fields).await?;
                apply_relation_writes_recursive(conn, db, registry, &new_id, &plan.relations).await?;
                incoming_ids.insert(pk_as_string(&new_id));
            }
        }
    }

    if matches!(relation.write_mode, WriteMode::Append) {
        return Ok(());
    }

    let currently_linked = fetch_linked_ids(conn, db, &target, &relation.target_key, parent_id).await?;
    let stray: Vec<&AttributeValue> = currently_linked.iter().filter(|id| !incoming_ids.contains(&pk_as_string(id))).collect();

    if stray.is_empty() {
        return Ok(());
    }

    match relation.write_mode {
        WriteMode::Diff => {}
        WriteMode::Replace => {
            for id in stray {
                apply_on_delete(conn, db, &target, id, relation.on_delete, &relation.target_key).await?;
            }
        }
        WriteMode::Append => unreachable!(),
    }

    Ok(())
}

fn apply_relation_writes_recursive<'a, C: ConnectionTrait>(
    conn: &'a C,
    db: &'a DbConnection,
    registry: &'a Registry,
    parent_id: &'a AttributeValue,
    writes: &'a [RelationWrite],
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RocketError>> + Send + 'a>> {
    Box::pin(apply_relation_writes(conn, db, registry, parent_id, writes))
}

async fn apply_many_to_many<C: ConnectionTrait>(conn: &C, db: &DbConnection, registry: &Registry, parent_id: &AttributeValue, write: &RelationWrite) -> Result<(), RocketError> {
    let relation = &write.relation;
    let target = registry
        .get_entity(&relation.target)
        .ok_or_else(|| RocketError::unknown_entity(relation.target.clone()))?;

    let join_table = relation.join_table.clone().unwrap_or_else(|| format!("{}_{}", relation.source, relation.target));
    let source_key = relation.source_join_key.clone().unwrap_or_else(|| format!("{}_id", relation.source));
    let target_key = relation.target_join_key.clone().unwrap_or_else(|| format!("{}_id", relation.target));

    if matches!(relation.write_mode, WriteMode::Replace) {
        raw::execute(
            conn,
            &format!(
                "DELETE FROM {} WHERE {} = {}",
                db.dialect().quote_ident(&join_table),
                db.dialect().quote_ident(&source_key),
                db.dialect().placeholder(1)
            ),
            vec![parent_id.clone()],
        )
        .await
        .map_err(RocketError::from)?;
    }

    for payload in &write.payloads {
        let target_id = match payload.get(&target.primary_key.field).cloned() {
            Some(raw_pk) => AttributeValue::from_json(&raw_pk, pk_field_type(&target)).map_err(RocketError::invalid_payload)?,
            None => {
                let plan = plan_write(&target, registry, payload, true)?;
                insert_row(conn, db, &target, &plan.fields).await?
            }
        };

        if matches!(relation.write_mode, WriteMode::Append | WriteMode::Diff) {
            let existing = raw::query_one(
                conn,
                &format!(
                    "SELECT {} FROM {} WHERE {} = {} AND {} = {}",
                    db.dialect().quote_ident(&source_key),
                    db.dialect().quote_ident(&join_table),
                    db.dialect().quote_ident(&source_key),
                    db.dialect().placeholder(1),
                    db.dialect().quote_ident(&target_key),
                    db.dialect().placeholder(2),
                ),
                vec![parent_id.clone(), target_id.clone()],
                &[(source_key.as_str(), crate::database::FieldType::String)],
            )
            .await
            .map_err(RocketError::from)?;
            if existing.is_some() {
                continue;
            }
        }

        raw::execute(
            conn,
            &format!(
                "INSERT INTO {} ({}, {}) VALUES ({}, {})",
                db.dialect().quote_ident(&join_table),
                db.dialect().quote_ident(&source_key),
                db.dialect().quote_ident(&target_key),
                db.dialect().placeholder(1),
                db.dialect().placeholder(2),
            ),
            vec![parent_id.clone(), target_id],
        )
        .await
        .map_err(RocketError::from)?;
    }

    Ok(())
}

async fn apply_on_delete<C: ConnectionTrait>(conn: &C, db: &DbConnection, target: &crate::metadata::Entity, id: &AttributeValue, policy: OnDelete, fk: &str) -> Result<(), RocketError> {
    match policy {
        OnDelete::Cascade => {
            raw::execute(
                conn,
                &format!(
                    "DELETE FROM {} WHERE {} = {}",
                    db.dialect().quote_ident(&target.table),
                    db.dialect().quote_ident(&target.primary_key.field),
                    db.dialect().placeholder(1)
                ),
                vec![id.clone()],
            )
            .await
            .map_err(RocketError::from)?;
        }
        OnDelete::SetNull | OnDelete::Detach => {
            raw::execute(
                conn,
                &format!(
                    "UPDATE {} SET {} = NULL WHERE {} = {}",
                    db.dialect().quote_ident(&target.table),
                    db.dialect().quote_ident(fk),
                    db.dialect().quote_ident(&target.primary_key.field),
                    db.dialect().placeholder(1)
                ),
                vec![id.clone()],
            )
            .await
            .map_err(RocketError::from)?;
        }
        OnDelete::Restrict => {
            return Err(RocketError::conflict(format!(
                "cannot remove linked '{}' record while on_delete policy is restrict",
                target.name
            )));
        }
    }
    Ok(())
}

async fn fetch_linked_ids<C: ConnectionTrait>(conn: &C, db: &DbConnection, target: &crate::metadata::Entity, fk: &str, parent_id: &AttributeValue) -> Result<Vec<AttributeValue>, RocketError> {
    let rows = raw::query_all(
        conn,
        &format!(
            "SELECT {} FROM {} WHERE {} = {}",
            db.dialect().quote_ident(&target.primary_key.field),
            db.dialect().quote_ident(&target.table),
            db.dialect().quote_ident(fk),
            db.dialect().placeholder(1)
        ),
        vec![parent_id.clone()],
        &[(target.primary_key.field.as_str(), pk_field_type(target))],
    )
    .await
    .map_err(RocketError::from)?;
    Ok(rows.into_iter().filter_map(|r| r.get(&target.primary_key.field).cloned()).collect())
}

async fn insert_row<C: ConnectionTrait>(conn: &C, db: &DbConnection, entity: &crate::metadata::Entity, fields: &AttributeMap) -> Result<AttributeValue, RocketError> {
    use crate::metadata::PrimaryKeyType;

    let generate_id = entity.primary_key.generated && !fields.contains_key(&entity.primary_key.field);

    if generate_id && entity.primary_key.kind == PrimaryKeyType::Uuid {
        let id = AttributeValue::Text(uuid::Uuid::new_v4().to_string());
        let mut all_fields = fields.clone();
        all_fields.insert(entity.primary_key.field.clone(), id.clone());
        insert_row_as_is(conn, db, entity, &all_fields).await?;
        return Ok(id);
    }

    if generate_id {
        // Serial/identity PK (Int/Bigint): the column is omitted from the
        // insert and the backend assigns it; re-select the newest row.
        insert_row_as_is(conn, db, entity, fields).await?;
        let row = raw::query_one(
            conn,
            &format!("SELECT MAX({}) as id FROM {}", db.dialect().quote_ident(&entity.primary_key.field), db.dialect().quote_ident(&entity.table)),
            vec![],
            &[("id", pk_field_type(entity))],
        )
        .await
        .map_err(RocketError::from)?;
        return row
            .and_then(|r| r.get("id").cloned())
            .ok_or_else(|| RocketError::internal(format!("failed to determine generated id for '{}'", entity.name)));
    }

    let pk_value = fields.get(&entity.primary_key.field).cloned().unwrap_or(AttributeValue::Null);
    insert_row_as_is(conn, db, entity, fields).await?;
    Ok(pk_value)
}

async fn insert_row_as_is<C: ConnectionTrait>(conn: &C, db: &DbConnection, entity: &crate::metadata::Entity, fields: &AttributeMap) -> Result<(), RocketError> {
    let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| db.dialect().placeholder(i)).collect();
    let quoted_columns: Vec<String> = columns.iter().map(|c| db.dialect().quote_ident(c)).collect();
    let values: Vec<AttributeValue> = fields.values().cloned().collect();
    let sql = format!("INSERT INTO {} ({}) VALUES ({})", db.dialect().quote_ident(&entity.table), quoted_columns.join(", "), placeholders.join(", "));
    raw::execute(conn, &sql, values).await.map_err(RocketError::from)?;
    Ok(())
}

pub(crate) async fn update_row<C: ConnectionTrait>(conn: &C, db: &DbConnection, entity: &crate::metadata::Entity, id: &AttributeValue, fields: &AttributeMap) -> Result<(), RocketError> {
    if fields.is_empty() {
        return Ok(());
    }
    let mut set_clauses = Vec::new();
    let mut values: Vec<AttributeValue> = Vec::new();
    for (name, value) in fields {
        if name == &entity.primary_key.field {
            continue;
        }
        values.push(value.clone());
        set_clauses.push(format!("{} = {}", db.dialect().quote_ident(name), db.dialect().placeholder(values.len())));
    }
    if set_clauses.is_empty() {
        return Ok(());
    }
    values.push(id.clone());
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        db.dialect().quote_ident(&entity.table),
        set_clauses.join(", "),
        db.dialect().quote_ident(&entity.primary_key.field),
        db.dialect().placeholder(values.len())
    );
    raw::execute(conn, &sql, values).await.map_err(RocketError::from)?;
    Ok(())
}

pub(crate) fn pk_field_type(entity: &crate::metadata::Entity) -> crate::database::FieldType {
    use crate::metadata::PrimaryKeyType;
    match entity.primary_key.kind {
        PrimaryKeyType::Uuid => crate::database::FieldType::Uuid,
        PrimaryKeyType::Int | PrimaryKeyType::Bigint => crate::database::FieldType::Integer,
        PrimaryKeyType::String => crate::database::FieldType::String,
    }
}

fn pk_as_string(value: &AttributeValue) -> String {
    value.as_str().map(str::to_string).or_else(|| value.as_i64().map(|i| i.to_string())).unwrap_or_default()
}
