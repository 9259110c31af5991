//! Nested-Write Planner (spec §4.6)
//!
//! Walks an incoming JSON body against an entity's metadata, splitting it
//! into scalar fields (validated and coerced) and [`RelationWrite`]s (left
//! for the [`super::executor`] to apply). Unknown top-level keys are a
//! `VALIDATION_FAILED` error with `rule: "unknown"`.

use crate::database::{AttributeMap, AttributeValue, FieldType};
use crate::error::{ErrorDetail, RocketError};
use crate::metadata::{Entity, Registry, Relation};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone)]
pub struct RelationWrite {
    pub relation: Relation,
    /// Raw child payloads as given by the caller — each either carries the
    /// target's primary key (update/adopt) or not (create).
    pub payloads: Vec<JsonValue>,
}

#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    pub fields: AttributeMap,
    pub relations: Vec<RelationWrite>,
}

/// `is_create` controls required-field checking; on update, absent fields
/// are left untouched rather than defaulted or rejected.
pub fn plan_write(entity: &Entity, registry: &Registry, body: &JsonValue, is_create: bool) -> Result<WritePlan, RocketError> {
    let JsonValue::Object(map) = body else {
        return Err(RocketError::invalid_payload("request body must be a JSON object"));
    };

    let mut errors: Vec<ErrorDetail> = Vec::new();
    let mut plan = WritePlan::default();

    for (key, value) in map {
        if key == &entity.primary_key.field {
            if let Some(attr) = coerce_value(value, field_type_for_pk(entity))
                .map_err(|e| errors.push(ErrorDetail { field: key.clone(), rule: "type".into(), message: e }))
                .ok()
            {
                plan.fields.insert(key.clone(), attr);
            }
            continue;
        }

        if let Some(field) = entity.field(key) {
            match coerce_field(field, value) {
                Ok(attr) => {
                    plan.fields.insert(key.clone(), attr);
                }
                Err(message) => errors.push(ErrorDetail { field: key.clone(), rule: "type".into(), message }),
            }
            continue;
        }

        if let Some(relation) = registry.find_relation_for_entity(key, &entity.name) {
            let payloads = match value {
                JsonValue::Array(items) => items.clone(),
                JsonValue::Null => Vec::new(),
                other => vec![other.clone()],
            };
            plan.relations.push(RelationWrite { relation, payloads });
            continue;
        }

        errors.push(ErrorDetail { field: key.clone(), rule: "unknown".into(), message: format!("unknown key '{key}'") });
    }

    if is_create {
        for field in &entity.fields {
            if field.required && !plan.fields.contains_key(&field.name) && field.default.is_none() {
                errors.push(ErrorDetail {
                    field: field.name.clone(),
                    rule: "required".into(),
                    message: format!("'{}' is required", field.name),
                });
            }
        }
    }

    if !errors.is_empty() {
        return Err(RocketError::ValidationFailed(errors));
    }

    Ok(plan)
}

fn field_type_for_pk(entity: &Entity) -> FieldType {
    use crate::metadata::PrimaryKeyType;
    match entity.primary_key.kind {
        PrimaryKeyType::Uuid => FieldType::Uuid,
        PrimaryKeyType::Int | PrimaryKeyType::Bigint => FieldType::Integer,
        PrimaryKeyType::String => FieldType::String,
    }
}

fn coerce_field(field: &crate::metadata::Field, value: &JsonValue) -> Result<AttributeValue, String> {
    if let Some(allowed) = &field.enum_values {
        if let Some(s) = value.as_str() {
            if !allowed.iter().any(|a| a == s) {
                return Err(format!("'{s}' is not one of {allowed:?}"));
            }
        }
    }
    coerce_value(value, field.field_type)
}

fn coerce_value(value: &JsonValue, field_type: FieldType) -> Result<AttributeValue, String> {
    AttributeValue::from_json(value, field_type)
}
