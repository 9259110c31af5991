//! Untyped business-data value model
//!
//! Business rows never get a generated `Model`/`ActiveModel` pair the way
//! the engine's own system tables do (see [`crate::database::pool`]).
//! Instead every row read or written through the write pipeline is an
//! [`AttributeMap`]: an ordered map from field name to [`AttributeValue`],
//! keyed off the field's declared [`FieldType`] in the metadata registry.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use sea_orm::Value as SeaValue;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// The declared type of one entity field, as stored in `_fields.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Json,
    Uuid,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Uuid => "uuid",
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::DateTime),
            "json" => Ok(Self::Json),
            "uuid" => Ok(Self::Uuid),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// A single business-data value, tagged by the column's declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
    Json(JsonValue),
    Uuid(Uuid),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce a decoded JSON payload value into the shape its declared
    /// `FieldType` expects. This is where `"2024-01-01T00:00:00Z"` strings
    /// become `DateTime` and numeric strings become `Decimal`.
    pub fn from_json(value: &JsonValue, field_type: FieldType) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::Null);
        }
        match field_type {
            FieldType::String => value
                .as_str()
                .map(|s| Self::Text(s.to_string()))
                .ok_or_else(|| "expected string".to_string()),
            FieldType::Integer => value
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| "expected integer".to_string()),
            FieldType::Float => value
                .as_f64()
                .map(Self::Float)
                .ok_or_else(|| "expected float".to_string()),
            FieldType::Decimal => {
                let raw = match value {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Number(n) => n.to_string(),
                    _ => return Err("expected decimal".to_string()),
                };
                Decimal::from_str(&raw)
                    .map(Self::Decimal)
                    .map_err(|e| format!("invalid decimal: {e}"))
            }
            FieldType::Boolean => value
                .as_bool()
                .map(Self::Bool)
                .ok_or_else(|| "expected boolean".to_string()),
            FieldType::DateTime => {
                let raw = value.as_str().ok_or_else(|| "expected datetime string".to_string())?;
                parse_datetime(raw).map(Self::DateTime)
            }
            FieldType::Json => Ok(Self::Json(value.clone())),
            FieldType::Uuid => {
                let raw = value.as_str().ok_or_else(|| "expected uuid string".to_string())?;
                Uuid::from_str(raw).map(Self::Uuid).map_err(|e| format!("invalid uuid: {e}"))
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
            Self::Decimal(d) => JsonValue::String(d.to_string()),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::DateTime(dt) => JsonValue::String(format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.f"))),
            Self::Json(v) => v.clone(),
            Self::Uuid(u) => JsonValue::String(u.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Convert into a sea-orm bind value for use in a parameterized `Statement`.
    pub fn to_sea_value(&self) -> SeaValue {
        match self {
            Self::Null => SeaValue::String(None),
            Self::Bool(b) => SeaValue::Bool(Some(*b)),
            Self::Int(i) => SeaValue::BigInt(Some(*i)),
            Self::Float(f) => SeaValue::Double(Some(*f)),
            Self::Decimal(d) => SeaValue::String(Some(Box::new(d.to_string()))),
            Self::Text(s) => SeaValue::String(Some(Box::new(s.clone()))),
            Self::DateTime(dt) => SeaValue::ChronoDateTime(Some(Box::new(*dt))),
            Self::Json(v) => SeaValue::Json(Some(Box::new(v.clone()))),
            Self::Uuid(u) => SeaValue::String(Some(Box::new(u.to_string()))),
        }
    }
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(|e| format!("invalid datetime: {e}"))
}

/// An ordered record of business-data attributes, e.g. one row of `orders`.
pub type AttributeMap = IndexMap<String, AttributeValue>;

/// Build a JSON object from an [`AttributeMap`] for API responses.
pub fn attribute_map_to_json(map: &AttributeMap) -> JsonValue {
    let obj: serde_json::Map<String, JsonValue> =
        map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    JsonValue::Object(obj)
}
