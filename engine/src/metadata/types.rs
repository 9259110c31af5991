//! Declarative artifact types
//!
//! These mirror the rows an operator writes into `_entities`, `_relations`,
//! `_rules`, `_state_machines`, `_workflows`, `_webhooks`, and
//! `_permissions`. They're plain data — the registry indexes them, the
//! rule/state-machine/workflow/webhook engines interpret them.

use crate::database::FieldType;
use crate::expr::CompiledExpr;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyType {
    Uuid,
    Int,
    Bigint,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: PrimaryKeyType,
    /// Whether the datastore generates this value (serial/identity/gen_random_uuid).
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoTimestamp {
    Create,
    Update,
    None,
}

impl Default for AutoTimestamp {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub auto: AutoTimestamp,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlugConfig {
    pub source: String,
    #[serde(default)]
    pub regenerate_on_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub table: String,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub slug: Option<SlugConfig>,
    pub fields: Vec<Field>,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        name == self.primary_key.field || self.field(name).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Source,
    Target,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fetch {
    Lazy,
    Eager,
}

impl Default for Fetch {
    fn default() -> Self {
        Self::Lazy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Diff,
    Replace,
    Append,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::Diff
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub source: String,
    pub target: String,
    pub source_key: String,
    pub target_key: String,
    #[serde(default)]
    pub join_table: Option<String>,
    #[serde(default)]
    pub source_join_key: Option<String>,
    #[serde(default)]
    pub target_join_key: Option<String>,
    #[serde(default = "default_ownership")]
    pub ownership: Ownership,
    #[serde(default = "default_on_delete")]
    pub on_delete: OnDelete,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_ownership() -> Ownership {
    Ownership::None
}

fn default_on_delete() -> OnDelete {
    OnDelete::Restrict
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    BeforeWrite,
    BeforeDelete,
    AfterWrite,
    AfterDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Min,
    Max,
    MinLength,
    MaxLength,
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDefinition {
    Field {
        field: String,
        operator: FieldOperator,
        value: serde_json::Value,
        message: String,
    },
    Expression {
        expression: String,
        message: String,
        #[serde(default)]
        stop_on_fail: bool,
        #[serde(skip, default)]
        compiled: OnceLock<CompiledExpr>,
    },
    Computed {
        field: String,
        expression: String,
        #[serde(skip, default)]
        compiled: OnceLock<CompiledExpr>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub entity: String,
    pub hook: Hook,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(flatten)]
    pub definition: RuleDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    #[serde(deserialize_with = "deserialize_state_set", serialize_with = "serialize_state_set")]
    pub from: Vec<String>,
    pub to: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub actions: Vec<TransitionAction>,
    #[serde(skip)]
    pub compiled_guard: OnceLock<CompiledExpr>,
}

fn deserialize_state_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

fn serialize_state_set<S>(value: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if value.len() == 1 {
        serializer.serialize_str(&value[0])
    } else {
        value.serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionAction {
    SetField { field: String, value: serde_json::Value },
    Webhook { webhook_id: String },
    CreateRecord { entity: String, fields: serde_json::Value },
    SendEvent { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineDefinition {
    pub initial: String,
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    pub id: String,
    pub entity: String,
    pub field: String,
    pub definition: StateMachineDefinition,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowTrigger {
    StateChange { entity: String, field: String, to: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStep {
    Action {
        id: String,
        actions: Vec<TransitionAction>,
        then: String,
    },
    Condition {
        id: String,
        expression: String,
        on_true: String,
        on_false: String,
        #[serde(skip)]
        compiled: OnceLock<CompiledExpr>,
    },
    Approval {
        id: String,
        assignee: AssigneeDescriptor,
        /// Duration string, e.g. `"72h"`.
        timeout: Option<String>,
        on_approve: String,
        on_reject: String,
        on_timeout: Option<String>,
    },
}

impl WorkflowStep {
    pub fn id(&self) -> &str {
        match self {
            Self::Action { id, .. } => id,
            Self::Condition { id, .. } => id,
            Self::Approval { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssigneeDescriptor {
    RelationPath { path: String },
    Role { role: String },
    FixedUser { user_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub trigger: WorkflowTrigger,
    #[serde(default)]
    pub context: indexmap::IndexMap<String, String>,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Exponential,
    Linear,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), backoff: Backoff::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub entity: String,
    pub hook: Hook,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: indexmap::IndexMap<String, String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(skip)]
    pub compiled_condition: OnceLock<CompiledExpr>,
}

impl Webhook {
    pub fn is_sync(&self) -> bool {
        matches!(self.hook, Hook::BeforeWrite | Hook::BeforeDelete)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub entity: String,
    pub action: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub conditions: Option<String>,
}
