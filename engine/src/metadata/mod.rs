//! Declarative metadata: types, system-table entities, migration, and the
//! per-app in-memory [`Registry`].

pub mod entities;
pub mod migration;
pub mod registry;
pub mod types;

pub use migration::Migrator;
pub use registry::Registry;
pub use types::{
    AssigneeDescriptor, AutoTimestamp, Backoff, Entity, Field, FieldOperator, Fetch, Hook, HttpMethod, OnDelete,
    Ownership, Permission, PrimaryKey, PrimaryKeyType, Relation, RelationType, RetryPolicy, Rule, RuleDefinition,
    SlugConfig, StateMachine, StateMachineDefinition, Transition, TransitionAction, Webhook, Workflow,
    WorkflowStep, WorkflowTrigger, WriteMode,
};
