//! Database access for the Rocket runtime
//!
//! Two distinct kinds of table live behind this module:
//!
//! - **System tables** (`_entities`, `_fields`, `_relations`, `_rules`,
//!   `_state_machines`, `_workflows`, `_webhooks`, `_permissions`, plus the
//!   durable workflow-instance and webhook-log tables) are typed sea-orm
//!   entities with sea-orm-migration migrations — they're the engine's own
//!   data, not business data, so a typed ORM is the right tool.
//! - **Business entity tables** (whatever `_entities` describes: `orders`,
//!   `customers`, ...) are read and written as untyped [`AttributeMap`]s via
//!   [`raw`]'s parameterized `Statement` helpers. No codegen, no per-entity
//!   Rust struct — the whole point of a metadata-interpreted runtime.
//!
//! Every [`AppContext`](crate::app_manager::AppContext) owns one
//! [`DbConnection`] that serves both halves for that app.

pub mod dialect;
pub mod pool;
pub mod raw;
pub mod value;

pub use dialect::{dialect_for_url, PostgresDialect, SqlDialect, SqliteDialect};
pub use pool::{DatabaseConfig, DbConnection};
pub use raw::{execute, query_all, query_one, ColumnSpec};
pub use value::{attribute_map_to_json, AttributeMap, AttributeValue, FieldType};

pub use sea_orm;
