//! SQL dialect adapter
//!
//! The write pipeline and query builders generate SQL once and run it
//! against whichever backend an app's [`DbConnection`](super::DbConnection)
//! points at. Everything dialect-specific (placeholder syntax, identifier
//! quoting, the current-timestamp function, upsert syntax) is isolated here
//! so the rest of the engine reads like backend-agnostic SQL text.

use sea_orm::DatabaseBackend;

/// Which SQL engine an app's connection targets.
pub trait SqlDialect: Send + Sync {
    fn backend(&self) -> DatabaseBackend;

    /// The positional placeholder for bind parameter `index` (1-based).
    fn placeholder(&self, index: usize) -> String;

    /// Quote an identifier (table or column name) for safe interpolation.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// SQL expression for "now" in UTC.
    fn now_expr(&self) -> &'static str;

    /// Whether `INSERT ... RETURNING` is supported (Postgres yes, SQLite
    /// 3.35+ yes, but the engine targets the lowest common denominator and
    /// instead re-selects after insert when this returns `false`).
    fn supports_returning(&self) -> bool;

    /// `SELECT ... FOR UPDATE` row-lock clause, or empty string if the
    /// backend doesn't support row-level locking (SQLite).
    fn for_update_clause(&self) -> &'static str;

    /// Whether the backend supports `FOR UPDATE SKIP LOCKED` (used by the
    /// workflow claim query and the scheduler's webhook-retry sweep).
    fn supports_skip_locked(&self) -> bool;
}

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn now_expr(&self) -> &'static str {
        "NOW()"
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn for_update_clause(&self) -> &'static str {
        "FOR UPDATE"
    }

    fn supports_skip_locked(&self) -> bool {
        true
    }
}

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn now_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn for_update_clause(&self) -> &'static str {
        ""
    }

    fn supports_skip_locked(&self) -> bool {
        false
    }
}

/// Build the dialect matching a connection URL's scheme.
pub fn dialect_for_url(url: &str) -> Box<dyn SqlDialect> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Box::new(PostgresDialect)
    } else {
        Box::new(SqliteDialect)
    }
}
