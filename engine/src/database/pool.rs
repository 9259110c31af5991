//! Per-app database connection pool
//!
//! Generalizes the teacher's single process-global `DbConnection` into one
//! pool per [`AppContext`](crate::app_manager::AppContext): every app owns
//! its own database (one SQLite file, or a dedicated Postgres URL), so each
//! `AppContext` dials its own `DbConnection` rather than sharing a
//! container singleton.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;

use crate::database::dialect::{dialect_for_url, SqlDialect};
use crate::error::FrameworkError;

/// Connection settings for one app's database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub logging: bool,
}

impl DatabaseConfig {
    pub fn sqlite(path: &str) -> Self {
        Self {
            url: format!("sqlite://{path}"),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: 10,
            logging: false,
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 10,
            logging: false,
        }
    }
}

/// A clonable, thread-safe handle to one app's SeaORM connection pool,
/// paired with the [`SqlDialect`] that matches its backend.
#[derive(Clone)]
pub struct DbConnection {
    inner: Arc<DatabaseConnection>,
    dialect: Arc<dyn SqlDialect>,
}

impl DbConnection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, FrameworkError> {
        let url = if config.url.starts_with("sqlite://") {
            let path = config.url.trim_start_matches("sqlite://");
            let path = path.trim_start_matches("./");

            if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).ok();
                    }
                }
                if !std::path::Path::new(path).exists() {
                    std::fs::File::create(path).ok();
                }
                format!("sqlite:{path}?mode=rwc")
            } else {
                "sqlite::memory:".to_string()
            }
        } else {
            config.url.clone()
        };

        let mut opt = ConnectOptions::new(&url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .sqlx_logging(config.logging);

        let conn = Database::connect(opt)
            .await
            .map_err(|e| FrameworkError::database(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(conn),
            dialect: Arc::from(dialect_for_url(&config.url)),
        })
    }

    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }
}

impl AsRef<DatabaseConnection> for DbConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

impl std::ops::Deref for DbConnection {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
