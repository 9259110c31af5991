//! `AppContext`/`AppManager` lifecycle (spec §4.13)
//!
//! One Rocket process serves many tenant apps. A dedicated management
//! database (its own SQLite file under [`RuntimeConfig::data_dir`], or a
//! configured Postgres URL) holds the `_apps` directory; each named app
//! then gets its own [`DbConnection`] and [`Registry`], connected lazily on
//! first touch and kept alive for the process lifetime. Generalizes the
//! teacher's single process-global connection (`database::connection`) and
//! `App`'s process-wide container into one-context-per-tenant.

use crate::config::{Config, RuntimeConfig};
use crate::database::{DatabaseConfig, DbConnection};
use crate::error::RocketError;
use crate::metadata::entities::apps;
use crate::metadata::{Migrator as MetadataMigrator, Registry};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use sea_orm_migration::MigratorTrait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};

static GLOBAL: OnceLock<Arc<AppManager>> = OnceLock::new();

/// A connected tenant: its own database plus the metadata index built from
/// it. Cheap to clone — everything inside is already an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub name: String,
    pub db: DbConnection,
    pub registry: Arc<Registry>,
}

/// Owns the management database and every connected `AppContext`.
pub struct AppManager {
    management_db: DbConnection,
    contexts: RwLock<HashMap<String, AppContext>>,
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppManager {
    async fn connect(runtime: &RuntimeConfig) -> Result<Self, RocketError> {
        let path = format!("{}/_management.db", runtime.data_dir.trim_end_matches('/'));
        let management_db = DbConnection::connect(&DatabaseConfig::sqlite(&path)).await?;
        MetadataMigrator::up(management_db.inner(), None).await.map_err(RocketError::from)?;
        Ok(Self { management_db, contexts: RwLock::new(HashMap::new()), connect_locks: Mutex::new(HashMap::new()) })
    }

    /// Connects the management database and installs the process-wide
    /// singleton. Call once at startup, mirroring `App::init`.
    pub async fn install_global(runtime: &RuntimeConfig) -> Result<Arc<AppManager>, RocketError> {
        let manager = Arc::new(Self::connect(runtime).await?);
        let _ = GLOBAL.set(manager.clone());
        Ok(manager)
    }

    pub fn global() -> Option<Arc<AppManager>> {
        GLOBAL.get().cloned()
    }

    /// Returns the connected context for `name`, connecting it on first
    /// touch. Concurrent first-touches for the same name dedup behind a
    /// per-name lock rather than racing to open the database twice.
    pub async fn get(&self, name: &str) -> Result<AppContext, RocketError> {
        if let Some(ctx) = self.contexts.read().await.get(name).cloned() {
            return Ok(ctx);
        }

        let lock = {
            let mut locks = self.connect_locks.lock().await;
            locks.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = lock.lock().await;

        if let Some(ctx) = self.contexts.read().await.get(name).cloned() {
            return Ok(ctx);
        }

        let record = apps::Entity::find_by_id(name.to_string())
            .one(self.management_db.inner())
            .await
            .map_err(RocketError::from)?
            .ok_or_else(|| RocketError::unknown_entity(format!("app '{name}'")))?;

        let ctx = self.connect_app(&record).await?;
        self.contexts.write().await.insert(name.to_string(), ctx.clone());
        Ok(ctx)
    }

    async fn connect_app(&self, record: &apps::Model) -> Result<AppContext, RocketError> {
        let runtime = Config::get::<RuntimeConfig>().unwrap_or_default();
        let config = match record.db_driver.as_str() {
            "postgres" => DatabaseConfig::postgres(record.db_name.clone()),
            _ => DatabaseConfig::sqlite(&format!("{}/{}.db", runtime.data_dir.trim_end_matches('/'), record.db_name)),
        };
        let db = DbConnection::connect(&config).await?;
        MetadataMigrator::up(db.inner(), None).await.map_err(RocketError::from)?;

        let registry = Arc::new(Registry::empty());
        registry.reload(&db).await?;

        Ok(AppContext { name: record.name.clone(), db, registry })
    }

    /// Registers a new app in the management database and connects it.
    pub async fn create(&self, name: &str, display_name: &str, db_driver: &str) -> Result<AppContext, RocketError> {
        if apps::Entity::find_by_id(name.to_string())
            .one(self.management_db.inner())
            .await
            .map_err(RocketError::from)?
            .is_some()
        {
            return Err(RocketError::conflict(format!("app '{name}' already exists")));
        }

        let now = chrono::Utc::now().naive_utc();
        let active = apps::ActiveModel {
            name: Set(name.to_string()),
            display_name: Set(display_name.to_string()),
            db_name: Set(name.to_string()),
            db_driver: Set(db_driver.to_string()),
            jwt_secret: Set(uuid::Uuid::new_v4().to_string()),
            status: Set("active".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(self.management_db.inner()).await.map_err(RocketError::from)?;

        self.get(name).await
    }

    /// Drops an app from the directory and evicts its cached context. The
    /// app's own database file/schema is left untouched — deleting tenant
    /// data is a separate, explicit operation.
    pub async fn delete(&self, name: &str) -> Result<(), RocketError> {
        let res = apps::Entity::delete_by_id(name.to_string()).exec(self.management_db.inner()).await.map_err(RocketError::from)?;
        if res.rows_affected == 0 {
            return Err(RocketError::unknown_entity(format!("app '{name}'")));
        }
        self.contexts.write().await.remove(name);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<apps::Model>, RocketError> {
        apps::Entity::find().all(self.management_db.inner()).await.map_err(RocketError::from)
    }

    /// Every currently-connected context, for the scheduler's per-app fan-out.
    pub async fn live_contexts(&self) -> Vec<AppContext> {
        self.contexts.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = std::env::temp_dir().join(format!("rocket-app-manager-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let runtime = RuntimeConfig { data_dir: dir.to_string_lossy().to_string(), ..Default::default() };

        let manager = AppManager::connect(&runtime).await.expect("connect management db");
        manager.create("acme", "Acme Corp", "sqlite").await.expect("create app");

        let ctx = manager.get("acme").await.expect("get app");
        assert_eq!(ctx.name, "acme");

        let apps = manager.list().await.expect("list apps");
        assert_eq!(apps.len(), 1);

        manager.delete("acme").await.expect("delete app");
        assert!(manager.get("acme").await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
