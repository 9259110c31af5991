//! Application Bootstrap
//!
//! Registers global middleware and connects the [`AppManager`] before the
//! server starts accepting connections.

use rocket_engine::{global_middleware, AppManager, Config, RuntimeConfig};
use std::sync::Arc;

use crate::config::DemoConfig;
use crate::middleware;

/// Called from main.rs before `Server::from_config()`.
pub async fn register() -> Arc<AppManager> {
    global_middleware!(middleware::LoggingMiddleware);

    let runtime = Config::get::<RuntimeConfig>().unwrap_or_default();
    let manager = AppManager::install_global(&runtime).await.expect("failed to connect management database");

    let demo = Config::get::<DemoConfig>().unwrap_or_else(DemoConfig::from_env);
    if demo.seed_demo_app {
        seed_demo_app(&manager, &demo.demo_app_name).await;
    }

    manager
}

async fn seed_demo_app(manager: &AppManager, name: &str) {
    let ctx = match manager.get(name).await {
        Ok(ctx) => ctx,
        Err(_) => manager.create(name, "Demo Shop", "sqlite").await.expect("failed to create demo app"),
    };

    if ctx.registry.all_entities().is_empty() {
        crate::demo::seed(&ctx).await.expect("failed to seed demo metadata");
    }
}
