//! Operator CLI: `serve` (default), `migrate`, and `scheduler:work`.
//!
//! Generalizes the teacher's `Application` builder CLI from one
//! process-global database to the multi-tenant `AppManager` model: there is
//! no standalone migration step to run by hand, since `AppManager::connect`
//! and `connect_app` already migrate the management database and every
//! tenant database the moment they're touched. `migrate` exists as an
//! explicit, scriptable way to force that connection (and therefore the
//! migration) without also starting the HTTP listener; `scheduler:work`
//! runs the sweep loops alone, for operators who want webhook retries and
//! workflow timeouts on a separate process from the request-serving one.

use clap::{Parser, Subcommand};
use rocket_engine::{Config, RuntimeConfig, Scheduler, Server};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rocket-demo")]
#[command(about = "Rocket demo app server and operator commands")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server and the background sweep scheduler (default).
    Serve,
    /// Connect the management database and every configured app, running
    /// their migrations, then exit without serving traffic.
    Migrate,
    /// Run only the background sweep scheduler (workflow timeouts, webhook
    /// retries, event retention) in the foreground.
    #[command(name = "scheduler:work")]
    SchedulerWork,
}

impl Cli {
    pub async fn run(self) {
        match self.command.unwrap_or(Command::Serve) {
            Command::Serve => serve().await,
            Command::Migrate => migrate().await,
            Command::SchedulerWork => scheduler_work().await,
        }
    }
}

async fn serve() {
    let manager = crate::bootstrap::register().await;

    let runtime = Config::get::<RuntimeConfig>().unwrap_or_default();
    let scheduler = Arc::new(Scheduler::new(manager, runtime));
    scheduler.spawn();

    let router = crate::routes::register();
    Server::from_config(router).run().await.expect("Failed to start server");
}

async fn migrate() {
    let manager = crate::bootstrap::register().await;
    let apps = manager.list().await.expect("failed to list apps");
    for app in &apps {
        manager.get(&app.name).await.expect("failed to connect and migrate app");
    }
    println!("migrated management database and {} app(s)", apps.len());
}

async fn scheduler_work() {
    let manager = crate::bootstrap::register().await;

    let runtime = Config::get::<RuntimeConfig>().unwrap_or_default();
    let scheduler = Arc::new(Scheduler::new(manager, runtime));
    scheduler.spawn();

    println!("scheduler running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    scheduler.stop();
}
