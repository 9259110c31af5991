use clap::Parser;
use rocket_engine::Config;

mod bootstrap;
mod cli;
mod config;
mod demo;
mod middleware;
mod routes;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    // Initialize framework configuration (loads .env files)
    Config::init(std::path::Path::new("."));

    // Register application configs
    config::register_all();

    cli::Cli::parse().run().await;
}
