mod app;
mod runtime;
mod server;

pub use app::{AppConfig, AppConfigBuilder};
pub use runtime::RuntimeConfig;
pub use server::{ServerConfig, ServerConfigBuilder};
