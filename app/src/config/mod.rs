mod demo;

pub use demo::DemoConfig;

use rocket_engine::Config;

/// Register all application configs
pub fn register_all() {
    Config::register(DemoConfig::from_env());
}
