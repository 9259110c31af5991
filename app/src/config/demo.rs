use rocket_engine::env;

/// Controls the demo `shop` tenant seeded on startup (spec §8 scenarios).
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub seed_demo_app: bool,
    pub demo_app_name: String,
}

impl DemoConfig {
    pub fn from_env() -> Self {
        Self {
            seed_demo_app: env("ROCKET_SEED_DEMO_APP", true),
            demo_app_name: env("ROCKET_DEMO_APP_NAME", "shop".to_string()),
        }
    }
}
