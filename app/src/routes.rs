use rocket_engine::{api, Router};

pub fn register() -> Router {
    api::register_routes(Router::new())
}
