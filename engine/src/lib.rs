pub mod api;
pub mod app_manager;
pub mod config;
pub mod container;
pub mod database;
pub mod error;
pub mod expr;
pub mod http;
pub mod metadata;
pub mod middleware;
pub mod rules;
pub mod routing;
pub mod scheduler;
pub mod server;
pub mod state_machine;
pub mod webhook;
pub mod workflow;
pub mod write;

extern crate self as rocket_engine;

pub use app_manager::{AppContext, AppManager};
pub use config::{env, env_optional, env_required, AppConfig, Config, Environment, RuntimeConfig, ServerConfig};
pub use container::{App, Container};
pub use database::{AttributeMap, AttributeValue, DbConnection};
pub use error::{ErrorDetail, FrameworkError, RocketError};
pub use http::{json, text, FromRequest, HttpResponse, Redirect, Request, Response, ResponseExt};
pub use metadata::Registry;
pub use middleware::{
    register_global_middleware, Middleware, MiddlewareFuture, MiddlewareRegistry, Next,
};
pub use routing::{
    register_route_name, route, route_with_params, BoxedHandler, GroupBuilder, GroupRouter,
    RouteBuilder, Router,
};
pub use scheduler::Scheduler;
pub use workflow::{HistoryEntry, InstanceStatus};
pub use server::Server;

// Re-export async_trait for middleware/task implementations
pub use async_trait::async_trait;

#[doc(hidden)]
pub use serde_json;

pub use serde;

#[macro_export]
macro_rules! json_response {
    ($($json:tt)+) => {
        Ok($crate::HttpResponse::json($crate::serde_json::json!($($json)+)))
    };
}

#[macro_export]
macro_rules! text_response {
    ($text:expr) => {
        Ok($crate::HttpResponse::text($text))
    };
}

/// Register global middleware that runs on every request
///
/// Global middleware is registered in `bootstrap.rs` and runs in registration order,
/// before any route-specific middleware.
#[macro_export]
macro_rules! global_middleware {
    ($middleware:expr) => {
        $crate::register_global_middleware($middleware)
    };
}
