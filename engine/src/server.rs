use crate::config::{Config, ServerConfig};
use crate::container::App;
use crate::http::{HttpResponse, Request};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareRegistry};
use crate::routing::Router;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Server {
    router: Arc<Router>,
    middleware: MiddlewareRegistry,
    host: String,
    port: u16,
}

impl Server {
    pub fn new(router: impl Into<Router>) -> Self {
        Self {
            router: Arc::new(router.into()),
            middleware: MiddlewareRegistry::new(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }

    pub fn from_config(router: impl Into<Router>) -> Self {
        App::init();

        let config = Config::get::<ServerConfig>().unwrap_or_else(ServerConfig::from_env);
        Self {
            router: Arc::new(router.into()),
            // Pull global middleware registered via global_middleware! in bootstrap.rs
            middleware: MiddlewareRegistry::from_global(),
            host: config.host,
            port: config.port,
        }
    }

    /// Add global middleware (runs on every request)
    ///
    /// For route-specific middleware, use `.middleware(M)` on the route itself.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// Server::from_config(router)
    ///     .middleware(LoggingMiddleware)  // Global
    ///     .middleware(CorsMiddleware)     // Global
    ///     .run()
    ///     .await;
    /// ```
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware = self.middleware.append(middleware);
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn get_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host.parse().unwrap(), self.port)
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.get_addr();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "rocket server listening");

        let router = self.router;
        let middleware = Arc::new(self.middleware);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let router = router.clone();
            let middleware = middleware.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let router = router.clone();
                    let middleware = middleware.clone();
                    async move { Ok::<_, Infallible>(handle_request(router, middleware, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::warn!(error = %err, "connection error");
                }
            });
        }
    }
}

async fn handle_request(
    router: Arc<Router>,
    middleware_registry: Arc<MiddlewareRegistry>,
    req: hyper::Request<hyper::body::Incoming>,
) -> hyper::Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("");

    // Built-in health check endpoint, prefixed to avoid conflicting with app routes.
    if path == "/_rocket/health" && method == hyper::Method::GET {
        return health_response(query).await;
    }

    match router.match_route(&method, &path) {
        Some((handler, params)) => {
            let request = Request::new(req).with_params(params);

            let mut chain = MiddlewareChain::new();
            chain.extend(middleware_registry.global_middleware().iter().cloned());
            let route_middleware = router.get_route_middleware(&path);
            chain.extend(route_middleware);

            let response = chain.execute(request, move |req| handler(req)).await;
            let http_response = response.unwrap_or_else(|e| e);
            http_response.into_hyper()
        }
        None => {
            if let Some((fallback_handler, fallback_middleware)) = router.get_fallback() {
                let request = Request::new(req).with_params(std::collections::HashMap::new());

                let mut chain = MiddlewareChain::new();
                chain.extend(middleware_registry.global_middleware().iter().cloned());
                chain.extend(fallback_middleware);

                let response = chain.execute(request, fallback_handler).await;
                let http_response = response.unwrap_or_else(|e| e);
                http_response.into_hyper()
            } else {
                HttpResponse::text("404 Not Found").status(404).into_hyper()
            }
        }
    }
}

/// Built-in health check endpoint.
///
/// Returns `{"status": "ok", "timestamp": "..."}` by default. Add `?app=<name>`
/// to also verify that app's database connection is reachable.
async fn health_response(query: &str) -> hyper::Response<Full<Bytes>> {
    use chrono::Utc;
    use serde_json::json;

    let timestamp = Utc::now().to_rfc3339();
    let check_app = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("app="))
        .map(|s| s.to_string());

    let mut response = json!({
        "status": "ok",
        "timestamp": timestamp
    });

    if let Some(app_name) = check_app {
        match check_database_health(&app_name).await {
            Ok(_) => response["database"] = json!("connected"),
            Err(e) => {
                response["database"] = json!("error");
                response["database_error"] = json!(e);
            }
        }
    }

    let body = serde_json::to_string(&response).unwrap_or_else(|_| r#"{"status":"ok"}"#.to_string());

    hyper::Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Checks database health for one app by issuing a trivial query on its pool.
async fn check_database_health(app_name: &str) -> Result<(), String> {
    use crate::app_manager::AppManager;
    use sea_orm::ConnectionTrait;

    let manager = AppManager::global().ok_or_else(|| "app manager not initialized".to_string())?;
    let ctx = manager
        .get(app_name)
        .await
        .map_err(|e| format!("app {app_name} unavailable: {e}"))?;

    ctx.db
        .inner()
        .execute_unprepared("SELECT 1")
        .await
        .map_err(|e| format!("database query failed: {e}"))?;

    Ok(())
}
