use rocket_engine::{async_trait, Middleware, Next, Response};
use rocket_engine::Request;

/// Logs method, path and outcome status for every request.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.path().to_string();

        let response = next.run(req).await;

        match &response {
            Ok(res) => tracing::info!(%method, %path, status = res.status_code(), "request"),
            Err(res) => tracing::warn!(%method, %path, status = res.status_code(), "request"),
        }

        response
    }
}
