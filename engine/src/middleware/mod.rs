//! Request middleware pipeline
//!
//! Laravel-style onion middleware: each middleware receives the request and a
//! `Next` handle to call the rest of the chain.

mod registry;

pub use registry::{get_global_middleware, register_global_middleware, MiddlewareRegistry};

use crate::http::{Request, Response};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A single middleware layer.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: Request, next: Next) -> Response;
}

pub(crate) fn into_boxed<M: Middleware + 'static>(middleware: M) -> BoxedMiddleware {
    Arc::new(middleware)
}

/// Handle to the remainder of the middleware chain plus the terminal handler.
#[derive(Clone)]
pub struct Next {
    remaining: Arc<[BoxedMiddleware]>,
    index: usize,
    handler: Arc<dyn Fn(Request) -> MiddlewareFuture + Send + Sync>,
}

impl Next {
    pub async fn run(self, req: Request) -> Response {
        if self.index >= self.remaining.len() {
            return (self.handler)(req).await;
        }
        let middleware = self.remaining[self.index].clone();
        let next = Next {
            remaining: self.remaining.clone(),
            index: self.index + 1,
            handler: self.handler.clone(),
        };
        middleware.handle(req, next).await
    }
}

/// Builds the ordered list of middleware for one request and runs it against a handler.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn extend(&mut self, middlewares: impl IntoIterator<Item = BoxedMiddleware>) {
        self.middlewares.extend(middlewares);
    }

    pub async fn execute<H, Fut>(self, req: Request, handler: H) -> Response
    where
        H: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: Arc<dyn Fn(Request) -> MiddlewareFuture + Send + Sync> =
            Arc::new(move |req| Box::pin(handler(req)));
        let next = Next {
            remaining: self.middlewares.into(),
            index: 0,
            handler,
        };
        next.run(req).await
    }
}
