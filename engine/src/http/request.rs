use std::collections::HashMap;

/// HTTP Request wrapper providing Laravel-like access to request data
pub struct Request {
    inner: hyper::Request<hyper::body::Incoming>,
    params: HashMap<String, String>,
}

impl Request {
    pub fn new(inner: hyper::Request<hyper::body::Incoming>) -> Self {
        Self {
            inner,
            params: HashMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Get the request method
    pub fn method(&self) -> &hyper::Method {
        self.inner.method()
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Get a route parameter by name (e.g., /users/{id})
    pub fn param(&self, name: &str) -> Option<&String> {
        self.params.get(name)
    }

    /// Get all route parameters
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Get the inner hyper request
    pub fn inner(&self) -> &hyper::Request<hyper::body::Incoming> {
        &self.inner
    }

    /// Get the raw query string, if any.
    pub fn query(&self) -> &str {
        self.inner.uri().query().unwrap_or("")
    }

    /// Consume the request and collect its body, for handlers that need
    /// the JSON/form payload rather than just method/params/query.
    pub async fn into_body_bytes(self) -> Result<bytes::Bytes, crate::error::FrameworkError> {
        super::body::collect_body(self.inner.into_body()).await
    }
}
