//! Engine-wide error taxonomy
//!
//! One enum maps every failure the write pipeline, registry, and HTTP
//! boundary can produce onto the HTTP status codes the API promises.

use std::collections::HashMap;
use thiserror::Error;

/// Trait for errors that can be converted to HTTP responses.
pub trait HttpError: std::error::Error + Send + Sync + 'static {
    fn status_code(&self) -> u16 {
        500
    }

    fn error_message(&self) -> String {
        self.to_string()
    }
}

/// One field-level validation failure, as reported by the Rule Engine.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub rule: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(field: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Simple wrapper for creating one-off domain errors with a custom status code.
#[derive(Debug, Clone)]
pub struct AppError {
    message: String,
    status_code: u16,
}

impl AppError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: 500,
        }
    }

    pub fn status(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).status(404)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message).status(400)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message).status(401)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message).status(403)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(message).status(422)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(message).status(409)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl HttpError for AppError {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn error_message(&self) -> String {
        self.message.clone()
    }
}

impl From<AppError> for RocketError {
    fn from(e: AppError) -> Self {
        RocketError::Domain {
            message: e.message,
            status_code: e.status_code,
        }
    }
}

/// Engine-wide error type.
///
/// Every variant maps onto one status code from the error taxonomy:
/// `UnknownEntity`/`NotFound` → 404, `InvalidPayload`/`UnknownField` → 400,
/// `Unauthorized` → 401, `Forbidden` → 403, `ValidationFailed` → 422,
/// `Conflict` → 409, `Internal` → 500.
#[derive(Debug, Clone, Error)]
pub enum RocketError {
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("validation failed")]
    ValidationFailed(Vec<ErrorDetail>),

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    /// Escape hatch for app-defined errors that need a status code outside
    /// the fixed taxonomy above (used by `AppError`).
    #[error("{message}")]
    Domain { message: String, status_code: u16 },
}

impl RocketError {
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity { entity: entity.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload { message: message.into() }
    }

    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField { entity: entity.into(), field: field.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn validation_failed(details: Vec<ErrorDetail>) -> Self {
        Self::ValidationFailed(details)
    }

    pub fn domain(message: impl Into<String>, status_code: u16) -> Self {
        Self::Domain { message: message.into(), status_code }
    }

    // --- Compatibility constructors used by the HTTP/container plumbing ---

    pub fn service_not_found<T: ?Sized>() -> Self {
        Self::Internal {
            message: format!("service '{}' not registered in container", std::any::type_name::<T>()),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::InvalidPayload { message: format!("missing required parameter: {}", name.into()) }
    }

    pub fn param_parse(param: impl Into<String>, expected_type: &'static str) -> Self {
        Self::InvalidPayload {
            message: format!("invalid parameter '{}': expected {}", param.into(), expected_type),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Internal { message: format!("database error: {}", message.into()) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn model_not_found(name: impl Into<String>) -> Self {
        Self::NotFound { resource: name.into() }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownEntity { .. } => 404,
            Self::NotFound { .. } => 404,
            Self::InvalidPayload { .. } => 400,
            Self::UnknownField { .. } => 400,
            Self::Unauthorized => 401,
            Self::Forbidden { .. } => 403,
            Self::ValidationFailed(_) => 422,
            Self::Conflict { .. } => 409,
            Self::Internal { .. } => 500,
            Self::Domain { status_code, .. } => *status_code,
        }
    }

    /// JSON error code string, matching the taxonomy names (e.g. `"NOT_FOUND"`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::Domain { .. } => "DOMAIN_ERROR",
        }
    }
}

/// Alias kept for the container/HTTP plumbing, which predates the taxonomy
/// rename; `FrameworkError::internal(...)` etc. still read naturally there.
pub type FrameworkError = RocketError;

impl From<sea_orm::DbErr> for RocketError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::Internal { message: format!("database error: {e}") }
    }
}

/// Laravel-style validation error bag, kept for form-level (non-Rule-Engine)
/// validation such as query-parameter parsing.
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_details(self) -> Vec<ErrorDetail> {
        self.errors
            .into_iter()
            .flat_map(|(field, messages)| {
                messages
                    .into_iter()
                    .map(move |message| ErrorDetail::new(field.clone(), "invalid", message))
            })
            .collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: {:?}", self.errors)
    }
}

impl std::error::Error for ValidationErrors {}
