//! Error types for the bridge service
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Handlers that report problems to the browser as flash notices
//! match on the recoverable variants before they reach this conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Both identities are required but at least one is missing (401)
    #[error("Sign in to both Twitter and Mastodon first")]
    Unauthorized,

    /// CSRF token missing or wrong (403)
    #[error("Access denied")]
    Forbidden,

    /// Malformed user input (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The user declined consent or the callback carried no grant (400)
    #[error("{0}")]
    AuthorizationDenied(String),

    /// Registering the bridge as an app on a Mastodon server failed (502)
    #[error("Could not register with Mastodon host {hostname}: {reason}")]
    HostRegistration { hostname: String, reason: String },

    /// Reading the latest post of an account failed
    #[error("Status fetch failed: {0}")]
    StatusFetch(String),

    /// A platform answered an OAuth or API call with an unusable response (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Session cookie signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::AuthorizationDenied(_) => "authorization_denied",
            AppError::HostRegistration { .. } => "host_registration",
            AppError::StatusFetch(_) => "status_fetch",
            AppError::Upstream(_) => "upstream",
            AppError::Database(_) => "database",
            AppError::HttpClient(_) => "http_client",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether the error is reported to the user as a flash notice
    /// followed by a redirect instead of an error page.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::AuthorizationDenied(_) | AppError::Unauthorized
        )
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::AuthorizationDenied(_) => StatusCode::BAD_REQUEST,
            AppError::HostRegistration { .. }
            | AppError::StatusFetch(_)
            | AppError::Upstream(_)
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) | AppError::Encryption(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
