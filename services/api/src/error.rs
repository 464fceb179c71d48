//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered to the browser.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labmarket_core::{MarketError, PortError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A user-facing failure of the listing lifecycle.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while running the schema migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Login with an unknown email or a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The request clashes with existing state, e.g. an email already registered.
    #[error("{0}")]
    Conflict(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// One rejected form field.
#[derive(Debug, Serialize, ToSchema)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    /// Where the client should navigate next, when the error implies it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldErrorBody>,
}

fn market_response(err: &MarketError) -> (StatusCode, ErrorBody) {
    let status = match err {
        MarketError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarketError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        MarketError::Unauthorized => StatusCode::FORBIDDEN,
        MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
        MarketError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    let fields = match err {
        MarketError::Validation(errors) => errors
            .errors()
            .iter()
            .map(|e| FieldErrorBody {
                field: e.field.to_string(),
                message: e.message.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };
    let message = match err {
        MarketError::Validation(_) => "Please correct the highlighted fields.".to_string(),
        MarketError::Store(_) => "The marketplace service is unavailable. Please try again.".to_string(),
        other => other.to_string(),
    };
    (
        status,
        ErrorBody {
            error: message,
            redirect: err.redirect().map(|route| route.path()),
            fields,
        },
    )
}

fn plain(status: StatusCode, message: String) -> Response {
    let body = ErrorBody {
        error: message,
        redirect: None,
        fields: Vec::new(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let market = match self {
            ApiError::Market(err) => err,
            ApiError::Port(err) => MarketError::from(err),
            ApiError::InvalidCredentials => {
                return plain(StatusCode::UNAUTHORIZED, "Invalid email or password".to_string());
            }
            ApiError::Conflict(message) => return plain(StatusCode::CONFLICT, message),
            other => {
                error!("Request failed: {:?}", other);
                return plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                );
            }
        };
        if let MarketError::Store(detail) = &market {
            error!("Store failure: {}", detail);
        }
        let (status, body) = market_response(&market);
        (status, Json(body)).into_response()
    }
}

/// A convenience type alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;
