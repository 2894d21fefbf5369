//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use marketplace::MarketplaceError;
use projections::ProjectionError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path, header or body.
    BadRequest(String),
    /// The acting principal may not see this resource.
    Forbidden(String),
    Marketplace(MarketplaceError),
    Projection(ProjectionError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    /// Stable error kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "validation_error",
            ApiError::Forbidden(_) => "authorization_error",
            ApiError::Marketplace(err) => err.kind(),
            ApiError::Projection(_) => "persistence_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        status_for(self.kind())
    }
}

fn status_for(kind: &str) -> StatusCode {
    match kind {
        "validation_error" => StatusCode::BAD_REQUEST,
        "authorization_error" => StatusCode::FORBIDDEN,
        "not_found" => StatusCode::NOT_FOUND,
        "insufficient_stock"
        | "invalid_state_transition"
        | "already_confirmed"
        | "conflict"
        | "order_number_collision" => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Forbidden(msg) => msg,
            ApiError::Marketplace(err) => err.to_string(),
            ApiError::Projection(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %message, "internal server error");
        } else if kind == "already_confirmed" {
            tracing::warn!(error = %message, "request lost a confirmation race");
        }

        (status, Json(ErrorBody { kind, message })).into_response()
    }
}

impl From<MarketplaceError> for ApiError {
    fn from(err: MarketplaceError) -> Self {
        ApiError::Marketplace(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}
