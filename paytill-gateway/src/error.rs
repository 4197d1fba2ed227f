//! HTTP error mapping for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use paytill::ledger::DuplicateIntentError;
use paytill_svm::error::BuildError;

/// Errors surfaced by the gateway's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is malformed; never retried automatically.
    #[error("{0}")]
    Validation(String),

    /// Unknown storefront or product reference.
    #[error("unknown storefront or product")]
    NotFound,

    /// Webhook signature missing or mismatched.
    #[error("unauthorized")]
    Unauthorized,

    /// Transaction construction failed; the caller may retry the build.
    #[error("transaction build failed")]
    Build(#[from] BuildError),

    /// A correlation key was reused; fatal to this request.
    #[error("{0}")]
    Duplicate(#[from] DuplicateIntentError),

    /// JSON deserialization of the request body failed.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Build(inner) => match inner {
                BuildError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                BuildError::AssetResolution { .. } | BuildError::NetworkUnavailable(_) => {
                    StatusCode::BAD_GATEWAY
                }
                BuildError::Compile(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Duplicate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            Self::Build(inner) => {
                serde_json::json!({ "error": self.to_string(), "detail": inner.to_string() })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
