//! Error → HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use toolchat_core::error::{Error, GatewayError, RegistryError};
use tracing::warn;

/// Errors returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A plain-text 400.
    BadRequest(String),
    /// A plain-text 404.
    NotFound(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::BadRequest(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::NotFound(msg) => return (StatusCode::NOT_FOUND, msg).into_response(),
            Self::Core(e) => e,
        };

        match error {
            Error::UnsupportedModel(_) => {
                (StatusCode::BAD_REQUEST, "Model is not supported").into_response()
            }
            e @ (Error::InvalidConversation(_) | Error::InvalidOperationName(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            Error::Registry(RegistryError::ToolNotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Tool not found: {id}")).into_response()
            }
            Error::Registry(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            Error::Gateway(GatewayError::LaunchFailed { failures }) => {
                warn!(failed = failures.len(), "Tool backends failed to launch");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "Failed to launch tool backends",
                        "failures": failures,
                    })),
                )
                    .into_response()
            }
            Error::Provider(info) => (StatusCode::BAD_GATEWAY, Json(info)).into_response(),
            e @ (Error::Gateway(_) | Error::ProviderTransport(_)) => {
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }
}
