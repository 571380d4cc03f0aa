use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::mcp::rpc::{json_rpc_error, INTERNAL_ERROR};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("upstream request failed ({status:?}): {message}")]
    Upstream { status: Option<u16>, message: String },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized { code, message } => {
                tracing::debug!(code, "request rejected");
                (StatusCode::UNAUTHORIZED, json_rpc_error(None, 401, message))
            }
            Self::Upstream { status, message } => {
                tracing::error!(
                    upstream_status = ?status,
                    error = %message,
                    "request failed with upstream error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json_rpc_error(None, INTERNAL_ERROR, "Internal server error"),
                )
            }
            Self::Internal { code, message } => {
                tracing::error!(code, error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json_rpc_error(None, INTERNAL_ERROR, "Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
