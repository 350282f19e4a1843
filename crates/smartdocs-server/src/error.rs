//! Error types for smartdocs-server

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use smartdocs_core::session::GENERIC_FAILURE_MESSAGE;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error(
        "Config version {found} is newer than supported version {supported}. Please upgrade smartdocs."
    )]
    ConfigVersionTooNew { found: u32, supported: u32 },

    #[error("Failed to read stored data: {0}")]
    StoreParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Missing user identity")]
    Unauthenticated,

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The completion provider failed; the detail is logged, never shown.
    #[error("Completion provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Core(#[from] smartdocs_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Core(smartdocs_core::Error::QuotaExhausted(_)) => StatusCode::TOO_MANY_REQUESTS,
            Error::Core(smartdocs_core::Error::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Error::Core(smartdocs_core::Error::HtmlSyntax { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user.
    fn public_message(&self) -> String {
        match self {
            Error::Upstream(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            Error::Core(err) => err.to_string(),
            Error::Unauthenticated | Error::DocumentNotFound(_) | Error::BadRequest(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
