use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::strip::StripError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (missing upload field, empty filename, ...)
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload extension is not on the allow-list
    #[error("Unsupported file type: {filename}")]
    UnsupportedExtension { filename: String },

    /// Upload body exceeded the configured ceiling
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Macro removal failed on an accepted upload
    #[error(transparent)]
    Conversion(#[from] StripError),

    /// Filesystem error while staging the upload
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::UnsupportedExtension { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::UnsupportedExtension { filename } => {
                format!("\"{filename}\" is not a .xlsm file; only macro-enabled workbooks are accepted")
            }
            Error::PayloadTooLarge { limit } => {
                format!("File is too large; the limit is {} MB", limit / (1024 * 1024))
            }
            Error::Conversion(cause) => {
                format!("Could not remove macros from this file: {cause}")
            }
            Error::Io(_) | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

/// Map multipart read failures onto our error space. The only interesting
/// case is the body-limit rejection, which axum surfaces as a 413 from the
/// underlying stream.
pub fn from_multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest {
            message: format!("Invalid multipart request: {}", err.body_text()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.user_message(),
            }),
        )
            .into_response()
    }
}
