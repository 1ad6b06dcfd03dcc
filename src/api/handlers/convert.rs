//! Conversion endpoints.
//!
//! One workflow does the actual work: parse the multipart upload, validate
//! the filename, stage the bytes into a per-request temp directory, strip
//! macros, and read the result back. Two thin adapters sit on top of it:
//! the form route answers failures with a redirect back to the page (the
//! message lands in a flash box), while the JSON API answers them with a
//! structured error body. Success looks identical on both: an `.xlsx`
//! attachment download.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info};

use crate::AppState;
use crate::errors::{self, Error};
use crate::filename;
use crate::strip;

/// MIME type of the macro-free output container.
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Multipart field the upload must arrive in.
const UPLOAD_FIELD: &str = "file";

/// A finished conversion, ready to be turned into a download response.
pub struct ConvertedWorkbook {
    pub display_name: String,
    pub bytes: Vec<u8>,
}

/// Shared conversion workflow behind both routes.
///
/// The upload is staged under its sanitized name in a fresh temp directory;
/// the directory guard is dropped at the end of the blocking task, so the
/// staged input and any partial output are deleted on every exit path. The
/// zip and XML work is synchronous and runs on the blocking pool.
async fn run_conversion(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<ConvertedWorkbook, Error> {
    let limit = state.config.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| errors::from_multipart_error(e, limit))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let client_name = field.file_name().map(str::to_string).unwrap_or_default();
            let data = field
                .bytes()
                .await
                .map_err(|e| errors::from_multipart_error(e, limit))?;
            upload = Some((client_name, data));
        }
    }

    let (client_name, data) = upload.ok_or_else(|| Error::BadRequest {
        message: "No file part in the request".to_string(),
    })?;
    if client_name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "No file selected".to_string(),
        });
    }
    if !filename::is_allowed_upload(&client_name) {
        return Err(Error::UnsupportedExtension {
            filename: client_name,
        });
    }

    debug!(upload = %client_name, size = data.len(), "staging upload");

    let display_name = filename::display_output_name(&client_name);
    let input_name = filename::sanitize(&client_name);
    let output_name = filename::safe_output_name(&client_name);

    let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, Error> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join(&input_name);
        let output_path = workdir.path().join(&output_name);

        std::fs::write(&input_path, &data)?;
        strip::remove_macros(&input_path, &output_path)?;
        Ok(std::fs::read(&output_path)?)
    })
    .await
    .map_err(|e| Error::Other(anyhow::anyhow!("conversion task panicked: {e}")))??;

    info!(output = %display_name, size = bytes.len(), "macros removed");
    Ok(ConvertedWorkbook {
        display_name,
        bytes,
    })
}

/// Build the attachment download response for a converted workbook.
fn attachment_response(workbook: ConvertedWorkbook) -> Response {
    (
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                filename::attachment_content_disposition(&workbook.display_name),
            ),
        ],
        workbook.bytes,
    )
        .into_response()
}

/// `POST /` - browser form upload.
///
/// Failures redirect back to the form page with the message in the `error`
/// query parameter, where the page renders it as a flash box.
pub async fn convert_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    match run_conversion(&state, multipart).await {
        Ok(workbook) => attachment_response(workbook),
        Err(err) => {
            let status = err.status_code();
            let message = err.user_message();
            if status.is_server_error() {
                tracing::error!(error = %err, "conversion failed");
            } else {
                tracing::debug!(error = %err, "upload rejected");
            }
            let location = format!(
                "/?error={}",
                utf8_percent_encode(&message, NON_ALPHANUMERIC)
            );
            Redirect::to(&location).into_response()
        }
    }
}

/// `POST /api/remove-macro` - JSON API upload.
///
/// Failures map to `{"error": "..."}` with 400/413/500 via the `Error`
/// response impl.
pub async fn convert_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, Error> {
    let workbook = run_conversion(&state, multipart).await?;
    Ok(attachment_response(workbook))
}
