//! Route handlers.
//!
//! - `GET  /`                 upload form
//! - `POST /process`          encrypt or decrypt an uploaded file
//! - `GET  /download/{token}/{name}`  fetch a stored result
//! - `GET  /health`           liveness probe

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::AppState;
use super::page;
use crate::error::{ErrorCategory, ErrorKind, ImagecryptError};
use crate::operation::{self, Operation};

/// A failed request, rendered as the form with a message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Html(page::error_page(&self.message))).into_response()
    }
}

impl From<ImagecryptError> for ApiError {
    fn from(err: ImagecryptError) -> Self {
        let status = match (err.category, err.kind) {
            (_, Some(ErrorKind::MalformedContainer | ErrorKind::PaddingError)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            (ErrorCategory::User, _) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, source = ?err.source_error(), "request failed");
            return Self::new(status, "internal error");
        }

        let message = match err.kind {
            Some(ErrorKind::PaddingError) => {
                "Decryption failed: wrong password or corrupted file.".to_string()
            }
            Some(ErrorKind::MalformedContainer) => {
                format!("This file is not an encrypted file ({}).", err.message())
            }
            _ => err.to_string(),
        };
        Self::new(status, message)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        warn!(error = %err, "failed to read upload");
        Self::new(err.status(), err.body_text())
    }
}

/// The fields of one `/process` form submission.
struct Submission {
    file_name: String,
    data: Vec<u8>,
    password: Zeroizing<Vec<u8>>,
    op: Operation,
}

async fn read_submission(multipart: &mut Multipart) -> Result<Submission, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut password: Option<Zeroizing<Vec<u8>>> = None;
    let mut action: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await?;
                file = Some((file_name, data.to_vec()));
            }
            "password" => {
                password = Some(Zeroizing::new(field.bytes().await?.to_vec()));
            }
            "action" => {
                action = Some(field.text().await?);
            }
            _ => {
                // Skip unknown fields
            }
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No file provided."))?;
    let password =
        password.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No password provided."))?;
    let action =
        action.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No action provided."))?;
    let op = action.parse::<Operation>()?;

    let file_name = operation::base_name(&file_name).to_string();
    if file_name.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "The uploaded file has no name.",
        ));
    }

    Ok(Submission {
        file_name,
        data,
        password,
        op,
    })
}

/// GET /
pub async fn index() -> Html<String> {
    Html(page::index_page())
}

/// POST /process
///
/// Multipart form fields:
/// - `file`: the file to encrypt or decrypt (its name picks the output name)
/// - `password`: the password
/// - `action`: `encrypt` or `decrypt`
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, ApiError> {
    let submission = read_submission(&mut multipart).await?;
    let op = submission.op;
    let output_name = operation::output_name(&submission.file_name, op);
    let input_len = submission.data.len();

    let store = state.store.clone();
    let name = output_name.clone();
    // PBKDF2 blocks for a noticeable time; run it off the async workers.
    let (stored, output) = tokio::task::spawn_blocking(move || {
        let output = op.apply(&submission.data, &submission.password)?;
        let stored = store.save(&name, &output)?;
        Ok::<_, ImagecryptError>((stored, output))
    })
    .await
    .map_err(|e| {
        warn!(error = %e, "processing task failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?
    .map_err(|e| {
        info!(%op, error = %e, "request rejected");
        ApiError::from(e)
    })?;

    info!(
        %op,
        output = output_name.as_str(),
        input_bytes = input_len,
        output_bytes = output.len(),
        "processed upload"
    );
    Ok(Html(page::result_page(
        op,
        &stored.token,
        &stored.name,
        &output,
    )))
}

/// GET /download/{token}/{name}
pub async fn download(
    State(state): State<AppState>,
    Path((token, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let path = state.store.resolve(&token, &name)?;
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::new(StatusCode::NOT_FOUND, "No such file."));
        }
        Err(e) => {
            return Err(ImagecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to read {}", path.display()),
                e,
            )
            .into());
        }
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "imagecrypt",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
