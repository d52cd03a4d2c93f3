//! Multipart intake: every file part is streamed into the staging area with a
//! per-file size cap before anything else looks at it.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::storage::staging::StagedFile;

pub(crate) const PHONE_FIELD: &str = "clientPhoneNumber";

/// Parts of an upload request after staging.
#[derive(Debug, Default)]
pub(crate) struct ReceivedUpload {
    pub files: Vec<StagedFile>,
    pub client_phone_number: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::too_large("file_too_large", "Upload exceeds the size limit")
    } else {
        AppError::validation("invalid_multipart", e.body_text())
    }
}

async fn stage_field(state: &AppState, mut field: Field<'_>, file_name: String) -> AppResult<StagedFile> {
    let declared = field.content_type().map(str::to_string);
    let (mut staged, mut out) = state
        .staging
        .create(&file_name, declared)
        .await
        .map_err(|e| AppError::internal("staging_error", format!("creating staged file: {e}")))?;

    let limit = state.config.max_upload_bytes;
    let mut written: u64 = 0;
    // any early return drops `staged`, which removes the temp file
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > limit {
            debug!(target: "docportal::ingest", "'{}' exceeds {} bytes", file_name, limit);
            return Err(AppError::too_large(
                "file_too_large",
                format!("File '{}' exceeds the {} byte limit", file_name, limit),
            ));
        }
        out.write_all(&chunk)
            .await
            .map_err(|e| AppError::internal("staging_error", format!("writing staged file: {e}")))?;
    }
    out.flush()
        .await
        .map_err(|e| AppError::internal("staging_error", format!("flushing staged file: {e}")))?;
    staged.set_size(written);
    Ok(staged)
}

/// Read the whole multipart body. File parts are accepted under any of `file_fields`;
/// at most `max_files` of them. Other parts are ignored except the client phone.
pub(crate) async fn receive(
    state: &AppState,
    mut multipart: Multipart,
    file_fields: &[&str],
    max_files: usize,
) -> AppResult<ReceivedUpload> {
    let mut received = ReceivedUpload::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name == PHONE_FIELD {
            let text = field.text().await.map_err(multipart_error)?;
            received.client_phone_number = Some(text);
            continue;
        }
        // browsers send an empty filename for an unset file input
        let Some(file_name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else { continue };
        if !file_fields.contains(&name.as_str()) {
            continue;
        }
        if received.files.len() >= max_files {
            return Err(AppError::validation(
                "too_many_files",
                format!("At most {} files per request", max_files),
            ));
        }
        let staged = stage_field(state, field, file_name).await?;
        received.files.push(staged);
    }
    Ok(received)
}
