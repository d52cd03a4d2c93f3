//! Document endpoints.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::content::{stream_document, Disposition};
use super::upload::{receive, ReceivedUpload};
use super::{require_session, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::SessionIdentity;
use crate::ingest::{ingest_batch, ingest_one};
use crate::model::Document;
use crate::phone::normalize_phone;
use crate::policy::{authorize_document_read, document_scope, require_admin, Action, DocumentScope};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    client_phone_number: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    let storage = state.storage.get().await;
    let documents = match document_scope(&who, q.client_phone_number.as_deref())? {
        DocumentScope::All => storage.get_all_documents().await?,
        DocumentScope::Client(phone) => storage.get_documents_by_client(&phone).await?,
    };
    Ok(Json(json!({"documents": documents})))
}

/// Target phone for an upload; required and normalized.
fn upload_target(received: &ReceivedUpload) -> AppResult<String> {
    let raw = received
        .client_phone_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("missing_phone", "Client phone number is required"))?;
    normalize_phone(raw).map_err(|e| AppError::validation("invalid_phone", e.to_string()))
}

pub async fn upload(State(state): State<AppState>, headers: HeaderMap, multipart: Multipart) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    require_admin(&who, Action::Upload)?;

    let mut received = receive(&state, multipart, &["file"], 1).await?;
    let phone = upload_target(&received)?;
    let Some(staged) = received.files.pop() else {
        return Err(AppError::validation("missing_file", "No file uploaded"));
    };

    let storage = state.storage.get().await;
    let document = ingest_one(storage.as_ref(), staged, &phone, &who.user_id).await?;
    Ok(Json(json!({"document": document})))
}

pub async fn batch_upload(State(state): State<AppState>, headers: HeaderMap, multipart: Multipart) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    require_admin(&who, Action::BatchUpload)?;

    let received = receive(&state, multipart, &["files", "files[]"], state.config.max_batch_files).await?;
    let phone = upload_target(&received)?;
    if received.files.is_empty() {
        return Err(AppError::validation("missing_file", "No files uploaded"));
    }

    let storage = state.storage.get().await;
    let outcome = ingest_batch(storage.as_ref(), received.files, &phone, &who.user_id).await;
    Ok(Json(outcome))
}

async fn readable_document(state: &AppState, who: &SessionIdentity, id: &str) -> AppResult<Document> {
    let storage = state.storage.get().await;
    let doc = storage
        .get_document(id)
        .await?
        .ok_or_else(|| AppError::not_found("document_not_found", "Document not found"))?;
    authorize_document_read(who, &doc)?;
    Ok(doc)
}

async fn serve_content(state: AppState, headers: HeaderMap, id: String, kind: Disposition) -> AppResult<Response> {
    let (_, who) = require_session(&state, &headers)?;
    let doc = readable_document(&state, &who, &id).await?;
    let storage = state.storage.get().await;
    stream_document(storage.as_ref(), &doc, kind).await
}

pub async fn preview(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<Response> {
    serve_content(state, headers, id, Disposition::Inline).await
}

pub async fn download(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<Response> {
    serve_content(state, headers, id, Disposition::Attachment).await
}

pub async fn delete_document(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    require_admin(&who, Action::Delete)?;
    let storage = state.storage.get().await;
    if !storage.delete_document(&id).await? {
        return Err(AppError::not_found("document_not_found", "Document not found"));
    }
    info!(target: "docportal::http", doc = %id, by = %who.user_id, "document deleted");
    Ok(Json(json!({"success": true})))
}
