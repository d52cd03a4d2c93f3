//! Streaming document bytes back to the browser.

use axum::body::{Body, Bytes};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use tokio::io::AsyncReadExt;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::model::Document;
use crate::storage::{ContentReader, PortalStorage};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self { Disposition::Inline => "inline", Disposition::Attachment => "attachment" }
    }
}

/// `filename` carries an ASCII stand-in; `filename*` carries the real name (RFC 5987).
pub(crate) fn content_disposition(kind: Disposition, file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    let fallback = if fallback.trim().is_empty() { "document.pdf".to_string() } else { fallback };
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        kind.as_str(),
        fallback,
        urlencoding::encode(file_name)
    )
}

fn reader_body(reader: ContentReader) -> Body {
    let stream = futures_util::stream::try_unfold(reader, |mut r| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = r.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), r)))
    });
    Body::from_stream(stream)
}

/// Open the document's content and build the streaming response.
pub(crate) async fn stream_document(storage: &dyn PortalStorage, doc: &Document, kind: Disposition) -> AppResult<Response> {
    let Some(reader) = storage.get_document_stream(&doc.content_ref).await? else {
        error!(
            target: "docportal::storage",
            doc = %doc.id, content_ref = %doc.content_ref,
            "integrity: metadata present but content missing"
        );
        return Err(AppError::not_found("content_missing", "Document content not found"));
    };

    let disposition = HeaderValue::from_str(&content_disposition(kind, &doc.file_name))
        .map_err(|e| AppError::internal("header_error", e.to_string()))?;
    let content_type = HeaderValue::from_str(&doc.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/pdf"));

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, doc.file_size)
        .header(CONTENT_DISPOSITION, disposition)
        .header(CACHE_CONTROL, "private, no-store")
        .body(reader_body(reader))
        .map_err(|e| AppError::internal("response_error", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_has_ascii_and_encoded_names() {
        let v = content_disposition(Disposition::Attachment, "Año \"fiscal\".pdf");
        assert!(v.starts_with("attachment; filename=\"A_o _fiscal_.pdf\""));
        assert!(v.ends_with("filename*=UTF-8''A%C3%B1o%20%22fiscal%22.pdf"));
        assert!(content_disposition(Disposition::Inline, "r.pdf").starts_with("inline; "));
    }
}
