//! Upload ingestion: staged temp file -> validated -> persisted, or rejected and purged.
//!
//! Every function here consumes the `StagedFile` it is given and removes its temp file
//! before returning, whatever the outcome.

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::model::{Document, NewDocument, PDF_CONTENT_TYPE};
use crate::storage::staging::StagedFile;
use crate::storage::{ContentReader, PortalStorage};

const PDF_MAGIC: &[u8] = b"%PDF-";

fn not_a_pdf() -> AppError {
    AppError::upload("invalid_file_type", "Only PDF files are allowed")
}

/// Declared type must be PDF and the content must carry the PDF header.
pub async fn validate_pdf(staged: &StagedFile) -> AppResult<()> {
    let declared = staged
        .declared_type()
        .map(|t| t.split(';').next().unwrap_or("").trim().to_ascii_lowercase());
    if declared.as_deref() != Some(PDF_CONTENT_TYPE) {
        return Err(not_a_pdf());
    }
    let head = staged
        .head(PDF_MAGIC.len())
        .await
        .map_err(|e| AppError::internal("staging_error", format!("reading staged upload: {e}")))?;
    if head != PDF_MAGIC {
        return Err(not_a_pdf());
    }
    Ok(())
}

async fn persist(storage: &dyn PortalStorage, staged: &StagedFile, phone: &str, uploaded_by: &str) -> AppResult<Document> {
    validate_pdf(staged).await?;
    let file = tokio::fs::File::open(staged.path())
        .await
        .map_err(|e| AppError::internal("staging_error", format!("opening staged upload: {e}")))?;
    let content: ContentReader = Box::new(file);
    let new = NewDocument::pdf(staged.original_name(), phone, staged.size(), uploaded_by);
    Ok(storage.create_document(new, content).await?)
}

/// Validate and store one staged upload for `phone`.
pub async fn ingest_one(storage: &dyn PortalStorage, staged: StagedFile, phone: &str, uploaded_by: &str) -> AppResult<Document> {
    let res = persist(storage, &staged, phone, uploaded_by).await;
    match &res {
        Ok(doc) => info!(target: "docportal::ingest", doc = %doc.id, client = %phone, bytes = doc.file_size, "stored '{}'", doc.file_name),
        Err(e) if e.is_server_side() => warn!(target: "docportal::ingest", "failed to store '{}': {}", staged.original_name(), e),
        Err(e) => debug!(target: "docportal::ingest", "rejected '{}': {}", staged.original_name(), e),
    }
    staged.discard().await;
    res
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub documents: Vec<Document>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileError>,
    pub total_files: usize,
    pub success_count: usize,
    pub error_count: usize,
}

/// Ingest every staged file independently. One file failing never affects the others;
/// results keep the input order.
pub async fn ingest_batch(storage: &dyn PortalStorage, files: Vec<StagedFile>, phone: &str, uploaded_by: &str) -> BatchOutcome {
    let total_files = files.len();
    let tasks = files.into_iter().map(|staged| async move {
        let name = staged.original_name().to_string();
        (name, ingest_one(storage, staged, phone, uploaded_by).await)
    });
    let results = join_all(tasks).await;

    let mut documents = Vec::new();
    let mut errors = Vec::new();
    for (file_name, res) in results {
        match res {
            Ok(doc) => documents.push(doc),
            Err(e) => errors.push(FileError { file_name, error: e.public_message().to_string() }),
        }
    }
    info!(target: "docportal::ingest", client = %phone, total = total_files, ok = documents.len(), failed = errors.len(), "batch upload finished");
    BatchOutcome {
        success_count: documents.len(),
        error_count: errors.len(),
        total_files,
        documents,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewUser, User, UserPatch};
    use crate::storage::staging::StagingArea;
    use crate::storage::{MemoryStorage, StorageError, StorageResult};
    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;

    /// Memory backend whose document writes fail for one file name.
    struct FailingWrites {
        inner: MemoryStorage,
        fail_on: &'static str,
    }

    #[async_trait]
    impl PortalStorage for FailingWrites {
        fn backend_name(&self) -> &'static str { "failing" }
        async fn create_user(&self, new: NewUser) -> StorageResult<User> { self.inner.create_user(new).await }
        async fn get_user(&self, id: &str) -> StorageResult<Option<User>> { self.inner.get_user(id).await }
        async fn get_user_by_phone_number(&self, phone: &str) -> StorageResult<Option<User>> {
            self.inner.get_user_by_phone_number(phone).await
        }
        async fn update_user(&self, id: &str, patch: UserPatch) -> StorageResult<Option<User>> {
            self.inner.update_user(id, patch).await
        }
        async fn get_all_clients(&self) -> StorageResult<Vec<User>> { self.inner.get_all_clients().await }
        async fn create_document(&self, new: NewDocument, content: ContentReader) -> StorageResult<Document> {
            if new.file_name == self.fail_on {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.create_document(new, content).await
        }
        async fn get_document(&self, id: &str) -> StorageResult<Option<Document>> { self.inner.get_document(id).await }
        async fn get_documents_by_client(&self, phone: &str) -> StorageResult<Vec<Document>> {
            self.inner.get_documents_by_client(phone).await
        }
        async fn get_all_documents(&self) -> StorageResult<Vec<Document>> { self.inner.get_all_documents().await }
        async fn get_document_stream(&self, content_ref: &str) -> StorageResult<Option<ContentReader>> {
            self.inner.get_document_stream(content_ref).await
        }
        async fn delete_document(&self, id: &str) -> StorageResult<bool> { self.inner.delete_document(id).await }
    }

    async fn stage(area: &StagingArea, name: &str, ty: &str, bytes: &[u8]) -> StagedFile {
        let (mut staged, mut f) = area.create(name, Some(ty.to_string())).await.unwrap();
        f.write_all(bytes).await.unwrap();
        f.flush().await.unwrap();
        staged.set_size(bytes.len() as u64);
        staged
    }

    #[tokio::test]
    async fn single_pdf_is_stored_and_staging_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        let storage = MemoryStorage::new();
        let staged = stage(&area, "report.pdf", "application/pdf", b"%PDF-1.7 body").await;

        let doc = ingest_one(&storage, staged, "+15551234567", "admin-1").await.unwrap();
        assert_eq!(doc.file_name, "report.pdf");
        assert_eq!(doc.file_size, 13);
        assert_eq!(doc.content_type, "application/pdf");
        assert_eq!(area.pending(), 0);
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_before_any_write() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        let storage = MemoryStorage::new();

        let by_type = stage(&area, "notes.txt", "text/plain", b"%PDF-1.4 looks like pdf").await;
        let err = ingest_one(&storage, by_type, "+15551234567", "admin-1").await.unwrap_err();
        assert_eq!(err.http_status(), 400);

        let by_magic = stage(&area, "fake.pdf", "application/pdf", b"MZ not a pdf").await;
        assert!(ingest_one(&storage, by_magic, "+15551234567", "admin-1").await.is_err());

        assert!(storage.get_all_documents().await.unwrap().is_empty());
        assert_eq!(storage.blob_count(), 0);
        assert_eq!(area.pending(), 0);
    }

    #[tokio::test]
    async fn batch_isolates_a_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        let storage = MemoryStorage::new();

        let mut files = Vec::new();
        for i in 1..=5 {
            let body: &[u8] = if i == 3 { b"\x00\x01garbage" } else { b"%PDF-1.4 ok" };
            files.push(stage(&area, &format!("f{i}.pdf"), "application/pdf", body).await);
        }
        assert_eq!(area.pending(), 5);

        let out = ingest_batch(&storage, files, "+15551234567", "admin-1").await;
        assert_eq!(out.total_files, 5);
        assert_eq!(out.success_count, 4);
        assert_eq!(out.error_count, 1);
        assert_eq!(out.errors[0].file_name, "f3.pdf");
        assert_eq!(area.pending(), 0);
        assert_eq!(storage.get_documents_by_client("+15551234567").await.unwrap().len(), 4);

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["successCount"], 4);
        assert_eq!(v["errors"][0]["fileName"], "f3.pdf");
    }

    #[tokio::test]
    async fn batch_survives_a_storage_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        let storage = FailingWrites { inner: MemoryStorage::new(), fail_on: "f3.pdf" };

        let mut files = Vec::new();
        for i in 1..=5 {
            files.push(stage(&area, &format!("f{i}.pdf"), "application/pdf", b"%PDF-1.4 ok").await);
        }

        let out = ingest_batch(&storage, files, "+15551234567", "admin-1").await;
        assert_eq!(out.success_count, 4);
        assert_eq!(out.error_count, 1);
        assert_eq!(out.errors[0].file_name, "f3.pdf");
        assert_eq!(out.errors[0].error, "Internal server error");
        assert_eq!(area.pending(), 0);
        assert_eq!(storage.get_documents_by_client("+15551234567").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn storage_failure_still_clears_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        let storage = FailingWrites { inner: MemoryStorage::new(), fail_on: "only.pdf" };
        let staged = stage(&area, "only.pdf", "application/pdf", b"%PDF-1.4 ok").await;

        let err = ingest_one(&storage, staged, "+15551234567", "admin-1").await.unwrap_err();
        assert_eq!(err.http_status(), 500);
        assert_eq!(area.pending(), 0);
        assert_eq!(storage.inner.blob_count(), 0);
    }
}
