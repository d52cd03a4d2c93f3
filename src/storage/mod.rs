//!
//! docportal storage module
//! ------------------------
//! Persistence for user accounts (admins and clients) and uploaded documents.
//! A single `PortalStorage` trait fronts two interchangeable backends:
//!
//! - `MemoryStorage`: ephemeral maps behind one lock, used in degraded mode when no
//!   database is configured or reachable. Data is lost on restart.
//! - `PgStorage`: Postgres tables for metadata plus `FsBlobStore` for document bytes.
//!
//! Backend selection happens once, lazily, through `StorageHandle` (see `bootstrap`).
//! Callers hold a `SharedStorage` (`Arc<dyn PortalStorage>`) and never lock it
//! themselves; each backend is safe for concurrent use.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::model::{Document, NewDocument, NewUser, User, UserPatch};

pub mod blob;
pub mod bootstrap;
pub mod memory;
pub mod postgres;
pub mod staging;

pub use bootstrap::{ensure_bootstrap_admin, select_backend, BackendSettings, StorageHandle};
pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Readable document content.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

pub type SharedStorage = Arc<dyn PortalStorage>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Phone number already belongs to another account.
    #[error("{0}")]
    Conflict(String),
    /// Stored data does not match what was promised (size mismatch, missing blob).
    #[error("integrity: {0}")]
    Integrity(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("database: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("backend: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub(crate) fn phone_conflict(phone: &str) -> StorageError {
    StorageError::Conflict(format!("User with phone number {phone} already exists"))
}

#[async_trait]
pub trait PortalStorage: Send + Sync {
    /// Short backend label for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Hashes the password and persists the user. Fails with `Conflict` when the phone
    /// number is registered as either an admin or a client.
    async fn create_user(&self, new: NewUser) -> StorageResult<User>;

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>>;

    async fn get_user_by_phone_number(&self, phone: &str) -> StorageResult<Option<User>>;

    /// Returns the user only when the phone exists and the password matches.
    /// Unknown phone and wrong password are indistinguishable to the caller.
    async fn verify_password(&self, phone: &str, password: &str) -> StorageResult<Option<User>> {
        let user = self.get_user_by_phone_number(phone).await?;
        let hash = user.as_ref().map(|u| u.password_hash.clone());
        if crate::security::verify_password_blocking(hash, password.to_string()).await {
            Ok(user)
        } else {
            Ok(None)
        }
    }

    /// Applies the patch. `None` when the id is unknown; `Conflict` when a new phone
    /// number is taken by another account.
    async fn update_user(&self, id: &str, patch: UserPatch) -> StorageResult<Option<User>>;

    /// Clients in registration order.
    async fn get_all_clients(&self) -> StorageResult<Vec<User>>;

    /// Streams `content` into the blob store, then records the metadata. Either both
    /// land or neither does. The number of bytes read must equal `new.file_size`.
    async fn create_document(&self, new: NewDocument, content: ContentReader) -> StorageResult<Document>;

    async fn get_document(&self, id: &str) -> StorageResult<Option<Document>>;

    /// Newest first.
    async fn get_documents_by_client(&self, phone: &str) -> StorageResult<Vec<Document>>;

    /// Newest first.
    async fn get_all_documents(&self) -> StorageResult<Vec<Document>>;

    /// `None` when the content is missing; callers treat that as an integrity failure.
    async fn get_document_stream(&self, content_ref: &str) -> StorageResult<Option<ContentReader>>;

    /// True when the metadata row was removed. Content removal failures are logged only.
    async fn delete_document(&self, id: &str) -> StorageResult<bool>;
}
