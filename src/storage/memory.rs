//! In-memory backend for degraded mode.
//! Users, documents and content live behind one `RwLock`, so phone uniqueness checks
//! and document+content inserts are atomic.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{phone_conflict, ContentReader, PortalStorage, StorageError, StorageResult};
use crate::model::{sort_newest_first, Document, NewDocument, NewUser, Role, User, UserPatch};
use crate::security::hash_password_blocking;

const CONTENT_PREFIX: &str = "mem:";

#[derive(Default)]
struct MemoryInner {
    /// Registration order; users are never removed.
    users: Vec<User>,
    /// Upload order.
    documents: Vec<Document>,
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryInner {
    fn phone_taken(&self, phone: &str, except_id: Option<&str>) -> bool {
        self.users.iter().any(|u| u.phone_number == phone && Some(u.id.as_str()) != except_id)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    /// Number of content blobs held; used by tests to detect leaks.
    pub fn blob_count(&self) -> usize { self.inner.read().blobs.len() }
}

#[async_trait]
impl PortalStorage for MemoryStorage {
    fn backend_name(&self) -> &'static str { "memory" }

    async fn create_user(&self, new: NewUser) -> StorageResult<User> {
        let NewUser { phone_number, password, role, name } = new;
        let password_hash = hash_password_blocking(password).await?;
        let mut inner = self.inner.write();
        if inner.phone_taken(&phone_number, None) {
            return Err(phone_conflict(&phone_number));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            phone_number,
            password_hash,
            name,
            role,
            created_at: Utc::now(),
        };
        inner.users.push(user.clone());
        debug!(target: "docportal::storage", "memory: created {} id={}", user.role, user.id);
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self.inner.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_phone_number(&self, phone: &str) -> StorageResult<Option<User>> {
        Ok(self.inner.read().users.iter().find(|u| u.phone_number == phone).cloned())
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> StorageResult<Option<User>> {
        let UserPatch { name, phone_number, password } = patch;
        let new_hash = match password {
            Some(pw) => Some(hash_password_blocking(pw).await?),
            None => None,
        };
        let mut inner = self.inner.write();
        if let Some(phone) = phone_number.as_deref() {
            if inner.phone_taken(phone, Some(id)) {
                return Err(phone_conflict(phone));
            }
        }
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else { return Ok(None) };
        if let Some(n) = name { user.name = Some(n); }
        if let Some(p) = phone_number { user.phone_number = p; }
        if let Some(h) = new_hash { user.password_hash = h; }
        Ok(Some(user.clone()))
    }

    async fn get_all_clients(&self) -> StorageResult<Vec<User>> {
        Ok(self.inner.read().users.iter().filter(|u| u.role == Role::Client).cloned().collect())
    }

    async fn create_document(&self, new: NewDocument, mut content: ContentReader) -> StorageResult<Document> {
        let mut bytes = Vec::with_capacity(new.file_size as usize);
        content.read_to_end(&mut bytes).await?;
        if bytes.len() as u64 != new.file_size {
            return Err(StorageError::Integrity(format!(
                "expected {} bytes for '{}', read {}",
                new.file_size, new.file_name, bytes.len()
            )));
        }
        let id = Uuid::new_v4().to_string();
        let content_ref = format!("{CONTENT_PREFIX}{id}");
        let doc = Document {
            id,
            file_name: new.file_name,
            client_phone_number: new.client_phone_number,
            upload_date: Utc::now(),
            file_size: new.file_size,
            content_type: new.content_type,
            content_ref: content_ref.clone(),
            uploaded_by: new.uploaded_by,
        };
        let mut inner = self.inner.write();
        inner.blobs.insert(content_ref, Arc::from(bytes));
        inner.documents.push(doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, id: &str) -> StorageResult<Option<Document>> {
        Ok(self.inner.read().documents.iter().find(|d| d.id == id).cloned())
    }

    async fn get_documents_by_client(&self, phone: &str) -> StorageResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .inner
            .read()
            .documents
            .iter()
            .rev()
            .filter(|d| d.client_phone_number == phone)
            .cloned()
            .collect();
        sort_newest_first(&mut docs);
        Ok(docs)
    }

    async fn get_all_documents(&self) -> StorageResult<Vec<Document>> {
        let mut docs: Vec<Document> = self.inner.read().documents.iter().rev().cloned().collect();
        sort_newest_first(&mut docs);
        Ok(docs)
    }

    async fn get_document_stream(&self, content_ref: &str) -> StorageResult<Option<ContentReader>> {
        let blob = self.inner.read().blobs.get(content_ref).cloned();
        Ok(blob.map(|b| Box::new(Cursor::new(b)) as ContentReader))
    }

    async fn delete_document(&self, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write();
        let Some(pos) = inner.documents.iter().position(|d| d.id == id) else { return Ok(false) };
        let doc = inner.documents.remove(pos);
        if inner.blobs.remove(&doc.content_ref).is_none() {
            warn!(target: "docportal::storage", "memory: document {} had no content under '{}'", id, doc.content_ref);
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
