//! Backend selection and first-run seeding.
//!
//! `StorageHandle` is the process-wide handle injected into the server state. The
//! backend is chosen on first access and reused for the rest of the process lifetime:
//! Postgres when a database URL is configured and reachable, otherwise the in-memory
//! backend (degraded mode).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::blob::FsBlobStore;
use super::{MemoryStorage, PgStorage, SharedStorage, StorageError, StorageResult};
use crate::model::{NewUser, Role, User};

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub database_url: Option<String>,
    pub blob_root: PathBuf,
}

#[derive(Clone)]
pub struct StorageHandle {
    cell: Arc<OnceCell<SharedStorage>>,
    settings: Arc<BackendSettings>,
}

impl StorageHandle {
    /// Selection deferred until the first `get`.
    pub fn lazy(settings: BackendSettings) -> Self {
        Self { cell: Arc::new(OnceCell::new()), settings: Arc::new(settings) }
    }

    /// Already-selected backend (tests, tools).
    pub fn ready(storage: SharedStorage) -> Self {
        let settings = BackendSettings { database_url: None, blob_root: PathBuf::new() };
        Self { cell: Arc::new(OnceCell::new_with(Some(storage))), settings: Arc::new(settings) }
    }

    pub async fn get(&self) -> SharedStorage {
        self.cell.get_or_init(|| select_backend(&self.settings)).await.clone()
    }

    pub fn is_initialized(&self) -> bool { self.cell.initialized() }
}

/// Pick the backend. Never fails: any problem with the persistent store falls back to
/// memory with a warning.
pub async fn select_backend(settings: &BackendSettings) -> SharedStorage {
    let Some(url) = settings.database_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!(target: "startup", "no database URL configured; using in-memory storage (data is lost on restart)");
        return Arc::new(MemoryStorage::new());
    };
    let blobs = match FsBlobStore::new(&settings.blob_root) {
        Ok(b) => b,
        Err(e) => {
            warn!(target: "startup", "blob root '{}' unusable ({}); falling back to in-memory storage", settings.blob_root.display(), e);
            return Arc::new(MemoryStorage::new());
        }
    };
    match PgStorage::connect(url, blobs).await {
        Ok(pg) => {
            info!(target: "startup", "connected to postgres; persistent storage enabled");
            Arc::new(pg)
        }
        Err(e) => {
            warn!(target: "startup", "postgres connection failed ({}); falling back to in-memory storage", e);
            Arc::new(MemoryStorage::new())
        }
    }
}

/// Create the configured admin when that phone number is not registered yet.
/// Returns the admin when one was created.
pub async fn ensure_bootstrap_admin(
    storage: &SharedStorage,
    phone_number: &str,
    password: &str,
    name: Option<&str>,
) -> StorageResult<Option<User>> {
    if let Some(existing) = storage.get_user_by_phone_number(phone_number).await? {
        if existing.role != Role::Admin {
            warn!(target: "startup", "bootstrap admin phone {} belongs to a client account; not promoting", phone_number);
        }
        return Ok(None);
    }
    let new = NewUser {
        phone_number: phone_number.to_string(),
        password: password.to_string(),
        role: Role::Admin,
        name: name.map(str::to_string),
    };
    match storage.create_user(new).await {
        Ok(user) => {
            info!(target: "startup", "created bootstrap admin {}", user.phone_number);
            Ok(Some(user))
        }
        // lost a race with another process seeding the same admin
        Err(StorageError::Conflict(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_url_selects_memory_once() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = StorageHandle::lazy(BackendSettings { database_url: None, blob_root: tmp.path().join("blobs") });
        assert!(!handle.is_initialized());
        let a = handle.get().await;
        let b = handle.get().await;
        assert_eq!(a.backend_name(), "memory");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unreachable_database_falls_back_to_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = BackendSettings {
            database_url: Some("postgres://nobody@127.0.0.1:1/none?connect_timeout=1".into()),
            blob_root: tmp.path().join("blobs"),
        };
        let storage = select_backend(&settings).await;
        assert_eq!(storage.backend_name(), "memory");
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let first = ensure_bootstrap_admin(&storage, "+15550001111", "adminpw1", Some("Owner")).await.unwrap();
        assert_eq!(first.as_ref().map(|u| u.role), Some(Role::Admin));
        let second = ensure_bootstrap_admin(&storage, "+15550001111", "other-pw1", None).await.unwrap();
        assert!(second.is_none());
        assert!(storage.verify_password("+15550001111", "adminpw1").await.unwrap().is_some());
    }
}
