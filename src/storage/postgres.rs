//! Persistent backend: Postgres for users and document metadata, `FsBlobStore` for
//! document bytes.
//!
//! Admins and clients live in separate tables, each with a unique `phone_number`.
//! Uniqueness across the two tables is enforced by taking a transaction-scoped
//! advisory lock before every check-then-write on a phone number.
//!
//! Two connections are held. User writes run their transactions one at a time on
//! `txn`; every other statement goes through `shared`, which pipelines concurrent
//! queries from any number of requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blob::FsBlobStore;
use super::{phone_conflict, ContentReader, PortalStorage, StorageError, StorageResult};
use crate::model::{Document, NewDocument, NewUser, Role, User, UserPatch};
use crate::security::hash_password_blocking;

const PHONE_LOCK_KEY: i64 = 0x646f_6370_6f72_7401;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS admins (
    id TEXT PRIMARY KEY,
    phone_number TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    phone_number TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    client_phone_number TEXT NOT NULL,
    upload_date TIMESTAMPTZ NOT NULL,
    file_size BIGINT NOT NULL,
    content_type TEXT NOT NULL,
    content_ref TEXT NOT NULL,
    uploaded_by TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS documents_client_phone_idx ON documents (client_phone_number);
CREATE INDEX IF NOT EXISTS documents_upload_date_idx ON documents (upload_date DESC);
";

const USER_COLS: &str = "id, phone_number, password_hash, name, created_at";
const DOC_COLS: &str = "id, file_name, client_phone_number, upload_date, file_size, content_type, content_ref, uploaded_by";

fn table_for(role: Role) -> &'static str {
    match role { Role::Admin => "admins", Role::Client => "clients" }
}

fn row_to_user(row: &Row, role: Role) -> User {
    User {
        id: row.get("id"),
        phone_number: row.get("phone_number"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        role,
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
    }
}

fn row_to_user_tagged(row: &Row) -> StorageResult<User> {
    let tag: String = row.get("role");
    let role = Role::parse(&tag).ok_or_else(|| StorageError::Backend(format!("unknown role tag '{tag}'")))?;
    Ok(row_to_user(row, role))
}

fn row_to_document(row: &Row) -> Document {
    let size: i64 = row.get("file_size");
    Document {
        id: row.get("id"),
        file_name: row.get("file_name"),
        client_phone_number: row.get("client_phone_number"),
        upload_date: row.get("upload_date"),
        file_size: size.max(0) as u64,
        content_type: row.get("content_type"),
        content_ref: row.get("content_ref"),
        uploaded_by: row.get("uploaded_by"),
    }
}

async fn lock_phones(tx: &Transaction<'_>) -> StorageResult<()> {
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&PHONE_LOCK_KEY]).await?;
    Ok(())
}

async fn phone_taken(tx: &Transaction<'_>, phone: &str, except_id: &str) -> StorageResult<bool> {
    let rows = tx
        .query(
            "SELECT 1 FROM admins WHERE phone_number = $1 AND id <> $2
             UNION ALL
             SELECT 1 FROM clients WHERE phone_number = $1 AND id <> $2
             LIMIT 1",
            &[&phone, &except_id],
        )
        .await?;
    Ok(!rows.is_empty())
}

async fn open_client(cfg: &Config, label: &'static str) -> StorageResult<Client> {
    let (client, conn) = cfg.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!(target: "docportal::storage", "postgres {} connection closed: {}", label, e);
        }
    });
    Ok(client)
}

pub struct PgStorage {
    // `transaction()` needs `&mut Client`.
    txn: Mutex<Client>,
    shared: Client,
    blobs: FsBlobStore,
}

impl PgStorage {
    /// Connect, drive the connections in the background, and create tables if needed.
    pub async fn connect(url: &str, blobs: FsBlobStore) -> StorageResult<Self> {
        let cfg: Config = url.parse().map_err(|e: tokio_postgres::Error| StorageError::Backend(format!("invalid postgres url: {e}")))?;
        let shared = open_client(&cfg, "shared").await?;
        shared.batch_execute(SCHEMA_SQL).await?;
        let txn = open_client(&cfg, "txn").await?;
        info!(target: "docportal::storage", "postgres schema ready; blobs under '{}'", blobs.root().display());
        Ok(Self { txn: Mutex::new(txn), shared, blobs })
    }

    pub fn blobs(&self) -> &FsBlobStore { &self.blobs }

    async fn find_user(&self, where_clause: &str, value: &str) -> StorageResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLS}, 'admin' AS role FROM admins WHERE {where_clause}
             UNION ALL
             SELECT {USER_COLS}, 'client' AS role FROM clients WHERE {where_clause}"
        );
        let rows = self.shared.query(sql.as_str(), &[&value]).await?;
        rows.first().map(row_to_user_tagged).transpose()
    }
}

#[async_trait]
impl PortalStorage for PgStorage {
    fn backend_name(&self) -> &'static str { "postgres" }

    async fn create_user(&self, new: NewUser) -> StorageResult<User> {
        let NewUser { phone_number, password, role, name } = new;
        let password_hash = hash_password_blocking(password).await?;
        let id = Uuid::new_v4().to_string();

        let mut client = self.txn.lock().await;
        let tx = client.transaction().await?;
        lock_phones(&tx).await?;
        if phone_taken(&tx, &phone_number, &id).await? {
            return Err(phone_conflict(&phone_number));
        }
        let sql = format!(
            "INSERT INTO {} (id, phone_number, password_hash, name) VALUES ($1, $2, $3, $4) RETURNING {USER_COLS}",
            table_for(role)
        );
        let row = tx.query_one(sql.as_str(), &[&id, &phone_number, &password_hash, &name]).await?;
        tx.commit().await?;
        let user = row_to_user(&row, role);
        debug!(target: "docportal::storage", "postgres: created {} id={}", user.role, user.id);
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        self.find_user("id = $1", id).await
    }

    async fn get_user_by_phone_number(&self, phone: &str) -> StorageResult<Option<User>> {
        self.find_user("phone_number = $1", phone).await
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> StorageResult<Option<User>> {
        let UserPatch { name, phone_number, password } = patch;
        let new_hash = match password {
            Some(pw) => Some(hash_password_blocking(pw).await?),
            None => None,
        };

        let mut client = self.txn.lock().await;
        let tx = client.transaction().await?;
        lock_phones(&tx).await?;

        let found = tx
            .query(
                "SELECT 'admin' AS role FROM admins WHERE id = $1
                 UNION ALL
                 SELECT 'client' AS role FROM clients WHERE id = $1",
                &[&id],
            )
            .await?;
        let Some(role) = found.first().and_then(|r| Role::parse(r.get::<_, &str>("role"))) else {
            return Ok(None);
        };
        if let Some(phone) = phone_number.as_deref() {
            if phone_taken(&tx, phone, id).await? {
                return Err(phone_conflict(phone));
            }
        }
        let sql = format!(
            "UPDATE {} SET name = COALESCE($2, name),
                 phone_number = COALESCE($3, phone_number),
                 password_hash = COALESCE($4, password_hash)
             WHERE id = $1 RETURNING {USER_COLS}",
            table_for(role)
        );
        let row = tx.query_opt(sql.as_str(), &[&id, &name, &phone_number, &new_hash]).await?;
        tx.commit().await?;
        Ok(row.map(|r| row_to_user(&r, role)))
    }

    async fn get_all_clients(&self) -> StorageResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLS} FROM clients ORDER BY created_at ASC, id ASC");
        let rows = self.shared.query(sql.as_str(), &[]).await?;
        Ok(rows.iter().map(|r| row_to_user(r, Role::Client)).collect())
    }

    async fn create_document(&self, new: NewDocument, content: ContentReader) -> StorageResult<Document> {
        let id = Uuid::new_v4().to_string();
        let (content_ref, written) = self.blobs.write(&id, content).await?;
        if written != new.file_size {
            self.blobs.remove_logged(&content_ref).await;
            return Err(StorageError::Integrity(format!(
                "expected {} bytes for '{}', wrote {}",
                new.file_size, new.file_name, written
            )));
        }
        let size = i64::try_from(new.file_size).map_err(|_| StorageError::Integrity("file size out of range".into()))?;
        let upload_date = Utc::now();
        let sql = format!(
            "INSERT INTO documents ({DOC_COLS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {DOC_COLS}"
        );
        let res = self
            .shared
            .query_one(
                sql.as_str(),
                &[&id, &new.file_name, &new.client_phone_number, &upload_date, &size, &new.content_type, &content_ref, &new.uploaded_by],
            )
            .await;
        match res {
            Ok(row) => Ok(row_to_document(&row)),
            Err(e) => {
                // metadata failed; drop the content so nothing is orphaned
                self.blobs.remove_logged(&content_ref).await;
                Err(e.into())
            }
        }
    }

    async fn get_document(&self, id: &str) -> StorageResult<Option<Document>> {
        let sql = format!("SELECT {DOC_COLS} FROM documents WHERE id = $1");
        let row = self.shared.query_opt(sql.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn get_documents_by_client(&self, phone: &str) -> StorageResult<Vec<Document>> {
        let sql = format!("SELECT {DOC_COLS} FROM documents WHERE client_phone_number = $1 ORDER BY upload_date DESC");
        let rows = self.shared.query(sql.as_str(), &[&phone]).await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn get_all_documents(&self) -> StorageResult<Vec<Document>> {
        let sql = format!("SELECT {DOC_COLS} FROM documents ORDER BY upload_date DESC");
        let rows = self.shared.query(sql.as_str(), &[]).await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn get_document_stream(&self, content_ref: &str) -> StorageResult<Option<ContentReader>> {
        Ok(self.blobs.open(content_ref).await?)
    }

    async fn delete_document(&self, id: &str) -> StorageResult<bool> {
        let row = self
            .shared
            .query_opt("DELETE FROM documents WHERE id = $1 RETURNING content_ref", &[&id])
            .await?;
        let Some(row) = row else { return Ok(false) };
        let content_ref: String = row.get("content_ref");
        self.blobs.remove_logged(&content_ref).await;
        Ok(true)
    }
}
