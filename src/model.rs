//!
//! docportal data model
//! --------------------
//! Users (admins and clients), document metadata, and the inputs used to create or
//! modify them. Wire names are camelCase to match the JSON API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Role::Admin => "admin", Role::Client => "client" }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A registered account. The password hash is never serialized.
#[derive(Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("phone_number", &self.phone_number)
            .field("password_hash", &"<redacted>")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Input for creating a user. `password` is plaintext and only lives until hashed.
#[derive(Clone)]
pub struct NewUser {
    pub phone_number: String,
    pub password: String,
    pub role: Role,
    pub name: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("phone_number", &self.phone_number)
            .field("role", &self.role)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone_number.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPatch")
            .field("name", &self.name)
            .field("phone_number", &self.phone_number)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stored document metadata. `content_ref` locates the bytes inside the backend and
/// stays server-side.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub client_phone_number: String,
    pub upload_date: DateTime<Utc>,
    pub file_size: u64,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub content_ref: String,
    pub uploaded_by: String,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub client_phone_number: String,
    pub file_size: u64,
    pub uploaded_by: String,
    pub content_type: String,
}

impl NewDocument {
    pub fn pdf(file_name: impl Into<String>, client_phone_number: impl Into<String>, file_size: u64, uploaded_by: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            client_phone_number: client_phone_number.into(),
            file_size,
            uploaded_by: uploaded_by.into(),
            content_type: PDF_CONTENT_TYPE.to_string(),
        }
    }
}

/// Newest first; ties keep their incoming order.
pub fn sort_newest_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
}
