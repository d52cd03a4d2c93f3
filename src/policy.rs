//! Access policy.
//!
//! Pure checks over the caller's `SessionIdentity`. Handlers call these before touching
//! storage; nothing here performs I/O except `check_phone_available`, which only reads.

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::SessionIdentity;
use crate::model::Document;
use crate::phone::normalize_phone;
use crate::storage::PortalStorage;

/// Operations reserved to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    BatchUpload,
    Delete,
    ListClients,
    UpdateProfile,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::BatchUpload => "batch_upload",
            Action::Delete => "delete",
            Action::ListClients => "list_clients",
            Action::UpdateProfile => "update_profile",
        }
    }
}

pub fn require_admin(who: &SessionIdentity, action: Action) -> AppResult<()> {
    if who.is_admin() {
        return Ok(());
    }
    debug!(target: "docportal::http", user = %who.user_id, action = action.as_str(), "admin action denied");
    Err(AppError::forbidden("admin_required", "Admin access required"))
}

/// Admins read everything; clients read only documents filed under their own phone.
pub fn authorize_document_read(who: &SessionIdentity, doc: &Document) -> AppResult<()> {
    if who.is_admin() || doc.client_phone_number == who.phone_number {
        return Ok(());
    }
    debug!(target: "docportal::http", user = %who.user_id, doc = %doc.id, "document read denied");
    Err(AppError::forbidden("access_denied", "Access denied"))
}

/// Which documents a listing request may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentScope {
    All,
    Client(String),
}

/// Resolve the listing scope from the optional `clientPhoneNumber` filter.
///
/// Admins may filter by any phone. The filter is normalized when it parses as a phone
/// number and used verbatim otherwise, so documents filed under malformed numbers stay
/// reachable. Clients always get their own phone; asking for another one is forbidden.
pub fn document_scope(who: &SessionIdentity, requested: Option<&str>) -> AppResult<DocumentScope> {
    let requested = requested.map(str::trim).filter(|s| !s.is_empty());
    if who.is_admin() {
        return Ok(match requested {
            None => DocumentScope::All,
            Some(raw) => DocumentScope::Client(normalize_phone(raw).unwrap_or_else(|_| raw.to_string())),
        });
    }
    if let Some(raw) = requested {
        let wanted = normalize_phone(raw).unwrap_or_else(|_| raw.to_string());
        if wanted != who.phone_number {
            return Err(AppError::forbidden("access_denied", "Clients can only list their own documents"));
        }
    }
    Ok(DocumentScope::Client(who.phone_number.clone()))
}

/// Fails with a conflict when `phone` belongs to an account other than `user_id`.
/// The backends re-check atomically on write; this gives an early, friendly answer.
pub async fn check_phone_available(storage: &dyn PortalStorage, user_id: &str, phone: &str) -> AppResult<()> {
    match storage.get_user_by_phone_number(phone).await? {
        Some(existing) if existing.id != user_id => {
            Err(AppError::conflict("phone_conflict", "Phone number is already in use"))
        }
        _ => Ok(()),
    }
}
