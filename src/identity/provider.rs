use async_trait::async_trait;
use crate::tprintln;

use super::principal::SessionIdentity;
use super::session::{Session, SessionManager};
use crate::error::{AppError, AppResult};
use crate::model::User;
use crate::phone::normalize_phone;
use crate::storage::StorageHandle;

#[derive(Clone)]
pub struct LoginRequest {
    pub phone_number: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest").field("phone_number", &self.phone_number).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
    pub user: User,
}

fn invalid_credentials() -> AppError {
    AppError::auth("invalid_credentials", "Invalid phone number or password")
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse>;
}

pub struct LocalAuthProvider {
    pub storage: StorageHandle,
    pub sm: SessionManager,
}

impl LocalAuthProvider {
    pub fn new(storage: StorageHandle, sm: SessionManager) -> Self { Self { storage, sm } }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        if req.phone_number.trim().is_empty() || req.password.is_empty() {
            return Err(AppError::validation("missing_credentials", "Phone number and password are required"));
        }
        // Accounts are stored normalized; fall back to the raw value for legacy rows.
        let phone = normalize_phone(&req.phone_number).unwrap_or_else(|_| req.phone_number.trim().to_string());
        let storage = self.storage.get().await;
        let Some(user) = storage.verify_password(&phone, &req.password).await? else {
            tprintln!("auth.login rejected phone={}", phone);
            return Err(invalid_credentials());
        };
        let session = self.sm.issue(SessionIdentity::from(&user))?;
        tprintln!("auth.login user={} role={}", user.id, user.role);
        Ok(LoginResponse { session, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::model::{NewUser, Role};
    use crate::storage::MemoryStorage;

    async fn provider() -> LocalAuthProvider {
        let mem = Arc::new(MemoryStorage::new());
        let handle = StorageHandle::ready(mem);
        handle.get().await.create_user(NewUser {
            phone_number: "+15551234567".into(),
            password: "secret1".into(),
            role: Role::Client,
            name: Some("Ada".into()),
        }).await.unwrap();
        LocalAuthProvider::new(handle, SessionManager::default())
    }

    #[tokio::test]
    async fn login_issues_session_for_valid_credentials() {
        let p = provider().await;
        let resp = p.login(&LoginRequest { phone_number: "+1 (555) 123-4567".into(), password: "secret1".into() }).await.unwrap();
        assert_eq!(resp.user.phone_number, "+15551234567");
        let who = p.sm.validate(&resp.session.token).unwrap();
        assert_eq!(who.role, Role::Client);
        assert_eq!(who.user_id, resp.user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_phone_look_the_same() {
        let p = provider().await;
        let a = p.login(&LoginRequest { phone_number: "+15551234567".into(), password: "nope".into() }).await.unwrap_err();
        let b = p.login(&LoginRequest { phone_number: "+15559999999".into(), password: "secret1".into() }).await.unwrap_err();
        assert_eq!(a, b);
        assert_eq!(a.http_status(), 401);
        assert_eq!(p.sm.live_count(), 0);
    }
}
