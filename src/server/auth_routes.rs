//! Account endpoints: login, register, logout, me, roster, admin profile.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{clear_session_cookie, json_body, parse_cookie, require_session, set_session_cookie, AppState, SESSION_COOKIE};
use crate::error::{AppError, AppResult};
use crate::identity::{AuthProvider, LoginRequest, SessionIdentity};
use crate::model::{NewUser, Role, UserPatch};
use crate::phone::normalize_phone;
use crate::policy::{check_phone_available, require_admin, Action};
use crate::roster::build_roster;
use crate::security::{check_admin_password, check_password};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    password: String,
    name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    name: Option<String>,
    phone_number: Option<String>,
    password: Option<String>,
}

fn present(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn invalid_phone(e: impl std::fmt::Display) -> AppError {
    AppError::validation("invalid_phone", e.to_string())
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let p = json_body(payload)?;
    let resp = state
        .auth
        .login(&LoginRequest { phone_number: p.phone_number, password: p.password })
        .await?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, set_session_cookie(&resp.session.token, &state.config)?);
    Ok((headers, Json(json!({"user": resp.user}))))
}

/// Self-service signup. Always creates a client account and signs it in.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let p = json_body(payload)?;
    let phone = normalize_phone(&p.phone_number).map_err(invalid_phone)?;
    check_password(&p.password).map_err(|m| AppError::validation("weak_password", m))?;

    let storage = state.storage.get().await;
    let user = storage
        .create_user(NewUser { phone_number: phone, password: p.password, role: Role::Client, name: present(p.name) })
        .await?;
    info!(target: "docportal::http", user = %user.id, "client registered");

    let session = state.sessions.issue(SessionIdentity::from(&user))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, set_session_cookie(&session.token, &state.config)?);
    Ok((headers, Json(json!({"user": user}))))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.sessions.logout(&token);
    }
    let mut h = HeaderMap::new();
    h.insert(SET_COOKIE, clear_session_cookie(&state.config));
    (h, Json(json!({"success": true})))
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let (token, who) = require_session(&state, &headers)?;
    let storage = state.storage.get().await;
    match storage.get_user(&who.user_id).await? {
        Some(user) => Ok(Json(json!({"user": user}))),
        None => {
            // account vanished (degraded-mode restart); the session is useless
            state.sessions.logout(&token);
            Err(AppError::auth("not_authenticated", "Not authenticated"))
        }
    }
}

pub async fn clients(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    require_admin(&who, Action::ListClients)?;
    let storage = state.storage.get().await;
    let roster = build_roster(storage.as_ref()).await?;
    Ok(Json(json!({"clients": roster})))
}

/// Admin changes their own name, phone number or password.
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProfilePayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let (_, who) = require_session(&state, &headers)?;
    require_admin(&who, Action::UpdateProfile)?;
    let p = json_body(payload)?;

    let mut patch = UserPatch {
        name: present(p.name),
        phone_number: None,
        password: p.password.filter(|s| !s.is_empty()),
    };
    if let Some(raw) = present(p.phone_number) {
        patch.phone_number = Some(normalize_phone(&raw).map_err(invalid_phone)?);
    }
    if patch.is_empty() {
        return Err(AppError::validation("no_changes", "No fields to update"));
    }
    if let Some(pw) = patch.password.as_deref() {
        check_admin_password(pw).map_err(|m| AppError::validation("weak_password", m))?;
    }

    let storage = state.storage.get().await;
    if let Some(phone) = patch.phone_number.as_deref() {
        check_phone_available(storage.as_ref(), &who.user_id, phone).await?;
    }
    let phone_changed = patch.phone_number.is_some();
    let user = storage
        .update_user(&who.user_id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("user_not_found", "User not found"))?;
    if phone_changed {
        state.sessions.refresh_identity(&SessionIdentity::from(&user));
    }
    info!(target: "docportal::http", user = %user.id, phone_changed = phone_changed, "admin profile updated");
    Ok(Json(json!({"user": user})))
}
