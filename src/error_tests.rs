use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::validation("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::auth("auth", "no").http_status(), 401);
    assert_eq!(AppError::forbidden("forbidden", "nope").http_status(), 403);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::conflict("conflict", "dup").http_status(), 400);
    assert_eq!(AppError::upload("not_pdf", "bad type").http_status(), 400);
    assert_eq!(AppError::too_large("too_large", "big").http_status(), 413);
    assert_eq!(AppError::from(StorageError::Io(std::io::Error::other("disk"))).http_status(), 500);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn server_side_messages_are_hidden() {
    let e = AppError::from(StorageError::Backend("connection refused at 10.0.0.4:5432".into()));
    assert!(e.is_server_side());
    assert_eq!(e.public_message(), "Internal server error");

    let e = AppError::validation("invalid_phone", "Invalid phone number");
    assert_eq!(e.public_message(), "Invalid phone number");
}

#[test]
fn storage_conflict_maps_to_conflict() {
    let e: AppError = StorageError::Conflict("phone already registered".into()).into();
    assert_eq!(e.code_str(), "phone_conflict");
    assert_eq!(e.http_status(), 400);

    let e: AppError = StorageError::Integrity("size mismatch".into()).into();
    assert_eq!(e.http_status(), 500);
}

#[tokio::test]
async fn into_response_renders_json_body() {
    let resp = AppError::forbidden("admin_required", "Admin access required").into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["error"], "Admin access required");
    assert_eq!(v["code"], "admin_required");
}
