use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use password_hash::{PasswordHash, SaltString};

use crate::storage::StorageError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_ADMIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

// Verified against when the phone number is unknown so both paths cost the same.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| hash_password("docportal-dummy-password").unwrap_or_default());

/// Argon2 is CPU-bound; run it off the async workers.
pub async fn hash_password_blocking(password: String) -> Result<String, StorageError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| StorageError::Hashing(e.to_string()))?
        .map_err(|e| StorageError::Hashing(e.to_string()))
}

/// Verify off the async workers. `None` as hash burns the same time against a dummy hash
/// and always returns false.
pub async fn verify_password_blocking(hash: Option<String>, password: String) -> bool {
    let res = tokio::task::spawn_blocking(move || match hash {
        Some(h) => verify_password(&h, &password),
        None => {
            let _ = verify_password(&DUMMY_HASH, &password);
            false
        }
    })
    .await;
    res.unwrap_or(false)
}

/// Registration rule for client accounts.
pub fn check_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    Ok(())
}

/// Stricter rule applied when an admin changes their own password.
pub fn check_admin_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_ADMIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {MIN_ADMIN_PASSWORD_LEN} characters"));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }
    Ok(())
}
