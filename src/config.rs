//!
//! docportal configuration
//! -----------------------
//! Runtime settings read from `DOCPORTAL_*` environment variables. The server binary
//! applies command-line overrides on top (see `src/main.rs`).

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::BackendSettings;

pub const DEFAULT_HTTP_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_BATCH_FILES: usize = 50;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_STAGING_MAX_AGE_SECS: u64 = 3600;

/// Account created at startup when its phone number is not registered yet.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub phone_number: String,
    pub password: String,
    pub name: Option<String>,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("phone_number", &self.phone_number)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub http_port: u16,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub max_batch_files: usize,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    pub staging_max_age: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            database_url: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            cookie_secure: false,
            staging_max_age: Duration::from_secs(DEFAULT_STAGING_MAX_AGE_SECS),
            bootstrap_admin: None,
        }
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back to the
    /// default for that setting.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let num = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        let http_port = lookup("DOCPORTAL_HTTP_PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(d.http_port);
        let database_url = non_empty(lookup("DOCPORTAL_DATABASE_URL"));
        let data_dir = non_empty(lookup("DOCPORTAL_DATA_DIR")).map(PathBuf::from).unwrap_or(d.data_dir);
        let max_upload_bytes = num("DOCPORTAL_MAX_UPLOAD_BYTES").filter(|n| *n > 0).unwrap_or(d.max_upload_bytes);
        let max_batch_files = num("DOCPORTAL_MAX_BATCH_FILES")
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(d.max_batch_files);
        let session_ttl = num("DOCPORTAL_SESSION_TTL_SECS")
            .filter(|n| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.session_ttl);
        let cookie_secure = lookup("DOCPORTAL_COOKIE_SECURE").and_then(|v| parse_bool(&v)).unwrap_or(d.cookie_secure);
        let staging_max_age = num("DOCPORTAL_STAGING_MAX_AGE_SECS").map(Duration::from_secs).unwrap_or(d.staging_max_age);

        let bootstrap_admin = match (non_empty(lookup("DOCPORTAL_ADMIN_PHONE")), lookup("DOCPORTAL_ADMIN_PASSWORD")) {
            (Some(phone_number), Some(password)) if !password.is_empty() => Some(BootstrapAdmin {
                phone_number,
                password,
                name: non_empty(lookup("DOCPORTAL_ADMIN_NAME")),
            }),
            _ => None,
        };

        Self {
            http_port,
            database_url,
            data_dir,
            max_upload_bytes,
            max_batch_files,
            session_ttl,
            cookie_secure,
            staging_max_age,
            bootstrap_admin,
        }
    }

    pub fn staging_dir(&self) -> PathBuf { self.data_dir.join("staging") }

    pub fn blob_dir(&self) -> PathBuf { self.data_dir.join("blobs") }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings { database_url: self.database_url.clone(), blob_root: self.blob_dir() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> PortalConfig {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        PortalConfig::from_lookup(|k| m.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = from_pairs(&[]);
        assert_eq!(c.http_port, 5000);
        assert!(c.database_url.is_none());
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.staging_dir(), PathBuf::from("data/staging"));
        assert_eq!(c.blob_dir(), PathBuf::from("data/blobs"));
        assert!(!c.cookie_secure);
        assert!(c.bootstrap_admin.is_none());
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let c = from_pairs(&[
            ("DOCPORTAL_HTTP_PORT", "8080"),
            ("DOCPORTAL_DATABASE_URL", "  "),
            ("DOCPORTAL_DATA_DIR", "/srv/portal"),
            ("DOCPORTAL_MAX_UPLOAD_BYTES", "not-a-number"),
            ("DOCPORTAL_SESSION_TTL_SECS", "60"),
            ("DOCPORTAL_COOKIE_SECURE", "YES"),
            ("DOCPORTAL_ADMIN_PHONE", "+15550001111"),
            ("DOCPORTAL_ADMIN_PASSWORD", "adminpw1"),
        ]);
        assert_eq!(c.http_port, 8080);
        assert!(c.database_url.is_none());
        assert_eq!(c.blob_dir(), PathBuf::from("/srv/portal/blobs"));
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(c.session_ttl, Duration::from_secs(60));
        assert!(c.cookie_secure);
        let admin = c.bootstrap_admin.unwrap();
        assert_eq!(admin.phone_number, "+15550001111");
        assert!(admin.name.is_none());
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
