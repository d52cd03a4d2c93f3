//!
//! docportal server binary
//! -----------------------
//! Command-line entry point for the document portal HTTP server. Settings come from
//! `DOCPORTAL_*` environment variables; the flags below override them.

use anyhow::Result;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use docportal::config::PortalConfig;

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    arg_value(args, flag).and_then(|v| v.parse::<u16>().ok())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"     _                            _        _
  __| | ___   ___ _ __   ___  _ __| |_ __ _| |
 / _` |/ _ \ / __| '_ \ / _ \| '__| __/ _` | |
| (_| | (_) | (__| |_) | (_) | |  | || (_| | |
 \__,_|\___/ \___| .__/ \___/|_|   \__\__,_|_|
                 |_|");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    let _ = fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("docportal Server\n\nUSAGE:\n  docportal [--http-port N] [--database-url URL] [--data-dir PATH]\n\nOPTIONS:\n  --http-port N         HTTP port (env: DOCPORTAL_HTTP_PORT, default 5000)\n  --database-url URL    Postgres URL (env: DOCPORTAL_DATABASE_URL). Unset runs on in-memory storage.\n  --data-dir PATH       Blob and staging root (env: DOCPORTAL_DATA_DIR, default data)\n\nOther settings: DOCPORTAL_MAX_UPLOAD_BYTES, DOCPORTAL_MAX_BATCH_FILES, DOCPORTAL_SESSION_TTL_SECS,\nDOCPORTAL_COOKIE_SECURE, DOCPORTAL_STAGING_MAX_AGE_SECS, DOCPORTAL_ADMIN_PHONE, DOCPORTAL_ADMIN_PASSWORD,\nDOCPORTAL_ADMIN_NAME.\n");
        return Ok(());
    }

    // CLI arguments override environment
    let mut config = PortalConfig::from_env();
    if let Some(port) = parse_port_arg(&args, "--http-port") {
        config.http_port = port;
    }
    if let Some(url) = arg_value(&args, "--database-url").filter(|u| !u.trim().is_empty()) {
        config.database_url = Some(url);
    }
    if let Some(dir) = arg_value(&args, "--data-dir") {
        config.data_dir = PathBuf::from(dir);
    }

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "docportal starting: RUST_LOG='{}', http_port={}, data_dir='{}', database={}",
        rust_log,
        config.http_port,
        config.data_dir.display(),
        if config.database_url.is_some() { "configured" } else { "none (in-memory)" }
    );

    docportal::server::run_with_config(config).await
}
