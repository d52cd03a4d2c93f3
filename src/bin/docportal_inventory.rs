//!
//! docportal inventory tool
//! ------------------------
//! Connects with the server's configuration and prints what the selected backend
//! holds: clients, documents, and the roster including phone numbers that have
//! documents but no account. Exits non-zero when the backend cannot be read.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use docportal::config::PortalConfig;
use docportal::roster::{aggregate, RosterEntry};
use docportal::storage::select_backend;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))?;
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("docportal_inventory\n\nUSAGE:\n  docportal_inventory [--database-url URL] [--data-dir PATH]\n\nReads DOCPORTAL_* environment variables like the server.\n");
        return Ok(());
    }

    let mut config = PortalConfig::from_env();
    if let Some(url) = arg_value(&args, "--database-url") {
        config.database_url = Some(url);
    }
    if let Some(dir) = arg_value(&args, "--data-dir") {
        config.data_dir = PathBuf::from(dir);
    }

    let storage = select_backend(&config.backend_settings()).await;
    println!("Backend: {}", storage.backend_name());
    if config.database_url.is_some() && storage.backend_name() == "memory" {
        anyhow::bail!("database configured but unreachable; see warnings above");
    }

    let clients = storage.get_all_clients().await.context("While listing clients")?;
    let documents = storage.get_all_documents().await.context("While listing documents")?;

    println!("\nClients ({}):", clients.len());
    for c in &clients {
        println!("- {} {} (since {})", c.phone_number, c.name.as_deref().unwrap_or("-"), c.created_at.to_rfc3339());
    }

    let total_bytes: u64 = documents.iter().map(|d| d.file_size).sum();
    println!("\nDocuments ({}, {} bytes):", documents.len(), total_bytes);
    for d in documents.iter().take(20) {
        println!("- {} {} -> {} ({} bytes, {})", d.id, d.file_name, d.client_phone_number, d.file_size, d.upload_date.to_rfc3339());
    }
    if documents.len() > 20 {
        println!("  ... {} more", documents.len() - 20);
    }

    let roster = aggregate(&clients, &documents);
    let orphaned: Vec<&RosterEntry> = roster.iter().filter(|e| !e.is_registered()).collect();
    println!("\nRoster ({} entries, {} unregistered):", roster.len(), orphaned.len());
    for e in &roster {
        let tag = if e.is_registered() { "registered" } else { "UNREGISTERED" };
        println!("- {} [{}] documents={}", e.phone_number(), tag, e.document_count());
    }
    Ok(())
}
