//! File commands - list, locate and download the files of an account
//!
//! - `shdwdrive ls <account>` lists file names and CDN URLs
//! - `shdwdrive url <account> <name>` prints one file's CDN URL
//! - `shdwdrive get <account> <name>` downloads a file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use shdwdrive_core::domain::{format_bytes, StorageAccountKey, StoredFile};
use shdwdrive_core::ports::IFileReader;
use shdwdrive_http::client::StorageApiClient;
use shdwdrive_http::reader::HttpFileReader;

use crate::CliContext;

/// Parses a storage account key argument
pub fn parse_account(value: &str) -> Result<StorageAccountKey> {
    value
        .parse::<StorageAccountKey>()
        .with_context(|| format!("'{value}' is not a storage account key"))
}

pub fn file_reader(ctx: &CliContext) -> HttpFileReader {
    HttpFileReader::new(Arc::new(StorageApiClient::from_network(&ctx.config.network)))
}

// ============================================================================
// ls
// ============================================================================

#[derive(Debug, Args)]
pub struct LsCommand {
    /// Storage account key
    account: String,
}

impl LsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let key = parse_account(&self.account)?;
        let reader = file_reader(ctx);

        info!(account = %key, "Listing files");
        let files = reader.list_files(&key).await?;
        let cdn = reader.client().cdn();

        if ctx.is_json() {
            let entries: Vec<serde_json::Value> = files
                .iter()
                .map(|f| serde_json::json!({ "name": f.name, "url": f.url(cdn) }))
                .collect();
            formatter.print_json(&serde_json::json!({
                "storage_account": key.as_str(),
                "files": entries,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "{} file{} in {}",
            files.len(),
            if files.len() == 1 { "" } else { "s" },
            key
        ));
        for file in &files {
            formatter.info(&format!("{:<40} {}", file.name, file.url(cdn)));
        }
        Ok(())
    }
}

// ============================================================================
// url
// ============================================================================

#[derive(Debug, Args)]
pub struct UrlCommand {
    /// Storage account key
    account: String,
    /// File name
    name: String,
}

impl UrlCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let key = parse_account(&self.account)?;
        let url = StoredFile::new(key, self.name.clone()).url(&ctx.config.network.cdn);

        if ctx.is_json() {
            ctx.formatter()
                .print_json(&serde_json::json!({ "name": self.name, "url": url }));
        } else {
            println!("{url}");
        }
        Ok(())
    }
}

// ============================================================================
// get
// ============================================================================

#[derive(Debug, Args)]
pub struct GetCommand {
    /// Storage account key
    account: String,
    /// File name
    name: String,
    /// Destination path (defaults to the file name)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl GetCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let key = parse_account(&self.account)?;
        let file = StoredFile::new(key, self.name.clone());
        let destination = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name));

        info!(file = %file.entity_id(), "Downloading file");
        let data = file_reader(ctx).download_file(&file).await?;
        std::fs::write(&destination, &data)
            .with_context(|| format!("Failed to write {}", destination.display()))?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "name": file.name,
                "path": destination.display().to_string(),
                "bytes": data.len(),
            }));
        } else {
            formatter.success(&format!(
                "Saved {} ({})",
                destination.display(),
                format_bytes(data.len() as u64)
            ));
        }
        Ok(())
    }
}
