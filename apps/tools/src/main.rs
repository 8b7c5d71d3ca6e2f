use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use file_manager::{
    config::{load_settings, normalize_endpoint, Settings},
    form::{FieldValue, FormSink},
    uploader::PendingFile,
    FileManager,
};
use serde::Deserialize;
use shared::domain::{CategoryId, FileType, FileUuid};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "file-manager")]
struct Cli {
    /// TOML file listing the categories (`[[file_types]]` tables).
    #[arg(long, default_value = "file_types.toml")]
    manifest: PathBuf,
    #[arg(long)]
    upload_url: Option<String>,
    #[arg(long)]
    delete_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files into a category.
    Drop {
        category_id: i64,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove a file from a category.
    Remove { category_id: i64, uuid: Uuid },
    /// Print the form value derived from the manifest.
    Show,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    file_types: Vec<FileType>,
}

struct LoggingSink;

impl FormSink for LoggingSink {
    fn publish(&self, value: FieldValue) {
        info!(
            files = value.files.len(),
            uploading = value.uploading,
            error = ?value.error,
            "form value changed"
        );
    }
}

fn load_manifest(path: &Path) -> Result<Vec<FileType>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    Ok(manifest.file_types)
}

fn apply_overrides(
    settings: &mut Settings,
    upload_url: Option<&str>,
    delete_url: Option<&str>,
) -> Result<()> {
    if let Some(url) = upload_url {
        settings.upload_url =
            normalize_endpoint(url).with_context(|| format!("invalid --upload-url '{url}'"))?;
    }
    if let Some(url) = delete_url {
        settings.delete_url =
            normalize_endpoint(url).with_context(|| format!("invalid --delete-url '{url}'"))?;
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    apply_overrides(
        &mut settings,
        cli.upload_url.as_deref(),
        cli.delete_url.as_deref(),
    )?;

    let file_types = load_manifest(&cli.manifest)?;
    let manager = FileManager::new(file_types, &settings, Arc::new(LoggingSink))
        .context("failed to build upload client")?;

    match cli.command {
        Command::Drop { category_id, files } => {
            let mut pending = Vec::with_capacity(files.len());
            for path in &files {
                pending.push(PendingFile::from_path(path).await?);
            }
            let outcome = manager
                .drop_files(CategoryId(category_id), pending)
                .await?;
            for name in &outcome.rejected {
                println!("rejected {name}");
            }
            for name in &outcome.invalid {
                println!("invalid filename {name}");
            }
            for uploaded in outcome.results.iter().flatten() {
                println!("uploaded {} as {}", uploaded.filename, uploaded.uuid);
            }
            let failed = outcome.results.iter().filter(|r| r.is_none()).count();
            if failed > 0 {
                println!("{failed} upload(s) failed");
            }
        }
        Command::Remove { category_id, uuid } => {
            let entry = manager
                .remove_file(CategoryId(category_id), FileUuid(uuid))
                .await?;
            print_json(&entry)?;
        }
        Command::Show => {}
    }

    print_json(&manager.field_value())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
