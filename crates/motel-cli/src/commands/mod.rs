//! CLI commands and argument parsing.

pub mod blob;
pub mod manifest;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;

use motel_registry::{ClientConfig, Locator, Transport, UploadMode};

/// Motel - move artifacts in and out of an ocimotel registry
#[derive(Parser)]
#[command(name = "motel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Request timeout in seconds
    #[arg(long, global = true, env = "MOTEL_TIMEOUT", default_value = "300")]
    pub timeout: u64,

    /// Connect timeout in seconds
    #[arg(long, global = true, env = "MOTEL_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// Upload blobs with a known digest in one request, letting the
    /// registry verify them
    #[arg(long, global = true)]
    pub trust_server: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the client configuration from the global flags.
    pub fn client_config(&self) -> ClientConfig {
        let mode = if self.trust_server {
            UploadMode::TrustServer
        } else {
            UploadMode::Verified
        };

        ClientConfig::new()
            .with_timeout(Duration::from_secs(self.timeout))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_upload_mode(mode)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Read, write or delete manifests
    Manifest(manifest::ManifestArgs),

    /// Probe, download or upload blobs
    Blob(blob::BlobArgs),

    /// Print version information
    Version,
}

/// Parses a location argument such as `//registry:5000/app:v1`.
fn parse_location(location: &str) -> Result<Locator> {
    Transport::new()
        .parse_reference(location)
        .with_context(|| format!("Invalid location '{location}'"))
}

/// Writes `data` to `output`, or to stdout when no path is given.
async fn write_output(output: Option<&Path>, data: &[u8]) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await.context("Failed to write to stdout")?;
            stdout.flush().await.context("Failed to flush stdout")
        }
    }
}
