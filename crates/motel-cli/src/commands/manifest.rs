//! Manifest command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use motel_registry::{ClientConfig, ImageDestination, ImageSource, Manifest};

use super::{parse_location, write_output};

/// Arguments for the manifest command.
#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest subcommand
    #[command(subcommand)]
    pub command: ManifestCommand,
}

/// Manifest operations.
#[derive(Subcommand)]
pub enum ManifestCommand {
    /// Fetch the manifest stored under a tag
    Get {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,

        /// Write the manifest here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store a manifest under a tag
    Put {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,

        /// Manifest file to upload
        file: PathBuf,
    },

    /// Delete the manifest stored under a tag
    Delete {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,
    },
}

/// Execute the manifest command.
pub async fn execute(args: ManifestArgs, config: ClientConfig) -> Result<()> {
    match args.command {
        ManifestCommand::Get { location, output } => {
            let locator = parse_location(&location)?;
            let source = locator
                .new_source(config)
                .await
                .context("Failed to open source")?;

            let (raw, media_type) = source
                .get_manifest(None)
                .await
                .context("Failed to fetch manifest")?;
            info!(location = %locator, media_type = %media_type, bytes = raw.len(), "Fetched manifest");

            write_output(output.as_deref(), &raw).await
        }
        ManifestCommand::Put { location, file } => {
            let locator = parse_location(&location)?;
            let raw = load_manifest(&file).await?;
            let destination = locator
                .new_destination(config)
                .await
                .context("Failed to open destination")?;

            destination
                .put_manifest(&raw)
                .await
                .context("Failed to store manifest")?;
            println!("Stored manifest ({} bytes) at {locator}", raw.len());
            Ok(())
        }
        ManifestCommand::Delete { location } => {
            let locator = parse_location(&location)?;
            locator
                .delete_image(config)
                .await
                .context("Failed to delete manifest")?;
            println!("Deleted {locator}");
            Ok(())
        }
    }
}

/// Reads a manifest file.
///
/// The bytes are uploaded unchanged; a file that does not decode as a
/// manifest is only warned about.
async fn load_manifest(path: &Path) -> Result<Vec<u8>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if let Err(e) = Manifest::from_slice(&raw) {
        warn!(path = %path.display(), error = %e, "File does not look like a manifest");
    }
    Ok(raw)
}
