//! Blob command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use motel_registry::{
    stream, BlobInfo, BlobStream, ClientConfig, Digest, ImageDestination, ImageSource,
    RegistryClient,
};

use super::parse_location;

/// Arguments for the blob command.
#[derive(Args)]
pub struct BlobArgs {
    /// Blob subcommand
    #[command(subcommand)]
    pub command: BlobCommand,
}

/// Blob operations.
#[derive(Subcommand)]
pub enum BlobCommand {
    /// Check whether the registry holds a blob
    Exists {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,

        /// Blob digest, e.g. `sha256:...`
        digest: String,
    },

    /// Download a blob
    Get {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,

        /// Blob digest, e.g. `sha256:...`
        digest: String,

        /// Write the blob here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a blob
    Put {
        /// Location, e.g. `//registry:5000/app:v1`
        location: String,

        /// File to upload
        file: PathBuf,

        /// Expected digest; enables the already-present check
        #[arg(long)]
        digest: Option<String>,
    },
}

/// Execute the blob command.
pub async fn execute(args: BlobArgs, config: ClientConfig) -> Result<()> {
    match args.command {
        BlobCommand::Exists { location, digest } => {
            let locator = parse_location(&location)?;
            let client = RegistryClient::connect(locator, config)
                .await
                .context("Failed to connect to registry")?;

            // Any string is probed as given; a malformed digest reads as absent.
            let present = client.has_layer_named(&digest).await;
            println!("{digest}: {}", if present { "present" } else { "absent" });
            Ok(())
        }
        BlobCommand::Get {
            location,
            digest,
            output,
        } => {
            let locator = parse_location(&location)?;
            let digest = parse_digest(&digest)?;
            let source = locator
                .new_source(config)
                .await
                .context("Failed to open source")?;

            let (body, _) = source
                .get_blob(&BlobInfo::with_digest(digest.clone()))
                .await
                .context("Failed to fetch blob")?;

            let written = match output {
                Some(path) => {
                    let file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    copy_stream(body, file).await?
                }
                None => copy_stream(body, tokio::io::stdout()).await?,
            };
            info!(digest = %digest, bytes = written, "Downloaded blob");
            Ok(())
        }
        BlobCommand::Put {
            location,
            file,
            digest,
        } => {
            let locator = parse_location(&location)?;
            let info = match digest {
                Some(digest) => BlobInfo::with_digest(parse_digest(&digest)?),
                None => BlobInfo::unknown(),
            };
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let destination = locator
                .new_destination(config)
                .await
                .context("Failed to open destination")?;

            let stored = destination
                .put_blob(stream::from_reader(reader), &info)
                .await
                .context("Failed to upload blob")?;

            match (&stored.digest, stored.has_size()) {
                (Some(digest), true) => println!("{digest} ({} bytes)", stored.size),
                (Some(digest), false) => println!("{digest} (already present)"),
                (None, _) => println!("stored"),
            }
            Ok(())
        }
    }
}

fn parse_digest(digest: &str) -> Result<Digest> {
    Digest::parse(digest).with_context(|| format!("Invalid digest '{digest}'"))
}

/// Copies a blob stream into `writer`, returning the number of bytes.
async fn copy_stream<W>(mut body: BlobStream, mut writer: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await.context("Failed reading blob")? {
        writer.write_all(&chunk).await.context("Failed writing blob")?;
        written += chunk.len() as u64;
    }
    writer.flush().await.context("Failed writing blob")?;
    Ok(written)
}
