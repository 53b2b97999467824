//! Motel CLI - Command-line access to an `ocimotel` registry.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so manifest and blob output can be piped.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "motel=info,motel_registry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.client_config();

    match cli.command {
        Commands::Manifest(args) => commands::manifest::execute(args, config).await,
        Commands::Blob(args) => commands::blob::execute(args, config).await,
        Commands::Version => {
            println!("motel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
