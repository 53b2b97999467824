//! # Motel Registry
//!
//! Client for the `ocimotel` transport: moving artifacts into and out of a
//! content-addressable registry that speaks the OCI distribution protocol.
//!
//! Blobs are addressed by digest and manifests by repository and tag. The
//! heart of the crate is the verified upload: content is hashed in the same
//! pass that streams it to the registry, and the upload only succeeds if the
//! registry reports the same digest.
//!
//! ## Features
//!
//! - **Locator parsing**: `//[host[:port]]/name[:tag]` location strings
//! - **Manifest operations**: get, put and delete by tag
//! - **Blob operations**: existence probe, streaming download, upload
//! - **Verified uploads**: single-pass hashing with server cross-check
//! - **Copy adapters**: [`ImageSource`] and [`ImageDestination`] with blob
//!   reuse
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motel_registry::{stream, BlobInfo, ClientConfig, ImageDestination, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let locator = Transport::new().parse_reference("//localhost:5000/library/app:v1")?;
//!     let destination = locator.new_destination(ClientConfig::new()).await?;
//!
//!     // Upload a blob; the registry must agree on its digest.
//!     let stored = destination
//!         .put_blob(stream::from_bytes(b"layer bytes".to_vec()), &BlobInfo::unknown())
//!         .await?;
//!     println!("stored {:?}", stored.digest);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Transport ──► Locator ──► RegistrySource / Destination     │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RegistryClient                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Manifests  │  │    Blobs    │  │  Upload strategies  │  │
//! │  │  (by tag)   │  │ (by digest) │  │ (verified / single) │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OCI Registry                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod adapter;
mod client;
mod config;
mod digest;
mod error;
mod locator;
mod oci;
pub mod stream;
mod transport;
mod upload;

pub use adapter::{ImageDestination, ImageSource, RegistryDestination, RegistrySource};
pub use client::{RegistryClient, LIVENESS_PATH};
pub use config::{ClientConfig, UploadMode};
pub use digest::{Algorithm, Digest, Digester};
pub use error::{ErrorKind, RegistryError, Result};
pub use locator::{Locator, DEFAULT_HOST, DEFAULT_PORT};
pub use oci::{BlobInfo, Descriptor, Manifest, MediaType};
pub use stream::BlobStream;
pub use transport::Transport;
pub use upload::{
    select_strategy, SingleShotUpload, UploadSession, UploadStrategy, UploadedBlob,
    VerifiedUpload, DIGEST_HEADER, LENGTH_HEADER,
};
