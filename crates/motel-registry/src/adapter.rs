//! Image source and destination adapters.
//!
//! A copy engine moves an artifact by reading manifests and blobs from an
//! [`ImageSource`] and writing them to an [`ImageDestination`]. The
//! implementations here map those calls onto a [`RegistryClient`]:
//!
//! ```text
//! ┌─────────────┐  get_manifest / get_blob   ┌─────────────────────┐
//! │             │ ─────────────────────────► │ RegistrySource      │──┐
//! │ Copy engine │                            └─────────────────────┘  │
//! │             │  put_blob / put_manifest   ┌─────────────────────┐  │
//! │             │ ─────────────────────────► │ RegistryDestination │──┤
//! └─────────────┘                            └─────────────────────┘  │
//!                                                                     ▼
//!                                                      ┌────────────────┐
//!                                                      │ RegistryClient │
//!                                                      └────────────────┘
//! ```
//!
//! Signatures are not stored by this transport; those calls succeed with
//! empty results. Commit and close have nothing to do because every write
//! is persisted by the exchange that performed it.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::client::RegistryClient;
use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::locator::Locator;
use crate::oci::{BlobInfo, Manifest, MediaType};
use crate::stream::BlobStream;
use crate::upload::select_strategy;

/// Read side of an artifact copy.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Returns the location this source reads from.
    fn reference(&self) -> &Locator;

    /// Returns the raw manifest and its media type.
    ///
    /// `instance_digest` selects one manifest out of a multi-manifest index.
    async fn get_manifest(&self, instance_digest: Option<&Digest>) -> Result<(Vec<u8>, String)>;

    /// Opens a blob for reading. Returns the stream and its size, which may
    /// be [`BlobInfo::UNKNOWN_SIZE`].
    async fn get_blob(&self, info: &BlobInfo) -> Result<(BlobStream, i64)>;

    /// Returns true if `get_blob` may be called concurrently.
    fn has_thread_safe_get_blob(&self) -> bool;

    /// Returns the signatures attached to the image.
    async fn get_signatures(&self, instance_digest: Option<&Digest>) -> Result<Vec<Vec<u8>>>;

    /// Returns layer descriptors to copy instead of those in the manifest,
    /// or `None` to use the manifest's own.
    async fn layer_infos_for_copy(&self) -> Result<Option<Vec<BlobInfo>>>;

    /// Releases any resources held by the source.
    async fn close(&self) -> Result<()>;
}

/// Write side of an artifact copy.
#[async_trait]
pub trait ImageDestination: Send + Sync {
    /// Returns the location this destination writes to.
    fn reference(&self) -> &Locator;

    /// Manifest media types the destination accepts, most preferred first.
    fn supported_manifest_mime_types(&self) -> Vec<&'static str>;

    /// Returns an error if signatures cannot be stored.
    fn supports_signatures(&self) -> Result<()>;

    /// Returns true if layers hosted elsewhere may be referenced rather than
    /// uploaded.
    fn accepts_foreign_layer_urls(&self) -> bool;

    /// Returns true if the image must match the host operating system.
    fn must_match_runtime_os(&self) -> bool;

    /// Returns true if references embedded in the manifest need no
    /// rewriting.
    fn ignores_embedded_docker_reference(&self) -> bool;

    /// Returns true if `put_blob` may be called concurrently.
    fn has_thread_safe_put_blob(&self) -> bool;

    /// Stores a blob and returns its descriptor.
    async fn put_blob(&self, stream: BlobStream, info: &BlobInfo) -> Result<BlobInfo>;

    /// Checks whether the blob described by `info` is already stored.
    ///
    /// Returns the existing descriptor if so.
    async fn try_reusing_blob(&self, info: &BlobInfo) -> Result<Option<BlobInfo>>;

    /// Stores the manifest under the destination's tag.
    async fn put_manifest(&self, manifest: &[u8]) -> Result<()>;

    /// Stores signatures for the image.
    async fn put_signatures(&self, signatures: &[Vec<u8>]) -> Result<()>;

    /// Marks the image as complete.
    async fn commit(&self) -> Result<()>;

    /// Releases any resources held by the destination.
    async fn close(&self) -> Result<()>;
}

/// [`ImageSource`] backed by a registry.
#[derive(Debug)]
pub struct RegistrySource {
    client: RegistryClient,
    manifest: OnceCell<(Vec<u8>, Manifest)>,
}

impl RegistrySource {
    /// Wraps a connected client.
    #[must_use]
    pub const fn new(client: RegistryClient) -> Self {
        Self {
            client,
            manifest: OnceCell::const_new(),
        }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &RegistryClient {
        &self.client
    }

    async fn cached_manifest(&self) -> Result<&(Vec<u8>, Manifest)> {
        self.manifest
            .get_or_try_init(|| async {
                debug!(locator = %self.client.locator(), "Fetching manifest for source");
                self.client.get_manifest().await
            })
            .await
    }
}

#[async_trait]
impl ImageSource for RegistrySource {
    fn reference(&self) -> &Locator {
        self.client.locator()
    }

    async fn get_manifest(&self, instance_digest: Option<&Digest>) -> Result<(Vec<u8>, String)> {
        if instance_digest.is_some() {
            return Err(RegistryError::NotImplemented {
                feature: "selecting a manifest by instance digest".to_string(),
            });
        }

        let (raw, manifest) = self.cached_manifest().await?;
        Ok((raw.clone(), manifest.media_type_or_default().to_string()))
    }

    async fn get_blob(&self, info: &BlobInfo) -> Result<(BlobStream, i64)> {
        let digest = info
            .digest
            .as_ref()
            .ok_or_else(|| RegistryError::InvalidDigest {
                digest: String::new(),
                reason: "blob has no digest".to_string(),
            })?;
        self.client.get_layer(digest).await
    }

    fn has_thread_safe_get_blob(&self) -> bool {
        true
    }

    async fn get_signatures(&self, _instance_digest: Option<&Digest>) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    async fn layer_infos_for_copy(&self) -> Result<Option<Vec<BlobInfo>>> {
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// [`ImageDestination`] backed by a registry.
#[derive(Debug, Clone)]
pub struct RegistryDestination {
    client: RegistryClient,
}

impl RegistryDestination {
    /// Wraps a connected client.
    #[must_use]
    pub const fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &RegistryClient {
        &self.client
    }
}

#[async_trait]
impl ImageDestination for RegistryDestination {
    fn reference(&self) -> &Locator {
        self.client.locator()
    }

    fn supported_manifest_mime_types(&self) -> Vec<&'static str> {
        vec![MediaType::OCI_MANIFEST]
    }

    fn supports_signatures(&self) -> Result<()> {
        Ok(())
    }

    fn accepts_foreign_layer_urls(&self) -> bool {
        true
    }

    fn must_match_runtime_os(&self) -> bool {
        false
    }

    fn ignores_embedded_docker_reference(&self) -> bool {
        true
    }

    fn has_thread_safe_put_blob(&self) -> bool {
        true
    }

    /// Stores a blob, skipping the transfer if the registry already has it.
    ///
    /// When `info` carries a digest the registry is probed first; a hit
    /// returns immediately with an unknown size and no bytes read from
    /// `stream`. Otherwise the configured upload strategy runs, and if a
    /// digest was announced the stored content must match it.
    async fn put_blob(&self, stream: BlobStream, info: &BlobInfo) -> Result<BlobInfo> {
        if info.digest.is_some() {
            if let Some(existing) = self.try_reusing_blob(info).await? {
                info!(digest = ?existing.digest, "Blob already present, skipping upload");
                return Ok(existing);
            }
        }

        let strategy = select_strategy(self.client.config().upload_mode, info.digest.as_ref());
        debug!(strategy = strategy.name(), digest = ?info.digest, "Uploading blob");
        let uploaded = strategy.upload(&self.client, stream).await?;

        if let Some(expected) = &info.digest {
            if *expected != uploaded.digest {
                return Err(RegistryError::ExpectedDigestMismatch {
                    expected: expected.to_string(),
                    actual: uploaded.digest.to_string(),
                });
            }
        }

        let mut stored = BlobInfo::from(uploaded);
        stored.media_type.clone_from(&info.media_type);
        Ok(stored)
    }

    async fn try_reusing_blob(&self, info: &BlobInfo) -> Result<Option<BlobInfo>> {
        let digest = info
            .digest
            .as_ref()
            .ok_or_else(|| RegistryError::InvalidDigest {
                digest: String::new(),
                reason: "cannot check for a blob without a digest".to_string(),
            })?;

        if !self.client.has_layer(digest).await {
            return Ok(None);
        }

        let mut existing = BlobInfo::with_digest(digest.clone());
        existing.media_type.clone_from(&info.media_type);
        Ok(Some(existing))
    }

    async fn put_manifest(&self, manifest: &[u8]) -> Result<()> {
        self.client.put_manifest(manifest).await
    }

    async fn put_signatures(&self, _signatures: &[Vec<u8>]) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
