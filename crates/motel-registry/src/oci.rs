//! Manifest and blob descriptor types.
//!
//! [`Manifest`] and [`Descriptor`] mirror the JSON documents stored in the
//! registry. [`BlobInfo`] is what crosses the boundary with the copy engine:
//! a digest that may be unknown, a size that may be unknown, and an optional
//! media type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Well-known media types.
#[derive(Debug, Clone, Copy)]
pub struct MediaType;

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// OCI image config media type.
    pub const OCI_CONFIG: &'static str = "application/vnd.oci.image.config.v1+json";

    /// OCI gzip-compressed layer media type.
    pub const OCI_LAYER_GZIP: &'static str = "application/vnd.oci.image.layer.v1.tar+gzip";

    /// Media type of raw blob uploads.
    pub const OCTET_STREAM: &'static str = "application/octet-stream";
}

/// Content descriptor as it appears inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: String,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    #[serde(default)]
    pub size: i64,

    /// Optional URLs for alternative locations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    /// Optional annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(media_type: impl Into<String>, digest: &Digest, size: i64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.to_string(),
            size,
            urls: None,
            annotations: None,
        }
    }

    /// Converts to a [`BlobInfo`]. A digest that does not parse is dropped.
    #[must_use]
    pub fn to_blob_info(&self) -> BlobInfo {
        BlobInfo {
            digest: Digest::parse(&self.digest).ok(),
            size: self.size,
            media_type: (!self.media_type.is_empty()).then(|| self.media_type.clone()),
        }
    }
}

/// Image manifest.
///
/// Decoding is lenient: every field has a default so that any JSON object a
/// registry stores under a tag can be read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    /// Schema version (2 for current manifests).
    pub schema_version: u32,

    /// Media type of this manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Configuration descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    /// Layers in application order.
    pub layers: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Manifest {
    /// Creates an OCI image manifest.
    ///
    /// # Examples
    ///
    /// ```
    /// use motel_registry::{Descriptor, Digest, Manifest, MediaType};
    ///
    /// let config = Descriptor::new(MediaType::OCI_CONFIG, &Digest::sha256(b"{}"), 2);
    /// let layer = Descriptor::new(MediaType::OCI_LAYER_GZIP, &Digest::sha256(b"layer"), 5);
    /// let manifest = Manifest::new(config, vec![layer]);
    /// assert_eq!(manifest.layers.len(), 1);
    /// ```
    #[must_use]
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(MediaType::OCI_MANIFEST.to_string()),
            config: Some(config),
            layers,
            annotations: None,
        }
    }

    /// Decodes a manifest document.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a JSON object.
    pub fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Encodes the manifest as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Returns the media type, defaulting to the OCI image manifest type.
    #[must_use]
    pub fn media_type_or_default(&self) -> &str {
        self.media_type.as_deref().unwrap_or(MediaType::OCI_MANIFEST)
    }

    /// Returns the layer descriptors as [`BlobInfo`]s.
    #[must_use]
    pub fn layer_infos(&self) -> Vec<BlobInfo> {
        self.layers.iter().map(Descriptor::to_blob_info).collect()
    }

    /// Returns the config descriptor as a [`BlobInfo`].
    #[must_use]
    pub fn config_info(&self) -> Option<BlobInfo> {
        self.config.as_ref().map(Descriptor::to_blob_info)
    }
}

/// Blob description exchanged with the copy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Content digest, if known.
    pub digest: Option<Digest>,

    /// Size in bytes, or [`BlobInfo::UNKNOWN_SIZE`].
    pub size: i64,

    /// Media type, if known.
    pub media_type: Option<String>,
}

impl BlobInfo {
    /// Size value meaning "not known and not asked for".
    pub const UNKNOWN_SIZE: i64 = -1;

    /// Creates a blob info with a known digest and size.
    #[must_use]
    pub const fn new(digest: Digest, size: i64) -> Self {
        Self {
            digest: Some(digest),
            size,
            media_type: None,
        }
    }

    /// Creates a blob info with nothing known about the content.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            digest: None,
            size: Self::UNKNOWN_SIZE,
            media_type: None,
        }
    }

    /// Creates a blob info with a known digest and unknown size.
    #[must_use]
    pub const fn with_digest(digest: Digest) -> Self {
        Self::new(digest, Self::UNKNOWN_SIZE)
    }

    /// Sets the media type.
    #[must_use]
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Returns true if the size is known.
    #[must_use]
    pub const fn has_size(&self) -> bool {
        self.size >= 0
    }
}

/// Error body returned by distribution-style registries.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<RegistryApiError>,
}

/// Individual error from registry API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegistryApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    /// Condenses an error body into one line.
    ///
    /// Structured bodies become `CODE: message; ...`; anything else is
    /// trimmed and truncated.
    pub(crate) fn summarize(body: &str) -> String {
        const MAX: usize = 200;

        if let Ok(parsed) = serde_json::from_str::<Self>(body) {
            if !parsed.errors.is_empty() {
                return parsed
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
            }
        }

        let trimmed = body.trim();
        match trimmed.char_indices().nth(MAX) {
            Some((idx, _)) => format!("{}...", &trimmed[..idx]),
            None => trimmed.to_string(),
        }
    }
}
