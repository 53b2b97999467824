//! Blob upload transactions.
//!
//! Two ways of getting a blob into the registry are supported:
//!
//! - **Verified** (three requests): `POST` opens a session, `PATCH` streams
//!   the content while the client hashes it, and `PUT ?digest=` finalizes.
//!   The registry must echo back the digest and length it computed, and the
//!   digest must equal the client's.
//! - **Single-shot** (one request): `POST ?digest=` carries the content and
//!   a digest the caller already knows; the registry does the checking.
//!
//! Neither path retries. A failed transaction is abandoned and the caller
//! restarts from the beginning with a fresh source.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::RegistryClient;
use crate::config::UploadMode;
use crate::digest::{Algorithm, Digest, Digester};
use crate::error::{RegistryError, Result};
use crate::oci::{BlobInfo, MediaType};
use crate::stream::{BlobStream, TeeStream};

/// Header carrying the registry-computed digest on finalize.
pub const DIGEST_HEADER: &str = "Digest";

/// Header carrying the registry-computed length on finalize.
pub const LENGTH_HEADER: &str = "Length";

/// An open upload session.
///
/// Returned by [`RegistryClient::start_layer`] and consumed by
/// [`RegistryClient::complete_layer`]. A session is used once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    location: String,
}

impl UploadSession {
    /// Returns the location the registry assigned to this session.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(rename = "Location", alias = "location")]
    location: Option<String>,
}

/// A blob the registry accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    /// Digest of the stored content.
    pub digest: Digest,
    /// Number of bytes stored.
    pub size: u64,
}

impl From<UploadedBlob> for BlobInfo {
    fn from(blob: UploadedBlob) -> Self {
        Self::new(blob.digest, i64::try_from(blob.size).unwrap_or(i64::MAX))
    }
}

impl RegistryClient {
    /// Opens an upload session.
    ///
    /// The registry must answer 201. The session location is read from the
    /// JSON body's `Location` field, falling back to the `Location` header.
    ///
    /// # Errors
    ///
    /// Returns an error for any other status or if neither source names a
    /// location.
    pub async fn start_layer(&self) -> Result<UploadSession> {
        let url = self.uploads_url();
        let name = self.locator().name().to_string();

        let response = Self::send(self.bounded(self.http().post(&url)), &url).await?;
        let response =
            Self::expect_status(response, StatusCode::CREATED, "start upload", &name).await?;

        let header_location = header_str(response.headers(), LOCATION.as_str());
        let body = response
            .bytes()
            .await
            .map_err(|e| RegistryError::transport(&url, e))?;
        let body_location = serde_json::from_slice::<StartResponse>(&body)
            .ok()
            .and_then(|r| r.location);

        let location = body_location
            .or(header_location)
            .filter(|l| !l.is_empty())
            .ok_or(RegistryError::MissingLocation { name })?;

        debug!(location = %location, "Opened upload session");
        Ok(UploadSession { location })
    }

    /// Streams `stream` into `session` and finalizes it.
    ///
    /// The content is hashed as it is sent. After the registry accepts the
    /// stream (204), a `PUT ?digest=<hex>` finalizes the session (204). The
    /// finalize response must carry exactly one `Digest` and one `Length`
    /// header, and the reported digest must equal the one computed here.
    ///
    /// # Errors
    ///
    /// - The source fails mid-stream: [`RegistryError::SourceStream`]; the
    ///   session is never finalized.
    /// - A missing header: [`RegistryError::IncompleteHeaders`].
    /// - A different digest: [`RegistryError::DigestMismatch`].
    /// - Any other status, transport or header decoding failure.
    pub async fn complete_layer(
        &self,
        session: UploadSession,
        stream: BlobStream,
    ) -> Result<UploadedBlob> {
        self.complete_layer_with(session, stream, self.config().digest_algorithm)
            .await
    }

    async fn complete_layer_with(
        &self,
        session: UploadSession,
        stream: BlobStream,
        algorithm: Algorithm,
    ) -> Result<UploadedBlob> {
        let session_url = self.session_url(&session)?;
        let target = format!("{}@{}", self.locator().name(), session.location);

        let (tee, handle) = TeeStream::new(stream, Some(Digester::new(algorithm)));
        let request = self
            .http()
            .patch(session_url.as_str())
            .header(CONTENT_TYPE, MediaType::OCTET_STREAM)
            .body(Body::wrap_stream(tee));
        let sent = Self::send(request, session_url.as_str()).await;

        let outcome = handle.finish();
        if let Some(message) = outcome.error {
            warn!(location = %session.location, message = %message, "Blob source failed, abandoning upload");
            return Err(RegistryError::SourceStream { message });
        }
        Self::expect_status(sent?, StatusCode::NO_CONTENT, "stream blob", &target).await?;
        if !outcome.finished {
            return Err(RegistryError::SourceStream {
                message: "registry accepted the upload before the source was drained".to_string(),
            });
        }
        let client_digest = outcome.digest.ok_or_else(|| RegistryError::SourceStream {
            message: "upload digest was not computed".to_string(),
        })?;
        debug!(digest = %client_digest, bytes = outcome.bytes, "Streamed blob");

        let mut finalize_url = session_url;
        finalize_url
            .query_pairs_mut()
            .append_pair("digest", client_digest.encoded());
        let request = self.bounded(self.http().put(finalize_url.as_str()));
        let response = Self::send(request, finalize_url.as_str()).await?;
        let response =
            Self::expect_status(response, StatusCode::NO_CONTENT, "finalize upload", &target).await?;

        let headers = response.headers();
        let reported = single_header(headers, DIGEST_HEADER)?;
        let length = single_header(headers, LENGTH_HEADER)?;
        let size = length
            .trim()
            .parse::<u64>()
            .map_err(|_| RegistryError::MalformedHeader {
                operation: "finalize upload",
                header: LENGTH_HEADER,
                value: length.clone(),
            })?;

        let matches = Digest::from_reported(&reported, algorithm)
            .is_ok_and(|server| server == client_digest);
        if !matches {
            warn!(client = %client_digest, server = %reported, "Registry digest does not match uploaded content");
            return Err(RegistryError::DigestMismatch {
                client: client_digest.to_string(),
                server: reported,
            });
        }

        info!(digest = %client_digest, size, "Uploaded blob");
        Ok(UploadedBlob {
            digest: client_digest,
            size,
        })
    }

    /// Uploads `stream` in a single request under a digest the caller
    /// already knows.
    ///
    /// The registry must answer 201. It, not the client, verifies that the
    /// content matches `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails or the registry answers with any
    /// other status.
    pub async fn put_layer(&self, expected: &Digest, stream: BlobStream) -> Result<UploadedBlob> {
        let uploads_url = self.uploads_url();
        let mut url = Url::parse(&uploads_url).map_err(|e| RegistryError::InvalidUrl {
            url: uploads_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("digest", &expected.to_string());
        let target = self.blob_target(expected);

        let (tee, handle) = TeeStream::new(stream, None);
        let request = self
            .http()
            .post(url.as_str())
            .header(CONTENT_TYPE, MediaType::OCTET_STREAM)
            .body(Body::wrap_stream(tee));
        let sent = Self::send(request, url.as_str()).await;

        let outcome = handle.finish();
        if let Some(message) = outcome.error {
            return Err(RegistryError::SourceStream { message });
        }
        Self::expect_status(sent?, StatusCode::CREATED, "single-shot upload", &target).await?;

        info!(digest = %expected, size = outcome.bytes, "Uploaded blob in one request");
        Ok(UploadedBlob {
            digest: expected.clone(),
            size: outcome.bytes,
        })
    }

    /// Resolves a session location against the base URL. Absolute
    /// locations are used as given.
    fn session_url(&self, session: &UploadSession) -> Result<Url> {
        Url::parse(self.url_base())
            .and_then(|base| base.join(&session.location))
            .map_err(|e| RegistryError::MalformedHeader {
                operation: "start upload",
                header: "Location",
                value: format!("{} ({e})", session.location),
            })
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn single_header(headers: &HeaderMap, name: &'static str) -> Result<String> {
    let mut values = headers.get_all(name).iter();
    let value = match (values.next(), values.next()) {
        (Some(value), None) => value,
        _ => return Err(RegistryError::IncompleteHeaders { missing: name }),
    };
    value
        .to_str()
        .map(str::to_string)
        .map_err(|_| RegistryError::MalformedHeader {
            operation: "finalize upload",
            header: name,
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
}

/// A way of moving one blob into the registry.
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Uploads `stream` and returns what the registry stored.
    async fn upload(&self, client: &RegistryClient, stream: BlobStream) -> Result<UploadedBlob>;
}

/// Three-request upload with client-side digest verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifiedUpload {
    algorithm: Option<Algorithm>,
}

impl VerifiedUpload {
    /// Creates a strategy hashing with the client's configured algorithm.
    #[must_use]
    pub const fn new() -> Self {
        Self { algorithm: None }
    }

    /// Hashes with `algorithm` so the result is comparable to a digest the
    /// caller announced.
    #[must_use]
    pub const fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
        }
    }
}

#[async_trait]
impl UploadStrategy for VerifiedUpload {
    fn name(&self) -> &'static str {
        "verified"
    }

    async fn upload(&self, client: &RegistryClient, stream: BlobStream) -> Result<UploadedBlob> {
        let algorithm = self
            .algorithm
            .unwrap_or(client.config().digest_algorithm);
        let session = client.start_layer().await?;
        client.complete_layer_with(session, stream, algorithm).await
    }
}

/// One-request upload under a known digest.
#[derive(Debug, Clone)]
pub struct SingleShotUpload {
    expected: Digest,
}

impl SingleShotUpload {
    /// Creates a strategy that uploads under `expected`.
    #[must_use]
    pub const fn new(expected: Digest) -> Self {
        Self { expected }
    }
}

#[async_trait]
impl UploadStrategy for SingleShotUpload {
    fn name(&self) -> &'static str {
        "single-shot"
    }

    async fn upload(&self, client: &RegistryClient, stream: BlobStream) -> Result<UploadedBlob> {
        client.put_layer(&self.expected, stream).await
    }
}

/// Picks the upload strategy for a blob.
///
/// Single-shot is only possible when the digest is known up front; every
/// other case uses the verified exchange.
#[must_use]
pub fn select_strategy(mode: UploadMode, expected: Option<&Digest>) -> Box<dyn UploadStrategy> {
    match (mode, expected) {
        (UploadMode::TrustServer, Some(digest)) => Box::new(SingleShotUpload::new(digest.clone())),
        (UploadMode::Verified, Some(digest)) => {
            Box::new(VerifiedUpload::with_algorithm(digest.algorithm()))
        }
        (_, None) => Box::new(VerifiedUpload::new()),
    }
}
