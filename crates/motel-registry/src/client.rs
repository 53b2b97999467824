//! Registry client for one repository and tag.
//!
//! Every operation is a single HTTP exchange against the endpoint resolved
//! from a [`Locator`]. The client holds no mutable state, so clones can run
//! operations concurrently over the shared connection pool.

use std::fmt;
use std::io;

use futures::TryStreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::locator::Locator;
use crate::oci::{BlobInfo, ErrorResponse, Manifest, MediaType};
use crate::stream::BlobStream;

/// Discovery path probed before any other exchange.
pub const LIVENESS_PATH: &str = "/v2/";

/// Client for a registry repository and tag.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    url_base: String,
    locator: Locator,
    config: ClientConfig,
}

impl RegistryClient {
    /// Connects to the registry named by `locator`.
    ///
    /// Issues one `GET /v2/` and fails unless the registry answers 200. No
    /// other exchange is attempted against an endpoint that fails this probe.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the registry cannot be reached and a
    /// protocol error for any status other than 200.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use motel_registry::{ClientConfig, Locator, RegistryClient};
    ///
    /// # async fn example() -> motel_registry::Result<()> {
    /// let locator = Locator::parse("//localhost:5000/library/app:v1")?;
    /// let client = RegistryClient::connect(locator, ClientConfig::new()).await?;
    /// let (raw, manifest) = client.get_manifest().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(locator: Locator, config: ClientConfig) -> Result<Self> {
        let client = Self::new_unchecked(locator, config)?;
        client.check_liveness().await?;
        Ok(client)
    }

    pub(crate) fn new_unchecked(locator: Locator, config: ClientConfig) -> Result<Self> {
        let url_base = locator.url_base();
        let http = Self::build_http_client(&config, &url_base)?;
        Ok(Self {
            http,
            url_base,
            locator,
            config,
        })
    }

    /// Returns the locator this client was built from.
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Returns the base URL all exchanges are rooted at.
    #[must_use]
    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn check_liveness(&self) -> Result<()> {
        let url = format!("{}{LIVENESS_PATH}", self.url_base);
        let response = Self::send(self.bounded(self.http.get(&url)), &url).await?;
        Self::expect_status(response, StatusCode::OK, "liveness check", &self.url_base).await?;
        debug!(url = %url, "Registry is reachable");
        Ok(())
    }

    /// Fetches the manifest stored under the locator's tag.
    ///
    /// Returns the raw bytes exactly as served together with the decoded
    /// view.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry does not answer 200 or the body is
    /// not a manifest document.
    pub async fn get_manifest(&self) -> Result<(Vec<u8>, Manifest)> {
        let url = self.manifest_url();
        let target = self.manifest_target();

        let request = self.bounded(self.http.get(&url).header(ACCEPT, MediaType::OCI_MANIFEST));
        let response = Self::send(request, &url).await?;
        let response = Self::expect_status(response, StatusCode::OK, "get manifest", &target).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| RegistryError::transport(&url, e))?
            .to_vec();
        let manifest = Manifest::from_slice(&body).map_err(|e| RegistryError::Decode {
            operation: "get manifest",
            target: target.clone(),
            message: e.to_string(),
        })?;

        debug!(reference = %target, bytes = body.len(), "Fetched manifest");
        Ok((body, manifest))
    }

    /// Stores `manifest` under the locator's tag.
    ///
    /// The bytes are sent unchanged in a single PUT.
    ///
    /// # Errors
    ///
    /// Returns an error unless the registry answers 201.
    pub async fn put_manifest(&self, manifest: &[u8]) -> Result<()> {
        let url = self.manifest_url();
        let target = self.manifest_target();
        let content_type = Manifest::from_slice(manifest)
            .ok()
            .and_then(|m| m.media_type)
            .unwrap_or_else(|| MediaType::OCI_MANIFEST.to_string());

        let request = self.bounded(
            self.http
                .put(&url)
                .header(CONTENT_TYPE, content_type)
                .body(manifest.to_vec()),
        );
        let response = Self::send(request, &url).await?;
        Self::expect_status(response, StatusCode::CREATED, "put manifest", &target).await?;

        info!(reference = %target, bytes = manifest.len(), "Stored manifest");
        Ok(())
    }

    /// Deletes the manifest stored under the locator's tag.
    ///
    /// # Errors
    ///
    /// Returns an error unless the registry answers 202.
    pub async fn remove_manifest(&self) -> Result<()> {
        let url = self.manifest_url();
        let target = self.manifest_target();

        let response = Self::send(self.bounded(self.http.delete(&url)), &url).await?;
        Self::expect_status(response, StatusCode::ACCEPTED, "delete manifest", &target).await?;

        info!(reference = %target, "Deleted manifest");
        Ok(())
    }

    /// Returns true if the registry holds a blob with `digest`.
    ///
    /// Only an exact 200 counts. Transport failures and every other status
    /// read as "not present"; the probe is advisory and never fails.
    pub async fn has_layer(&self, digest: &Digest) -> bool {
        self.has_layer_named(&digest.to_string()).await
    }

    /// Same probe as [`has_layer`](Self::has_layer) for a digest string
    /// that has not been validated.
    ///
    /// The string is placed in the request path as given, so a short or
    /// otherwise malformed digest simply reads as absent.
    pub async fn has_layer_named(&self, digest: &str) -> bool {
        let url = self.blob_url(digest);
        match self.bounded(self.http.head(&url)).send().await {
            Ok(response) => {
                let present = response.status() == StatusCode::OK;
                debug!(digest = %digest, status = response.status().as_u16(), present, "Probed blob");
                present
            }
            Err(err) => {
                debug!(digest = %digest, error = %err, "Blob probe failed, treating as absent");
                false
            }
        }
    }

    /// Opens the blob with `digest` for reading.
    ///
    /// The size is always reported as [`BlobInfo::UNKNOWN_SIZE`], even when
    /// the registry sends a length header.
    ///
    /// # Errors
    ///
    /// Returns an error unless the registry answers 200.
    pub async fn get_layer(&self, digest: &Digest) -> Result<(BlobStream, i64)> {
        let url = self.blob_url(digest);
        let target = self.blob_target(digest);

        // The body is streamed to the caller, so no overall deadline applies.
        let response = Self::send(self.http.get(&url), &url).await?;
        let response = Self::expect_status(response, StatusCode::OK, "get blob", &target).await?;

        debug!(reference = %target, "Opened blob stream");
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok((Box::pin(stream), BlobInfo::UNKNOWN_SIZE))
    }

    pub(crate) const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn manifest_url(&self) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.url_base,
            self.locator.name(),
            self.locator.tag()
        )
    }

    /// Applies the configured deadline to an exchange with a bounded body.
    pub(crate) fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        request.timeout(self.config.timeout)
    }

    fn blob_url(&self, digest: impl fmt::Display) -> String {
        format!("{}/v2/{}/blobs/{digest}", self.url_base, self.locator.name())
    }

    pub(crate) fn uploads_url(&self) -> String {
        format!("{}/v2/{}/blobs/uploads/", self.url_base, self.locator.name())
    }

    fn manifest_target(&self) -> String {
        format!("{}:{}", self.locator.name(), self.locator.tag())
    }

    pub(crate) fn blob_target(&self, digest: &Digest) -> String {
        format!("{}@{digest}", self.locator.name())
    }

    /// Sends a request, tagging transport failures with the URL.
    pub(crate) async fn send(request: RequestBuilder, url: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| RegistryError::transport(url, e))
    }

    /// Passes `response` through if it has the expected status.
    pub(crate) async fn expect_status(
        response: Response,
        expected: StatusCode,
        operation: &'static str,
        target: &str,
    ) -> Result<Response> {
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(operation, reference = target, status = status.as_u16(), "Unexpected registry status");
        Err(RegistryError::UnexpectedStatus {
            operation,
            target: target.to_string(),
            expected: expected.as_u16(),
            status: status.as_u16(),
            message: ErrorResponse::summarize(&body),
        })
    }

    fn build_http_client(config: &ClientConfig, url_base: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RegistryError::ConnectionFailed {
                url: url_base.to_string(),
                source: e,
            })
    }
}
