//! Configuration types for the registry client.

use std::time::Duration;

use crate::digest::Algorithm;

/// How the destination uploads a blob that is not already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Start a session, stream while hashing, finalize and cross-check the
    /// server's digest against the client's.
    #[default]
    Verified,

    /// When the caller already knows the digest, send the content in one
    /// request and let the server check it. Blobs without a known digest
    /// still use the verified exchange.
    TrustServer,
}

/// Configuration for the registry client.
///
/// The endpoint itself comes from the [`Locator`](crate::Locator); this only
/// carries transport tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for exchanges whose body is small and bounded: the liveness
    /// probe, manifest requests, blob probes and upload session start and
    /// finalize. Blob bodies are streamed without an overall deadline so a
    /// large layer on a slow link is not cut off partway.
    pub timeout: Duration,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Upload strategy used by destinations.
    pub upload_mode: UploadMode,

    /// Algorithm used to hash uploaded content.
    pub digest_algorithm: Algorithm,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Creates a configuration with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use motel_registry::ClientConfig;
    ///
    /// let config = ClientConfig::new();
    /// assert_eq!(config.timeout, Duration::from_secs(300));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("motel-registry/{}", env!("CARGO_PKG_VERSION")),
            upload_mode: UploadMode::Verified,
            digest_algorithm: Algorithm::Sha256,
        }
    }

    /// Sets the deadline for bounded exchanges.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the upload mode.
    #[must_use]
    pub const fn with_upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    /// Sets the digest algorithm used for uploads.
    #[must_use]
    pub const fn with_digest_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ClientConfig::new();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.upload_mode, UploadMode::Verified);
        assert_eq!(config.digest_algorithm, Algorithm::Sha256);
        assert!(config.user_agent.starts_with("motel-registry/"));
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(1))
            .with_user_agent("test-agent")
            .with_upload_mode(UploadMode::TrustServer)
            .with_digest_algorithm(Algorithm::Sha512);

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.upload_mode, UploadMode::TrustServer);
        assert_eq!(config.digest_algorithm, Algorithm::Sha512);
    }
}
