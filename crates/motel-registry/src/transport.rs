//! The `ocimotel` transport.
//!
//! [`Transport`] is the entry point a copy engine holds on to: it turns
//! location strings into [`Locator`]s, and each locator opens the source and
//! destination adapters for its repository and tag.

use tracing::info;

use crate::adapter::{RegistryDestination, RegistrySource};
use crate::client::RegistryClient;
use crate::config::ClientConfig;
use crate::error::{RegistryError, Result};
use crate::locator::Locator;

/// Handle for the `ocimotel` transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transport;

impl Transport {
    /// Name the transport is known by.
    pub const NAME: &'static str = "ocimotel";

    /// Creates the transport handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the transport name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Parses a location string for this transport.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidLocator`] if the string is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use motel_registry::Transport;
    ///
    /// let locator = Transport::new().parse_reference("//reg.local:5000/app:v1")?;
    /// assert_eq!(locator.to_string(), "//reg.local:5000/app:v1");
    /// # Ok::<(), motel_registry::RegistryError>(())
    /// ```
    pub fn parse_reference(&self, reference: &str) -> Result<Locator> {
        Locator::parse(reference)
    }

    /// Checks a policy configuration scope. Every scope is accepted.
    ///
    /// # Errors
    ///
    /// Never fails; the signature leaves room for transports with a scope
    /// grammar.
    pub const fn validate_policy_scope(&self, _scope: &str) -> Result<()> {
        Ok(())
    }
}

impl Locator {
    /// Opens a source reading from this location.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connect`] if the registry fails the liveness
    /// probe.
    pub async fn new_source(&self, config: ClientConfig) -> Result<RegistrySource> {
        let client = self.connect(config).await?;
        Ok(RegistrySource::new(client))
    }

    /// Opens a destination writing to this location.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connect`] if the registry fails the liveness
    /// probe.
    pub async fn new_destination(&self, config: ClientConfig) -> Result<RegistryDestination> {
        let client = self.connect(config).await?;
        Ok(RegistryDestination::new(client))
    }

    /// Deletes the manifest stored at this location.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connect`] if the registry cannot be reached,
    /// or the error from the delete itself.
    pub async fn delete_image(&self, config: ClientConfig) -> Result<()> {
        let client = self.connect(config).await?;
        client.remove_manifest().await?;
        info!(locator = %self, "Deleted image");
        Ok(())
    }

    async fn connect(&self, config: ClientConfig) -> Result<RegistryClient> {
        RegistryClient::connect(self.clone(), config)
            .await
            .map_err(|e| RegistryError::Connect {
                source: Box::new(e),
            })
    }
}
