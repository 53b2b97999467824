//! Error types for registry operations.

use thiserror::Error;

/// Result type alias using [`RegistryError`] as the error type.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Broad class of a [`RegistryError`].
///
/// None of these are retried inside the crate. The class tells the caller
/// what kind of failure happened so it can decide whether restarting the
/// whole artifact transfer makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed locator strings, digests or server headers.
    Format,
    /// The registry could not be reached.
    Connectivity,
    /// The registry answered with an unexpected status or body.
    Protocol,
    /// Client and server disagree about the content that was stored.
    Integrity,
    /// The requested operation is not implemented by this transport.
    Unsupported,
    /// The caller-supplied byte source failed while streaming.
    Source,
}

impl ErrorKind {
    /// Returns a string representation for display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Connectivity => "connectivity",
            Self::Protocol => "protocol",
            Self::Integrity => "integrity",
            Self::Unsupported => "unsupported",
            Self::Source => "source",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Location string does not follow the locator grammar.
    #[error("ocimotel: bad image reference {reference}: {reason}")]
    InvalidLocator {
        /// Raw location string.
        reference: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Digest string could not be parsed.
    #[error("Invalid digest '{digest}': {reason}")]
    InvalidDigest {
        /// Raw digest string.
        digest: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A response header was present but could not be decoded.
    #[error("Malformed {header} header from {operation}: {value}")]
    MalformedHeader {
        /// Operation that received the header.
        operation: &'static str,
        /// Header name.
        header: &'static str,
        /// Raw header value.
        value: String,
    },

    /// A request URL could not be built from the locator.
    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidUrl {
        /// URL text that failed to parse.
        url: String,
        /// Parser error.
        reason: String,
    },

    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Attempted URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP exchange failed after the connection was made.
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        /// Attempted URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a status the operation does not accept.
    #[error("Unexpected status {status} from {operation} on {target}: expected {expected}{}", fmt_message(.message))]
    UnexpectedStatus {
        /// Operation attempted.
        operation: &'static str,
        /// Name, tag or digest the operation was about.
        target: String,
        /// Status the operation requires.
        expected: u16,
        /// Status actually returned.
        status: u16,
        /// Error text returned by the registry, if any.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("Failed decoding response from {operation} on {target}: {message}")]
    Decode {
        /// Operation attempted.
        operation: &'static str,
        /// Name, tag or digest the operation was about.
        target: String,
        /// Decoder error.
        message: String,
    },

    /// The registry did not return an upload location.
    #[error("No upload location returned for {name}")]
    MissingLocation {
        /// Repository name.
        name: String,
    },

    /// Finalize response lacked the digest or length headers.
    #[error("Server returned incomplete headers: missing {missing}")]
    IncompleteHeaders {
        /// Name of the missing header.
        missing: &'static str,
    },

    /// Server digest differs from the digest the client computed.
    #[error("Server calculated digest {server}, not our {client}")]
    DigestMismatch {
        /// Digest computed by the client while streaming.
        client: String,
        /// Digest reported by the server.
        server: String,
    },

    /// The verified digest differs from the digest the caller announced.
    #[error("Uploaded content has digest {actual}, caller expected {expected}")]
    ExpectedDigestMismatch {
        /// Digest the caller supplied.
        expected: String,
        /// Digest of the content actually uploaded.
        actual: String,
    },

    /// The byte source failed while it was being uploaded.
    #[error("Reading blob source failed: {message}")]
    SourceStream {
        /// Underlying read error.
        message: String,
    },

    /// Operation is not implemented by this transport.
    #[error("{feature} is not implemented")]
    NotImplemented {
        /// Feature name.
        feature: String,
    },

    /// Failed to reach the server while opening a source or destination.
    #[error("Failed connecting to server: {source}")]
    Connect {
        /// Underlying error.
        #[source]
        source: Box<RegistryError>,
    },
}

fn fmt_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(" ({message})")
    }
}

impl RegistryError {
    /// Returns the class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLocator { .. }
            | Self::InvalidDigest { .. }
            | Self::MalformedHeader { .. }
            | Self::InvalidUrl { .. } => ErrorKind::Format,
            Self::ConnectionFailed { .. } | Self::RequestFailed { .. } => ErrorKind::Connectivity,
            Self::UnexpectedStatus { .. } | Self::Decode { .. } | Self::MissingLocation { .. } => {
                ErrorKind::Protocol
            }
            Self::IncompleteHeaders { .. }
            | Self::DigestMismatch { .. }
            | Self::ExpectedDigestMismatch { .. } => ErrorKind::Integrity,
            Self::SourceStream { .. } => ErrorKind::Source,
            Self::NotImplemented { .. } => ErrorKind::Unsupported,
            Self::Connect { source } => source.kind(),
        }
    }

    /// Wraps a transport error, keeping the attempted URL for diagnosis.
    pub(crate) fn transport(url: impl Into<String>, err: reqwest::Error) -> Self {
        let url = url.into();
        if err.is_connect() || err.is_timeout() {
            Self::ConnectionFailed { url, source: err }
        } else {
            Self::RequestFailed { url, source: err }
        }
    }

    pub(crate) fn invalid_locator(reference: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
