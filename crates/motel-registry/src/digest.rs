//! Content digests.
//!
//! A [`Digest`] is an algorithm-tagged hash such as `sha256:<64 hex chars>`.
//! Digests are compared as typed values, never as raw strings, so a registry
//! that reports the bare hex and one that reports the qualified form both
//! verify against the same client-side result.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256, Sha512};

use crate::error::{RegistryError, Result};

/// Hash algorithms a digest can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// SHA-256, the registry default.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl Algorithm {
    /// Returns the algorithm prefix used in digest strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Returns the number of hex characters in an encoded digest.
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl FromStr for Algorithm {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(RegistryError::InvalidDigest {
                digest: other.to_string(),
                reason: "unsupported algorithm".to_string(),
            }),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An algorithm-tagged content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

impl Digest {
    /// Parses a qualified digest such as `sha256:abc...`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the algorithm is unknown
    /// or the encoded part is not lowercase hex of the right length.
    ///
    /// # Examples
    ///
    /// ```
    /// use motel_registry::{Algorithm, Digest};
    ///
    /// let hex = "a".repeat(64);
    /// let digest = Digest::parse(&format!("sha256:{hex}"))?;
    /// assert_eq!(digest.algorithm(), Algorithm::Sha256);
    /// assert_eq!(digest.encoded(), hex);
    /// # Ok::<(), motel_registry::RegistryError>(())
    /// ```
    pub fn parse(digest: &str) -> Result<Self> {
        let (algorithm, encoded) =
            digest
                .split_once(':')
                .ok_or_else(|| RegistryError::InvalidDigest {
                    digest: digest.to_string(),
                    reason: "missing algorithm prefix".to_string(),
                })?;
        let algorithm = algorithm.parse::<Algorithm>().map_err(|_| RegistryError::InvalidDigest {
            digest: digest.to_string(),
            reason: format!("unsupported algorithm '{algorithm}'"),
        })?;
        Self::from_encoded(algorithm, encoded)
    }

    /// Builds a digest from an algorithm and its hex encoding.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if `encoded` is not lowercase
    /// hex of the length the algorithm produces.
    pub fn from_encoded(algorithm: Algorithm, encoded: &str) -> Result<Self> {
        let valid = encoded.len() == algorithm.encoded_len()
            && encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(RegistryError::InvalidDigest {
                digest: format!("{algorithm}:{encoded}"),
                reason: format!(
                    "expected {} lowercase hex characters",
                    algorithm.encoded_len()
                ),
            });
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }

    /// Normalizes a digest reported by a registry.
    ///
    /// Some registries return only the hex encoding where a qualified digest
    /// is expected. A bare value is tagged with `algorithm`; a qualified one
    /// is parsed as is.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the value is neither form.
    pub fn from_reported(value: &str, algorithm: Algorithm) -> Result<Self> {
        let value = value.trim();
        if value.contains(':') {
            Self::parse(value)
        } else {
            Self::from_encoded(algorithm, value)
        }
    }

    /// Computes the digest of `data` with `algorithm`.
    #[must_use]
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        let mut digester = Digester::new(algorithm);
        digester.update(data);
        digester.finish()
    }

    /// Computes the SHA-256 digest of `data`.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        Self::compute(Algorithm::Sha256, data)
    }

    /// Returns the algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the hex encoding without the algorithm prefix.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

/// Incremental hasher producing a [`Digest`].
#[derive(Clone)]
pub struct Digester {
    state: DigesterState,
}

#[derive(Clone)]
enum DigesterState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Digester {
    /// Creates a hasher for `algorithm`.
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        let state = match algorithm {
            Algorithm::Sha256 => DigesterState::Sha256(Sha256::new()),
            Algorithm::Sha512 => DigesterState::Sha512(Sha512::new()),
        };
        Self { state }
    }

    /// Feeds bytes into the hash.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigesterState::Sha256(h) => h.update(data),
            DigesterState::Sha512(h) => h.update(data),
        }
    }

    /// Consumes the hasher and returns the digest.
    #[must_use]
    pub fn finish(self) -> Digest {
        let (algorithm, encoded) = match self.state {
            DigesterState::Sha256(h) => (Algorithm::Sha256, hex::encode(h.finalize())),
            DigesterState::Sha512(h) => (Algorithm::Sha512, hex::encode(h.finalize())),
        };
        Digest { algorithm, encoded }
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self.state {
            DigesterState::Sha256(_) => Algorithm::Sha256,
            DigesterState::Sha512(_) => Algorithm::Sha512,
        };
        f.debug_struct("Digester").field("algorithm", &algorithm).finish()
    }
}
