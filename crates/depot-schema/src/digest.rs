use crate::types::string_newtype;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid digest format: {0:?}")]
    InvalidFormat(String),
    #[error("unsupported digest algorithm: {0:?}")]
    UnsupportedAlgorithm(String),
    #[error("invalid {algorithm} digest length: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },
    #[error("invalid characters in digest hex: {0:?}")]
    InvalidCharacters(String),
}

/// Hash algorithms a [`Digest`] may be qualified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl Algorithm {
    /// The algorithm content is addressed by unless a client asks otherwise.
    pub const CANONICAL: Algorithm = Algorithm::Sha256;

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Number of lowercase hex characters in an encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha256 | Algorithm::Blake3 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    /// Hash `data` and return the qualified digest.
    pub fn digest(self, data: &[u8]) -> Digest {
        let hex = match self {
            Algorithm::Sha256 => hex::encode(sha2::Sha256::digest(data)),
            Algorithm::Sha384 => hex::encode(sha2::Sha384::digest(data)),
            Algorithm::Sha512 => hex::encode(sha2::Sha512::digest(data)),
            Algorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        };
        Digest::from_parts(self, &hex)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            "blake3" => Ok(Algorithm::Blake3),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_owned())),
        }
    }
}

string_newtype!(
    /// Content identifier in `<algorithm>:<hex>` form.
    ///
    /// Construction does not validate: request input is carried as-is until
    /// something calls [`Digest::validate`], so malformed digests surface as
    /// errors at the component that rejects them.
    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    Digest
);

impl Digest {
    /// Wrap a raw digest string without validating it.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Wrap and validate.
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let digest = Self::new(s);
        digest.validate()?;
        Ok(digest)
    }

    pub fn from_parts(algorithm: Algorithm, hex: &str) -> Self {
        Self(format!("{algorithm}:{hex}"))
    }

    /// Algorithm component, or `""` when there is no `:` separator.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map_or("", |(alg, _)| alg)
    }

    /// Encoded component, or `""` when there is no `:` separator.
    pub fn hex(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, hex)| hex)
    }

    /// Check the digest is well formed and return its algorithm.
    pub fn validate(&self) -> Result<Algorithm, DigestError> {
        let Some((alg, hex)) = self.0.split_once(':') else {
            return Err(DigestError::InvalidFormat(self.0.clone()));
        };
        if !is_algorithm_component(alg) {
            return Err(DigestError::InvalidFormat(self.0.clone()));
        }
        let algorithm: Algorithm = alg.parse()?;
        if hex.len() != algorithm.hex_len() {
            return Err(DigestError::InvalidLength {
                algorithm,
                expected: algorithm.hex_len(),
                actual: hex.len(),
            });
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestError::InvalidCharacters(hex.to_owned()));
        }
        Ok(algorithm)
    }

    /// Recompute the digest of `data` under this digest's algorithm and compare.
    pub fn verify(&self, data: &[u8]) -> bool {
        match self.validate() {
            Ok(algorithm) => algorithm.digest(data) == *self,
            Err(_) => false,
        }
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `[a-z0-9]+([+._-][a-z0-9]+)*`
fn is_algorithm_component(alg: &str) -> bool {
    alg.split(['+', '.', '_', '-']).all(|part| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}
