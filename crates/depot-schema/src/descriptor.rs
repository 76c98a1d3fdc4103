use crate::digest::{Algorithm, Digest, DigestError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Media type recorded for blobs whose type the client did not declare.
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("invalid descriptor digest: {0}")]
    Digest(#[from] DigestError),
    #[error("invalid length in descriptor: {0} < 0")]
    NegativeSize(i64),
    #[error("empty media type on descriptor for {0}")]
    EmptyMediaType(Digest),
}

/// What is known about a blob without reading it: identity, length, and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: i64,
    pub digest: Digest,
}

impl Descriptor {
    pub fn new(digest: Digest, size: i64, media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            size,
            digest,
        }
    }

    /// Describe `data` as addressed under `algorithm`.
    pub fn for_content(algorithm: Algorithm, data: &[u8], media_type: impl Into<String>) -> Self {
        Self::new(
            algorithm.digest(data),
            i64::try_from(data.len()).unwrap_or(i64::MAX),
            media_type,
        )
    }

    /// Structural checks applied before a descriptor may be cached.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        self.digest.validate()?;
        if self.size < 0 {
            return Err(DescriptorError::NegativeSize(self.size));
        }
        if self.media_type.is_empty() {
            return Err(DescriptorError::EmptyMediaType(self.digest.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_content_is_valid() {
        let desc = Descriptor::for_content(Algorithm::Sha256, b"layer", OCTET_STREAM);
        assert_eq!(desc.size, 5);
        assert!(desc.digest.verify(b"layer"));
        desc.validate().unwrap();
    }

    #[test]
    fn negative_size_rejected() {
        let mut desc = Descriptor::for_content(Algorithm::Sha256, b"x", OCTET_STREAM);
        desc.size = -1;
        assert_eq!(desc.validate(), Err(DescriptorError::NegativeSize(-1)));
    }

    #[test]
    fn empty_media_type_rejected() {
        let desc = Descriptor::for_content(Algorithm::Sha256, b"x", "");
        assert!(matches!(
            desc.validate(),
            Err(DescriptorError::EmptyMediaType(_))
        ));
    }

    #[test]
    fn malformed_embedded_digest_rejected() {
        let desc = Descriptor::new(Digest::new("sha256:zz"), 1, OCTET_STREAM);
        assert!(matches!(desc.validate(), Err(DescriptorError::Digest(_))));
    }

    #[test]
    fn zero_size_is_allowed() {
        let desc = Descriptor::for_content(Algorithm::Sha256, b"", OCTET_STREAM);
        assert_eq!(desc.size, 0);
        desc.validate().unwrap();
    }

    #[test]
    fn serde_uses_media_type_camel_case() {
        let media_type = "application/vnd.oci.image.layer.v1.tar";
        let desc = Descriptor::for_content(Algorithm::Sha256, b"abc", media_type);
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["mediaType"], media_type);
        assert_eq!(json["size"], 3);
        let back: Descriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }
}
