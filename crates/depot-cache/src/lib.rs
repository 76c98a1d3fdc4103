//! In-memory blob descriptor cache for depot.
//!
//! Answers "is digest D known, and what are its size and media type"
//! without touching durable storage. One [`DescriptorCacheProvider`] owns a
//! single [`AdaptiveCache`] shared by the global scope and every
//! [`RepositoryScopedCache`] handed out from it, so all scopes compete for
//! one eviction budget.
//!
//! Nothing here is persisted, shared between processes, or fetched on a
//! miss: a miss is reported as [`CacheError::UnknownBlob`] and the caller
//! decides where to look next.

pub mod arc;
pub mod key;
pub mod provider;
pub mod scoped;

pub use arc::{AdaptiveCache, CacheStats};
pub use key::CacheKey;
pub use provider::DescriptorCacheProvider;
pub use scoped::{RepositoryScopedCache, ScopedClear};

use depot_schema::{Descriptor, DescriptorError, Digest, DigestError, NameError};
use thiserror::Error;

/// Capacity used when none is configured.
pub const DEFAULT_SIZE: usize = 10_000;

/// Capacity that disables eviction.
pub const UNLIMITED_SIZE: usize = usize::MAX;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(#[from] NameError),
    #[error("blob unknown to descriptor cache: {0}")]
    UnknownBlob(Digest),
    #[error("cache capacity must be greater than zero")]
    InvalidCapacity,
}

impl CacheError {
    /// True for the miss signal, as opposed to a rejected request.
    pub fn is_unknown_blob(&self) -> bool {
        matches!(self, CacheError::UnknownBlob(_))
    }
}

/// Stat, clear, and record blob descriptors.
///
/// Implemented by the global provider and by repository-scoped views, so
/// callers can hold either behind the same interface.
pub trait BlobDescriptorService: Send + Sync {
    /// Return the cached descriptor for `digest`, or [`CacheError::UnknownBlob`].
    fn stat(&self, digest: &Digest) -> Result<Descriptor, CacheError>;

    /// Forget `digest` in this scope. Succeeds whether or not it was cached.
    fn clear(&self, digest: &Digest) -> Result<(), CacheError>;

    /// Record `desc` as the descriptor for `digest`.
    fn set_descriptor(&self, digest: &Digest, desc: &Descriptor) -> Result<(), CacheError>;
}

/// A descriptor service that can also hand out repository-scoped views.
pub trait BlobDescriptorCacheProvider: BlobDescriptorService {
    type Scoped: BlobDescriptorService;

    /// Validate `repo` and return a view limited to that repository.
    fn repository_scoped(&self, repo: &str) -> Result<Self::Scoped, CacheError>;
}
