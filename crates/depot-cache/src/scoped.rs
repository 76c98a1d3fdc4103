use crate::key::CacheKey;
use crate::provider::DescriptorCacheProvider;
use crate::{BlobDescriptorService, CacheError};
use depot_schema::{Descriptor, Digest, RepositoryName};
use serde::{Deserialize, Serialize};

/// What [`RepositoryScopedCache::clear`] does to the global entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopedClear {
    /// Drop only the repository's entry. Other repositories and the global
    /// scope keep seeing the digest.
    #[default]
    Repository,
    /// Drop the repository's entry and the global entry for the digest.
    Cascade,
}

/// One repository's view of the descriptor cache.
///
/// Holds a validated name and a handle to the provider; no state of its
/// own, so creating one per request is cheap. Lookups see only entries
/// written through a view of the same repository and never fall back to
/// the global scope. Writes go to both.
#[derive(Debug, Clone)]
pub struct RepositoryScopedCache {
    repo: RepositoryName,
    parent: DescriptorCacheProvider,
}

impl RepositoryScopedCache {
    pub(crate) fn new(repo: RepositoryName, parent: DescriptorCacheProvider) -> Self {
        Self { repo, parent }
    }

    pub fn repository(&self) -> &RepositoryName {
        &self.repo
    }

    fn key(&self, digest: &Digest) -> CacheKey {
        CacheKey::scoped(digest.clone(), self.repo.clone())
    }
}

impl BlobDescriptorService for RepositoryScopedCache {
    fn stat(&self, digest: &Digest) -> Result<Descriptor, CacheError> {
        digest.validate()?;
        self.parent
            .store()
            .get(&self.key(digest))
            .ok_or_else(|| CacheError::UnknownBlob(digest.clone()))
    }

    fn clear(&self, digest: &Digest) -> Result<(), CacheError> {
        digest.validate()?;
        self.parent.store().remove(&self.key(digest));
        if self.parent.scoped_clear() == ScopedClear::Cascade {
            self.parent.clear(digest)?;
        }
        Ok(())
    }

    /// Always overwrites the repository entry, then records the descriptor
    /// globally under the provider's first-writer-wins rule.
    fn set_descriptor(&self, digest: &Digest, desc: &Descriptor) -> Result<(), CacheError> {
        digest.validate()?;
        desc.validate()?;
        self.parent.store().put(self.key(digest), desc.clone());
        self.parent.set_descriptor(digest, desc)
    }
}
