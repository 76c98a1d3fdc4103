use crate::arc::{AdaptiveCache, CacheStats};
use crate::key::CacheKey;
use crate::scoped::{RepositoryScopedCache, ScopedClear};
use crate::{BlobDescriptorCacheProvider, BlobDescriptorService, CacheError, UNLIMITED_SIZE};
use depot_schema::{Descriptor, Digest, DistributionNames, RepositoryNameValidator};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// The global descriptor cache and the owner of the shared adaptive store.
///
/// Cloning is cheap and every clone shares the same store. Global writes
/// are first-writer-wins per digest, and an alias digest is only recorded
/// after its canonical digest is.
#[derive(Clone)]
pub struct DescriptorCacheProvider {
    store: Arc<AdaptiveCache<CacheKey, Descriptor>>,
    names: Arc<dyn RepositoryNameValidator>,
    scoped_clear: ScopedClear,
}

impl DescriptorCacheProvider {
    /// Create a provider holding at most `size` descriptors across all
    /// scopes. `size <= 0` means unbounded.
    pub fn new(size: i64) -> Self {
        let capacity = usize::try_from(size)
            .ok()
            .and_then(NonZeroUsize::new)
            .unwrap_or(NonZeroUsize::MAX);
        debug!(
            capacity = capacity.get(),
            unbounded = capacity.get() == UNLIMITED_SIZE,
            "creating blob descriptor cache"
        );
        Self {
            store: Arc::new(AdaptiveCache::with_capacity(capacity)),
            names: Arc::new(DistributionNames),
            scoped_clear: ScopedClear::default(),
        }
    }

    /// Replace the repository name validator used by [`Self::repository_scoped`].
    #[must_use]
    pub fn with_validator(mut self, names: Arc<dyn RepositoryNameValidator>) -> Self {
        self.names = names;
        self
    }

    /// Set what a scoped `clear` does to the global entry.
    #[must_use]
    pub fn with_scoped_clear(mut self, policy: ScopedClear) -> Self {
        self.scoped_clear = policy;
        self
    }

    pub fn scoped_clear(&self) -> ScopedClear {
        self.scoped_clear
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Resident descriptors across every scope.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub(crate) fn store(&self) -> &AdaptiveCache<CacheKey, Descriptor> {
        &self.store
    }

    /// Store `desc` under its own digest unless something already is.
    fn set_canonical(&self, desc: &Descriptor) {
        let key = CacheKey::global(desc.digest.clone());
        if !self.store.contains(&key) {
            self.store.put(key, desc.clone());
        }
    }
}

impl Default for DescriptorCacheProvider {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SIZE as i64)
    }
}

impl std::fmt::Debug for DescriptorCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCacheProvider")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("scoped_clear", &self.scoped_clear)
            .finish_non_exhaustive()
    }
}

impl BlobDescriptorService for DescriptorCacheProvider {
    fn stat(&self, digest: &Digest) -> Result<Descriptor, CacheError> {
        digest.validate()?;
        self.store
            .get(&CacheKey::global(digest.clone()))
            .ok_or_else(|| CacheError::UnknownBlob(digest.clone()))
    }

    fn clear(&self, digest: &Digest) -> Result<(), CacheError> {
        digest.validate()?;
        self.store.remove(&CacheKey::global(digest.clone()));
        Ok(())
    }

    fn set_descriptor(&self, digest: &Digest, desc: &Descriptor) -> Result<(), CacheError> {
        digest.validate()?;
        // First writer wins. `contains` leaves hit/miss counters to real reads.
        if self.store.contains(&CacheKey::global(digest.clone())) {
            return Ok(());
        }

        // Validate before the canonical write so a rejected call never
        // leaves a half-registered alias behind.
        desc.validate()?;

        if *digest != desc.digest {
            self.set_canonical(desc);
        }

        self.store.put(CacheKey::global(digest.clone()), desc.clone());
        Ok(())
    }
}

impl BlobDescriptorCacheProvider for DescriptorCacheProvider {
    type Scoped = RepositoryScopedCache;

    fn repository_scoped(&self, repo: &str) -> Result<RepositoryScopedCache, CacheError> {
        let repo = self.names.validate(repo)?;
        Ok(RepositoryScopedCache::new(repo, self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_schema::{Algorithm, NameError, RepositoryName, OCTET_STREAM};

    fn desc(data: &[u8]) -> Descriptor {
        Descriptor::for_content(Algorithm::Sha256, data, OCTET_STREAM)
    }

    #[test]
    fn non_positive_size_is_unbounded() {
        assert_eq!(DescriptorCacheProvider::new(0).capacity(), UNLIMITED_SIZE);
        assert_eq!(DescriptorCacheProvider::new(-5).capacity(), UNLIMITED_SIZE);
        assert_eq!(DescriptorCacheProvider::new(7).capacity(), 7);
    }

    #[test]
    fn default_uses_default_size() {
        assert_eq!(
            DescriptorCacheProvider::default().capacity(),
            crate::DEFAULT_SIZE
        );
    }

    #[test]
    fn stat_miss_is_unknown_blob() {
        let cache = DescriptorCacheProvider::new(16);
        let d = desc(b"never written");
        assert_eq!(
            cache.stat(&d.digest),
            Err(CacheError::UnknownBlob(d.digest.clone()))
        );
    }

    #[test]
    fn set_then_stat_roundtrip() {
        let cache = DescriptorCacheProvider::new(16);
        let d = desc(b"blob");
        cache.set_descriptor(&d.digest, &d).unwrap();
        assert_eq!(cache.stat(&d.digest).unwrap(), d);
    }

    #[test]
    fn first_writer_wins() {
        let cache = DescriptorCacheProvider::new(16);
        let a = desc(b"blob");
        let mut b = a.clone();
        b.media_type = "application/vnd.other".to_owned();
        cache.set_descriptor(&a.digest, &a).unwrap();
        cache.set_descriptor(&a.digest, &b).unwrap();
        assert_eq!(cache.stat(&a.digest).unwrap(), a);
    }

    #[test]
    fn writes_do_not_count_as_lookups() {
        let cache = DescriptorCacheProvider::new(16);
        let d = desc(b"blob");
        cache.set_descriptor(&d.digest, &d).unwrap();
        cache.set_descriptor(&d.digest, &d).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));

        cache.stat(&d.digest).unwrap();
        let _ = cache.stat(&desc(b"absent").digest);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_descriptor_leaves_store_untouched() {
        let cache = DescriptorCacheProvider::new(16);
        let alias = Algorithm::Sha512.digest(b"blob");
        let mut d = desc(b"blob");
        d.media_type.clear();
        assert!(matches!(
            cache.set_descriptor(&alias, &d),
            Err(CacheError::InvalidDescriptor(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_digest_rejected_everywhere() {
        let cache = DescriptorCacheProvider::new(16);
        let bad = Digest::new("sha256:nothex");
        let d = desc(b"blob");
        assert!(matches!(cache.stat(&bad), Err(CacheError::InvalidDigest(_))));
        assert!(matches!(cache.clear(&bad), Err(CacheError::InvalidDigest(_))));
        assert!(matches!(
            cache.set_descriptor(&bad, &d),
            Err(CacheError::InvalidDigest(_))
        ));
        assert!(cache.is_empty());
    }

    struct OnlyTeam;

    impl RepositoryNameValidator for OnlyTeam {
        fn validate(&self, name: &str) -> Result<RepositoryName, NameError> {
            if name.starts_with("team/") {
                DistributionNames.validate(name)
            } else {
                Err(NameError::InvalidComponent {
                    name: name.to_owned(),
                    component: name.to_owned(),
                })
            }
        }
    }

    #[test]
    fn custom_validator_is_consulted() {
        let cache = DescriptorCacheProvider::new(16).with_validator(Arc::new(OnlyTeam));
        assert!(cache.repository_scoped("team/app").is_ok());
        assert!(matches!(
            cache.repository_scoped("other/app"),
            Err(CacheError::InvalidRepositoryName(_))
        ));
    }

    #[test]
    fn clones_share_one_store() {
        let cache = DescriptorCacheProvider::new(16);
        let other = cache.clone();
        let d = desc(b"shared");
        cache.set_descriptor(&d.digest, &d).unwrap();
        assert_eq!(other.stat(&d.digest).unwrap(), d);
    }
}
