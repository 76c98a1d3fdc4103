use crate::storage::BlobStore;
use crate::ServerError;
use depot_cache::BlobDescriptorService;
use depot_schema::{Descriptor, Digest, RepositoryName};
use tracing::{debug, warn};

/// Descriptor lookups for one repository: cache first, then the blob store.
///
/// Caching is an optimization only. A failed cache write is logged and the
/// request carries on with what the store said.
///
/// `stat` and `clear` are not atomic with respect to each other. A `stat`
/// that reads the store link just before a concurrent `clear` unlinks it
/// can `remember` the descriptor after `clear` has dropped it, so the
/// repository keeps reporting the deleted blob until the entry is evicted.
pub struct CachedBlobStatter<'a> {
    cache: Option<&'a dyn BlobDescriptorService>,
    store: &'a BlobStore,
    repo: &'a RepositoryName,
}

impl<'a> CachedBlobStatter<'a> {
    pub fn new(
        cache: Option<&'a dyn BlobDescriptorService>,
        store: &'a BlobStore,
        repo: &'a RepositoryName,
    ) -> Self {
        Self { cache, store, repo }
    }

    pub fn stat(&self, digest: &Digest) -> Result<Descriptor, ServerError> {
        if let Some(cache) = self.cache {
            match cache.stat(digest) {
                Ok(desc) => {
                    debug!(repo = %self.repo, %digest, "descriptor cache hit");
                    return Ok(desc);
                }
                Err(e) if e.is_unknown_blob() => {}
                Err(e) => debug!(repo = %self.repo, %digest, "descriptor cache stat failed: {e}"),
            }
        }

        let desc = self.store.stat(self.repo, digest)?;
        self.remember(digest, &desc);
        Ok(desc)
    }

    /// Record a descriptor the store just produced.
    pub fn remember(&self, digest: &Digest, desc: &Descriptor) {
        if let Some(cache) = self.cache {
            if let Err(e) = cache.set_descriptor(digest, desc) {
                warn!(repo = %self.repo, %digest, "failed to cache descriptor: {e}");
            }
        }
    }

    /// Unlink from the store, then forget the cached descriptor.
    pub fn clear(&self, digest: &Digest) -> Result<(), ServerError> {
        self.store.unlink(self.repo, digest)?;
        if let Some(cache) = self.cache {
            if let Err(e) = cache.clear(digest) {
                warn!(repo = %self.repo, %digest, "failed to clear cached descriptor: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_cache::{BlobDescriptorCacheProvider, DescriptorCacheProvider};
    use depot_schema::Algorithm;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: BlobStore,
        cache: DescriptorCacheProvider,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf());
        Fixture {
            _dir: dir,
            store,
            cache: DescriptorCacheProvider::new(128),
        }
    }

    #[test]
    fn miss_falls_through_and_populates_cache() {
        let f = fixture();
        let view = f.cache.repository_scoped("team/app").unwrap();
        let digest = Algorithm::Sha256.digest(b"content");
        f.store
            .put(view.repository(), &digest, b"content")
            .unwrap();

        assert!(view.stat(&digest).unwrap_err().is_unknown_blob());
        let statter = CachedBlobStatter::new(Some(&view), &f.store, view.repository());
        let desc = statter.stat(&digest).unwrap();
        assert_eq!(desc.size, 7);
        assert_eq!(view.stat(&digest).unwrap(), desc);
        assert_eq!(f.cache.stat(&digest).unwrap(), desc);
    }

    #[test]
    fn cache_hit_skips_store() {
        let f = fixture();
        let view = f.cache.repository_scoped("team/app").unwrap();
        let desc = Descriptor::for_content(Algorithm::Sha256, b"only cached", "application/x-test");
        view.set_descriptor(&desc.digest, &desc).unwrap();

        let statter = CachedBlobStatter::new(Some(&view), &f.store, view.repository());
        assert_eq!(statter.stat(&desc.digest).unwrap(), desc);
    }

    #[test]
    fn unknown_everywhere_is_blob_unknown() {
        let f = fixture();
        let view = f.cache.repository_scoped("team/app").unwrap();
        let statter = CachedBlobStatter::new(Some(&view), &f.store, view.repository());
        let digest = Algorithm::Sha256.digest(b"absent");
        assert!(matches!(
            statter.stat(&digest),
            Err(ServerError::BlobUnknown(_))
        ));
    }

    #[test]
    fn works_without_cache() {
        let f = fixture();
        let repo = depot_schema::validate_repository_name("team/app").unwrap();
        let digest = Algorithm::Sha256.digest(b"uncached");
        f.store.put(&repo, &digest, b"uncached").unwrap();
        let statter = CachedBlobStatter::new(None, &f.store, &repo);
        assert_eq!(statter.stat(&digest).unwrap().size, 8);
        statter.clear(&digest).unwrap();
        assert!(statter.stat(&digest).is_err());
    }

    #[test]
    fn clear_drops_scoped_entry() {
        let f = fixture();
        let view = f.cache.repository_scoped("team/app").unwrap();
        let digest = Algorithm::Sha256.digest(b"doomed");
        f.store.put(view.repository(), &digest, b"doomed").unwrap();
        let statter = CachedBlobStatter::new(Some(&view), &f.store, view.repository());
        statter.stat(&digest).unwrap();

        statter.clear(&digest).unwrap();
        assert!(view.stat(&digest).unwrap_err().is_unknown_blob());
        assert!(matches!(
            statter.stat(&digest),
            Err(ServerError::BlobUnknown(_))
        ));
    }

    #[test]
    fn remember_after_clear_restores_scoped_entry() {
        let f = fixture();
        let view = f.cache.repository_scoped("team/app").unwrap();
        let digest = Algorithm::Sha256.digest(b"raced");
        f.store.put(view.repository(), &digest, b"raced").unwrap();
        let statter = CachedBlobStatter::new(Some(&view), &f.store, view.repository());

        // A stat that read the link before the clear, finishing after it.
        let desc = f.store.stat(view.repository(), &digest).unwrap();
        statter.clear(&digest).unwrap();
        statter.remember(&digest, &desc);

        assert_eq!(statter.stat(&digest).unwrap(), desc);
        assert!(matches!(
            f.store.stat(view.repository(), &digest),
            Err(ServerError::BlobUnknown(_))
        ));
    }
}
