use depot_schema::{Digest, RepositoryName};

/// Cache key: a digest plus the scope it is visible in.
///
/// `repo == None` is the global scope. Repository names are never empty, so
/// a scoped key can never collide with a global one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: Digest,
    repo: Option<RepositoryName>,
}

impl CacheKey {
    pub fn global(digest: Digest) -> Self {
        Self { digest, repo: None }
    }

    pub fn scoped(digest: Digest, repo: RepositoryName) -> Self {
        Self {
            digest,
            repo: Some(repo),
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn repository(&self) -> Option<&RepositoryName> {
        self.repo.as_ref()
    }

    pub fn is_global(&self) -> bool {
        self.repo.is_none()
    }
}
