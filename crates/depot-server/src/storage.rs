use crate::ServerError;
use depot_schema::{Descriptor, Digest, RepositoryName, OCTET_STREAM};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Fsync a directory so a preceding `rename()` is durable.
fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}

/// Filesystem blob store: the durable side the descriptor cache fronts.
///
/// Content lives once under `blobs/{alg}/{hex[..2]}/{hex}`. A repository
/// sees a blob only if it has a link at
/// `repositories/{repo}/_layers/{alg}/{hex}`. Paths are only built from
/// validated digests and repository names.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.hex();
        self.root
            .join("blobs")
            .join(digest.algorithm())
            .join(&hex[..2])
            .join(hex)
    }

    fn link_path(&self, repo: &RepositoryName, digest: &Digest) -> PathBuf {
        self.root
            .join("repositories")
            .join(repo.as_str())
            .join("_layers")
            .join(digest.algorithm())
            .join(digest.hex())
    }

    /// Verify `data` against `digest`, store it, and link it into `repo`.
    /// Content already present is not rewritten.
    pub fn put(
        &self,
        repo: &RepositoryName,
        digest: &Digest,
        data: &[u8],
    ) -> Result<Descriptor, ServerError> {
        let algorithm = digest.validate()?;
        let actual = algorithm.digest(data);
        if actual != *digest {
            return Err(ServerError::DigestMismatch {
                expected: digest.clone(),
                actual,
            });
        }

        let dest = self.blob_path(digest);
        if !dest.exists() {
            let dir = dest.parent().unwrap_or(&self.root).to_path_buf();
            fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| ServerError::Io(e.error))?;
            fsync_dir(&dir)?;
        }

        let link = self.link_path(repo, digest);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&link, b"")?;

        Ok(Descriptor::new(
            digest.clone(),
            i64::try_from(data.len()).unwrap_or(i64::MAX),
            OCTET_STREAM,
        ))
    }

    /// Describe a blob linked into `repo`.
    pub fn stat(&self, repo: &RepositoryName, digest: &Digest) -> Result<Descriptor, ServerError> {
        digest.validate()?;
        if !self.link_path(repo, digest).exists() {
            return Err(ServerError::BlobUnknown(digest.clone()));
        }
        self.stat_global(digest)
    }

    /// Describe a blob regardless of which repositories link it.
    pub fn stat_global(&self, digest: &Digest) -> Result<Descriptor, ServerError> {
        digest.validate()?;
        match fs::metadata(self.blob_path(digest)) {
            Ok(meta) => Ok(Descriptor::new(
                digest.clone(),
                i64::try_from(meta.len()).unwrap_or(i64::MAX),
                OCTET_STREAM,
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ServerError::BlobUnknown(digest.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, repo: &RepositoryName, digest: &Digest) -> Result<Vec<u8>, ServerError> {
        self.stat(repo, digest)?;
        Ok(fs::read(self.blob_path(digest))?)
    }

    /// Remove `repo`'s link. The content stays for other repositories.
    pub fn unlink(&self, repo: &RepositoryName, digest: &Digest) -> Result<(), ServerError> {
        digest.validate()?;
        match fs::remove_file(self.link_path(repo, digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ServerError::BlobUnknown(digest.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
