//! Digest, descriptor, and repository-name types for depot.
//!
//! This crate defines the key model shared by the cache and the server:
//! algorithm-qualified content digests (`Digest`, `Algorithm`), blob
//! metadata (`Descriptor`), and the repository name grammar used to scope
//! cache entries (`RepositoryName`, `RepositoryNameValidator`).

pub mod descriptor;
pub mod digest;
pub mod name;
pub mod types;

pub use descriptor::{Descriptor, DescriptorError, OCTET_STREAM};
pub use digest::{Algorithm, Digest, DigestError};
pub use name::{
    validate_repository_name, DistributionNames, NameError, RepositoryNameValidator,
    NAME_TOTAL_LENGTH_MAX,
};
pub use types::RepositoryName;
