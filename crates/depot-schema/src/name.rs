use crate::types::RepositoryName;
use thiserror::Error;

/// Longest repository name accepted, including any registry host prefix.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("repository name must not be empty")]
    Empty,
    #[error("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters, got {0}")]
    TooLong(usize),
    #[error("repository name must be lowercase: {0}")]
    NotLowercase(String),
    #[error("invalid repository name '{name}': bad component '{component}'")]
    InvalidComponent { name: String, component: String },
    #[error("invalid registry host in repository name: {0}")]
    InvalidDomain(String),
}

/// Validates and normalizes repository names before they scope anything.
pub trait RepositoryNameValidator: Send + Sync {
    fn validate(&self, name: &str) -> Result<RepositoryName, NameError>;
}

/// The distribution reference grammar for repository names.
///
/// `[host[:port]/]component(/component)*` where each path component is
/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`. Names are trimmed; uppercase path
/// components are rejected rather than folded.
#[derive(Debug, Default, Clone, Copy)]
pub struct DistributionNames;

impl RepositoryNameValidator for DistributionNames {
    fn validate(&self, name: &str) -> Result<RepositoryName, NameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(NameError::TooLong(name.len()));
        }

        let path = match name.split_once('/') {
            Some((first, rest)) if looks_like_domain(first) => {
                if !is_domain(first) {
                    return Err(NameError::InvalidDomain(first.to_owned()));
                }
                rest
            }
            _ => name,
        };

        if path.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(NameError::NotLowercase(name.to_owned()));
        }
        for component in path.split('/') {
            if !is_path_component(component) {
                return Err(NameError::InvalidComponent {
                    name: name.to_owned(),
                    component: component.to_owned(),
                });
            }
        }

        Ok(RepositoryName::new_unchecked(name))
    }
}

/// Validate `name` with the default grammar.
pub fn validate_repository_name(name: &str) -> Result<RepositoryName, NameError> {
    DistributionNames.validate(name)
}

fn looks_like_domain(first: &str) -> bool {
    first.contains(['.', ':'])
        || first == "localhost"
        || first.bytes().any(|b| b.is_ascii_uppercase())
}

fn is_domain(domain: &str) -> bool {
    let (host, port) = match domain.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn is_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let mut i = 0;
    loop {
        let start = i;
        while i < bytes.len() && alnum(bytes[i]) {
            i += 1;
        }
        if i == start {
            return false;
        }
        if i == bytes.len() {
            return true;
        }
        match bytes[i] {
            b'.' => i += 1,
            b'_' => {
                i += 1;
                if i < bytes.len() && bytes[i] == b'_' {
                    i += 1;
                }
            }
            b'-' => {
                while i < bytes.len() && bytes[i] == b'-' {
                    i += 1;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names_accepted() {
        for name in [
            "alpine",
            "library/alpine",
            "team/sub/app",
            "a.b_c__d--e",
            "foo-bar/baz9",
        ] {
            let validated = validate_repository_name(name).unwrap();
            assert_eq!(validated, name);
        }
    }

    #[test]
    fn host_prefixed_names_accepted() {
        for name in [
            "localhost/app",
            "localhost:5000/app",
            "registry.example.com/team/app",
            "Registry.Example.com:443/app",
        ] {
            assert!(validate_repository_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn whitespace_is_trimmed() {
        let name = validate_repository_name("  team/app\n").unwrap();
        assert_eq!(name, "team/app");
    }

    #[test]
    fn empty_rejected() {
        assert_eq!(validate_repository_name(""), Err(NameError::Empty));
        assert_eq!(validate_repository_name("   "), Err(NameError::Empty));
    }

    #[test]
    fn uppercase_path_rejected() {
        assert!(matches!(
            validate_repository_name("team/App"),
            Err(NameError::NotLowercase(_))
        ));
    }

    #[test]
    fn malformed_components_rejected() {
        for name in [
            "team//app",
            "/app",
            "app/",
            "-app",
            "app-",
            "a___b",
            "a..b",
            "app:latest",
            "team/app@sha256",
        ] {
            assert!(
                matches!(
                    validate_repository_name(name),
                    Err(NameError::InvalidComponent { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn bad_host_rejected() {
        assert!(matches!(
            validate_repository_name("host:port/app"),
            Err(NameError::InvalidDomain(_))
        ));
        assert!(matches!(
            validate_repository_name("-bad.example.com/app"),
            Err(NameError::InvalidDomain(_))
        ));
    }

    #[test]
    fn too_long_rejected() {
        let name = "a".repeat(NAME_TOTAL_LENGTH_MAX + 1);
        assert_eq!(
            validate_repository_name(&name),
            Err(NameError::TooLong(NAME_TOTAL_LENGTH_MAX + 1))
        );
        let max = "a".repeat(NAME_TOTAL_LENGTH_MAX);
        assert!(validate_repository_name(&max).is_ok());
    }
}
