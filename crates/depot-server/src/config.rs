use depot_cache::{DescriptorCacheProvider, ScopedClear, DEFAULT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration, usually loaded from a TOML file.
///
/// Every section and field is optional; omitted values take the defaults
/// shown on each section's `Default` impl.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub addr: String,
    /// Request-handling threads sharing the listener.
    pub workers: usize,
    /// How long shutdown waits for in-flight requests. `0` waits forever.
    pub drain_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_owned(),
            workers: 4,
            drain_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./depot-data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlobDescriptorBackend {
    #[default]
    Inmemory,
    Disabled,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub blobdescriptor: BlobDescriptorBackend,
    /// Descriptor capacity across all repositories. `<= 0` is unbounded.
    pub size: i64,
    pub scoped_clear: ScopedClear,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            blobdescriptor: BlobDescriptorBackend::default(),
            size: DEFAULT_SIZE as i64,
            scoped_clear: ScopedClear::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatter {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `depot_cache=debug,info`.
    pub level: String,
    pub formatter: LogFormatter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            formatter: LogFormatter::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.workers == 0 {
            return Err(ConfigError::Invalid(
                "http.workers must be at least 1".to_owned(),
            ));
        }
        if self.http.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("http.addr must not be empty".to_owned()));
        }
        Ok(())
    }

    /// The descriptor cache this config asks for, if any.
    pub fn build_cache(&self) -> Option<DescriptorCacheProvider> {
        match self.cache.blobdescriptor {
            BlobDescriptorBackend::Inmemory => Some(
                DescriptorCacheProvider::new(self.cache.size)
                    .with_scoped_clear(self.cache.scoped_clear),
            ),
            BlobDescriptorBackend::Disabled => None,
        }
    }
}
