//! Reference HTTP registry server for depot.
//!
//! Serves the blob subset of the distribution API: existence checks,
//! downloads, deletes, and monolithic uploads under `/v2/{name}/blobs/`.
//! Blob content is file-backed ([`BlobStore`]); descriptor lookups go
//! through a repository-scoped view of the in-memory descriptor cache
//! before touching the filesystem.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

pub mod config;
pub mod routes;
pub mod statter;
pub mod storage;

pub use config::{Config, ConfigError, LogFormatter};
pub use routes::handle_request;
pub use statter::CachedBlobStatter;
pub use storage::BlobStore;

use depot_cache::{
    BlobDescriptorCacheProvider, CacheError, DescriptorCacheProvider, RepositoryScopedCache,
};
use depot_schema::{validate_repository_name, Digest, DigestError, NameError, RepositoryName};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tiny_http::Server;
use tracing::{error, info, warn};

/// How often idle workers wake up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),
    #[error("invalid repository name: {0}")]
    InvalidName(#[from] NameError),
    #[error("descriptor cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("blob unknown to registry: {0}")]
    BlobUnknown(Digest),
    #[error("provided digest did not match uploaded content: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("upload is missing the digest query parameter")]
    MissingDigest,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed request target: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidDigest(_)
            | ServerError::InvalidName(_)
            | ServerError::DigestMismatch { .. }
            | ServerError::MissingDigest
            | ServerError::InvalidUrl(_)
            | ServerError::Cache(
                CacheError::InvalidDigest(_) | CacheError::InvalidRepositoryName(_),
            ) => 400,
            ServerError::BlobUnknown(_)
            | ServerError::NotFound(_)
            | ServerError::Cache(CacheError::UnknownBlob(_)) => 404,
            ServerError::MethodNotAllowed => 405,
            ServerError::Io(_)
            | ServerError::Bind { .. }
            | ServerError::Cache(CacheError::InvalidDescriptor(_) | CacheError::InvalidCapacity) => {
                500
            }
        }
    }

    /// Distribution API error code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidDigest(_)
            | ServerError::DigestMismatch { .. }
            | ServerError::MissingDigest
            | ServerError::Cache(CacheError::InvalidDigest(_)) => "DIGEST_INVALID",
            ServerError::InvalidName(_) | ServerError::Cache(CacheError::InvalidRepositoryName(_)) => {
                "NAME_INVALID"
            }
            ServerError::BlobUnknown(_) | ServerError::Cache(CacheError::UnknownBlob(_)) => {
                "BLOB_UNKNOWN"
            }
            ServerError::MethodNotAllowed => "UNSUPPORTED",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::Io(_)
            | ServerError::Bind { .. }
            | ServerError::InvalidUrl(_)
            | ServerError::Cache(CacheError::InvalidDescriptor(_) | CacheError::InvalidCapacity) => {
                "UNKNOWN"
            }
        }
    }
}

/// A validated repository plus its cache view, resolved once per request.
pub struct Scope {
    pub repo: RepositoryName,
    pub cache: Option<RepositoryScopedCache>,
}

/// Shared state handed to every worker.
pub struct Registry {
    store: BlobStore,
    cache: Option<DescriptorCacheProvider>,
}

impl Registry {
    pub fn new(store: BlobStore, cache: Option<DescriptorCacheProvider>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn cache(&self) -> Option<&DescriptorCacheProvider> {
        self.cache.as_ref()
    }

    /// Validate `name` and open its cache view.
    pub fn scope(&self, name: &str) -> Result<Scope, ServerError> {
        match &self.cache {
            Some(cache) => {
                let view = cache.repository_scoped(name)?;
                Ok(Scope {
                    repo: view.repository().clone(),
                    cache: Some(view),
                })
            }
            None => Ok(Scope {
                repo: validate_repository_name(name)?,
                cache: None,
            }),
        }
    }
}

fn worker_loop(server: &Server, registry: &Registry, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle_request(registry, request),
            Ok(None) => {}
            Err(e) => {
                error!("failed to receive request: {e}");
                break;
            }
        }
    }
}

/// Spawn `workers` threads serving requests from `server` until `shutdown` is set.
pub fn spawn_workers(
    server: &Arc<Server>,
    registry: &Arc<Registry>,
    workers: usize,
    shutdown: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    (0..workers.max(1))
        .map(|_| {
            let server = Arc::clone(server);
            let registry = Arc::clone(registry);
            let shutdown = Arc::clone(shutdown);
            std::thread::spawn(move || worker_loop(&server, &registry, &shutdown))
        })
        .collect()
}

/// Wait for workers to finish their in-flight requests.
///
/// A zero `timeout` waits indefinitely. Returns how many workers were
/// still busy when the timeout ran out.
pub fn drain(handles: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    if timeout.is_zero() {
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        return 0;
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline && !handles.iter().all(JoinHandle::is_finished) {
        std::thread::sleep(POLL_INTERVAL);
    }
    let mut abandoned = 0;
    for handle in handles {
        if handle.is_finished() {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        } else {
            abandoned += 1;
        }
    }
    abandoned
}

/// Bind `config.http.addr` and serve until `shutdown` is set, then drain.
pub fn run_server(
    registry: &Arc<Registry>,
    config: &Config,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), ServerError> {
    let addr = config.http.addr.as_str();
    let server = Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        reason: e.to_string(),
    })?;
    let server = Arc::new(server);
    info!(
        "listening on {addr} with {} workers",
        config.http.workers
    );

    let handles = spawn_workers(&server, registry, config.http.workers, shutdown);
    let abandoned = drain(handles, Duration::from_secs(config.http.drain_timeout_secs));
    if abandoned > 0 {
        warn!("drain timeout elapsed with {abandoned} workers still busy");
    }
    info!("server stopped");
    Ok(())
}

/// Set `shutdown` on the first Ctrl-C; exit immediately on the second.
pub fn install_signal_handler(shutdown: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        eprintln!("\nshutdown requested, draining in-flight requests...");
    });
    if let Err(e) = result {
        warn!("failed to install signal handler: {e}");
    }
}

/// A test helper that starts a depot server on a random port in background threads.
///
/// The server listens on `127.0.0.1:{port}` and stores data in the provided `data_dir`.
/// Drop the `TestServer` to stop it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub registry: Arc<Registry>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server with the default descriptor cache.
    pub fn start(data_dir: PathBuf) -> Self {
        Self::start_with_cache(data_dir, Some(DescriptorCacheProvider::default()))
    }

    /// Start a test server with a caller-supplied cache, or none.
    pub fn start_with_cache(data_dir: PathBuf, cache: Option<DescriptorCacheProvider>) -> Self {
        std::fs::create_dir_all(&data_dir).expect("failed to create test data dir");
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let registry = Arc::new(Registry::new(BlobStore::new(data_dir.clone()), cache));
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(&server, &registry, 2, &shutdown);

        Self {
            url,
            port,
            data_dir,
            registry,
            shutdown,
            handles,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        drain(std::mem::take(&mut self.handles), Duration::from_secs(5));
    }
}
