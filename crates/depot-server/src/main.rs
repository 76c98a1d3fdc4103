use clap::Parser;
use depot_server::{install_signal_handler, run_server, BlobStore, Config, LogFormatter, Registry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "depot-server", about = "Blob registry server with a descriptor cache")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `http.addr`.
    #[arg(long)]
    addr: Option<String>,

    /// Directory to store blobs and repository links, overriding `storage.root`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Descriptor cache capacity, overriding `cache.size`. `0` is unbounded.
    #[arg(long, allow_negative_numbers = true)]
    cache_size: Option<i64>,
}

fn init_logging(config: &Config) {
    let (filter, bad_level) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, None),
        Err(_) => match EnvFilter::try_new(&config.log.level) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new("info"), Some(config.log.level.clone())),
        },
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log.formatter {
        LogFormatter::Text => builder.init(),
        LogFormatter::Json => builder.json().init(),
    }
    if let Some(level) = bad_level {
        warn!("invalid log level {level:?}, using info");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if let Some(addr) = cli.addr {
        config.http.addr = addr;
    }
    if let Some(root) = cli.data_dir {
        config.storage.root = root;
    }
    if let Some(size) = cli.cache_size {
        config.cache.size = size;
    }
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    init_logging(&config);

    if let Err(e) = std::fs::create_dir_all(&config.storage.root) {
        error!(
            "failed to create data directory {}: {e}",
            config.storage.root.display()
        );
        return ExitCode::FAILURE;
    }
    info!("data directory: {}", config.storage.root.display());

    let cache = config.build_cache();
    match &cache {
        Some(cache) => info!(
            "blob descriptor cache: inmemory, capacity {}",
            cache.capacity()
        ),
        None => info!("blob descriptor cache: disabled"),
    }

    let registry = Arc::new(Registry::new(
        BlobStore::new(config.storage.root.clone()),
        cache,
    ));
    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&shutdown));

    match run_server(&registry, &config, &shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
