//! Configuration, logging and server startup for chatmirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chatmirror_api::{ApiServer, ApiState};
use chatmirror_config::{Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig, ValidationResult};
use chatmirror_sync::SyncService;

use crate::cli::DEFAULT_CONFIG;

/// Get the .chatmirror directory path.
pub(crate) fn chatmirror_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".chatmirror"))
        .unwrap_or_else(|| PathBuf::from(".chatmirror"))
}

/// Load and validate the configuration. A missing file is only tolerated
/// for the implicit default path.
pub(crate) fn load_config(path: Option<&Path>) -> Result<(Config, ValidationResult), ConfigError> {
    let config = match path {
        Some(path) => ConfigLoader::load(path)?,
        None => ConfigLoader::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    let report = ConfigValidator::ensure_valid(&config)?;
    Ok((config, report))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to `logging.directory` (default
/// ~/.chatmirror/logs/) with daily rotation. The console layer writes to
/// stderr so command output on stdout stays clean.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = logging
        .directory
        .clone()
        .unwrap_or_else(|| chatmirror_dir().join("logs"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("chatmirror")
        .filename_suffix("log")
        .max_log_files(logging.max_files)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file writer when dropped.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Log validation warnings once tracing is up.
pub(crate) fn report_warnings(report: &ValidationResult) {
    for warning in &report.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
}

/// Run the relay in foreground until Ctrl-C.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting chatmirror v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Watching debug ports {:?} on {} (default {})",
        config.devtools.ports, config.devtools.host, config.devtools.default_port
    );

    let service = Arc::new(SyncService::new(&config)?);
    let state = Arc::new(ApiState::new(service.clone(), &config.sync));
    let server = ApiServer::new(config.server.clone(), state);

    let served = server.run(shutdown_signal()).await;
    service.shutdown().await;
    served?;

    info!("chatmirror stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
    }
}
