use std::path::{Path, PathBuf};

use flexi_logger::{Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, Naming};

use crate::config::LoggingConfig;

/// Initialize the logger for the daemon
pub fn init_logger(config: &LoggingConfig, debug: bool) -> Result<(), FlexiLoggerError> {
    let level = if debug || cfg!(debug_assertions) {
        "debug".to_string()
    } else {
        config.level.to_lowercase()
    };

    let mut logger = Logger::try_with_str(&level)?;

    logger = logger
        .log_to_file(
            FileSpec::default()
                .directory(get_log_directory())
                .basename("marquee")
                .suppress_timestamp(),
        )
        .format_for_files(custom_log_format);

    if config.append_to_file {
        logger = logger.append();
    }

    if config.rotate_logs {
        logger = logger.rotate(
            Criterion::Size(config.rotation_size_mb * 1024 * 1024),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(config.keep_log_files as usize),
        );
    }

    if config.log_to_console || debug {
        logger = logger.log_to_stdout();
    }

    logger.start()?;
    log::info!("Logger initialized with level: {level}");
    log::info!("Log file location: {}", get_log_file_path().display());

    Ok(())
}

/// Get the platform-specific log directory
pub fn get_log_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local/share"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
        .join("marquee/logs")
}

/// Get the full path to the main log file
pub fn get_log_file_path() -> PathBuf {
    get_log_directory().join("marquee.log")
}

/// Custom log format for file output
fn custom_log_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} [{}] [{}:{}] {}",
        now.now().format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.args()
    )
}

/// Ensure log directory exists
pub fn ensure_log_directory() -> color_eyre::Result<()> {
    let log_dir = get_log_directory();
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)?;
    }
    Ok(())
}

/// Log application startup information
pub fn log_startup_info() {
    log::info!("=== Marquee Starting ===");
    log::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    log::info!("OS: {}", std::env::consts::OS);
    log::info!("Architecture: {}", std::env::consts::ARCH);
}

/// Log application shutdown information
pub fn log_shutdown_info() {
    log::info!("=== Marquee Shutting Down ===");
}

/// Log configuration loading
pub fn log_config_loading(config_path: &Path, created: bool) {
    if created {
        log::info!("Created default config file at: {}", config_path.display());
    } else {
        log::info!("Loaded config file from: {}", config_path.display());
    }
}
