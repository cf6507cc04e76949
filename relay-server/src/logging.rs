//! Tracing-subscriber setup: a console layer always on, plus an optional
//! rolling file layer when `log_to_file` is set. The ambient-logging
//! counterpart of `error_handler.py`'s `ErrorHandler`, which this server
//! replaces with structured `tracing` spans/events throughout.

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initializes the global subscriber. The returned guard must be held for
/// the process lifetime when file logging is enabled: dropping it flushes
/// and stops the non-blocking file writer.
pub fn init(config: &Config, level_override: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter_str = level_override.unwrap_or_else(|| config.log_level.as_tracing_filter());
    let env_filter = EnvFilter::try_new(filter_str).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_to_file {
        let log_path = Path::new(&config.log_file_path);
        let dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("server.log"));
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();

        None
    }
}
