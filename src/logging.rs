use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{env_bool, env_string};

const LOG_FILE_PREFIX: &str = "study-companion.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily-rotated log files; stdout only when `None`.
    pub file_dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level = env_string("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let file_dir = env_bool("ENABLE_FILE_LOGS")
            .unwrap_or(false)
            .then(|| PathBuf::from(env_string("LOG_DIR").unwrap_or_else(|| "./logs".to_string())));
        Self { level, file_dir }
    }
}

/// Held by `main` so buffered file output is flushed on exit.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn init_tracing(config: &LoggingConfig) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let file_writer = config.file_dir.as_ref().and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            Some(tracing_appender::non_blocking(appender))
        }
        Err(err) => {
            eprintln!("failed to create log directory {}: {err}", dir.display());
            None
        }
    });

    match file_writer {
        Some((writer, guard)) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            Some(FileLogGuard { _guard: guard })
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
