use anyhow::{Context, Result, anyhow};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer flushing. Hold it until exit.
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn none() -> Self {
        Self { _worker: None }
    }

    pub fn with_guard(guard: WorkerGuard) -> Self {
        Self {
            _worker: Some(guard),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(to_stdout: bool, file_path: &Path, level: LevelFilter) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if to_stdout {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init()
            .map_err(|e| anyhow!("Failed to install stdout subscriber: {e}"))?;
        return Ok(LoggingGuard::none());
    }

    if let Some(parent) = file_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {parent:?}"))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .with_context(|| format!("Failed to open log file {file_path:?}"))?;

    let (writer, guard) = non_blocking::NonBlockingBuilder::default()
        .thread_name("livecrab-log")
        .finish(file);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to install file subscriber: {e}"))?;

    Ok(LoggingGuard::with_guard(guard))
}
