// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialisation
//!
//! Installs a global `tracing` subscriber: a console layer filtered by
//! `RUST_LOG` if set, otherwise by the configured level plus the per-crate
//! debug flags. With the `file-logging` feature a second layer writes to
//! `<log_dir>/run_<timestamp>/neurocl.log`.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

/// Keeps background log writers alive; logs are flushed when dropped
#[derive(Default)]
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    #[cfg(feature = "file-logging")]
    log_file_dir: Option<std::path::PathBuf>,
}

impl LoggingGuard {
    /// Directory receiving the log file, if file logging is active
    #[cfg(feature = "file-logging")]
    pub fn log_dir(&self) -> Option<&std::path::Path> {
        self.log_file_dir.as_deref()
    }
}

/// Filter directives for `config` and `debug_flags`
pub fn filter_directives(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> String {
    debug_flags.to_filter_string(&config.level.to_lowercase())
}

fn build_filter(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = filter_directives(config, debug_flags);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if the filter is invalid, the log directory cannot be created, or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    let filter = build_filter(config, debug_flags)?;
    #[allow(unused_mut)]
    let mut guard = LoggingGuard::default();

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(config.ansi);
    let console = match config.format {
        LogFormat::Text => console.boxed(),
        LogFormat::Json => console.json().boxed(),
    };
    #[allow(unused_mut)]
    let mut layers = vec![console.with_filter(filter).boxed()];

    #[cfg(feature = "file-logging")]
    {
        if let Some(base) = &config.log_dir {
            let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
            let run_folder = base.join(format!("run_{}", timestamp));
            std::fs::create_dir_all(&run_folder).with_context(|| {
                format!("Failed to create log directory: {}", run_folder.display())
            })?;
            let appender = tracing_appender::rolling::never(&run_folder, "neurocl.log");
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(build_filter(config, debug_flags)?)
                .boxed();
            layers.push(file_layer);
            guard._file_guard = Some(file_guard);
            guard.log_file_dir = Some(run_folder);
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;
    Ok(guard)
}

/// Like [`init_logging`], but an already installed subscriber is not an error
///
/// Convenient in tests, where many cases share one process.
pub fn try_init_logging(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> LoggingGuard {
    init_logging(config, debug_flags).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_combine_level_and_flags() {
        let config = LoggingConfig {
            level: "WARN".to_string(),
            ..LoggingConfig::default()
        };
        let flags = CrateDebugFlags::from_args(vec!["--debug-neurocl-runtime".to_string()]);
        assert_eq!(filter_directives(&config, &flags), "neurocl-runtime=debug,warn");
    }

    #[test]
    fn test_second_init_is_rejected_but_try_init_is_not() {
        let config = LoggingConfig::default();
        let flags = CrateDebugFlags::default();
        let _first = try_init_logging(&config, &flags);
        assert!(init_logging(&config, &flags).is_err());
        let _again = try_init_logging(&config, &flags);
    }
}
