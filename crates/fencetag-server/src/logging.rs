//! Logging initialization.
//!
//! - **Production**: JSON logs to rolling files plus compact logs to stdout
//! - **Development**: Pretty logs to stdout with span events

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `RUST_LOG` is not set.
pub const LOG_LEVEL_ENV: &str = "FENCETAG_LOG_LEVEL";

// Non-blocking writers flush on drop, so the guards live for the whole process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins; otherwise `FENCETAG_LOG_LEVEL`, otherwise `info`.
///
/// # Production Mode
///
/// - Daily rolling JSON files in `/var/log/fencetag/`
/// - Compact stdout without ANSI colors, for the systemd journal
///
/// # Development Mode
///
/// - Pretty stdout with span open/close events
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let env_filter = build_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref())?;

    if is_production {
        init_production(env_filter);
    } else {
        init_development(env_filter);
    }

    Ok(())
}

fn build_filter(fallback: Option<&str>) -> anyhow::Result<EnvFilter> {
    let level = fallback.unwrap_or("info");
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}

fn init_production(env_filter: EnvFilter) {
    let log_dir = log_directory();

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir).ok();
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "fencetag");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// Returns the log directory for the current platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/fencetag")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fencetag")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_named_for_fencetag() {
        let dir = log_directory();
        assert!(dir.to_string_lossy().contains("fencetag") || dir.ends_with("logs"));
    }

    #[test]
    fn test_filter_accepts_level_directives() {
        assert!(build_filter(Some("debug")).is_ok());
        assert!(build_filter(Some("fencetag_core=trace,tower_http=info")).is_ok());
        assert!(build_filter(None).is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage_directive() {
        // RUST_LOG takes precedence over the fallback.
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_filter(Some("fencetag=loud")).is_err());
        }
    }
}
