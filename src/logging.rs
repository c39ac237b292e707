//! Log output for the feedwatch service.
//!
//! Poll results and failures are written to stdout and appended to a log
//! file that survives restarts. The HTTP client stack is kept at `warn` so
//! per-request chatter does not drown out the poll log.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Crates whose logs are capped at `warn`.
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "rustls"];

/// Map a configured level name to a tracing level, falling back to `info`.
fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse().unwrap_or(Level::INFO),
    }
}

fn build_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(parse_level(level).into());
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=warn").parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Open the log file for appending, creating its directory if needed.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(File::options().create(true).append(true).open(path)?)
}

/// Log to stdout and to `config.file`.
///
/// `RUST_LOG` directives apply on top of `config.level`. Fails if the log
/// file cannot be opened; callers fall back to [`init_console_only`].
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = open_log_file(Path::new(&config.file))?;
    let writer = std::io::stdout.and(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(build_filter(&config.level))
        .init();

    Ok(())
}

/// Log to stdout only.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(build_filter(level))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level_known() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level(" info "), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("Error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_build_filter_quiets_http_stack() {
        let filter = build_filter("debug").to_string();
        for target in QUIET_TARGETS {
            assert!(filter.contains(&format!("{target}=warn")), "{filter}");
        }
    }

    #[test]
    fn test_open_log_file_creates_directory_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("feedwatch.log");

        writeln!(open_log_file(&path).unwrap(), "first run").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second run").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first run\nsecond run\n");
    }
}
