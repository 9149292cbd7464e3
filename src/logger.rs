//! Logging initialisation via tracing-subscriber.
//!
//! Each binary calls [`init`] once at startup, after config is resolved.

use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Dependency targets that flood the log at `info` and below (PDF parsing
/// warnings, connection pool chatter). A bare level caps them at `warn`.
const NOISY_TARGETS: &[&str] =
    &["lopdf", "pdf_extract", "hyper", "hyper_util", "h2", "rustls", "reqwest"];

/// Initialise the global tracing subscriber.
///
/// `level` is either a bare level (`"info"`, `"debug"`, ...), which applies
/// to docchat and is capped at `warn` for [`NOISY_TARGETS`], or a full
/// `EnvFilter` directive such as `"docchat=debug,lopdf=info"`, used as given.
///
/// If `prefer_level` is `true` (a `-v` flag was passed), `level` wins and
/// `RUST_LOG` is only the fallback for an invalid `level`. Otherwise
/// `RUST_LOG` wins when set.
///
/// With `log_file`, output is appended there without ANSI colours; the parent
/// directory is created if needed.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = build_filter(level, prefer_level)?;
    let writer = match log_file {
        Some(path) => file_writer(path)?,
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Expand a bare level into a directive list; pass full directives through.
fn directives(level: &str) -> String {
    let level = level.trim();
    let is_bare = !level.contains(['=', ',']);
    if !is_bare || matches!(level, "off" | "error" | "warn") {
        return level.to_string();
    }
    let caps: Vec<String> = NOISY_TARGETS.iter().map(|t| format!("{t}=warn")).collect();
    format!("{level},{}", caps.join(","))
}

fn build_filter(level: &str, prefer_level: bool) -> Result<EnvFilter, AppError> {
    let configured = directives(level);
    if prefer_level {
        EnvFilter::try_new(&configured).or_else(|level_err| {
            EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })
        })
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&configured))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    }
}

fn file_writer(path: &Path) -> Result<BoxMakeWriter, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Logger(format!("cannot create log directory '{}': {e}", parent.display()))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::Logger(format!("failed to open log file '{}': {e}", path.display())))?;
    Ok(BoxMakeWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_caps_noisy_targets() {
        let d = directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("lopdf=warn"));
        assert!(d.contains("hyper=warn"));
    }

    #[test]
    fn quiet_levels_and_directives_pass_through() {
        assert_eq!(directives("warn"), "warn");
        assert_eq!(directives(" error "), "error");
        assert_eq!(directives("docchat=trace,lopdf=info"), "docchat=trace,lopdf=info");
    }

    #[test]
    fn expanded_levels_parse_as_filters() {
        for l in ["trace", "debug", "info", "warn", "error", "docchat=debug,tower_http=info"] {
            assert!(build_filter(l, true).is_ok(), "expected '{l}' to build a filter");
        }
    }

    #[test]
    fn log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("docchat.log");
        file_writer(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn init_info_succeeds_or_already_init() {
        // Another test in the same process may have installed a subscriber first.
        match init("info", false, None) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
