//! Structured logging.
//!
//! Logs go to stderr so stdout stays clean for the orchestrator; the
//! format is pretty for humans or JSON for collection. Filters resolve
//! env overrides first, then config, then a `mnemo=info` default
//! (`debug` with `--verbose`).

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly logs for local debugging.
    Pretty,
    /// JSON structured logs.
    Json,
}

/// Initializes the global tracing subscriber. Safe to call once per
/// process; later calls are ignored.
pub fn init(settings: &LoggingSettings, verbose: bool) {
    let filter = build_filter(settings, verbose);
    let format = resolve_format(settings);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    // A second init (tests, embedding) is harmless.
    drop(result);
}

fn build_filter(settings: &LoggingSettings, verbose: bool) -> EnvFilter {
    if let Ok(filter) = std::env::var("MNEMO_LOG_FILTER") {
        return EnvFilter::new(filter);
    }
    if let Ok(level) = std::env::var("MNEMO_LOG_LEVEL") {
        return EnvFilter::new(normalize_level(&level));
    }
    if let Some(level) = &settings.level {
        return EnvFilter::new(normalize_level(level));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(if verbose { "mnemo=debug" } else { "mnemo=info" })
}

fn resolve_format(settings: &LoggingSettings) -> LogFormat {
    let from_env = std::env::var("MNEMO_LOG_FORMAT").ok();
    let value = from_env.as_deref().or(settings.format.as_deref());
    match value.map(str::to_lowercase).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Bare levels scope to this crate; full directives pass through.
fn normalize_level(level: &str) -> String {
    let normalized = level.trim().to_lowercase();
    if normalized.contains('=') || normalized.contains(',') {
        normalized
    } else {
        format!("mnemo={normalized}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("debug"), "mnemo=debug");
        assert_eq!(normalize_level("INFO"), "mnemo=info");
        assert_eq!(normalize_level("mnemo=warn,rusqlite=error"), "mnemo=warn,rusqlite=error");
    }

    #[test]
    fn test_format_resolution_from_settings() {
        let settings = LoggingSettings {
            level: None,
            format: Some("json".to_string()),
        };
        assert_eq!(resolve_format(&settings), LogFormat::Json);

        let settings = LoggingSettings::default();
        assert_eq!(resolve_format(&settings), LogFormat::Pretty);
    }
}
