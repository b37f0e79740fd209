use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a log level, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Build the filter directive for a log mode; unknown modes fall back to info
pub fn filter_directive(log_mode: &str) -> String {
    let level = LogLevel::parse(log_mode).unwrap_or_default();
    format!("ptero_hub={}", level.as_str())
}

/// Install the global subscriber. `RUST_LOG` wins over `log_mode` when set.
pub fn init_logger(log_mode: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_mode)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

pub mod log {
    pub use tracing::{debug, error, info, warn};

    /// Record an outgoing panel request
    pub fn panel_request(panel: &str, surface: &str, method: &str, path: &str) {
        debug!(panel = panel, surface = surface, method = method, path = path, "Panel request");
    }

    /// Record a panel that dropped out of an aggregated call
    pub fn panel_failure(panel: &str, operation: &str, error: &str) {
        warn!(panel = panel, operation = operation, error = error, "Panel skipped");
    }

    /// Record a console capture state transition
    pub fn capture(server: &str, state: &str, detail: Option<&str>) {
        if let Some(detail) = detail {
            debug!(server = server, state = state, detail = detail, "Console capture");
        } else {
            debug!(server = server, state = state, "Console capture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("debug"), "ptero_hub=debug");
        assert_eq!(filter_directive("nonsense"), "ptero_hub=info");
    }
}
