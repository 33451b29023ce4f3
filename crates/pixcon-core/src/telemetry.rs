//! Log output for pixcon binaries.
//!
//! Logs always go to stderr: `pixcon compare --json` prints the report on
//! stdout and the two must never interleave.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variables, most specific first.
const FILTER_VARS: [&str; 2] = ["PIXCON_LOG", "RUST_LOG"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Newline-delimited JSON objects.
    Json,
}

/// Build the event filter from the first parsable variable in
/// `PIXCON_LOG`, `RUST_LOG`, else `level`.
///
/// A variable that is set but does not parse is skipped, not fatal.
pub fn log_filter<F>(lookup: F, level: Level) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    FILTER_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Returns `false` if one was already set,
/// in which case this call changes nothing.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let filter = log_filter(|var| std::env::var(var).ok(), level);
    let text = (format == LogFormat::Text)
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_pixcon_log_wins_over_rust_log() {
        let env = vars(&[("PIXCON_LOG", "pixcon_core=trace"), ("RUST_LOG", "error")]);
        let filter = log_filter(|k| env.get(k).cloned(), Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_unparsable_variable_falls_through() {
        let env = vars(&[("PIXCON_LOG", "pixcon_core=loudest"), ("RUST_LOG", "warn")]);
        let filter = log_filter(|k| env.get(k).cloned(), Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        let filter = log_filter(|_| None, Level::DEBUG);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_second_init_is_a_no_op() {
        init_tracing(LogFormat::Text, Level::WARN);
        assert!(!init_tracing(LogFormat::Json, Level::DEBUG));
        tracing::info!("still alive");
    }
}
