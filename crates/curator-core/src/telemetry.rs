//! Tracing initialisation for curator binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored;
//! the global subscriber can only be set once per process.
//!
//! Without `RUST_LOG`, curator crates log at the requested level while the
//! HTTP stack stays at `warn`. In JSON mode every line carries the fields of
//! the enclosing `curator.segment` span, so segment runs can be split apart
//! after the fact.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose output follows the requested level.
const CURATOR_TARGETS: [&str; 2] = ["curator_core", "curator"];

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(CURATOR_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber.
///
/// * `json`: newline-delimited JSON on stdout, with the current segment span.
/// * `level`: verbosity for curator crates when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_dependencies() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,curator_core=debug,curator=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        let _span = crate::obs::SegmentSpan::enter("builders", "2026-10-18");
        tracing::debug!("after init");
    }
}
