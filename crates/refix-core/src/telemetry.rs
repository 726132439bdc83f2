//! Tracing bootstrap shared by the refix binaries.
//!
//! [`init_tracing`] installs the process-global subscriber. The first
//! call wins; later calls are no-ops. `RUST_LOG` takes precedence over
//! the built-in defaults, which cap the artifact resolver's HTTP client
//! stack at warn so a verbose run shows task activity rather than wire
//! chatter.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Filter directives used when `RUST_LOG` is unset: the requested level
/// everywhere, except the crates under the artifact resolver's HTTP
/// client, which only surface warnings.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("{level},reqwest=warn,hyper=warn,rustls=warn")
}

/// Install the global tracing subscriber.
///
/// With `json` set, output is newline-delimited JSON with event fields
/// flattened into the top-level object; otherwise human-readable lines
/// without target paths. `level` is the default verbosity when
/// `RUST_LOG` does not override it.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().flatten_event(true).try_init().ok();
    } else {
        builder.with_target(false).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_follow_requested_level() {
        assert!(default_directives(Level::DEBUG).starts_with("debug,"));
        assert!(default_directives(Level::WARN).starts_with("warn,"));
    }

    #[test]
    fn test_default_directives_cap_http_client_noise() {
        let directives = default_directives(Level::TRACE);
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.contains("hyper=warn"));
    }

    #[test]
    fn test_init_tracing_tolerates_repeat_calls() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
