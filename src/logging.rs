//! Diagnostics go to stderr through `tracing`; stdout is reserved for reports.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn create_env_filter(verbose: bool, debug: bool) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    EnvFilter::new(default_directives(level))
}

/// Directives for the library and the `fanout` binary at `level`.
fn default_directives(level: &str) -> String {
    format!("fanout_cmd={level},fanout={level}")
}

pub fn init_logging(verbose: bool, debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbose, debug))
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_binary_and_library() {
        assert_eq!(default_directives("debug"), "fanout_cmd=debug,fanout=debug");
    }

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(default_directives("info")).is_ok());
    }
}
