//! Tracing bootstrap for the CLI.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,feedhub_core=info,feedhub=info";

/// Installs the global subscriber, writing to stderr so stdout stays JSON.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `FEEDHUB_LOG`
/// 3) internal default filter
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter_from_env(verbose))
        .try_init();
}

fn filter_from_env(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let configured = env::var("FEEDHUB_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok());
    if let Some(filter) = configured {
        return filter;
    }

    if verbose {
        EnvFilter::new("info,feedhub_core=debug,feedhub=debug")
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}
