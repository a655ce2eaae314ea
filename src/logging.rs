//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Default filter directive; `RUST_LOG` takes precedence when set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "xlrules=debug"
    } else {
        "xlrules=info"
    }
}

/// Install the global subscriber. Call once, from `main`.
pub fn init(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbose).into());

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
