//! Tracing subscriber setup.
//!
//! Level comes from `RUST_LOG` and falls back to `info`.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. A second call (tests, embedding) is a no-op.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    if result.is_ok() {
        tracing::debug!(json, "logging initialized");
    }
}
