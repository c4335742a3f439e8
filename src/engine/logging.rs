//! Tracing subscriber installation

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber, writing to stderr so JSON output on
/// stdout stays parseable.
///
/// `RUST_LOG` takes precedence over `level`; an invalid `level` falls back to
/// `info`. Calling this twice is harmless, the second call is a no-op.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
