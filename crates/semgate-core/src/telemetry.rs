//! Tracing setup for the semgate binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level`; `json`
/// switches to newline-delimited JSON for CI log collectors.
///
/// Everything goes to stderr: stdout is reserved for the gate status line.
/// Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let plain = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let json = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .ok();
}
