//! Tracing bootstrap shared by every binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Every component logs under its own target (`worker`, `dashboard`, ...).
pub const DEFAULT_FILTER: &str =
    "trustfeed=info,broker=info,extract=info,ingest=info,producer=info,worker=info,dashboard=info,scheduler=info,warn";

/// Install the global subscriber once.
///
/// - Filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// - `LOG_FORMAT=json` switches to JSON lines (for log shipping); compact text otherwise.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
