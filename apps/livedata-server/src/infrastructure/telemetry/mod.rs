//! Tracing Setup
//!
//! Structured logging via `tracing-subscriber` with an environment
//! filter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level and per-target directives (default: info
//!   for this crate)
//!
//! # Usage
//!
//! ```ignore
//! use livedata_server::infrastructure::telemetry;
//!
//! // Initialize once at startup
//! telemetry::init();
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Safe to call once per process; later calls are ignored.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "livedata_server=info"
            .parse()
            .expect("static directive 'livedata_server=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
