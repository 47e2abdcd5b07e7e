//! Tracing/logging initialization.
//!
//! One call at process startup; everything else in the workspace only uses
//! the `tracing` macros.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// JSON output, filtered via `RUST_LOG` with a quiet-by-default fallback
/// that keeps this workspace's own spans visible. Safe to call multiple
/// times (subsequent calls are no-ops), including from tests.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,fieldtrack=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
