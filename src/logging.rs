// logging.rs - tracing subscriber setup
//
// The lifecycle_check tool calls `init_tracing`; test binaries call
// `init_test_tracing` so output goes through libtest's capture. Both are safe
// to call more than once: later calls are no-ops.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}

/// Same as `init_tracing`, but writing through the test harness's capture.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_thread_ids(false)
        .with_test_writer()
        .try_init();
}
