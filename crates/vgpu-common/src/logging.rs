use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable controlling log verbosity.
pub const LOG_ENV: &str = "VGPU_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize structured logging with environment filter.
/// Set VGPU_LOG=debug (or trace, info, warn, error) for verbosity control.
pub fn init_logging() {
    fmt()
        .with_env_filter(filter())
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Like [`init_logging`], but leaves an already-installed subscriber alone.
/// Used inside the guest driver, which is loaded into someone else's process.
/// Returns whether our subscriber was installed.
pub fn try_init_logging() -> bool {
    fmt()
        .with_env_filter(filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
