//! Tracing bootstrap for binaries embedding this crate.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,larder=debug"
}

/// Initialize the global tracing subscriber from the environment.
/// Call once at process start; library code only emits events.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_crate() {
        assert!(default_log_filter().contains("larder"));
    }
}
