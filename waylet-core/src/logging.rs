//! Logging bring-up for the waylet workspace.
//!
//! Built on the `tracing` ecosystem. The presentation layer itself only
//! emits events through the `tracing` macros; hosts embedding it can
//! install their own subscriber, or call [`init_minimal_logging`] to get
//! a sensible stderr setup.

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Initializes a minimal logging setup, directing messages to `stderr`.
///
/// Intended for tests, demos and early application startup. Messages are
/// filtered through the `RUST_LOG` environment variable, defaulting to
/// "info" when unset or invalid. Calling this more than once, or after
/// another global subscriber has been installed, is harmless.
pub fn init_minimal_logging() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_minimal_logging();
        init_minimal_logging();
        tracing::debug!("logging initialized twice without panicking");
    }
}
