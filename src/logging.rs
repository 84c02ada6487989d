//! Logging setup for the provider process.
//!
//! All logs go to **stderr**: stdout is reserved for the handshake line the
//! engine parses to find the server.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`,
//!   `sendgrid_provider=debug`)

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the default logging subscriber.
///
/// Respects `RUST_LOG` for filtering and defaults to `info` when it is not
/// set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level used when `RUST_LOG` is
/// not set.
pub fn init_logging_with_default(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if a subscriber was already
/// set. Useful in tests, where the process-global subscriber can only be
/// installed once.
pub fn try_init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // filter syntax is checked here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("debug").is_ok());
        assert!(EnvFilter::try_new("sendgrid_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,sendgrid_provider=debug").is_ok());
    }
}
