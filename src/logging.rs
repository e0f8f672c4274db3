//! Structured logging setup.
//!
//! Logs go to **stderr**; stdout carries the handshake line and nothing else.
//!
//! The filter is read from `DX_LOG`, then `RUST_LOG`, then falls back to the
//! given default (`info` for [`init_logging`]):
//!
//! ```bash
//! DX_LOG=dx_provider=debug dx-provider
//! RUST_LOG=warn,dx_provider::allocator=trace dx-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "DX_LOG";

/// Install the global subscriber at `info` unless overridden.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Install the global subscriber with `default_level` as the fallback filter.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    if let Err(e) = install(default_level) {
        panic!("failed to install the tracing subscriber: {}", e);
    }
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_logging() -> bool {
    install("info").is_ok()
}

fn install(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

fn env_filter(default_level: &str) -> EnvFilter {
    let configured = std::env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok());
    filter_from(configured.as_deref(), default_level)
}

// An unparseable directive falls back to the default rather than silencing logs.
fn filter_from(directives: Option<&str>, default_level: &str) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert!(EnvFilter::try_new("dx_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,dx_provider::allocator=trace").is_ok());
    }

    #[test]
    fn test_filter_from_falls_back_to_default() {
        use tracing_subscriber::filter::LevelFilter;

        let hint = |f: EnvFilter| f.max_level_hint();
        assert_eq!(hint(filter_from(None, "warn")), Some(LevelFilter::WARN));
        assert_eq!(hint(filter_from(Some("dx_provider=loud"), "info")), Some(LevelFilter::INFO));
        assert_eq!(hint(filter_from(Some("debug"), "info")), Some(LevelFilter::DEBUG));
    }
}
