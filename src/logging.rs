//! Process-wide logging initialization.
//!
//! The facility is injected once at startup and must not retain state across
//! teardown (§9) — there is no exporter to flush, unlike a full distributed
//! tracing pipeline, which remains the embedding application's concern and is
//! explicitly out of scope (§1). Every subsystem logs through
//! `tracing::{debug,info,warn,error}` at its own module path.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Configuration for the logging facility.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Whether to emit ANSI color codes.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create a configuration with a custom default filter directive.
    #[must_use]
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            default_filter: filter.into(),
            ..Default::default()
        }
    }

    /// Disable ANSI color codes (useful when output is piped to a file).
    #[must_use]
    pub const fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }
}

/// Error initializing the logging facility.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Install a `tracing-subscriber` registry as the global default.
///
/// # Errors
///
/// Returns [`LoggingError::AlreadyInitialized`] if a global subscriber has
/// already been set (this is idempotent-safe to call more than once in a
/// test binary; callers in production code should call it exactly once).
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer().with_ansi(config.ansi);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
