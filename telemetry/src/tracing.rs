use std::sync::Once;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Guards [`init_test_tracing`] so that concurrently running tests install the subscriber once.
static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The directive derived from the configured level could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(#[source] ParseError),
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[source] TryInitError),
}

/// Installs a formatted tracing subscriber for the binary named `app_name`.
///
/// `RUST_LOG` takes precedence when set, otherwise every event at `level` or above is emitted.
pub fn init_tracing(app_name: &str, level: Level) -> Result<(), TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level.as_str().to_lowercase()).map_err(TracingError::Filter)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(TracingError::Init)?;

    tracing::info!(app = app_name, %level, "tracing initialized");

    Ok(())
}

/// Installs a test writer subscriber once per process.
///
/// Output is only emitted when `ENABLE_TRACING` is set, which keeps test logs quiet by default.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
