use crate::error::{LoadError, LoadResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize console logging
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_console_logging(default_level: &str) -> LoadResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| LoadError::Config(format!("Failed to initialize logging: {}", e)))
}
