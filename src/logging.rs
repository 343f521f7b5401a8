use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_DIRECTIVE: &str = "panelkeeper=info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a JSON subscriber, failing if one is already set.
pub fn try_init_logging(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(env_filter(default_directive))
        .try_init()
}

/// Install a JSON subscriber. A second call is a no-op.
pub fn init_logging(default_directive: &str) {
    let _ = try_init_logging(default_directive);
}
