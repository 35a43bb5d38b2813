// Common Crate - utils.rs
// common/src/utils.rs
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Setup tracing for the gateway process.
///
/// `RUST_LOG` wins when present; otherwise production logs at `info`
/// and every other environment at `debug`.
pub fn setup_tracing() {
    let environment = std::env::var("NODE_ENV").unwrap_or_default();
    let default_level = if environment == "production" { "info" } else { "debug" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Interpret an environment-style boolean (`1`, `true`, `yes`, `on`).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
