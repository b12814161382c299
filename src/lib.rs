pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::AppConfig;
use crate::errors::ClawResult;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Host start-up: `.env`, logging, then `config.toml` (defaults if absent).
pub fn bootstrap() -> ClawResult<AppConfig> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    config::load_config_or_default()
}
