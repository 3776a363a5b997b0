#![cfg(not(tarpaulin_include))]

use dealer_price::app;
use dealer_price::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main entry point for the web application
///
/// Usage: `website [config.toml]`. Without a config file the defaults are used;
/// SMTP credentials are read from `PRICE_SMTP_USER` / `PRICE_SMTP_PASSWORD`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    app::run(settings).await
}
