//! AnyTools - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

const DEFAULT_CONFIG: &str = "anytools";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ANYTOOLS_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = AppConfig::load(&path)?;
    init_logging(&config.logging)?;

    info!("=== AnyTools v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", path);

    run_server(config).await
}
