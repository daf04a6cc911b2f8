//!
//! advisorhub server binary
//! -------------------------
//! Command-line entry point for the advisorhub HTTP server. Configuration comes from CLI flags
//! and environment variables (flags win); see `--help`.

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use advisorhub::config::{has_flag, AppConfig, HELP};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", HELP);
        return Ok(());
    }

    let config = AppConfig::from_sources(&args, |k| env::var(k).ok())?;
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "advisorhub_server: RUST_LOG='{}', http_port={}, environment={}", rust_log, config.http_port, config.environment);

    advisorhub::server::run(config).await
}
