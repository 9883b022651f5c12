//! relc compile service
//!
//! HTTP front end over the relational compiler: accepts JSON plans and DDL
//! statements and returns SQL for the requested dialect.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

mod api;
mod config;
mod logging;
mod metrics;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("RELC_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).with_context(|| format!("loading {}", config_path))?
    } else {
        Config::from_env()?
    };

    logging::init(&config.logging)?;
    tracing::info!(
        config = %config_path,
        default_dialect = %config.compiler.default_dialect,
        tables = config.catalog.tables.len(),
        "configuration loaded"
    );

    let state = Arc::new(api::AppState::new(&config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "relc server listening");

    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
