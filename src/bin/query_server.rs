//! Query API server binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipeline_nlq::api;
use pipeline_nlq::classifier::build_chat_model;
use pipeline_nlq::config::{mask_database_url, AppConfig};
use pipeline_nlq::engine::{CachedBoundaries, QueryEngine};
use pipeline_nlq::executor::{connect_pool, PgQueryExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!(
        database = %mask_database_url(&config.database_url),
        provider = ?config.provider,
        insights = config.enable_insights,
        "Starting query server"
    );

    let pool = connect_pool(&config).await?;
    let model = build_chat_model(&config)?;
    let engine = QueryEngine::new(
        model,
        Arc::new(PgQueryExecutor::new(pool.clone())),
        Arc::new(CachedBoundaries::new(pool)),
    )
    .with_insights(config.enable_insights);

    let app = api::router(Arc::new(engine));
    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_addr))?;
    info!(addr = %config.server_addr, "Query server listening");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
