//! Casper DEX backend
//!
//! HTTP API over the chain client: contract state reads, AMM quotes and the
//! deploy build/approve/submit lifecycle against a Casper node.

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casper_dex_core::api::{self, AppState, SharedTransport};
use casper_dex_core::chain::deploy::now_ms;
use casper_dex_core::chain::{HttpTransport, StateResolver};
use casper_dex_core::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let layouts = config.layouts().context("failed to load contract layouts")?;
    tracing::info!(
        "Chain {} via {} ({} layouts: {})",
        config.deploy.chain_name,
        config.rpc_url,
        layouts.names().len(),
        layouts.names().join(", ")
    );

    let transport: SharedTransport = Arc::new(
        HttpTransport::new(config.rpc_url.clone(), config.rpc_timeout)
            .context("failed to create RPC client")?,
    );
    let resolver = StateResolver::new(transport.clone(), config.resolver.clone(), layouts);
    let addr = config.bind_addr;
    let state = AppState::new(config, transport, resolver);

    // Expired pending deploys can never be submitted
    {
        let deploys = state.deploys.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let pruned = deploys.prune_expired(now_ms()).await;
                if pruned > 0 {
                    tracing::info!("Pruned {} expired pending deploys", pruned);
                }
            }
        });
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    tracing::info!("Starting server on {}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health                                   - Health check");
    tracing::info!("  GET  /api/config                               - Network and quoting settings");
    tracing::info!("  POST /api/keys/derive                          - Derive one storage key");
    tracing::info!("  POST /api/keys/candidates                      - Candidate keys for a layout field");
    tracing::info!("  GET  /api/tokens/:token/balance/:owner         - Token balance");
    tracing::info!("  GET  /api/tokens/:token/allowance/:owner/:spender - Allowance");
    tracing::info!("  GET  /api/tokens/:token/supply                 - Total supply");
    tracing::info!("  GET  /api/pairs/:pair/reserves                 - Pool reserves");
    tracing::info!("  GET  /api/factories/:factory/pair              - Pool address for a token pair");
    tracing::info!("  POST /api/quote                                - Swap quote");
    tracing::info!("  POST /api/quote/liquidity                      - Liquidity deposit quote");
    tracing::info!("  POST /api/deploys                              - Build unsigned deploy");
    tracing::info!("  GET  /api/deploys/:hash                        - Pending deploy");
    tracing::info!("  POST /api/deploys/:hash/approve                - Attach wallet signature");
    tracing::info!("  POST /api/deploys/:hash/submit                 - Submit signed deploy");
    tracing::info!("  GET  /api/deploys/:hash/status                 - Execution status");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
