//! HTTP API over the chain client

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

mod deploys;
mod keys;
mod quote;
mod state;
pub mod store;
mod system;

pub use store::DeployStore;

use crate::chain::quote::QuoteEngine;
use crate::chain::resolver::StateResolver;
use crate::chain::rpc::RpcTransport;
use crate::config::AppConfig;

/// Node transport shared by all handlers
pub type SharedTransport = Arc<dyn RpcTransport>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transport: SharedTransport,
    pub resolver: Arc<StateResolver<SharedTransport>>,
    pub engine: QuoteEngine,
    pub deploys: Arc<DeployStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        transport: SharedTransport,
        resolver: StateResolver<SharedTransport>,
    ) -> Self {
        Self {
            engine: QuoteEngine::new(config.fees),
            config: Arc::new(config),
            transport,
            resolver: Arc::new(resolver),
            deploys: Arc::new(DeployStore::new()),
        }
    }
}

/// Create the API router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/config", get(system::get_config))
        // Storage keys
        .route("/keys/derive", post(keys::derive))
        .route("/keys/candidates", post(keys::candidates))
        // Chain state
        .route("/tokens/:token/balance/:owner", get(state::get_balance))
        .route("/tokens/:token/allowance/:owner/:spender", get(state::get_allowance))
        .route("/tokens/:token/supply", get(state::get_supply))
        .route("/pairs/:pair/reserves", get(state::get_reserves))
        .route("/factories/:factory/pair", get(state::get_pair_address))
        // Quotes
        .route("/quote", post(quote::get_quote))
        .route("/quote/liquidity", post(quote::get_liquidity_quote))
        // Deploy lifecycle
        .route("/deploys", post(deploys::build_deploy))
        .route("/deploys/:hash", get(deploys::get_deploy))
        .route("/deploys/:hash/approve", post(deploys::approve_deploy))
        .route("/deploys/:hash/submit", post(deploys::submit_deploy))
        .route("/deploys/:hash/status", get(deploys::get_status))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::chain::layout::LayoutRegistry;
    use crate::chain::resolver::ResolverConfig;
    use crate::chain::rpc::mock::MockTransport;
    use std::time::Duration;

    /// App state over a scripted node
    pub fn state_with(transport: MockTransport) -> (AppState, Arc<MockTransport>) {
        let mock = Arc::new(transport);
        let shared: SharedTransport = mock.clone();
        let mut config = AppConfig::from_lookup(|_| None).expect("default config");
        config.resolver = ResolverConfig {
            probe_delay: Duration::ZERO,
            ..ResolverConfig::default()
        };
        config.poll.attempts = 2;
        config.poll.interval = Duration::ZERO;
        let resolver = StateResolver::new(
            shared.clone(),
            config.resolver.clone(),
            LayoutRegistry::builtin(),
        );
        (AppState::new(config, shared, resolver), mock)
    }
}
