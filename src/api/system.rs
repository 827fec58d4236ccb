//! Service metadata endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::AppState;
use crate::chain::deploy::format_ttl;
use crate::chain::quote::FeeConfig;
use crate::types::ApiResult;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub chain_name: String,
    pub rpc_url: String,
    pub gas_price: u64,
    pub deploy_ttl: String,
    pub default_payment_motes: String,
    pub fees: FeeConfig,
    pub probe_delay_ms: u64,
    pub layouts: Vec<String>,
    pub pending_deploys: usize,
}

/// GET /api/config - Effective network and quoting settings
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<ConfigResponse>> {
    let config = &state.config;
    Ok(Json(ConfigResponse {
        chain_name: config.deploy.chain_name.clone(),
        rpc_url: config.rpc_url.clone(),
        gas_price: config.deploy.gas_price,
        deploy_ttl: format_ttl(config.deploy.ttl.as_millis() as u64),
        default_payment_motes: config.default_payment_motes.to_string(),
        fees: config.fees,
        probe_delay_ms: config.resolver.probe_delay.as_millis() as u64,
        layouts: state
            .resolver
            .layouts()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        pending_deploys: state.deploys.len().await,
    }))
}
