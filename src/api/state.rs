//! Chain state endpoints: balances, allowances, reserves

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::chain::address::Address;
use crate::chain::amount::{biguint_string, RawAmount};
use crate::chain::quote::ReservePair;
use crate::types::{ApiError, ApiResult};

fn parse_address(what: &str, value: &str) -> ApiResult<Address> {
    Address::parse(value).map_err(|e| ApiError::BadRequest(format!("{}: {}", what, e)))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub token: Address,
    pub owner: Address,
    pub balance: RawAmount,
    pub display: String,
}

/// GET /api/tokens/:token/balance/:owner - Token balance, zero when absent
pub async fn get_balance(
    State(state): State<AppState>,
    Path((token, owner)): Path<(String, String)>,
) -> ApiResult<Json<BalanceResponse>> {
    let token = parse_address("token", &token)?;
    let owner = parse_address("owner", &owner)?;

    let balance = state.resolver.token_balance(token, owner).await?;
    tracing::debug!("Balance of {} in {}: {}", owner, token, balance);

    Ok(Json(BalanceResponse {
        token,
        owner,
        display: balance.to_display_string(),
        balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct AllowanceResponse {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "biguint_string")]
    pub allowance: num_bigint::BigUint,
}

/// GET /api/tokens/:token/allowance/:owner/:spender
pub async fn get_allowance(
    State(state): State<AppState>,
    Path((token, owner, spender)): Path<(String, String, String)>,
) -> ApiResult<Json<AllowanceResponse>> {
    let token = parse_address("token", &token)?;
    let owner = parse_address("owner", &owner)?;
    let spender = parse_address("spender", &spender)?;

    let allowance = state.resolver.allowance(token, owner, spender).await?;
    Ok(Json(AllowanceResponse {
        token,
        owner,
        spender,
        allowance,
    }))
}

#[derive(Debug, Serialize)]
pub struct SupplyResponse {
    pub token: Address,
    pub total_supply: RawAmount,
    pub display: String,
}

/// GET /api/tokens/:token/supply
pub async fn get_supply(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<SupplyResponse>> {
    let token = parse_address("token", &token)?;
    let total_supply = state.resolver.token_total_supply(token).await?;
    Ok(Json(SupplyResponse {
        token,
        display: total_supply.to_display_string(),
        total_supply,
    }))
}

/// Token hints for pools whose token fields cannot be read
#[derive(Debug, Default, Deserialize)]
pub struct TokenPairQuery {
    pub token_a: Option<String>,
    pub token_b: Option<String>,
}

impl TokenPairQuery {
    fn tokens(&self) -> ApiResult<Option<(Address, Address)>> {
        match (&self.token_a, &self.token_b) {
            (Some(a), Some(b)) => Ok(Some((parse_address("token_a", a)?, parse_address("token_b", b)?))),
            (None, None) => Ok(None),
            _ => Err(ApiError::BadRequest("token_a and token_b go together".into())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservesResponse {
    pub pair: Address,
    #[serde(flatten)]
    pub reserves: ReservePair,
    pub has_liquidity: bool,
}

/// GET /api/pairs/:pair/reserves - Current pool reserves in canonical order
pub async fn get_reserves(
    State(state): State<AppState>,
    Path(pair): Path<String>,
    Query(query): Query<TokenPairQuery>,
) -> ApiResult<Json<ReservesResponse>> {
    let pair = parse_address("pair", &pair)?;
    let reserves = state.resolver.pair_reserves(pair, query.tokens()?).await?;
    Ok(Json(ReservesResponse {
        pair,
        has_liquidity: reserves.has_liquidity(),
        reserves,
    }))
}

#[derive(Debug, Serialize)]
pub struct PairAddressResponse {
    pub factory: Address,
    pub token0: Address,
    pub token1: Address,
    pub pair: Option<Address>,
}

/// GET /api/factories/:factory/pair?token_a=..&token_b=.. - Pool for a token pair
pub async fn get_pair_address(
    State(state): State<AppState>,
    Path(factory): Path<String>,
    Query(query): Query<TokenPairQuery>,
) -> ApiResult<Json<PairAddressResponse>> {
    let factory = parse_address("factory", &factory)?;
    let (a, b) = query
        .tokens()?
        .ok_or_else(|| ApiError::BadRequest("token_a and token_b are required".into()))?;
    let pair = state.resolver.pair_address(factory, a, b).await?;
    let (token0, token1) = crate::chain::address::sort_pair(a, b);
    Ok(Json(PairAddressResponse {
        factory,
        token0,
        token1,
        pair,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::test_support::state_with;
    use crate::chain::codec::{ToBytes, U256};
    use crate::chain::keys::{candidate_keys, scalar_candidates};
    use crate::chain::layout::{field, ContractLayout};
    use crate::chain::rpc::mock::MockTransport;
    use crate::chain::rpc::RpcError;
    use serde_json::{json, Value as JsonValue};
    use std::collections::HashMap;

    pub const STATE_UREF: &str = "uref-2222222222222222222222222222222222222222222222222222222222222222-007";

    pub fn contract() -> JsonValue {
        json!({"Contract": {"named_keys": [{"name": "state", "key": STATE_UREF}]}})
    }

    pub fn u256(value: u64) -> JsonValue {
        json!({"stored_value": {"CLValue": {
            "cl_type": "U256",
            "bytes": hex::encode(U256::from_u64(value).to_bytes()),
        }}})
    }

    /// Node with the given contracts and dictionary items
    pub fn node(contracts: Vec<Address>, items: HashMap<String, JsonValue>) -> MockTransport {
        let contracts: Vec<String> = contracts.iter().map(Address::to_key_string).collect();
        MockTransport::new(move |method, params| match method {
            "chain_get_state_root_hash" => Ok(json!({"state_root_hash": "00".repeat(32)})),
            "query_global_state" => {
                let key = params["key"].as_str().unwrap_or_default();
                if contracts.iter().any(|c| c == key) {
                    Ok(json!({"stored_value": contract()}))
                } else {
                    Err(RpcError::Rpc { code: -32003, message: "Query failed".into() })
                }
            }
            "state_get_dictionary_item" => {
                let key = params["dictionary_identifier"]["URef"]["dictionary_item_key"]
                    .as_str()
                    .unwrap_or_default();
                items
                    .get(key)
                    .cloned()
                    .ok_or(RpcError::Rpc { code: -32003, message: "Query failed".into() })
            }
            other => Err(RpcError::Rpc { code: -32601, message: format!("no method {}", other) }),
        })
    }

    #[tokio::test]
    async fn test_get_balance() {
        let token = Address::contract([1; 32]);
        let owner = Address::account([2; 32]);
        let mut items = HashMap::new();
        let keys = candidate_keys(ContractLayout::token().slots(field::BALANCES), owner);
        items.insert(keys[0].to_hex(), u256(2_500_000_000));
        let (state, _) = state_with(node(vec![token], items));

        let Json(res) = get_balance(
            State(state),
            Path((token.to_key_string(), owner.to_key_string())),
        )
        .await
        .unwrap();
        assert_eq!(res.balance.decimals(), 9);
        assert_eq!(res.display, "2.5");
    }

    #[tokio::test]
    async fn test_get_balance_bad_address() {
        let (state, _) = state_with(node(vec![], HashMap::new()));
        let result = get_balance(State(state), Path(("nope".into(), "nope".into()))).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_contract_is_not_found() {
        let (state, _) = state_with(node(vec![], HashMap::new()));
        let token = Address::contract([1; 32]).to_key_string();
        let result = get_supply(State(state), Path(token)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_node_failure_is_bad_gateway() {
        let (state, _) = state_with(MockTransport::new(|method, _| match method {
            "chain_get_state_root_hash" => Ok(json!({"state_root_hash": "00".repeat(32)})),
            _ => Err(RpcError::Rpc { code: -32001, message: "busy".into() }),
        }));
        let token = Address::contract([1; 32]).to_key_string();
        let result = get_supply(State(state), Path(token)).await;
        assert!(matches!(result, Err(ApiError::BadGateway(_))));
    }

    #[tokio::test]
    async fn test_get_reserves_with_hints() {
        let pair = Address::contract([5; 32]);
        let layout = ContractLayout::pair();
        let mut items = HashMap::new();
        items.insert(scalar_candidates(layout.slots(field::RESERVE0))[0].to_hex(), u256(100));
        items.insert(scalar_candidates(layout.slots(field::RESERVE1))[0].to_hex(), u256(300));
        let (state, _) = state_with(node(vec![pair], items));

        let query = TokenPairQuery {
            token_a: Some(Address::contract([9; 32]).to_key_string()),
            token_b: Some(Address::contract([3; 32]).to_key_string()),
        };
        let Json(res) = get_reserves(State(state), Path(pair.to_key_string()), Query(query))
            .await
            .unwrap();
        assert_eq!(res.reserves.token0, Address::contract([3; 32]));
        assert!(res.has_liquidity);
        let body = serde_json::to_value(&res).unwrap();
        assert_eq!(body["reserve1"], json!("300"));
    }
}
