//! Swap and liquidity quote endpoints

use axum::{extract::State, Json};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::chain::address::Address;
use crate::chain::amount::{biguint_string, RawAmount};
use crate::chain::quote::{Quote, ReservePair};
use crate::types::{ApiError, ApiResult};

fn default_slippage_bps() -> u32 {
    50
}

fn parse_raw(what: &str, value: &str) -> ApiResult<BigUint> {
    BigUint::parse_bytes(value.trim().as_bytes(), 10)
        .ok_or_else(|| ApiError::BadRequest(format!("{}: '{}' is not an integer", what, value)))
}

fn parse_address(what: &str, value: &str) -> ApiResult<Address> {
    Address::parse(value).map_err(|e| ApiError::BadRequest(format!("{}: {}", what, e)))
}

/// Reserves come either from a pool on chain (`pair` + `token_in`) or
/// verbatim from the caller (`reserve_in` + `reserve_out`).
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub pair: Option<String>,
    pub token_in: Option<String>,
    /// Other side of the pool, used when the pool's token fields are unreadable
    pub token_out: Option<String>,
    pub reserve_in: Option<String>,
    pub reserve_out: Option<String>,
    /// Input in display units
    pub amount: Option<String>,
    /// Input in raw units
    pub amount_raw: Option<String>,
    /// Desired output in display units; the input is solved for
    pub desired_output: Option<String>,
    pub input_decimals: Option<u8>,
    pub output_decimals: Option<u8>,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: Quote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out: Option<Address>,
    #[serde(with = "biguint_string")]
    pub reserve_in: BigUint,
    #[serde(with = "biguint_string")]
    pub reserve_out: BigUint,
}

struct Market {
    pair: Option<Address>,
    token_in: Option<Address>,
    token_out: Option<Address>,
    reserve_in: BigUint,
    reserve_out: BigUint,
    input_decimals: u8,
    output_decimals: u8,
}

async fn load_market(state: &AppState, req: &QuoteRequest) -> ApiResult<Market> {
    let default_decimals = state.config.resolver.default_decimals;

    let Some(pair) = &req.pair else {
        let (Some(reserve_in), Some(reserve_out)) = (&req.reserve_in, &req.reserve_out) else {
            return Err(ApiError::BadRequest(
                "give either pair and token_in, or reserve_in and reserve_out".into(),
            ));
        };
        return Ok(Market {
            pair: None,
            token_in: None,
            token_out: None,
            reserve_in: parse_raw("reserve_in", reserve_in)?,
            reserve_out: parse_raw("reserve_out", reserve_out)?,
            input_decimals: req.input_decimals.unwrap_or(default_decimals),
            output_decimals: req.output_decimals.unwrap_or(default_decimals),
        });
    };

    let pair = parse_address("pair", pair)?;
    let token_in = req
        .token_in
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("token_in is required with pair".into()))
        .and_then(|t| parse_address("token_in", t))?;
    let hint = match &req.token_out {
        Some(token_out) => Some((token_in, parse_address("token_out", token_out)?)),
        None => None,
    };

    let reserves = state.resolver.pair_reserves(pair, hint).await?;
    let (reserve_in, reserve_out) = reserves
        .oriented(&token_in)
        .map(|(i, o)| (i.clone(), o.clone()))
        .ok_or_else(|| ApiError::BadRequest(format!("{} is not traded by pair {}", token_in, pair)))?;
    let token_out = if token_in == reserves.token0 {
        reserves.token1
    } else {
        reserves.token0
    };

    let input_decimals = match req.input_decimals {
        Some(d) => d,
        None => state.resolver.token_decimals(token_in).await?,
    };
    let output_decimals = match req.output_decimals {
        Some(d) => d,
        None => state.resolver.token_decimals(token_out).await?,
    };

    Ok(Market {
        pair: Some(pair),
        token_in: Some(token_in),
        token_out: Some(token_out),
        reserve_in,
        reserve_out,
        input_decimals,
        output_decimals,
    })
}

/// POST /api/quote - Preview a swap against a pool
pub async fn get_quote(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> ApiResult<Json<QuoteResponse>> {
    let market = load_market(&state, &req).await?;

    // Solving for a desired output can fail on the pool itself; that is an
    // invalid quote, like any other unquotable amount.
    let amount_in = match (&req.amount, &req.amount_raw, &req.desired_output) {
        (Some(display), None, None) => {
            Ok(RawAmount::parse_display(display, market.input_decimals)?)
        }
        (None, Some(raw), None) => Ok(RawAmount::new(
            parse_raw("amount_raw", raw)?,
            market.input_decimals,
        )),
        (None, None, Some(desired)) => {
            let desired = RawAmount::parse_display(desired, market.output_decimals)?;
            state
                .engine
                .amount_in(desired.raw(), &market.reserve_in, &market.reserve_out)
                .map(|required| RawAmount::new(required, market.input_decimals))
        }
        _ => {
            return Err(ApiError::BadRequest(
                "give exactly one of amount, amount_raw, desired_output".into(),
            ))
        }
    };

    let quote = match amount_in {
        Ok(amount_in) => state.engine.quote(
            &amount_in,
            &market.reserve_in,
            &market.reserve_out,
            market.output_decimals,
            req.slippage_bps,
        ),
        Err(e) => Quote::invalid(
            &RawAmount::zero(market.input_decimals),
            market.output_decimals,
            e,
        ),
    };
    if !quote.valid {
        tracing::debug!(
            "Invalid quote for {}: {}",
            quote.input_amount,
            quote.invalid_reason.as_deref().unwrap_or_default()
        );
    }

    Ok(Json(QuoteResponse {
        quote,
        pair: market.pair,
        token_in: market.token_in,
        token_out: market.token_out,
        reserve_in: market.reserve_in,
        reserve_out: market.reserve_out,
    }))
}

/// Deposit into a pool, either on chain (`pair`) or with explicit figures
#[derive(Debug, Deserialize)]
pub struct LiquidityQuoteRequest {
    pub pair: Option<String>,
    /// Token of `amount_a`; defaults to the pool's token0
    pub token_a: Option<String>,
    pub reserve_a: Option<String>,
    pub reserve_b: Option<String>,
    pub total_supply: Option<String>,
    /// Raw units
    pub amount_a: String,
    /// Raw units; matched to the pool ratio when omitted
    pub amount_b: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LiquidityQuoteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserves: Option<ReservePair>,
    #[serde(with = "biguint_string")]
    pub amount_a: BigUint,
    #[serde(with = "biguint_string")]
    pub amount_b: BigUint,
    #[serde(with = "biguint_string")]
    pub liquidity: BigUint,
    /// Share of the pool after the deposit
    pub pool_share_percent: f64,
}

/// POST /api/quote/liquidity - Liquidity tokens minted for a deposit
pub async fn get_liquidity_quote(
    State(state): State<AppState>,
    Json(req): Json<LiquidityQuoteRequest>,
) -> ApiResult<Json<LiquidityQuoteResponse>> {
    let (reserves, reserve_a, reserve_b, total_supply) = match &req.pair {
        Some(pair) => {
            let pair = parse_address("pair", pair)?;
            let reserves = state.resolver.pair_reserves(pair, None).await?;
            let token_a = match &req.token_a {
                Some(token) => parse_address("token_a", token)?,
                None => reserves.token0,
            };
            let (ra, rb) = reserves
                .oriented(&token_a)
                .map(|(a, b)| (a.clone(), b.clone()))
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("{} is not traded by pair {}", token_a, pair))
                })?;
            let supply = state.resolver.pair_total_supply(pair).await?.into_raw();
            (Some(reserves), ra, rb, supply)
        }
        None => {
            let field = |name: &str, value: &Option<String>| -> ApiResult<BigUint> {
                value
                    .as_deref()
                    .map(|v| parse_raw(name, v))
                    .unwrap_or_else(|| Ok(BigUint::default()))
            };
            (
                None,
                field("reserve_a", &req.reserve_a)?,
                field("reserve_b", &req.reserve_b)?,
                field("total_supply", &req.total_supply)?,
            )
        }
    };

    let amount_a = parse_raw("amount_a", &req.amount_a)?;
    let amount_b = match &req.amount_b {
        Some(amount_b) => parse_raw("amount_b", amount_b)?,
        None => state
            .engine
            .proportional_amount(&amount_a, &reserve_a, &reserve_b)?,
    };

    let liquidity = state.engine.estimate_liquidity_tokens(
        &amount_a,
        &amount_b,
        &reserve_a,
        &reserve_b,
        &total_supply,
    )?;
    let pool_share_percent = share_percent(&liquidity, &(&total_supply + &liquidity));

    Ok(Json(LiquidityQuoteResponse {
        reserves,
        amount_a,
        amount_b,
        liquidity,
        pool_share_percent,
    }))
}

fn share_percent(part: &BigUint, whole: &BigUint) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    let ppm = part * 1_000_000u32 / whole;
    ppm.to_f64().unwrap_or(0.0) / 10_000.0
}
