//! Constant-product market-maker math
//!
//! Pure and synchronous: no I/O, safe to call on every keystroke. All
//! arithmetic is on arbitrary-precision integers; floats appear only in the
//! display fields of a `Quote`.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use super::address::{sort_pair, Address};
use super::amount::{biguint_string, RawAmount};

pub const BPS_SCALE: u32 = 10_000;
const PPM_SCALE: u32 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("insufficient input amount")]
    InsufficientInput,

    #[error("insufficient output amount")]
    InsufficientOutput,

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("deposit too small to mint liquidity tokens")]
    InsufficientLiquidityMinted,

    #[error("fee {numerator}/{denominator} leaves no tradable input")]
    InvalidFee { numerator: u32, denominator: u32 },

    #[error("slippage {0} bps exceeds 10000")]
    InvalidSlippage(u32),

    #[error("cannot redeem {requested} of {supply} liquidity tokens")]
    InvalidRedemption { requested: String, supply: String },
}

/// Pool fee and first-deposit burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub fee_numerator: u32,
    pub fee_denominator: u32,
    pub minimum_liquidity: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_numerator: 997,
            fee_denominator: 1000,
            minimum_liquidity: 1000,
        }
    }
}

/// Integer square root (floor) by Newton's method
pub fn isqrt(n: &BigUint) -> BigUint {
    if n.is_zero() {
        return BigUint::zero();
    }
    // 2^ceil(bits/2) is always >= sqrt(n), so the iteration decreases monotonically
    let mut x = BigUint::from(1u8) << ((n.bits() + 1) / 2);
    loop {
        let y = (&x + n / &x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

fn ceil_div(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    let quotient = numerator / denominator;
    if (&quotient * denominator) == *numerator {
        quotient
    } else {
        quotient + 1u8
    }
}

/// Reserves of a pool in canonical token order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePair {
    pub token0: Address,
    pub token1: Address,
    #[serde(with = "biguint_string")]
    pub reserve0: BigUint,
    #[serde(with = "biguint_string")]
    pub reserve1: BigUint,
}

impl ReservePair {
    /// Build from reserves keyed by token, in any order
    pub fn new(token_a: Address, reserve_a: BigUint, token_b: Address, reserve_b: BigUint) -> Self {
        let (token0, _) = sort_pair(token_a, token_b);
        if token0 == token_a {
            Self {
                token0: token_a,
                token1: token_b,
                reserve0: reserve_a,
                reserve1: reserve_b,
            }
        } else {
            Self {
                token0: token_b,
                token1: token_a,
                reserve0: reserve_b,
                reserve1: reserve_a,
            }
        }
    }

    /// `(reserve_in, reserve_out)` for a trade selling `token_in`
    pub fn oriented(&self, token_in: &Address) -> Option<(&BigUint, &BigUint)> {
        if *token_in == self.token0 {
            Some((&self.reserve0, &self.reserve1))
        } else if *token_in == self.token1 {
            Some((&self.reserve1, &self.reserve0))
        } else {
            None
        }
    }

    pub fn has_liquidity(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }
}

/// Preview of a swap. Invalid quotes carry zero amounts and a reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub input_amount: RawAmount,
    pub output_amount: RawAmount,
    /// Output per unit of input, in display units
    pub execution_rate: f64,
    pub price_impact_percent: f64,
    pub minimum_received: RawAmount,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl Quote {
    pub fn invalid(input: &RawAmount, output_decimals: u8, reason: impl ToString) -> Self {
        Self {
            input_amount: input.clone(),
            output_amount: RawAmount::zero(output_decimals),
            execution_rate: 0.0,
            price_impact_percent: 0.0,
            minimum_received: RawAmount::zero(output_decimals),
            valid: false,
            invalid_reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteEngine {
    fees: FeeConfig,
}

impl QuoteEngine {
    pub fn new(fees: FeeConfig) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }

    fn fee_num(&self) -> BigUint {
        BigUint::from(self.fees.fee_numerator)
    }

    fn fee_den(&self) -> BigUint {
        BigUint::from(self.fees.fee_denominator)
    }

    fn invalid_fee(&self) -> QuoteError {
        QuoteError::InvalidFee {
            numerator: self.fees.fee_numerator,
            denominator: self.fees.fee_denominator,
        }
    }

    /// `floor(in·num·R_out / (R_in·den + in·num))`
    pub fn amount_out(
        &self,
        amount_in: &BigUint,
        reserve_in: &BigUint,
        reserve_out: &BigUint,
    ) -> Result<BigUint, QuoteError> {
        if amount_in.is_zero() {
            return Err(QuoteError::InsufficientInput);
        }
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(QuoteError::InsufficientLiquidity);
        }
        let in_with_fee = amount_in * self.fee_num();
        let numerator = &in_with_fee * reserve_out;
        let denominator = reserve_in * self.fee_den() + in_with_fee;
        if denominator.is_zero() {
            return Err(self.invalid_fee());
        }
        Ok(numerator / denominator)
    }

    /// Smallest input that yields at least `amount_out`: ceiling of
    /// `R_in·out·den / ((R_out − out)·num)`
    pub fn amount_in(
        &self,
        amount_out: &BigUint,
        reserve_in: &BigUint,
        reserve_out: &BigUint,
    ) -> Result<BigUint, QuoteError> {
        if amount_out.is_zero() {
            return Err(QuoteError::InsufficientOutput);
        }
        if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
            return Err(QuoteError::InsufficientLiquidity);
        }
        let numerator = reserve_in * amount_out * self.fee_den();
        let denominator = (reserve_out - amount_out) * self.fee_num();
        if denominator.is_zero() {
            return Err(self.invalid_fee());
        }
        Ok(ceil_div(&numerator, &denominator))
    }

    /// On-chain guard: `floor(out·(10000 − bps) / 10000)`
    pub fn minimum_received(
        &self,
        amount_out: &BigUint,
        slippage_bps: u32,
    ) -> Result<BigUint, QuoteError> {
        if slippage_bps > BPS_SCALE {
            return Err(QuoteError::InvalidSlippage(slippage_bps));
        }
        Ok(amount_out * (BPS_SCALE - slippage_bps) / BPS_SCALE)
    }

    /// Liquidity tokens minted for a deposit of `amount_a` and `amount_b`
    pub fn estimate_liquidity_tokens(
        &self,
        amount_a: &BigUint,
        amount_b: &BigUint,
        reserve_a: &BigUint,
        reserve_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<BigUint, QuoteError> {
        if amount_a.is_zero() || amount_b.is_zero() {
            return Err(QuoteError::InsufficientInput);
        }
        if total_supply.is_zero() {
            let root = isqrt(&(amount_a * amount_b));
            let burned = BigUint::from(self.fees.minimum_liquidity);
            if root <= burned {
                return Err(QuoteError::InsufficientLiquidityMinted);
            }
            return Ok(root - burned);
        }
        if reserve_a.is_zero() || reserve_b.is_zero() {
            return Err(QuoteError::InsufficientLiquidity);
        }
        let by_a = amount_a * total_supply / reserve_a;
        let by_b = amount_b * total_supply / reserve_b;
        let minted = by_a.min(by_b);
        if minted.is_zero() {
            return Err(QuoteError::InsufficientLiquidityMinted);
        }
        Ok(minted)
    }

    /// Underlying amounts returned for burning `liquidity` tokens
    pub fn estimate_redemption(
        &self,
        liquidity: &BigUint,
        reserve_a: &BigUint,
        reserve_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<(BigUint, BigUint), QuoteError> {
        if liquidity.is_zero() {
            return Err(QuoteError::InsufficientInput);
        }
        if total_supply.is_zero() || liquidity > total_supply {
            return Err(QuoteError::InvalidRedemption {
                requested: liquidity.to_string(),
                supply: total_supply.to_string(),
            });
        }
        Ok((
            liquidity * reserve_a / total_supply,
            liquidity * reserve_b / total_supply,
        ))
    }

    /// Amount of B matching `amount_a` at the current pool ratio
    pub fn proportional_amount(
        &self,
        amount_a: &BigUint,
        reserve_a: &BigUint,
        reserve_b: &BigUint,
    ) -> Result<BigUint, QuoteError> {
        if amount_a.is_zero() {
            return Err(QuoteError::InsufficientInput);
        }
        if reserve_a.is_zero() || reserve_b.is_zero() {
            return Err(QuoteError::InsufficientLiquidity);
        }
        Ok(amount_a * reserve_b / reserve_a)
    }

    /// Chain `amount_out` through consecutive pools; returns the amount after
    /// each hop, starting with the input
    pub fn amounts_out_along(
        &self,
        amount_in: &BigUint,
        hops: &[(BigUint, BigUint)],
    ) -> Result<Vec<BigUint>, QuoteError> {
        let mut amounts = Vec::with_capacity(hops.len() + 1);
        amounts.push(amount_in.clone());
        for (reserve_in, reserve_out) in hops {
            let next = self.amount_out(&amounts[amounts.len() - 1], reserve_in, reserve_out)?;
            amounts.push(next);
        }
        Ok(amounts)
    }

    /// How far the realized rate `out/in` falls below the spot rate
    /// `R_out/R_in`, as a percentage of spot; never negative
    pub fn price_impact_percent(
        &self,
        amount_in: &BigUint,
        amount_out: &BigUint,
        reserve_in: &BigUint,
        reserve_out: &BigUint,
    ) -> f64 {
        let spot_scaled = amount_in * reserve_out;
        if spot_scaled.is_zero() {
            return 0.0;
        }
        let realized_scaled = amount_out * reserve_in;
        if realized_scaled >= spot_scaled {
            return 0.0;
        }
        let ppm = (&spot_scaled - realized_scaled) * PPM_SCALE / &spot_scaled;
        ppm.to_f64().unwrap_or(0.0) / 10_000.0
    }

    /// Full swap preview. Liquidity and input problems yield an invalid quote
    /// rather than an error.
    pub fn quote(
        &self,
        amount_in: &RawAmount,
        reserve_in: &BigUint,
        reserve_out: &BigUint,
        output_decimals: u8,
        slippage_bps: u32,
    ) -> Quote {
        let output = match self.amount_out(amount_in.raw(), reserve_in, reserve_out) {
            Ok(output) => output,
            Err(e) => return Quote::invalid(amount_in, output_decimals, e),
        };
        let minimum = match self.minimum_received(&output, slippage_bps) {
            Ok(minimum) => minimum,
            Err(e) => return Quote::invalid(amount_in, output_decimals, e),
        };

        let impact = self.price_impact_percent(amount_in.raw(), &output, reserve_in, reserve_out);
        let output_amount = RawAmount::new(output, output_decimals);
        let execution_rate = display_ratio(&output_amount, amount_in);

        Quote {
            input_amount: amount_in.clone(),
            output_amount,
            execution_rate,
            price_impact_percent: impact,
            minimum_received: RawAmount::new(minimum, output_decimals),
            valid: true,
            invalid_reason: None,
        }
    }
}

/// `numerator / denominator` in display units
fn display_ratio(numerator: &RawAmount, denominator: &RawAmount) -> f64 {
    let num = numerator.raw().to_f64().unwrap_or(0.0);
    let den = denominator.raw().to_f64().unwrap_or(0.0);
    if den == 0.0 {
        return 0.0;
    }
    let scale = denominator.decimals() as i32 - numerator.decimals() as i32;
    num / den * 10f64.powi(scale)
}
