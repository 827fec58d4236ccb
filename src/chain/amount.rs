//! Raw token amounts
//!
//! Arithmetic always happens on the raw integer; `decimals` is only used when
//! converting to and from display strings, and that conversion is exact.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("invalid amount: {0}")]
    Invalid(String),

    #[error("{got} fractional digits exceed {decimals} decimals")]
    TooPrecise { got: usize, decimals: u8 },
}

/// Smallest-unit amount plus its display precision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAmount {
    #[serde(with = "biguint_string")]
    raw: BigUint,
    decimals: u8,
}

impl RawAmount {
    pub fn new(raw: BigUint, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(BigUint::zero(), decimals)
    }

    pub fn from_u64(raw: u64, decimals: u8) -> Self {
        Self::new(BigUint::from(raw), decimals)
    }

    pub fn raw(&self) -> &BigUint {
        &self.raw
    }

    pub fn into_raw(self) -> BigUint {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Same precision, different raw value
    pub fn with_raw(&self, raw: BigUint) -> Self {
        Self::new(raw, self.decimals)
    }

    /// Exact decimal rendering with trailing fractional zeros trimmed
    pub fn to_display_string(&self) -> String {
        let digits = self.raw.to_str_radix(10);
        let decimals = self.decimals as usize;
        if decimals == 0 {
            return digits;
        }
        let padded = if digits.len() <= decimals {
            format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{}.{}", int_part, frac_part)
        }
    }

    /// Parse a display string such as `"12.5"` into raw units
    pub fn parse_display(s: &str, decimals: u8) -> Result<Self, AmountError> {
        let s = s.trim();
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
        {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if frac_part.len() > decimals as usize {
            return Err(AmountError::TooPrecise {
                got: frac_part.len(),
                decimals,
            });
        }
        let digits = format!(
            "{}{}{}",
            int_part,
            frac_part,
            "0".repeat(decimals as usize - frac_part.len())
        );
        let raw = BigUint::parse_bytes(digits.as_bytes(), 10).unwrap_or_default();
        Ok(Self::new(raw, decimals))
    }
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Serialize big integers as decimal strings
pub mod biguint_string {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid integer: {}", s)))
    }
}
