//! Crate-wide error aggregate

use super::address::AddressError;
use super::amount::AmountError;
use super::clvalue::ArgError;
use super::codec::DecodeError;
use super::deploy::BuildError;
use super::layout::LayoutError;
use super::quote::QuoteError;
use super::resolver::ResolutionError;
use super::rpc::RpcError;
use super::signature::SignError;
use super::submit::SubmitError;

/// Any failure from the chain client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Arg(#[from] ArgError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("could not read chain state: {0}")]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::Address;
    use crate::chain::quote::{QuoteEngine, QuoteError};
    use num_bigint::BigUint;

    fn swap_then_parse(amount: u32) -> Result<Address> {
        let zero = BigUint::default();
        QuoteEngine::default().amount_out(&BigUint::from(amount), &zero, &zero)?;
        Ok(Address::parse("hash-00")?)
    }

    #[test]
    fn test_errors_convert_with_question_mark() {
        let err = swap_then_parse(1).unwrap_err();
        assert!(matches!(err, Error::Quote(QuoteError::InsufficientLiquidity)));
    }

    #[test]
    fn test_resolution_errors_carry_context() {
        let err: Error = ResolutionError::NotAContract(Address::contract([1; 32])).into();
        assert!(err.to_string().starts_with("could not read chain state"));
    }
}
