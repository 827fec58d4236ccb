//! Casper chain client core
//!
//! Byte codec, storage key derivation, state resolution, AMM quoting, deploy
//! building, signature normalization and submission. Node access goes through
//! an injected `RpcTransport`; `HttpTransport` is the JSON-RPC one.

pub mod address;
pub mod amount;
pub mod clvalue;
pub mod codec;
pub mod deploy;
pub mod digest;
pub mod error;
pub mod keys;
pub mod layout;
pub mod quote;
pub mod resolver;
pub mod rpc;
pub mod signature;
pub mod submit;

pub use address::{sort_pair, Address, PairOrdering, PublicKey};
pub use amount::RawAmount;
pub use deploy::{DeployBuilder, DeployConfig, DeployHash, Session, SignOutcome, SignedDeploy, UnsignedDeploy};
pub use error::{Error, Result};
pub use quote::{FeeConfig, Quote, QuoteEngine, ReservePair};
pub use resolver::{ResolverConfig, StateResolver};
pub use rpc::{HttpTransport, RpcTransport};
pub use submit::{ExecutionOutcome, PollConfig};
