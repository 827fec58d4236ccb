//! Service configuration from the environment
//!
//! Every component gets its settings as an explicit struct built here once at
//! startup; nothing reads the environment afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::deploy::DeployConfig;
use crate::chain::layout::{LayoutError, LayoutRegistry};
use crate::chain::quote::FeeConfig;
use crate::chain::resolver::ResolverConfig;
use crate::chain::submit::PollConfig;

pub const DEFAULT_RPC_URL: &str = "https://node.testnet.casper.network/rpc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub deploy: DeployConfig,
    pub resolver: ResolverConfig,
    pub poll: PollConfig,
    pub fees: FeeConfig,
    /// JSON file of contract layouts overriding the built-ins
    pub layouts_path: Option<PathBuf>,
    /// Payment used when a deploy request does not name one
    pub default_payment_motes: u64,
}

impl AppConfig {
    /// Read from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through an arbitrary lookup; unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut deploy = DeployConfig::default();
        if let Some(chain_name) = get("CASPER_CHAIN_NAME") {
            deploy.chain_name = chain_name;
        }
        if let Some(price) = parse::<u64>(&get, "CASPER_GAS_PRICE")? {
            deploy.gas_price = price;
        }
        if let Some(minutes) = parse::<u64>(&get, "DEPLOY_TTL_MINUTES")? {
            let secs = minutes.checked_mul(60).ok_or_else(|| ConfigError::Invalid {
                var: "DEPLOY_TTL_MINUTES",
                value: minutes.to_string(),
                reason: "too large".into(),
            })?;
            deploy.ttl = Duration::from_secs(secs);
        }

        let mut resolver = ResolverConfig::default();
        if let Some(ms) = parse::<u64>(&get, "PROBE_DELAY_MS")? {
            resolver.probe_delay = Duration::from_millis(ms);
        }

        let mut poll = PollConfig::default();
        if let Some(attempts) = parse::<u32>(&get, "POLL_ATTEMPTS")? {
            poll.attempts = attempts;
        }
        if let Some(ms) = parse::<u64>(&get, "POLL_INTERVAL_MS")? {
            poll.interval = Duration::from_millis(ms);
        }

        let mut fees = FeeConfig::default();
        if let Some(numerator) = parse::<u32>(&get, "FEE_NUMERATOR")? {
            fees.fee_numerator = numerator;
        }
        if let Some(denominator) = parse::<u32>(&get, "FEE_DENOMINATOR")? {
            fees.fee_denominator = denominator;
        }
        if fees.fee_numerator == 0
            || fees.fee_denominator == 0
            || fees.fee_numerator > fees.fee_denominator
        {
            return Err(ConfigError::Invalid {
                var: "FEE_NUMERATOR",
                value: format!("{}/{}", fees.fee_numerator, fees.fee_denominator),
                reason: "fee must be a positive fraction no greater than one".into(),
            });
        }

        let bind_addr = parse::<SocketAddr>(&get, "BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3001)));

        Ok(Self {
            rpc_url: get("CASPER_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            rpc_timeout: Duration::from_secs(parse::<u64>(&get, "RPC_TIMEOUT_SECS")?.unwrap_or(30)),
            bind_addr,
            deploy,
            resolver,
            poll,
            fees,
            layouts_path: get("CONTRACT_LAYOUTS_PATH").map(PathBuf::from),
            default_payment_motes: parse::<u64>(&get, "DEFAULT_PAYMENT_MOTES")?
                .unwrap_or(5_000_000_000),
        })
    }

    /// Built-in layouts plus any overrides file
    pub fn layouts(&self) -> Result<LayoutRegistry, LayoutError> {
        let mut registry = LayoutRegistry::builtin();
        if let Some(path) = &self.layouts_path {
            let count = registry.load_overrides_from_file(path)?;
            tracing::info!("Loaded {} contract layouts from {}", count, path.display());
        }
        Ok(registry)
    }
}

fn parse<T>(
    get: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}
