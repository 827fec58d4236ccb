//! Deploy construction and signing
//!
//! `DeployBuilder` (unbuilt) → `UnsignedDeploy` (built, hashed, immutable) →
//! `SignedDeploy` (approved). Each step consumes the previous value. The TTL
//! window is fixed when the deploy is built.

use chrono::{DateTime, SecondsFormat};
use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::address::{Address, PublicKey};
use super::clvalue::Arg;
use super::codec::{write_prefixed, write_u32, Endianness, ToBytes, U512};
use super::digest::{blake2b256, DIGEST_LENGTH};
use super::signature::{normalize_reply, Approval, Normalized, SignError, Signer};

const ITEM_MODULE_BYTES: u8 = 0;
const ITEM_STORED_CONTRACT_BY_HASH: u8 = 1;
const ITEM_STORED_VERSIONED_CONTRACT_BY_HASH: u8 = 3;

/// Name of the payment amount argument
pub const PAYMENT_ARG: &str = "amount";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("entry point must not be empty")]
    EmptyEntryPoint,

    #[error("duplicate argument: {0}")]
    DuplicateArg(String),

    #[error("payment amount must be greater than zero")]
    ZeroPayment,

    #[error("payment amount exceeds U512")]
    PaymentOutOfRange,

    #[error("session target {0} is an account, not a contract")]
    AccountTarget(Address),

    #[error("ttl must be greater than zero")]
    ZeroTtl,

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Network and header parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub chain_name: String,
    pub gas_price: u64,
    pub ttl: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            chain_name: "casper-test".to_string(),
            gas_price: 1,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl DeployConfig {
    pub fn mainnet() -> Self {
        Self {
            chain_name: "casper".to_string(),
            ..Self::default()
        }
    }

    pub fn testnet() -> Self {
        Self::default()
    }
}

/// What the session calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Contract { hash: Address },
    /// `version: None` runs the latest version at execution time
    Package { hash: Address, version: Option<u32> },
}

impl Session {
    pub fn target(&self) -> Address {
        match self {
            Session::Contract { hash } | Session::Package { hash, .. } => *hash,
        }
    }
}

/// Ordered named arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArgs(Vec<(String, Arg)>);

impl RuntimeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append; a repeated name is an error
    pub fn insert(&mut self, name: impl Into<String>, value: Arg) -> Result<(), BuildError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(BuildError::DuplicateArg(name));
        }
        self.0.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(
            self.0
                .iter()
                .map(|(name, value)| json!([name, value.to_cl_value().to_json()]))
                .collect(),
        )
    }
}

impl ToBytes for RuntimeArgs {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_u32(out, self.0.len() as u32, Endianness::Little);
        for (name, value) in &self.0 {
            name.encode_into(out);
            value.to_cl_value().encode_into(out);
        }
    }
}

/// Payment or session code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableItem {
    ModuleBytes {
        module_bytes: Vec<u8>,
        args: RuntimeArgs,
    },
    StoredContractByHash {
        hash: Address,
        entry_point: String,
        args: RuntimeArgs,
    },
    StoredVersionedContractByHash {
        hash: Address,
        version: Option<u32>,
        entry_point: String,
        args: RuntimeArgs,
    },
}

impl ExecutableItem {
    /// Standard payment: empty module with an `amount` argument
    pub fn standard_payment(amount: U512) -> Self {
        let mut args = RuntimeArgs::new();
        args.0.push((PAYMENT_ARG.to_string(), Arg::U512(amount)));
        ExecutableItem::ModuleBytes {
            module_bytes: Vec::new(),
            args,
        }
    }

    pub fn session(session: Session, entry_point: String, args: RuntimeArgs) -> Self {
        match session {
            Session::Contract { hash } => ExecutableItem::StoredContractByHash {
                hash,
                entry_point,
                args,
            },
            Session::Package { hash, version } => ExecutableItem::StoredVersionedContractByHash {
                hash,
                version,
                entry_point,
                args,
            },
        }
    }

    pub fn args(&self) -> &RuntimeArgs {
        match self {
            ExecutableItem::ModuleBytes { args, .. }
            | ExecutableItem::StoredContractByHash { args, .. }
            | ExecutableItem::StoredVersionedContractByHash { args, .. } => args,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            ExecutableItem::ModuleBytes { module_bytes, args } => json!({
                "ModuleBytes": {
                    "module_bytes": hex::encode(module_bytes),
                    "args": args.to_json(),
                }
            }),
            ExecutableItem::StoredContractByHash {
                hash,
                entry_point,
                args,
            } => json!({
                "StoredContractByHash": {
                    "hash": hash.to_hex(),
                    "entry_point": entry_point,
                    "args": args.to_json(),
                }
            }),
            ExecutableItem::StoredVersionedContractByHash {
                hash,
                version,
                entry_point,
                args,
            } => json!({
                "StoredVersionedContractByHash": {
                    "hash": hash.to_hex(),
                    "version": version,
                    "entry_point": entry_point,
                    "args": args.to_json(),
                }
            }),
        }
    }
}

impl ToBytes for ExecutableItem {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ExecutableItem::ModuleBytes { module_bytes, args } => {
                out.push(ITEM_MODULE_BYTES);
                write_prefixed(out, module_bytes);
                args.encode_into(out);
            }
            ExecutableItem::StoredContractByHash {
                hash,
                entry_point,
                args,
            } => {
                out.push(ITEM_STORED_CONTRACT_BY_HASH);
                hash.as_bytes().encode_into(out);
                entry_point.encode_into(out);
                args.encode_into(out);
            }
            ExecutableItem::StoredVersionedContractByHash {
                hash,
                version,
                entry_point,
                args,
            } => {
                out.push(ITEM_STORED_VERSIONED_CONTRACT_BY_HASH);
                hash.as_bytes().encode_into(out);
                version.encode_into(out);
                entry_point.encode_into(out);
                args.encode_into(out);
            }
        }
    }
}

/// Deploy hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeployHash([u8; DIGEST_LENGTH]);

impl DeployHash {
    pub fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DeployHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeployHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeployHash({})", self.to_hex())
    }
}

impl FromStr for DeployHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_LENGTH];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for DeployHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployHeader {
    pub account: PublicKey,
    pub timestamp_ms: u64,
    pub ttl_ms: u64,
    pub gas_price: u64,
    pub body_hash: [u8; DIGEST_LENGTH],
    pub dependencies: Vec<[u8; DIGEST_LENGTH]>,
    pub chain_name: String,
}

impl ToBytes for DeployHeader {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.account.encode_into(out);
        self.timestamp_ms.encode_into(out);
        self.ttl_ms.encode_into(out);
        self.gas_price.encode_into(out);
        self.body_hash.encode_into(out);
        self.dependencies.encode_into(out);
        self.chain_name.encode_into(out);
    }
}

impl DeployHeader {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "account": self.account.to_hex(),
            "timestamp": format_timestamp(self.timestamp_ms),
            "ttl": format_ttl(self.ttl_ms),
            "gas_price": self.gas_price,
            "body_hash": hex::encode(self.body_hash),
            "dependencies": self.dependencies.iter().map(hex::encode).collect::<Vec<_>>(),
            "chain_name": self.chain_name,
        })
    }
}

/// RFC 3339 with milliseconds, UTC
pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

/// Compact duration such as `30m` or `1h 30m`
pub fn format_ttl(ms: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (86_400_000, "day"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
        (1, "ms"),
    ];
    if ms == 0 {
        return "0ms".to_string();
    }
    let mut rest = ms;
    let mut parts = Vec::new();
    for (unit, suffix) in UNITS {
        if rest >= unit {
            parts.push(format!("{}{}", rest / unit, suffix));
            rest %= unit;
        }
    }
    parts.join(" ")
}

/// Current wall-clock time in milliseconds
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Collects deploy inputs; `build` validates and hashes
#[derive(Debug, Clone)]
pub struct DeployBuilder {
    config: DeployConfig,
    account: Option<PublicKey>,
    session: Option<Session>,
    entry_point: Option<String>,
    args: Vec<(String, Arg)>,
    payment: Option<BigUint>,
}

impl DeployBuilder {
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            account: None,
            session: None,
            entry_point: None,
            args: Vec::new(),
            payment: None,
        }
    }

    pub fn account(mut self, account: PublicKey) -> Self {
        self.account = Some(account);
        self
    }

    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Arg) -> Self {
        self.args.push((name.into(), value));
        self
    }

    /// Payment in motes
    pub fn payment(mut self, motes: impl Into<BigUint>) -> Self {
        self.payment = Some(motes.into());
        self
    }

    /// Build with the current time as the deploy timestamp
    pub fn build(self) -> Result<UnsignedDeploy, BuildError> {
        self.build_at(now_ms())
    }

    pub fn build_at(self, timestamp_ms: u64) -> Result<UnsignedDeploy, BuildError> {
        let account = self.account.ok_or(BuildError::Missing("account"))?;
        let session = self.session.ok_or(BuildError::Missing("session"))?;
        let entry_point = self.entry_point.ok_or(BuildError::Missing("entry point"))?;
        let payment = self.payment.ok_or(BuildError::Missing("payment"))?;

        if entry_point.trim().is_empty() {
            return Err(BuildError::EmptyEntryPoint);
        }
        if !session.target().is_contract() {
            return Err(BuildError::AccountTarget(session.target()));
        }
        if payment.bits() == 0 {
            return Err(BuildError::ZeroPayment);
        }
        let payment = U512::new(payment).ok_or(BuildError::PaymentOutOfRange)?;
        let ttl_ms = u64::try_from(self.config.ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_ms == 0 {
            return Err(BuildError::ZeroTtl);
        }
        i64::try_from(timestamp_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or(BuildError::InvalidTimestamp(timestamp_ms as i64))?;

        let mut args = RuntimeArgs::new();
        for (name, value) in self.args {
            args.insert(name, value)?;
        }

        let payment = ExecutableItem::standard_payment(payment);
        let session = ExecutableItem::session(session, entry_point, args);

        let mut body = payment.to_bytes();
        session.encode_into(&mut body);
        let header = DeployHeader {
            account,
            timestamp_ms,
            ttl_ms,
            gas_price: self.config.gas_price,
            body_hash: blake2b256(&body),
            dependencies: Vec::new(),
            chain_name: self.config.chain_name,
        };
        let hash = DeployHash(blake2b256(&header.to_bytes()));

        tracing::debug!("Built deploy {} for {}", hash, account.account_address());

        Ok(UnsignedDeploy {
            hash,
            header,
            payment,
            session,
        })
    }
}

/// Result of an approval attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(SignedDeploy),
    Cancelled,
}

/// Built, hashed deploy awaiting approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedDeploy {
    hash: DeployHash,
    header: DeployHeader,
    payment: ExecutableItem,
    session: ExecutableItem,
}

impl UnsignedDeploy {
    pub fn hash(&self) -> DeployHash {
        self.hash
    }

    pub fn header(&self) -> &DeployHeader {
        &self.header
    }

    pub fn payment(&self) -> &ExecutableItem {
        &self.payment
    }

    pub fn session(&self) -> &ExecutableItem {
        &self.session
    }

    /// Sender account derived from the header key
    pub fn sender(&self) -> Address {
        self.header.account.account_address()
    }

    pub fn expires_at(&self) -> u64 {
        self.header.timestamp_ms.saturating_add(self.header.ttl_ms)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at()
    }

    fn json_with(&self, approvals: &[Approval]) -> JsonValue {
        json!({
            "hash": self.hash.to_hex(),
            "header": self.header.to_json(),
            "payment": self.payment.to_json(),
            "session": self.session.to_json(),
            "approvals": approvals.iter().map(Approval::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        self.json_with(&[])
    }

    fn check_fresh(&self, now_ms: u64) -> Result<(), SignError> {
        if self.is_expired(now_ms) {
            return Err(SignError::Expired {
                expired_at_ms: self.expires_at(),
                now_ms,
            });
        }
        Ok(())
    }

    /// Apply a raw signer reply for `signer`
    pub fn approve(
        self,
        signer: &PublicKey,
        reply: &JsonValue,
        now_ms: u64,
    ) -> Result<SignOutcome, SignError> {
        self.check_fresh(now_ms)?;
        match normalize_reply(reply, signer)? {
            Normalized::Cancelled => {
                tracing::debug!("Signing of deploy {} cancelled", self.hash);
                Ok(SignOutcome::Cancelled)
            }
            Normalized::Approved(approval) => Ok(SignOutcome::Signed(SignedDeploy {
                deploy: self,
                approvals: vec![approval],
            })),
        }
    }

    /// Ask `signer_impl` to sign as `signer`
    pub async fn sign_with<S: Signer + ?Sized>(
        self,
        signer_impl: &S,
        signer: &PublicKey,
        now_ms: u64,
    ) -> Result<SignOutcome, SignError> {
        self.check_fresh(now_ms)?;
        let reply = signer_impl
            .sign(self.to_json(), &signer.to_hex())
            .await
            .map_err(|e| SignError::Signer(e.to_string()))?;
        self.approve(signer, &reply, now_ms)
    }
}

/// Deploy with one or more approvals, ready to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDeploy {
    deploy: UnsignedDeploy,
    approvals: Vec<Approval>,
}

impl SignedDeploy {
    pub fn hash(&self) -> DeployHash {
        self.deploy.hash
    }

    pub fn deploy(&self) -> &UnsignedDeploy {
        &self.deploy
    }

    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    /// Append another signer's approval
    pub fn add_approval(&mut self, approval: Approval) {
        self.approvals.push(approval);
    }

    pub fn to_json(&self) -> JsonValue {
        self.deploy.json_with(&self.approvals)
    }
}
