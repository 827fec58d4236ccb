//! Chain state resolution
//!
//! Turns a contract or package address into readable state: resolve the
//! package to its latest enabled contract, find the storage dictionary among
//! the contract's named keys, then probe candidate keys until one decodes.
//! A missing key is an ordinary outcome (`None`), not an error.

use num_bigint::BigUint;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::address::{sort_pair, Address};
use super::amount::RawAmount;
use super::clvalue::CLType;
use super::codec::{ByteReader, DecodeError, FromBytes, ToBytes, U256};
use super::keys::{candidates, KeyPayload, StorageKey};
use super::layout::{field, ContractLayout, LayoutRegistry, FACTORY_LAYOUT, PAIR_LAYOUT, TOKEN_LAYOUT};
use super::quote::ReservePair;
use super::rpc::{RpcError, RpcTransport};

/// Node error code for a dictionary item that does not exist
pub const QUERY_FAILED: i64 = -32003;

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("package {0} has no enabled versions")]
    NoEnabledVersions(Address),

    #[error("{0} is neither a contract nor a contract package")]
    NotAContract(Address),

    #[error("no contract or package at {0}")]
    ContractNotFound(Address),

    #[error("no storage dictionary on {contract} (tried {candidates:?})")]
    DictionaryRootNotFound {
        contract: Address,
        candidates: Vec<String>,
    },

    #[error("unknown contract layout: {0}")]
    UnknownLayout(String),
}

fn malformed(what: &'static str, detail: impl ToString) -> ResolutionError {
    ResolutionError::Malformed {
        what,
        detail: detail.to_string(),
    }
}

/// Resolver tuning
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Pause between consecutive candidate probes
    pub probe_delay: Duration,
    /// Root names tried when a layout does not list its own
    pub dictionary_roots: Vec<String>,
    /// RPC error codes meaning "no such item"
    pub not_found_codes: Vec<i64>,
    /// Decimals assumed for a token whose decimals cannot be read
    pub default_decimals: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(50),
            dictionary_roots: vec!["state".to_string()],
            not_found_codes: vec![QUERY_FAILED],
            default_decimals: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedKey {
    pub name: String,
    pub key: String,
}

/// A concrete contract, reached either directly or through its package
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedContract {
    pub requested: Address,
    pub contract: Address,
    pub package: Option<Address>,
    /// Contract version selected from the package
    pub version: Option<u32>,
    pub named_keys: Vec<NamedKey>,
}

impl ResolvedContract {
    pub fn named_key(&self, name: &str) -> Option<&NamedKey> {
        self.named_keys.iter().find(|k| k.name == name)
    }
}

/// Storage dictionary seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DictionaryRoot {
    pub name: String,
    pub uref: String,
}

/// Derived keys and the dictionary they are looked up in
#[derive(Debug, Clone, Serialize)]
pub struct StorageKeyCandidates {
    pub root: DictionaryRoot,
    pub keys: Vec<StorageKey>,
}

/// One contract opened for reading at a fixed state root
#[derive(Debug, Clone)]
pub struct ContractState {
    pub state_root: String,
    pub contract: ResolvedContract,
    pub root: DictionaryRoot,
    pub layout: ContractLayout,
}

impl ContractState {
    pub fn candidates(&self, field: &str, payload: &KeyPayload) -> StorageKeyCandidates {
        StorageKeyCandidates {
            root: self.root.clone(),
            keys: candidates(self.layout.slots(field), payload),
        }
    }
}

pub struct StateResolver<T> {
    transport: T,
    config: ResolverConfig,
    layouts: LayoutRegistry,
}

impl<T: RpcTransport> StateResolver<T> {
    pub fn new(transport: T, config: ResolverConfig, layouts: LayoutRegistry) -> Self {
        Self {
            transport,
            config,
            layouts,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn state_root_hash(&self) -> Result<String, ResolutionError> {
        let result = self
            .transport
            .call("chain_get_state_root_hash", json!({}))
            .await?;
        result
            .get("state_root_hash")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("state root", result))
    }

    async fn stored_value(
        &self,
        state_root: &str,
        address: Address,
    ) -> Result<JsonValue, ResolutionError> {
        let reply = self
            .transport
            .call(
                "query_global_state",
                json!({
                    "state_identifier": { "StateRootHash": state_root },
                    "key": address.to_key_string(),
                    "path": [],
                }),
            )
            .await;
        let mut result = match reply {
            Ok(result) => result,
            Err(e) if self.is_not_found(&e) => {
                return Err(ResolutionError::ContractNotFound(address))
            }
            Err(e) => return Err(e.into()),
        };
        match result.get_mut("stored_value") {
            Some(value) => Ok(value.take()),
            None => Err(malformed("global state query", "missing stored_value")),
        }
    }

    /// Resolve a package to its latest enabled contract; contracts pass through
    pub async fn resolve_contract(
        &self,
        state_root: &str,
        address: Address,
    ) -> Result<ResolvedContract, ResolutionError> {
        let stored = self.stored_value(state_root, address).await?;

        if let Some(contract) = stored.get("Contract") {
            return Ok(ResolvedContract {
                requested: address,
                contract: address,
                package: package_of(contract),
                version: None,
                named_keys: named_keys_of(contract)?,
            });
        }

        let package = stored
            .get("ContractPackage")
            .or_else(|| stored.get("Package"))
            .ok_or(ResolutionError::NotAContract(address))?;
        let (version, contract_address) =
            latest_enabled_version(package)?.ok_or(ResolutionError::NoEnabledVersions(address))?;

        tracing::info!(
            "Resolved package {} to contract {} (version {})",
            address,
            contract_address,
            version
        );

        let stored = self
            .stored_value(state_root, contract_address)
            .await?;
        let contract = stored
            .get("Contract")
            .ok_or(ResolutionError::NotAContract(contract_address))?;

        Ok(ResolvedContract {
            requested: address,
            contract: contract_address,
            package: Some(address),
            version: Some(version),
            named_keys: named_keys_of(contract)?,
        })
    }

    /// First preferred root name present among the contract's named keys
    pub fn dictionary_root(
        &self,
        contract: &ResolvedContract,
        preferences: &[String],
    ) -> Result<DictionaryRoot, ResolutionError> {
        let preferences = if preferences.is_empty() {
            &self.config.dictionary_roots
        } else {
            preferences
        };
        for (position, name) in preferences.iter().enumerate() {
            if let Some(named) = contract.named_key(name) {
                if position > 0 {
                    tracing::warn!(
                        "Contract {} has no '{}' dictionary, using '{}'",
                        contract.contract,
                        preferences[0],
                        name
                    );
                }
                return Ok(DictionaryRoot {
                    name: named.name.clone(),
                    uref: named.key.clone(),
                });
            }
        }
        Err(ResolutionError::DictionaryRootNotFound {
            contract: contract.contract,
            candidates: preferences.to_vec(),
        })
    }

    /// Resolve `address` and find its dictionary under the named layout
    pub async fn open(
        &self,
        address: Address,
        layout: &str,
    ) -> Result<ContractState, ResolutionError> {
        let layout = self
            .layouts
            .get(layout)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownLayout(layout.to_string()))?;
        let state_root = self.state_root_hash().await?;
        let contract = self.resolve_contract(&state_root, address).await?;
        let root = self.dictionary_root(&contract, &layout.dictionary_roots)?;
        Ok(ContractState {
            state_root,
            contract,
            root,
            layout,
        })
    }

    /// Probe `candidates` in order; first value that decodes wins.
    ///
    /// Probes are strictly sequential with `probe_delay` between them.
    pub async fn lookup<V: FromBytes>(
        &self,
        state_root: &str,
        candidates: &StorageKeyCandidates,
    ) -> Result<Option<V>, ResolutionError> {
        for (attempt, key) in candidates.keys.iter().enumerate() {
            if attempt > 0 && !self.config.probe_delay.is_zero() {
                tokio::time::sleep(self.config.probe_delay).await;
            }

            let params = json!({
                "state_root_hash": state_root,
                "dictionary_identifier": {
                    "URef": {
                        "seed_uref": candidates.root.uref,
                        "dictionary_item_key": key.to_hex(),
                    }
                }
            });
            let result = match self.transport.call("state_get_dictionary_item", params).await {
                Ok(result) => result,
                Err(e) if self.is_not_found(&e) => {
                    tracing::debug!("Probe {} ({}) not found", attempt + 1, key);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let value = result
                .get("stored_value")
                .and_then(|v| v.get("CLValue"))
                .ok_or_else(|| malformed("dictionary item", "missing stored_value.CLValue"))?;
            match decode_stored::<V>(value) {
                Ok(decoded) => {
                    tracing::debug!("Probe {} ({}) hit", attempt + 1, key);
                    return Ok(Some(decoded));
                }
                Err(e) => {
                    tracing::debug!("Probe {} ({}) did not decode: {}", attempt + 1, key, e);
                }
            }
        }
        Ok(None)
    }

    fn is_not_found(&self, error: &RpcError) -> bool {
        error
            .code()
            .map(|code| self.config.not_found_codes.contains(&code))
            .unwrap_or(false)
    }

    /// Read one logical field of an opened contract
    pub async fn read_field<V: FromBytes>(
        &self,
        state: &ContractState,
        field: &str,
        payload: &KeyPayload,
    ) -> Result<Option<V>, ResolutionError> {
        let candidates = state.candidates(field, payload);
        if candidates.keys.is_empty() {
            tracing::warn!("Layout '{}' has no slots for '{}'", state.layout.name, field);
            return Ok(None);
        }
        self.lookup(&state.state_root, &candidates).await
    }

    async fn read_amount(
        &self,
        state: &ContractState,
        field: &str,
        payload: &KeyPayload,
    ) -> Result<BigUint, ResolutionError> {
        Ok(self
            .read_field::<U256>(state, field, payload)
            .await?
            .map(U256::into_inner)
            .unwrap_or_default())
    }

    async fn read_decimals(&self, state: &ContractState) -> Result<u8, ResolutionError> {
        Ok(self
            .read_field::<u8>(state, field::DECIMALS, &KeyPayload::Scalar)
            .await?
            .unwrap_or(self.config.default_decimals))
    }

    pub async fn token_decimals(&self, token: Address) -> Result<u8, ResolutionError> {
        let state = self.open(token, TOKEN_LAYOUT).await?;
        self.read_decimals(&state).await
    }

    /// Balance of `owner`; an owner with no entry holds zero
    pub async fn token_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<RawAmount, ResolutionError> {
        let state = self.open(token, TOKEN_LAYOUT).await?;
        let decimals = self.read_decimals(&state).await?;
        let raw = self
            .read_amount(&state, field::BALANCES, &KeyPayload::Address(owner))
            .await?;
        Ok(RawAmount::new(raw, decimals))
    }

    pub async fn token_total_supply(&self, token: Address) -> Result<RawAmount, ResolutionError> {
        let state = self.open(token, TOKEN_LAYOUT).await?;
        let decimals = self.read_decimals(&state).await?;
        let raw = self
            .read_amount(&state, field::TOTAL_SUPPLY, &KeyPayload::Scalar)
            .await?;
        Ok(RawAmount::new(raw, decimals))
    }

    /// Amount `spender` may move on behalf of `owner`
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<BigUint, ResolutionError> {
        let state = self.open(token, TOKEN_LAYOUT).await?;
        let mut key = owner.to_bytes();
        spender.encode_into(&mut key);
        self.read_amount(&state, field::ALLOWANCES, &KeyPayload::Raw(key))
            .await
    }

    /// Current reserves of a pool. Token addresses come from the pool when
    /// readable, otherwise from `tokens`.
    pub async fn pair_reserves(
        &self,
        pair: Address,
        tokens: Option<(Address, Address)>,
    ) -> Result<ReservePair, ResolutionError> {
        let state = self.open(pair, PAIR_LAYOUT).await?;

        let token0 = self
            .read_field::<Address>(&state, field::TOKEN0, &KeyPayload::Scalar)
            .await?;
        let token1 = self
            .read_field::<Address>(&state, field::TOKEN1, &KeyPayload::Scalar)
            .await?;
        let (token0, token1) = match (token0, token1, tokens) {
            (Some(t0), Some(t1), _) => (t0, t1),
            (_, _, Some((a, b))) => {
                tracing::warn!("Pair {} token addresses unreadable, using caller's", pair);
                sort_pair(a, b)
            }
            _ => return Err(malformed("pair", format!("{} token addresses unreadable", pair))),
        };

        let reserve0 = self
            .read_amount(&state, field::RESERVE0, &KeyPayload::Scalar)
            .await?;
        let reserve1 = self
            .read_amount(&state, field::RESERVE1, &KeyPayload::Scalar)
            .await?;

        Ok(ReservePair::new(token0, reserve0, token1, reserve1))
    }

    /// Outstanding liquidity tokens of a pool
    pub async fn pair_total_supply(&self, pair: Address) -> Result<RawAmount, ResolutionError> {
        let state = self.open(pair, PAIR_LAYOUT).await?;
        let decimals = self.read_decimals(&state).await?;
        let raw = self
            .read_amount(&state, field::TOTAL_SUPPLY, &KeyPayload::Scalar)
            .await?;
        Ok(RawAmount::new(raw, decimals))
    }

    /// Pool registered by the factory for an unordered token pair
    pub async fn pair_address(
        &self,
        factory: Address,
        a: Address,
        b: Address,
    ) -> Result<Option<Address>, ResolutionError> {
        let state = self.open(factory, FACTORY_LAYOUT).await?;
        self.read_field::<Address>(&state, field::PAIRS, &KeyPayload::SortedPair(a, b))
            .await
    }
}

fn named_keys_of(contract: &JsonValue) -> Result<Vec<NamedKey>, ResolutionError> {
    let entries = match contract.get("named_keys") {
        Some(JsonValue::Array(entries)) => entries,
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(other) => return Err(malformed("named keys", other)),
    };
    entries
        .iter()
        .map(|entry| {
            let name = entry.get("name").and_then(JsonValue::as_str);
            let key = entry.get("key").and_then(JsonValue::as_str);
            match (name, key) {
                (Some(name), Some(key)) => Ok(NamedKey {
                    name: name.to_string(),
                    key: key.to_string(),
                }),
                _ => Err(malformed("named key", entry)),
            }
        })
        .collect()
}

fn package_of(contract: &JsonValue) -> Option<Address> {
    let hash = contract.get("contract_package_hash")?.as_str()?;
    // older nodes print "contract-package-wasm<hex>"
    let hash = hash
        .strip_prefix("contract-package-wasm")
        .unwrap_or(hash);
    Address::parse(hash).ok()
}

/// (protocol major, contract version) of a version entry, flat or nested
fn version_key(entry: &JsonValue) -> Option<(u64, u64)> {
    if let Some([major, version]) = entry.as_array().map(Vec::as_slice) {
        return Some((major.as_u64()?, version.as_u64()?));
    }
    let key = entry.get("entity_version_key").unwrap_or(entry);
    let major = key.get("protocol_version_major")?.as_u64()?;
    let version = key
        .get("contract_version")
        .or_else(|| key.get("entity_version"))?
        .as_u64()?;
    Some((major, version))
}

/// Highest (protocol major, version) not listed as disabled
fn latest_enabled_version(package: &JsonValue) -> Result<Option<(u32, Address)>, ResolutionError> {
    let versions = package
        .get("versions")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| malformed("package", "missing versions"))?;
    let disabled: Vec<(u64, u64)> = package
        .get("disabled_versions")
        .and_then(JsonValue::as_array)
        .map(|entries| entries.iter().filter_map(version_key).collect())
        .unwrap_or_default();

    let mut best: Option<((u64, u64), Address)> = None;
    for entry in versions {
        let key = version_key(entry).ok_or_else(|| malformed("package version", entry))?;
        if disabled.contains(&key) {
            continue;
        }
        let hash = entry
            .get("contract_hash")
            .or_else(|| entry.get("addressable_entity_hash"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| malformed("package version", entry))?;
        let address = Address::parse(hash).map_err(|e| malformed("contract hash", e))?;
        if best.as_ref().map_or(true, |(k, _)| key > *k) {
            best = Some((key, address));
        }
    }

    best.map(|((_, version), address)| {
        u32::try_from(version)
            .map(|v| (v, address))
            .map_err(|_| malformed("package version", version))
    })
    .transpose()
}

#[derive(Debug, thiserror::Error)]
enum StoredValueError {
    #[error("bad hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("bad cl_type: {0}")]
    Type(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Decode a dictionary CLValue, unwrapping byte-list and `Any` containers
fn decode_stored<V: FromBytes>(value: &JsonValue) -> Result<V, StoredValueError> {
    let cl_type = value
        .get("cl_type")
        .ok_or_else(|| StoredValueError::Type("missing".into()))
        .and_then(|t| CLType::from_json(t).map_err(|e| StoredValueError::Type(e.to_string())))?;
    let bytes = hex::decode(value.get("bytes").and_then(JsonValue::as_str).unwrap_or(""))?;

    let wrapped = match &cl_type {
        CLType::Any => true,
        CLType::List(inner) => **inner == CLType::U8,
        _ => false,
    };
    if wrapped {
        let mut reader = ByteReader::new(&bytes);
        let payload = reader.read_prefixed()?;
        reader.finish()?;
        return Ok(V::from_bytes(payload)?);
    }
    Ok(V::from_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::ADDRESS_LENGTH;
    use crate::chain::codec::{write_prefixed, Endianness};
    use crate::chain::keys::{candidate_keys, derive_key, pair_candidates, scalar_candidates};
    use crate::chain::rpc::mock::MockTransport;
    use std::collections::HashMap;
    use std::sync::Arc;

    const ROOT: &str = "5a5b5c5d5e5f5a5b5c5d5e5f5a5b5c5d5e5f5a5b5c5d5e5f5a5b5c5d5e5f5a5b";
    const STATE_UREF: &str = "uref-1111111111111111111111111111111111111111111111111111111111111111-007";

    fn addr(fill: u8) -> Address {
        Address::contract([fill; ADDRESS_LENGTH])
    }

    fn not_found() -> RpcError {
        RpcError::Rpc {
            code: QUERY_FAILED,
            message: "Query failed".into(),
        }
    }

    fn contract_json(roots: &[&str]) -> JsonValue {
        let named: Vec<JsonValue> = roots
            .iter()
            .map(|name| json!({"name": name, "key": STATE_UREF}))
            .collect();
        json!({"Contract": {
            "contract_package_hash": format!("contract-package-wasm{}", addr(0xee).to_hex()),
            "named_keys": named,
            "entry_points": [],
        }})
    }

    fn u256_item(value: u64) -> JsonValue {
        json!({"stored_value": {"CLValue": {
            "cl_type": "U256",
            "bytes": hex::encode(U256::from_u64(value).to_bytes()),
            "parsed": value.to_string(),
        }}})
    }

    fn wrapped_item<B: ToBytes>(value: &B) -> JsonValue {
        let mut bytes = Vec::new();
        write_prefixed(&mut bytes, &value.to_bytes());
        json!({"stored_value": {"CLValue": {
            "cl_type": {"List": "U8"},
            "bytes": hex::encode(bytes),
            "parsed": null,
        }}})
    }

    /// Chain with one contract per entry of `contracts` and dictionary items
    /// keyed by hex key
    fn chain(
        contracts: HashMap<String, JsonValue>,
        items: HashMap<String, JsonValue>,
    ) -> Arc<MockTransport> {
        Arc::new(MockTransport::new(move |method, params| match method {
            "chain_get_state_root_hash" => Ok(json!({"state_root_hash": ROOT})),
            "query_global_state" => {
                let key = params["key"].as_str().unwrap_or_default();
                contracts
                    .get(key)
                    .map(|v| json!({"stored_value": v}))
                    .ok_or_else(not_found)
            }
            "state_get_dictionary_item" => {
                let key = params["dictionary_identifier"]["URef"]["dictionary_item_key"]
                    .as_str()
                    .unwrap_or_default();
                items.get(key).cloned().ok_or_else(not_found)
            }
            other => panic!("unexpected method {}", other),
        }))
    }

    fn scripted(transport: Arc<MockTransport>) -> StateResolver<Arc<MockTransport>> {
        let config = ResolverConfig {
            probe_delay: Duration::ZERO,
            ..ResolverConfig::default()
        };
        StateResolver::new(transport, config, LayoutRegistry::builtin())
    }

    fn root() -> DictionaryRoot {
        DictionaryRoot {
            name: "state".into(),
            uref: STATE_UREF.into(),
        }
    }

    #[tokio::test]
    async fn test_lookup_stops_at_first_hit() {
        let keys: Vec<StorageKey> = (0..10)
            .map(|i| derive_key(i, b"owner", Endianness::Big))
            .collect();
        let mut items = HashMap::new();
        items.insert(keys[6].to_hex(), u256_item(42));
        items.insert(keys[8].to_hex(), u256_item(99));
        let transport = chain(HashMap::new(), items);
        let resolver = scripted(transport.clone());

        let candidates = StorageKeyCandidates { root: root(), keys };
        let value: Option<U256> = resolver.lookup(ROOT, &candidates).await.unwrap();

        assert_eq!(value, Some(U256::from_u64(42)));
        assert_eq!(transport.calls_to("state_get_dictionary_item"), 7);
    }

    #[tokio::test]
    async fn test_lookup_waits_between_probes() {
        let keys: Vec<StorageKey> = (0..4)
            .map(|i| derive_key(i, &[], Endianness::Big))
            .collect();
        let transport = chain(HashMap::new(), HashMap::new());
        let config = ResolverConfig {
            probe_delay: Duration::from_millis(5),
            ..ResolverConfig::default()
        };
        let resolver = StateResolver::new(transport.clone(), config, LayoutRegistry::builtin());

        let started = std::time::Instant::now();
        let value: Option<U256> = resolver
            .lookup(ROOT, &StorageKeyCandidates { root: root(), keys })
            .await
            .unwrap();
        assert!(value.is_none());
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert_eq!(transport.calls_to("state_get_dictionary_item"), 4);
    }

    #[tokio::test]
    async fn test_lookup_skips_undecodable_values() {
        let keys: Vec<StorageKey> = (0..3)
            .map(|i| derive_key(i, &[], Endianness::Big))
            .collect();
        let mut items = HashMap::new();
        // a string where a u8 was expected
        items.insert(
            keys[0].to_hex(),
            json!({"stored_value": {"CLValue": {"cl_type": "String", "bytes": "0300000061626364"}}}),
        );
        items.insert(keys[1].to_hex(), wrapped_item(&9u8));
        let resolver = scripted(chain(HashMap::new(), items));

        let value: Option<u8> = resolver
            .lookup(ROOT, &StorageKeyCandidates { root: root(), keys })
            .await
            .unwrap();
        assert_eq!(value, Some(9));
    }

    #[tokio::test]
    async fn test_lookup_unwraps_any_values() {
        let keys: Vec<StorageKey> = (0..2)
            .map(|i| derive_key(i, &[], Endianness::Big))
            .collect();
        let mut bytes = Vec::new();
        write_prefixed(&mut bytes, &U256::from_u64(7).to_bytes());
        let mut items = HashMap::new();
        items.insert(
            keys[0].to_hex(),
            json!({"stored_value": {"CLValue": {
                "cl_type": "Any",
                "bytes": hex::encode(bytes),
                "parsed": null,
            }}}),
        );
        let transport = chain(HashMap::new(), items);
        let resolver = scripted(transport.clone());

        let value: Option<U256> = resolver
            .lookup(ROOT, &StorageKeyCandidates { root: root(), keys })
            .await
            .unwrap();
        assert_eq!(value, Some(U256::from_u64(7)));
        assert_eq!(transport.calls_to("state_get_dictionary_item"), 1);
    }

    #[tokio::test]
    async fn test_lookup_propagates_transport_failure() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Err(RpcError::Transport("connection refused".into()))
        }));
        let resolver = scripted(transport);
        let keys = vec![derive_key(1, &[], Endianness::Big)];
        let result: Result<Option<u8>, _> = resolver
            .lookup(ROOT, &StorageKeyCandidates { root: root(), keys })
            .await;
        assert!(matches!(result, Err(ResolutionError::Rpc(RpcError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_package_resolves_to_latest_enabled_version() {
        let package = addr(0xaa);
        let v1 = addr(0x01);
        let v2 = addr(0x02);
        let v3 = addr(0x03);
        let mut contracts = HashMap::new();
        contracts.insert(
            package.to_key_string(),
            json!({"ContractPackage": {
                "versions": [
                    {"protocol_version_major": 1, "contract_version": 1, "contract_hash": format!("contract-{}", v1.to_hex())},
                    {"protocol_version_major": 1, "contract_version": 3, "contract_hash": format!("contract-{}", v3.to_hex())},
                    {"protocol_version_major": 1, "contract_version": 2, "contract_hash": format!("contract-{}", v2.to_hex())},
                ],
                "disabled_versions": [{"protocol_version_major": 1, "contract_version": 3}],
                "groups": [],
            }}),
        );
        contracts.insert(v2.to_key_string(), contract_json(&["state"]));
        let transport = chain(contracts, HashMap::new());
        let resolver = scripted(transport.clone());

        let resolved = resolver.resolve_contract(ROOT, package).await.unwrap();
        assert_eq!(resolved.contract, v2);
        assert_eq!(resolved.package, Some(package));
        assert_eq!(resolved.version, Some(2));
        assert_eq!(transport.calls_to("query_global_state"), 2);
    }

    #[tokio::test]
    async fn test_contract_address_used_directly() {
        let token = addr(0x10);
        let mut contracts = HashMap::new();
        contracts.insert(token.to_key_string(), contract_json(&["state"]));
        let resolver = scripted(chain(contracts, HashMap::new()));

        let resolved = resolver.resolve_contract(ROOT, token).await.unwrap();
        assert_eq!(resolved.contract, token);
        assert_eq!(resolved.package, Some(addr(0xee)));
        assert!(resolved.version.is_none());
    }

    #[tokio::test]
    async fn test_missing_contract_is_not_found() {
        let resolver = scripted(chain(HashMap::new(), HashMap::new()));
        assert!(matches!(
            resolver.resolve_contract(ROOT, addr(0x42)).await,
            Err(ResolutionError::ContractNotFound(a)) if a == addr(0x42)
        ));

        let failing = Arc::new(MockTransport::new(|_, _| {
            Err(RpcError::Rpc { code: -32001, message: "busy".into() })
        }));
        assert!(matches!(
            scripted(failing).resolve_contract(ROOT, addr(0x42)).await,
            Err(ResolutionError::Rpc(_))
        ));
    }

    #[tokio::test]
    async fn test_package_without_enabled_versions() {
        let package = addr(0xab);
        let mut contracts = HashMap::new();
        contracts.insert(
            package.to_key_string(),
            json!({"ContractPackage": {
                "versions": [{"protocol_version_major": 1, "contract_version": 1, "contract_hash": format!("contract-{}", addr(1).to_hex())}],
                "disabled_versions": [[1, 1]],
            }}),
        );
        let resolver = scripted(chain(contracts, HashMap::new()));
        assert!(matches!(
            resolver.resolve_contract(ROOT, package).await,
            Err(ResolutionError::NoEnabledVersions(a)) if a == package
        ));
    }

    #[test]
    fn test_dictionary_root_fallback() {
        let resolver = scripted(chain(HashMap::new(), HashMap::new()));
        let contract = ResolvedContract {
            requested: addr(1),
            contract: addr(1),
            package: None,
            version: None,
            named_keys: vec![
                NamedKey { name: "owner".into(), key: "account-hash-00".into() },
                NamedKey { name: "storage".into(), key: STATE_UREF.into() },
            ],
        };
        let prefs: Vec<String> = vec!["state".into(), "__state".into(), "storage".into()];
        let found = resolver.dictionary_root(&contract, &prefs).unwrap();
        assert_eq!(found.name, "storage");
        assert_eq!(found.uref, STATE_UREF);

        let missing = resolver.dictionary_root(&contract, &["state".to_string()]);
        assert!(matches!(missing, Err(ResolutionError::DictionaryRootNotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_balance_is_zero() {
        let token = addr(0x10);
        let mut contracts = HashMap::new();
        contracts.insert(token.to_key_string(), contract_json(&["state"]));
        let mut items = HashMap::new();
        let decimals = scalar_candidates(ContractLayout::token().slots(field::DECIMALS));
        items.insert(decimals[0].to_hex(), wrapped_item(&6u8));
        let resolver = scripted(chain(contracts, items));

        let balance = resolver.token_balance(token, addr(0x20)).await.unwrap();
        assert!(balance.is_zero());
        assert_eq!(balance.decimals(), 6);
    }

    #[tokio::test]
    async fn test_balance_found_on_fallback_slot() {
        let token = addr(0x10);
        let owner = Address::account([0x20; ADDRESS_LENGTH]);
        let mut contracts = HashMap::new();
        contracts.insert(token.to_key_string(), contract_json(&["state"]));
        let mut items = HashMap::new();
        let balance_keys = candidate_keys(ContractLayout::token().slots(field::BALANCES), owner);
        items.insert(balance_keys[1].to_hex(), u256_item(1_500));
        let transport = chain(contracts, items);
        let resolver = scripted(transport.clone());

        let balance = resolver.token_balance(token, owner).await.unwrap();
        assert_eq!(balance.raw(), &BigUint::from(1_500u32));
        assert_eq!(balance.decimals(), 9);
    }

    #[tokio::test]
    async fn test_pair_reserves_with_token_fallback() {
        let pair = addr(0x30);
        let low = addr(0x01);
        let high = addr(0x02);
        let layout = ContractLayout::pair();
        let mut contracts = HashMap::new();
        contracts.insert(pair.to_key_string(), contract_json(&["state"]));
        let mut items = HashMap::new();
        items.insert(scalar_candidates(layout.slots(field::RESERVE0))[0].to_hex(), u256_item(1_000));
        items.insert(scalar_candidates(layout.slots(field::RESERVE1))[0].to_hex(), u256_item(4_000));
        let resolver = scripted(chain(contracts.clone(), items.clone()));

        let reserves = resolver.pair_reserves(pair, Some((high, low))).await.unwrap();
        assert_eq!(reserves.token0, low);
        assert_eq!(reserves.reserve0, BigUint::from(1_000u32));
        assert_eq!(reserves.reserve1, BigUint::from(4_000u32));

        assert!(resolver.pair_reserves(pair, None).await.is_err());

        items.insert(scalar_candidates(layout.slots(field::TOKEN0))[0].to_hex(), wrapped_item(&low));
        items.insert(scalar_candidates(layout.slots(field::TOKEN1))[0].to_hex(), wrapped_item(&high));
        let resolver = scripted(chain(contracts, items));
        let reserves = resolver.pair_reserves(pair, None).await.unwrap();
        assert_eq!(reserves.token1, high);
        assert_eq!(reserves.oriented(&high), Some((&BigUint::from(4_000u32), &BigUint::from(1_000u32))));
    }

    #[tokio::test]
    async fn test_pair_total_supply() {
        let pair = addr(0x30);
        let mut contracts = HashMap::new();
        contracts.insert(pair.to_key_string(), contract_json(&["state"]));
        let mut items = HashMap::new();
        let supply = scalar_candidates(ContractLayout::pair().slots(field::TOTAL_SUPPLY));
        items.insert(supply[0].to_hex(), u256_item(2_000));
        let resolver = scripted(chain(contracts, items));

        let supply = resolver.pair_total_supply(pair).await.unwrap();
        assert_eq!(supply.raw(), &BigUint::from(2_000u32));
    }

    #[tokio::test]
    async fn test_pair_address_ignores_token_order() {
        let factory = addr(0x40);
        let pool = addr(0x41);
        let (a, b) = (addr(0x05), addr(0x03));
        let mut contracts = HashMap::new();
        contracts.insert(factory.to_key_string(), contract_json(&["state"]));
        let mut items = HashMap::new();
        let key = pair_candidates(ContractLayout::factory().slots(field::PAIRS), a, b);
        items.insert(key[0].to_hex(), wrapped_item(&pool));
        let resolver = scripted(chain(contracts, items));

        assert_eq!(resolver.pair_address(factory, b, a).await.unwrap(), Some(pool));
        assert_eq!(resolver.pair_address(factory, a, addr(0x09)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_layout() {
        let resolver = scripted(chain(HashMap::new(), HashMap::new()));
        assert!(matches!(
            resolver.open(addr(1), "vault").await,
            Err(ResolutionError::UnknownLayout(_))
        ));
    }
}
