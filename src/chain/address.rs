//! Addresses, public keys and canonical pair ordering
//!
//! An `Address` is a tagged 32-byte identifier for either an account or a
//! contract. Pools order their two tokens by the raw payload bytes, and every
//! caller must recompute that ordering the same way; `sort_pair` is the only
//! place it is defined.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::codec::{ByteReader, DecodeError, FromBytes, ToBytes};
use super::digest::blake2b256_parts;

pub const ADDRESS_LENGTH: usize = 32;

const ACCOUNT_TAG: u8 = 0;
const CONTRACT_TAG: u8 = 1;

const ED25519_TAG: u8 = 1;
const SECP256K1_TAG: u8 = 2;
const ED25519_LENGTH: usize = 32;
const SECP256K1_LENGTH: usize = 33;

/// Errors parsing addresses and keys from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("unrecognized address format: {0}")]
    UnknownFormat(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown public key tag: {0}")]
    UnknownKeyTag(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Account,
    Contract,
}

impl AddressKind {
    pub fn tag(self) -> u8 {
        match self {
            AddressKind::Account => ACCOUNT_TAG,
            AddressKind::Contract => CONTRACT_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            ACCOUNT_TAG => Some(AddressKind::Account),
            CONTRACT_TAG => Some(AddressKind::Contract),
            _ => None,
        }
    }
}

/// Tagged 32-byte account or contract identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    kind: AddressKind,
    bytes: [u8; ADDRESS_LENGTH],
}

impl Address {
    pub const fn new(kind: AddressKind, bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self { kind, bytes }
    }

    pub const fn account(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self::new(AddressKind::Account, bytes)
    }

    pub const fn contract(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self::new(AddressKind::Contract, bytes)
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.bytes
    }

    pub fn is_contract(&self) -> bool {
        self.kind == AddressKind::Contract
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Global-state key string used in RPC queries (`hash-…` / `account-hash-…`)
    pub fn to_key_string(&self) -> String {
        match self.kind {
            AddressKind::Account => format!("account-hash-{}", self.to_hex()),
            AddressKind::Contract => format!("hash-{}", self.to_hex()),
        }
    }

    /// Parse any of the textual forms the chain and wallets emit.
    ///
    /// Bare 64-character hex is taken to be a contract address.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let prefixes: [(&str, AddressKind); 7] = [
            ("account-hash-", AddressKind::Account),
            ("entity-account-", AddressKind::Account),
            ("contract-package-", AddressKind::Contract),
            ("entity-contract-", AddressKind::Contract),
            ("contract-", AddressKind::Contract),
            ("package-", AddressKind::Contract),
            ("hash-", AddressKind::Contract),
        ];
        let (kind, hex_part) = prefixes
            .iter()
            .find_map(|(prefix, kind)| s.strip_prefix(prefix).map(|rest| (*kind, rest)))
            .unwrap_or((AddressKind::Contract, s.strip_prefix("0x").unwrap_or(s)));

        if hex_part.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressError::UnknownFormat(s.to_string()));
        }
        let raw = hex::decode(hex_part).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&raw);
        Ok(Self::new(kind, bytes))
    }
}

/// Payload bytes first, variant tag only as a tie breaker
impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes
            .cmp(&other.bytes)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_key_string())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl ToBytes for Address {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.kind.tag());
        out.extend_from_slice(&self.bytes);
    }
}

impl FromBytes for Address {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        let kind = AddressKind::from_tag(tag).ok_or(DecodeError::UnknownTag {
            what: "address",
            tag,
        })?;
        Ok(Self::new(kind, reader.read_array()?))
    }
}

/// Canonical pool ordering: the smaller address is token0
pub fn sort_pair(a: Address, b: Address) -> (Address, Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Canonical ordering of a trade's two tokens, remembering which side the
/// input token landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairOrdering {
    pub token0: Address,
    pub token1: Address,
    pub input_is_token0: bool,
}

impl PairOrdering {
    pub fn of(input: Address, other: Address) -> Self {
        let (token0, token1) = sort_pair(input, other);
        Self {
            token0,
            token1,
            input_is_token0: token0 == input,
        }
    }
}

/// Signer identity: algorithm tag plus raw key bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicKey {
    Ed25519([u8; ED25519_LENGTH]),
    Secp256k1([u8; SECP256K1_LENGTH]),
}

impl PublicKey {
    pub fn tag(&self) -> u8 {
        match self {
            PublicKey::Ed25519(_) => ED25519_TAG,
            PublicKey::Secp256k1(_) => SECP256K1_TAG,
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(bytes) => bytes,
            PublicKey::Secp256k1(bytes) => bytes,
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            PublicKey::Ed25519(_) => "ed25519",
            PublicKey::Secp256k1(_) => "secp256k1",
        }
    }

    /// Tagged hex, e.g. `01` + 64 hex chars for Ed25519
    pub fn to_hex(&self) -> String {
        format!("{:02x}{}", self.tag(), hex::encode(self.raw_bytes()))
    }

    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let (&tag, key) = raw.split_first().ok_or(AddressError::InvalidLength {
            expected: 1 + ED25519_LENGTH,
            actual: 0,
        })?;
        Self::from_tagged(tag, key)
    }

    fn from_tagged(tag: u8, key: &[u8]) -> Result<Self, AddressError> {
        match tag {
            ED25519_TAG => {
                let bytes: [u8; ED25519_LENGTH] =
                    key.try_into().map_err(|_| AddressError::InvalidLength {
                        expected: ED25519_LENGTH,
                        actual: key.len(),
                    })?;
                Ok(PublicKey::Ed25519(bytes))
            }
            SECP256K1_TAG => {
                let bytes: [u8; SECP256K1_LENGTH] =
                    key.try_into().map_err(|_| AddressError::InvalidLength {
                        expected: SECP256K1_LENGTH,
                        actual: key.len(),
                    })?;
                Ok(PublicKey::Secp256k1(bytes))
            }
            other => Err(AddressError::UnknownKeyTag(other)),
        }
    }

    /// Account address owned by this key:
    /// blake2b256(algorithm name ++ 0x00 ++ raw key)
    pub fn account_address(&self) -> Address {
        Address::account(blake2b256_parts(&[
            self.algorithm_name().as_bytes(),
            &[0u8],
            self.raw_bytes(),
        ]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl ToBytes for PublicKey {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        out.extend_from_slice(self.raw_bytes());
    }
}

impl FromBytes for PublicKey {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            ED25519_TAG => Ok(PublicKey::Ed25519(reader.read_array()?)),
            SECP256K1_TAG => Ok(PublicKey::Secp256k1(reader.read_array()?)),
            tag => Err(DecodeError::UnknownTag {
                what: "public key",
                tag,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> Address {
        Address::contract([fill; ADDRESS_LENGTH])
    }

    #[test]
    fn test_parse_forms() {
        let hex_part = "aa".repeat(32);
        let contract = Address::parse(&format!("hash-{}", hex_part)).unwrap();
        assert!(contract.is_contract());
        assert_eq!(contract.to_key_string(), format!("hash-{}", hex_part));

        let package = Address::parse(&format!("contract-package-{}", hex_part)).unwrap();
        assert_eq!(package, contract);

        let account = Address::parse(&format!("account-hash-{}", hex_part)).unwrap();
        assert_eq!(account.kind(), AddressKind::Account);
        assert_ne!(account, contract);

        assert_eq!(Address::parse(&hex_part).unwrap(), contract);
        assert!(Address::parse("hash-abcd").is_err());
        assert!(Address::parse(&format!("hash-{}", "zz".repeat(32))).is_err());
    }

    #[test]
    fn test_address_bytes_round_trip_and_unknown_tag() {
        let a = Address::account([7; ADDRESS_LENGTH]);
        let bytes = a.to_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 0);
        assert_eq!(Address::from_bytes(&bytes).unwrap(), a);

        let mut bad = bytes.clone();
        bad[0] = 9;
        assert_eq!(
            Address::from_bytes(&bad),
            Err(DecodeError::UnknownTag {
                what: "address",
                tag: 9
            })
        );
        assert!(Address::from_bytes(&bytes[..20]).is_err());
    }

    #[test]
    fn test_sort_pair_idempotent() {
        let a = addr(0x10);
        let b = addr(0x02);
        let sorted = sort_pair(a, b);
        assert_eq!(sorted, (b, a));
        assert_eq!(sort_pair(sorted.0, sorted.1), sorted);
        assert_eq!(sort_pair(b, a), sorted);
    }

    #[test]
    fn test_pair_ordering_distinguishes_direction() {
        let a = addr(0x10);
        let b = addr(0x02);
        let ab = PairOrdering::of(a, b);
        let ba = PairOrdering::of(b, a);
        assert_ne!(ab, ba);
        assert_eq!((ab.token0, ab.token1), (ba.token0, ba.token1));
        assert!(!ab.input_is_token0);
        assert!(ba.input_is_token0);

        let same = PairOrdering::of(a, a);
        assert_eq!(same, PairOrdering::of(a, a));
    }

    #[test]
    fn test_ordering_compares_payload_before_kind() {
        let account = Address::account([0x01; ADDRESS_LENGTH]);
        let contract = Address::contract([0x00; ADDRESS_LENGTH]);
        assert!(contract < account);
    }

    #[test]
    fn test_public_key_hex_and_account() {
        let hex_key = format!("01{}", "11".repeat(32));
        let key = PublicKey::from_hex(&hex_key).unwrap();
        assert_eq!(key.tag(), 1);
        assert_eq!(key.to_hex(), hex_key);
        assert_eq!(key.to_bytes().len(), 33);
        assert_eq!(key.account_address().kind(), AddressKind::Account);
        assert_eq!(key.account_address(), key.account_address());

        let secp = PublicKey::from_hex(&format!("02{}", "22".repeat(33))).unwrap();
        assert_eq!(secp.tag(), 2);
        assert_ne!(secp.account_address(), key.account_address());

        assert_eq!(
            PublicKey::from_hex(&format!("03{}", "11".repeat(32))),
            Err(AddressError::UnknownKeyTag(3))
        );
        assert!(PublicKey::from_hex(&format!("01{}", "11".repeat(31))).is_err());
    }
}
