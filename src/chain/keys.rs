//! Storage key derivation
//!
//! Contract fields live in one dictionary keyed by
//! `blake2b256(field_index ++ payload)`. This module is the only place that
//! layout assumption is encoded. When the field index of a contract version is
//! uncertain, callers ask for an ordered list of candidates built from the
//! layout's index guesses, highest confidence first.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::address::{sort_pair, Address};
use super::codec::{write_u32, Endianness, ToBytes};
use super::digest::{blake2b256_parts, DIGEST_LENGTH};

/// Hashed dictionary item key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageKey([u8; DIGEST_LENGTH]);

impl StorageKey {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// Wire form used as `dictionary_item_key`
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.to_hex())
    }
}

impl Serialize for StorageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// One guess at where a field lives: its index and how the index is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSlot {
    pub index: u32,
    #[serde(default)]
    pub endianness: Endianness,
}

impl FieldSlot {
    pub const fn be(index: u32) -> Self {
        Self {
            index,
            endianness: Endianness::Big,
        }
    }

    pub const fn le(index: u32) -> Self {
        Self {
            index,
            endianness: Endianness::Little,
        }
    }
}

/// What follows the field index in the hashed preimage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPayload {
    /// Single-value field, nothing after the index
    Scalar,
    /// Mapping keyed by one address
    Address(Address),
    /// Mapping keyed by an unordered pair; ordered canonically before hashing
    SortedPair(Address, Address),
    /// Pre-serialized key (e.g. owner ++ spender, order significant)
    Raw(Vec<u8>),
}

impl KeyPayload {
    /// Bytes hashed after the field index
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            KeyPayload::Scalar => Vec::new(),
            KeyPayload::Address(address) => address.to_bytes(),
            KeyPayload::SortedPair(a, b) => {
                let (first, second) = sort_pair(*a, *b);
                let mut out = first.to_bytes();
                second.encode_into(&mut out);
                out
            }
            KeyPayload::Raw(bytes) => bytes.clone(),
        }
    }
}

/// `blake2b256(index ++ payload)`, no separator and no tag byte
pub fn derive_key(field_index: u32, payload: &[u8], endianness: Endianness) -> StorageKey {
    let mut index = Vec::with_capacity(4);
    write_u32(&mut index, field_index, endianness);
    StorageKey(blake2b256_parts(&[&index, payload]))
}

/// Key for a two-address mapping; the pair is put in canonical order here,
/// so callers pass the addresses as they have them
pub fn derive_mapping_key(
    field_index: u32,
    a: Address,
    b: Address,
    endianness: Endianness,
) -> StorageKey {
    derive_key(
        field_index,
        &KeyPayload::SortedPair(a, b).to_bytes(),
        endianness,
    )
}

/// One candidate per slot, in slot order, duplicates dropped
pub fn candidates(slots: &[FieldSlot], payload: &KeyPayload) -> Vec<StorageKey> {
    let bytes = payload.to_bytes();
    let mut keys: Vec<StorageKey> = Vec::with_capacity(slots.len());
    for slot in slots {
        let key = derive_key(slot.index, &bytes, slot.endianness);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Candidates for an address-keyed mapping field
pub fn candidate_keys(slots: &[FieldSlot], address: Address) -> Vec<StorageKey> {
    candidates(slots, &KeyPayload::Address(address))
}

/// Candidates for a single-value field
pub fn scalar_candidates(slots: &[FieldSlot]) -> Vec<StorageKey> {
    candidates(slots, &KeyPayload::Scalar)
}

/// Candidates for a mapping keyed by an unordered address pair
pub fn pair_candidates(slots: &[FieldSlot], a: Address, b: Address) -> Vec<StorageKey> {
    candidates(slots, &KeyPayload::SortedPair(a, b))
}
