//! Signer replies and signature normalization
//!
//! External signers answer in several shapes. `classify` maps the raw JSON to
//! a closed `SignerReply`; `normalize` turns that into a tagged 65-byte
//! approval for a given public key.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use super::address::PublicKey;

/// Signature length without the algorithm tag
pub const RAW_SIGNATURE_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("unrecognized signature format: {0}")]
    UnrecognizedSignatureFormat(String),

    #[error("deploy expired at {expired_at_ms} (now {now_ms})")]
    Expired { expired_at_ms: u64, now_ms: u64 },

    #[error("signer failed: {0}")]
    Signer(String),
}

fn unrecognized(detail: impl Into<String>) -> SignError {
    SignError::UnrecognizedSignatureFormat(detail.into())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SignerError(pub String);

/// Capability that signs a deploy on behalf of `signer_public_key_hex`
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        deploy: JsonValue,
        signer_public_key_hex: &str,
    ) -> Result<JsonValue, SignerError>;
}

/// Every reply shape a signer is known to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerReply {
    Cancelled,
    /// Hex signature, with or without tag
    Hex(String),
    /// Signature as individual bytes
    Bytes(Vec<u8>),
    /// Signature taken from an already-approved deploy
    Envelope(String),
}

/// Classify a raw signer reply
pub fn classify(reply: &JsonValue) -> Result<SignerReply, SignError> {
    match reply {
        // Some wallets hand back the reply object serialized as a string
        JsonValue::String(s) if s.trim_start().starts_with('{') => {
            let inner: JsonValue = serde_json::from_str(s)
                .map_err(|e| unrecognized(format!("malformed JSON reply: {}", e)))?;
            classify(&inner)
        }
        JsonValue::String(s) => Ok(SignerReply::Hex(s.clone())),
        JsonValue::Array(items) => byte_array(items).map(SignerReply::Bytes),
        JsonValue::Object(map) => {
            if map.get("cancelled").and_then(JsonValue::as_bool) == Some(true) {
                return Ok(SignerReply::Cancelled);
            }
            if let Some(hex) = map.get("signatureHex").and_then(JsonValue::as_str) {
                return Ok(SignerReply::Hex(hex.to_string()));
            }
            match map.get("signature") {
                Some(JsonValue::String(s)) => return Ok(SignerReply::Hex(s.clone())),
                Some(JsonValue::Array(items)) => return byte_array(items).map(SignerReply::Bytes),
                Some(JsonValue::Object(indexed)) => {
                    return indexed_bytes(indexed).map(SignerReply::Bytes)
                }
                _ => {}
            }
            let approvals = map
                .get("approvals")
                .or_else(|| map.get("deploy").and_then(|d| d.get("approvals")));
            if let Some(approval) = approvals.and_then(JsonValue::as_array).and_then(|a| a.first()) {
                return approval
                    .get("signature")
                    .and_then(JsonValue::as_str)
                    .map(|s| SignerReply::Envelope(s.to_string()))
                    .ok_or_else(|| unrecognized("approval without signature"));
            }
            Err(unrecognized(truncate(reply)))
        }
        other => Err(unrecognized(truncate(other))),
    }
}

fn truncate(value: &JsonValue) -> String {
    let text = value.to_string();
    match text.char_indices().nth(80) {
        Some((at, _)) => format!("{}…", &text[..at]),
        None => text,
    }
}

fn byte_array(items: &[JsonValue]) -> Result<Vec<u8>, SignError> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| unrecognized(format!("non-byte element {}", item)))
        })
        .collect()
}

/// `{"0": 1, "1": 2, …}` as produced by serializing a typed array
fn indexed_bytes(map: &serde_json::Map<String, JsonValue>) -> Result<Vec<u8>, SignError> {
    let mut bytes = vec![None; map.len()];
    for (key, value) in map {
        let index: usize = key
            .parse()
            .map_err(|_| unrecognized(format!("non-index key {}", key)))?;
        let slot = bytes
            .get_mut(index)
            .ok_or_else(|| unrecognized(format!("index {} out of range", index)))?;
        let byte = value
            .as_u64()
            .and_then(|b| u8::try_from(b).ok())
            .ok_or_else(|| unrecognized(format!("non-byte element {}", value)))?;
        *slot = Some(byte);
    }
    bytes
        .into_iter()
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| unrecognized("sparse signature indices"))
}

/// Signer identity plus tagged signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub signer: PublicKey,
    #[serde(serialize_with = "hex_bytes")]
    pub signature: Vec<u8>,
}

fn hex_bytes<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl Approval {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "signer": self.signer.to_hex(),
            "signature": hex::encode(&self.signature),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Approved(Approval),
    Cancelled,
}

/// Produce the tagged signature for `signer`.
///
/// 65 bytes must already carry the signer's tag; 64 bytes get it prepended.
pub fn normalize(reply: SignerReply, signer: &PublicKey) -> Result<Normalized, SignError> {
    let bytes = match reply {
        SignerReply::Cancelled => return Ok(Normalized::Cancelled),
        SignerReply::Bytes(bytes) => bytes,
        SignerReply::Hex(text) | SignerReply::Envelope(text) => {
            let text = text.trim();
            let text = text.strip_prefix("0x").unwrap_or(text);
            hex::decode(text).map_err(|e| unrecognized(format!("bad hex: {}", e)))?
        }
    };

    let tag = signer.tag();
    let raw = match bytes.len() {
        n if n == RAW_SIGNATURE_LENGTH + 1 => {
            if bytes[0] != tag {
                return Err(unrecognized(format!(
                    "signature tag {:02x} does not match key tag {:02x}",
                    bytes[0], tag
                )));
            }
            &bytes[1..]
        }
        RAW_SIGNATURE_LENGTH => &bytes[..],
        n => return Err(unrecognized(format!("{} signature bytes", n))),
    };

    let mut signature = Vec::with_capacity(RAW_SIGNATURE_LENGTH + 1);
    signature.push(tag);
    signature.extend_from_slice(raw);
    Ok(Normalized::Approved(Approval {
        signer: *signer,
        signature,
    }))
}

/// `classify` then `normalize`
pub fn normalize_reply(reply: &JsonValue, signer: &PublicKey) -> Result<Normalized, SignError> {
    normalize(classify(reply)?, signer)
}
