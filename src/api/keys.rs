//! Storage key derivation endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::chain::address::Address;
use crate::chain::codec::{Endianness, ToBytes};
use crate::chain::keys::{derive_key, FieldSlot, KeyPayload, StorageKey};
use crate::types::{ApiError, ApiResult};

/// What follows the field index; at most one of these may be given
#[derive(Debug, Default, Deserialize)]
pub struct PayloadSpec {
    pub address: Option<String>,
    /// Unordered pair, e.g. a factory's pair registry key
    pub pair: Option<[String; 2]>,
    /// Ordered owner/spender, e.g. allowances
    pub owner: Option<String>,
    pub spender: Option<String>,
    /// Pre-serialized payload
    pub payload_hex: Option<String>,
}

impl PayloadSpec {
    fn resolve(&self) -> ApiResult<KeyPayload> {
        let given = [
            self.address.is_some(),
            self.pair.is_some(),
            self.owner.is_some() || self.spender.is_some(),
            self.payload_hex.is_some(),
        ];
        if given.iter().filter(|g| **g).count() > 1 {
            return Err(ApiError::BadRequest(
                "give only one of address, pair, owner/spender, payload_hex".into(),
            ));
        }

        if let Some(address) = &self.address {
            return Ok(KeyPayload::Address(Address::parse(address)?));
        }
        if let Some([a, b]) = &self.pair {
            return Ok(KeyPayload::SortedPair(Address::parse(a)?, Address::parse(b)?));
        }
        match (&self.owner, &self.spender) {
            (Some(owner), Some(spender)) => {
                let mut bytes = Address::parse(owner)?.to_bytes();
                Address::parse(spender)?.encode_into(&mut bytes);
                return Ok(KeyPayload::Raw(bytes));
            }
            (None, None) => {}
            _ => return Err(ApiError::BadRequest("owner and spender go together".into())),
        }
        if let Some(payload) = &self.payload_hex {
            let payload = payload.strip_prefix("0x").unwrap_or(payload);
            let bytes = hex::decode(payload)
                .map_err(|e| ApiError::BadRequest(format!("payload_hex: {}", e)))?;
            return Ok(KeyPayload::Raw(bytes));
        }
        Ok(KeyPayload::Scalar)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeriveRequest {
    pub field_index: u32,
    #[serde(default)]
    pub endianness: Endianness,
    #[serde(flatten)]
    pub payload: PayloadSpec,
}

#[derive(Debug, Serialize)]
pub struct DeriveResponse {
    pub key: StorageKey,
}

/// POST /api/keys/derive - Hash one field index and payload
pub async fn derive(Json(req): Json<DeriveRequest>) -> ApiResult<Json<DeriveResponse>> {
    let payload = req.payload.resolve()?;
    let key = derive_key(req.field_index, &payload.to_bytes(), req.endianness);
    Ok(Json(DeriveResponse { key }))
}

#[derive(Debug, Deserialize)]
pub struct CandidatesRequest {
    pub layout: String,
    pub field: String,
    #[serde(flatten)]
    pub payload: PayloadSpec,
}

#[derive(Debug, Serialize)]
pub struct Candidate {
    pub slot: FieldSlot,
    pub key: StorageKey,
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub layout: String,
    pub version: u32,
    pub field: String,
    pub dictionary_roots: Vec<String>,
    pub candidates: Vec<Candidate>,
}

/// POST /api/keys/candidates - Candidate keys for a layout field, in probe order
pub async fn candidates(
    State(state): State<AppState>,
    Json(req): Json<CandidatesRequest>,
) -> ApiResult<Json<CandidatesResponse>> {
    let layout = state
        .resolver
        .layouts()
        .get(&req.layout)
        .ok_or_else(|| ApiError::NotFound(format!("layout '{}'", req.layout)))?;
    let slots = layout.slots(&req.field);
    if slots.is_empty() {
        return Err(ApiError::NotFound(format!(
            "field '{}' in layout '{}'",
            req.field, req.layout
        )));
    }

    let payload = req.payload.resolve()?.to_bytes();
    let mut candidates = Vec::with_capacity(slots.len());
    for slot in slots {
        let key = derive_key(slot.index, &payload, slot.endianness);
        if candidates.iter().all(|c: &Candidate| c.key != key) {
            candidates.push(Candidate { slot: *slot, key });
        }
    }

    Ok(Json(CandidatesResponse {
        layout: layout.name.clone(),
        version: layout.version,
        field: req.field,
        dictionary_roots: layout.dictionary_roots.clone(),
        candidates,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::state_with;
    use crate::chain::keys::{candidate_keys, derive_mapping_key};
    use crate::chain::layout::{field, ContractLayout};
    use crate::chain::rpc::mock::MockTransport;
    use serde_json::json;

    fn addr(fill: u8) -> String {
        format!("hash-{}", hex::encode([fill; 32]))
    }

    #[tokio::test]
    async fn test_derive_scalar_and_pair() {
        let req: DeriveRequest = serde_json::from_value(json!({"field_index": 3})).unwrap();
        let Json(res) = derive(Json(req)).await.unwrap();
        assert_eq!(res.key, derive_key(3, &[], Endianness::Big));

        let ab: DeriveRequest =
            serde_json::from_value(json!({"field_index": 3, "pair": [addr(1), addr(2)]})).unwrap();
        let ba: DeriveRequest =
            serde_json::from_value(json!({"field_index": 3, "pair": [addr(2), addr(1)]})).unwrap();
        let key = derive(Json(ab)).await.unwrap().0.key;
        assert_eq!(key, derive(Json(ba)).await.unwrap().0.key);
        let a = Address::parse(&addr(1)).unwrap();
        let b = Address::parse(&addr(2)).unwrap();
        assert_eq!(key, derive_mapping_key(3, a, b, Endianness::Big));
    }

    #[tokio::test]
    async fn test_derive_little_endian_raw_payload() {
        let req: DeriveRequest = serde_json::from_value(json!({
            "field_index": 7, "endianness": "little", "payload_hex": "0xabcd"
        }))
        .unwrap();
        let Json(res) = derive(Json(req)).await.unwrap();
        assert_eq!(res.key, derive_key(7, &[0xab, 0xcd], Endianness::Little));
    }

    #[tokio::test]
    async fn test_derive_rejects_ambiguous_payload() {
        let req: DeriveRequest = serde_json::from_value(json!({
            "field_index": 1, "address": addr(1), "payload_hex": "00"
        }))
        .unwrap();
        assert!(matches!(derive(Json(req)).await, Err(ApiError::BadRequest(_))));

        let req: DeriveRequest =
            serde_json::from_value(json!({"field_index": 1, "owner": addr(1)})).unwrap();
        assert!(matches!(derive(Json(req)).await, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_candidates_follow_layout() {
        let (state, _) = state_with(MockTransport::new(|_, _| unreachable!()));
        let owner = Address::account([9; 32]);
        let req: CandidatesRequest = serde_json::from_value(json!({
            "layout": "token", "field": "balances", "address": owner.to_key_string()
        }))
        .unwrap();
        let Json(res) = candidates(State(state.clone()), Json(req)).await.unwrap();

        let expected = candidate_keys(ContractLayout::token().slots(field::BALANCES), owner);
        let keys: Vec<StorageKey> = res.candidates.iter().map(|c| c.key).collect();
        assert_eq!(keys, expected);
        assert_eq!(res.dictionary_roots[0], "state");

        let req: CandidatesRequest =
            serde_json::from_value(json!({"layout": "token", "field": "nope"})).unwrap();
        assert!(matches!(
            candidates(State(state), Json(req)).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
