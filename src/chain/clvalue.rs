//! Typed values carried in deploy arguments and returned from storage
//!
//! Every argument value is tagged with its `CLType` so the session bytes can be
//! produced without guessing. The JSON forms match what nodes and wallets
//! exchange (`{"cl_type": …, "bytes": …, "parsed": …}`).

use num_bigint::BigUint;
use serde_json::{json, Value as JsonValue};

use super::address::{Address, PublicKey};
use super::codec::{write_prefixed, write_u32, Endianness, ToBytes, U128, U256, U512};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("unsupported cl_type: {0}")]
    UnsupportedType(String),

    #[error("expected {expected} value, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("value out of range for {0}")]
    OutOfRange(String),
}

/// Value type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CLType {
    Bool,
    U8,
    U32,
    U64,
    U128,
    U256,
    U512,
    Unit,
    String,
    Key,
    PublicKey,
    Option(Box<CLType>),
    List(Box<CLType>),
    ByteArray(u32),
    Any,
}

impl CLType {
    pub fn tag(&self) -> u8 {
        match self {
            CLType::Bool => 0,
            CLType::U8 => 3,
            CLType::U32 => 4,
            CLType::U64 => 5,
            CLType::U128 => 6,
            CLType::U256 => 7,
            CLType::U512 => 8,
            CLType::Unit => 9,
            CLType::String => 10,
            CLType::Key => 11,
            CLType::Option(_) => 13,
            CLType::List(_) => 14,
            CLType::ByteArray(_) => 15,
            CLType::Any => 21,
            CLType::PublicKey => 22,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            CLType::Option(inner) => json!({ "Option": inner.to_json() }),
            CLType::List(inner) => json!({ "List": inner.to_json() }),
            CLType::ByteArray(len) => json!({ "ByteArray": len }),
            simple => JsonValue::String(simple.simple_name().to_string()),
        }
    }

    fn simple_name(&self) -> &'static str {
        match self {
            CLType::Bool => "Bool",
            CLType::U8 => "U8",
            CLType::U32 => "U32",
            CLType::U64 => "U64",
            CLType::U128 => "U128",
            CLType::U256 => "U256",
            CLType::U512 => "U512",
            CLType::Unit => "Unit",
            CLType::String => "String",
            CLType::Key => "Key",
            CLType::PublicKey => "PublicKey",
            CLType::Any => "Any",
            CLType::Option(_) => "Option",
            CLType::List(_) => "List",
            CLType::ByteArray(_) => "ByteArray",
        }
    }

    pub fn from_json(value: &JsonValue) -> Result<Self, ArgError> {
        let unsupported = || ArgError::UnsupportedType(value.to_string());
        match value {
            JsonValue::String(name) => match name.as_str() {
                "Bool" => Ok(CLType::Bool),
                "U8" => Ok(CLType::U8),
                "U32" => Ok(CLType::U32),
                "U64" => Ok(CLType::U64),
                "U128" => Ok(CLType::U128),
                "U256" => Ok(CLType::U256),
                "U512" => Ok(CLType::U512),
                "Unit" => Ok(CLType::Unit),
                "String" => Ok(CLType::String),
                "Key" => Ok(CLType::Key),
                "PublicKey" => Ok(CLType::PublicKey),
                "Any" => Ok(CLType::Any),
                _ => Err(unsupported()),
            },
            JsonValue::Object(map) if map.len() == 1 => {
                let (name, inner) = map.iter().next().ok_or_else(unsupported)?;
                match name.as_str() {
                    "Option" => Ok(CLType::Option(Box::new(Self::from_json(inner)?))),
                    "List" => Ok(CLType::List(Box::new(Self::from_json(inner)?))),
                    "ByteArray" => inner
                        .as_u64()
                        .and_then(|len| u32::try_from(len).ok())
                        .map(CLType::ByteArray)
                        .ok_or_else(unsupported),
                    _ => Err(unsupported()),
                }
            }
            _ => Err(unsupported()),
        }
    }
}

impl ToBytes for CLType {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            CLType::Option(inner) | CLType::List(inner) => inner.encode_into(out),
            CLType::ByteArray(len) => write_u32(out, *len, Endianness::Little),
            _ => {}
        }
    }
}

/// Serialized value plus its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CLValue {
    cl_type: CLType,
    bytes: Vec<u8>,
    parsed: JsonValue,
}

impl CLValue {
    pub fn cl_type(&self) -> &CLType {
        &self.cl_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "cl_type": self.cl_type.to_json(),
            "bytes": hex::encode(&self.bytes),
            "parsed": self.parsed,
        })
    }
}

impl ToBytes for CLValue {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_prefixed(out, &self.bytes);
        self.cl_type.encode_into(out);
    }
}

/// Argument value tagged with its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Bool(bool),
    U8(u8),
    U32(u32),
    U64(u64),
    U128(U128),
    U256(U256),
    U512(U512),
    Unit,
    String(String),
    Key(Address),
    PublicKey(PublicKey),
    Option(CLType, Option<Box<Arg>>),
    List(CLType, Vec<Arg>),
    ByteArray(Vec<u8>),
}

impl Arg {
    pub fn u256(value: impl Into<BigUint>) -> Result<Self, ArgError> {
        U256::new(value.into())
            .map(Arg::U256)
            .ok_or_else(|| ArgError::OutOfRange("U256".into()))
    }

    pub fn u512(value: impl Into<BigUint>) -> Result<Self, ArgError> {
        U512::new(value.into())
            .map(Arg::U512)
            .ok_or_else(|| ArgError::OutOfRange("U512".into()))
    }

    pub fn some(value: Arg) -> Self {
        Arg::Option(value.cl_type(), Some(Box::new(value)))
    }

    pub fn none(inner: CLType) -> Self {
        Arg::Option(inner, None)
    }

    /// Homogeneous list; every item must have type `item_type`
    pub fn list(item_type: CLType, items: Vec<Arg>) -> Result<Self, ArgError> {
        if let Some(bad) = items.iter().find(|item| item.cl_type() != item_type) {
            return Err(ArgError::TypeMismatch {
                expected: item_type.to_json().to_string(),
                got: bad.cl_type().to_json().to_string(),
            });
        }
        Ok(Arg::List(item_type, items))
    }

    pub fn cl_type(&self) -> CLType {
        match self {
            Arg::Bool(_) => CLType::Bool,
            Arg::U8(_) => CLType::U8,
            Arg::U32(_) => CLType::U32,
            Arg::U64(_) => CLType::U64,
            Arg::U128(_) => CLType::U128,
            Arg::U256(_) => CLType::U256,
            Arg::U512(_) => CLType::U512,
            Arg::Unit => CLType::Unit,
            Arg::String(_) => CLType::String,
            Arg::Key(_) => CLType::Key,
            Arg::PublicKey(_) => CLType::PublicKey,
            Arg::Option(inner, _) => CLType::Option(Box::new(inner.clone())),
            Arg::List(inner, _) => CLType::List(Box::new(inner.clone())),
            Arg::ByteArray(bytes) => CLType::ByteArray(bytes.len() as u32),
        }
    }

    fn parsed(&self) -> JsonValue {
        match self {
            Arg::Bool(v) => json!(v),
            Arg::U8(v) => json!(v),
            Arg::U32(v) => json!(v),
            Arg::U64(v) => json!(v),
            Arg::U128(v) => json!(v.value().to_str_radix(10)),
            Arg::U256(v) => json!(v.value().to_str_radix(10)),
            Arg::U512(v) => json!(v.value().to_str_radix(10)),
            Arg::Unit => JsonValue::Null,
            Arg::String(v) => json!(v),
            Arg::Key(address) => json!(address.to_key_string()),
            Arg::PublicKey(key) => json!(key.to_hex()),
            Arg::Option(_, value) => value
                .as_ref()
                .map(|inner| inner.parsed())
                .unwrap_or(JsonValue::Null),
            Arg::List(_, items) => JsonValue::Array(items.iter().map(Arg::parsed).collect()),
            Arg::ByteArray(bytes) => json!(hex::encode(bytes)),
        }
    }

    pub fn to_cl_value(&self) -> CLValue {
        CLValue {
            cl_type: self.cl_type(),
            bytes: self.to_bytes(),
            parsed: self.parsed(),
        }
    }

    /// Build a typed value from loosely typed JSON input. Integers may be
    /// given as JSON numbers or decimal strings.
    pub fn from_json(cl_type: &CLType, value: &JsonValue) -> Result<Self, ArgError> {
        let mismatch = || ArgError::TypeMismatch {
            expected: cl_type.to_json().to_string(),
            got: value.to_string(),
        };
        let big = || -> Result<BigUint, ArgError> {
            match value {
                JsonValue::String(s) => BigUint::parse_bytes(s.trim().as_bytes(), 10),
                JsonValue::Number(n) => n.as_u64().map(BigUint::from),
                _ => None,
            }
            .ok_or_else(mismatch)
        };
        let small = |max: u64| -> Result<u64, ArgError> {
            let v = big()?;
            u64::try_from(&v)
                .ok()
                .filter(|v| *v <= max)
                .ok_or_else(|| ArgError::OutOfRange(cl_type.to_json().to_string()))
        };

        match cl_type {
            CLType::Bool => value.as_bool().map(Arg::Bool).ok_or_else(mismatch),
            CLType::U8 => Ok(Arg::U8(small(u8::MAX as u64)? as u8)),
            CLType::U32 => Ok(Arg::U32(small(u32::MAX as u64)? as u32)),
            CLType::U64 => Ok(Arg::U64(small(u64::MAX)?)),
            CLType::U128 => U128::new(big()?)
                .map(Arg::U128)
                .ok_or_else(|| ArgError::OutOfRange("U128".into())),
            CLType::U256 => Arg::u256(big()?),
            CLType::U512 => Arg::u512(big()?),
            CLType::Unit => Ok(Arg::Unit),
            CLType::String => value
                .as_str()
                .map(|s| Arg::String(s.to_string()))
                .ok_or_else(mismatch),
            CLType::Key => value
                .as_str()
                .and_then(|s| Address::parse(s).ok())
                .map(Arg::Key)
                .ok_or_else(mismatch),
            CLType::PublicKey => value
                .as_str()
                .and_then(|s| PublicKey::from_hex(s).ok())
                .map(Arg::PublicKey)
                .ok_or_else(mismatch),
            CLType::Option(inner) => {
                if value.is_null() {
                    Ok(Arg::none((**inner).clone()))
                } else {
                    Ok(Arg::Option(
                        (**inner).clone(),
                        Some(Box::new(Self::from_json(inner, value)?)),
                    ))
                }
            }
            CLType::List(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|item| Self::from_json(inner, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arg::List((**inner).clone(), items))
            }
            CLType::ByteArray(len) => {
                let s = value.as_str().ok_or_else(mismatch)?;
                let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| mismatch())?;
                if bytes.len() != *len as usize {
                    return Err(mismatch());
                }
                Ok(Arg::ByteArray(bytes))
            }
            CLType::Any => Err(ArgError::UnsupportedType("Any".into())),
        }
    }
}

impl ToBytes for Arg {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Arg::Bool(v) => v.encode_into(out),
            Arg::U8(v) => v.encode_into(out),
            Arg::U32(v) => v.encode_into(out),
            Arg::U64(v) => v.encode_into(out),
            Arg::U128(v) => v.encode_into(out),
            Arg::U256(v) => v.encode_into(out),
            Arg::U512(v) => v.encode_into(out),
            Arg::Unit => {}
            Arg::String(v) => v.encode_into(out),
            Arg::Key(address) => address.encode_into(out),
            Arg::PublicKey(key) => key.encode_into(out),
            Arg::Option(_, None) => out.push(0),
            Arg::Option(_, Some(inner)) => {
                out.push(1);
                inner.encode_into(out);
            }
            Arg::List(_, items) => {
                write_u32(out, items.len() as u32, Endianness::Little);
                for item in items {
                    item.encode_into(out);
                }
            }
            Arg::ByteArray(bytes) => out.extend_from_slice(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::ADDRESS_LENGTH;

    #[test]
    fn test_type_json_round_trip() {
        let ty = CLType::Option(Box::new(CLType::List(Box::new(CLType::Key))));
        let json = ty.to_json();
        assert_eq!(json, json!({"Option": {"List": "Key"}}));
        assert_eq!(CLType::from_json(&json).unwrap(), ty);
        assert_eq!(
            CLType::from_json(&json!({"ByteArray": 32})).unwrap(),
            CLType::ByteArray(32)
        );
        assert!(CLType::from_json(&json!("Map")).is_err());
    }

    #[test]
    fn test_cl_value_bytes() {
        let value = Arg::u512(2_500_000_000u64).unwrap().to_cl_value();
        assert_eq!(value.cl_type(), &CLType::U512);
        assert_eq!(hex::encode(value.bytes()), "0400f90295");
        // length-prefixed bytes, then the type tag
        assert_eq!(hex::encode(value.to_bytes()), "050000000400f9029508");
        assert_eq!(value.to_json()["parsed"], json!("2500000000"));
    }

    #[test]
    fn test_key_and_option_encoding() {
        let token = Address::contract([0x11; ADDRESS_LENGTH]);
        let key = Arg::Key(token);
        assert_eq!(key.to_bytes(), token.to_bytes());

        let some = Arg::some(Arg::U64(1));
        assert_eq!(some.cl_type(), CLType::Option(Box::new(CLType::U64)));
        assert_eq!(some.to_bytes(), vec![1, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Arg::none(CLType::U64).to_bytes(), vec![0]);
    }

    #[test]
    fn test_list_rejects_mixed_types() {
        assert!(Arg::list(CLType::U8, vec![Arg::U8(1), Arg::U32(2)]).is_err());
        let list = Arg::list(CLType::U8, vec![Arg::U8(1), Arg::U8(2)]).unwrap();
        assert_eq!(list.to_bytes(), vec![2, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_from_json_parsing() {
        assert_eq!(
            Arg::from_json(&CLType::U256, &json!("1000")).unwrap(),
            Arg::u256(1000u32).unwrap()
        );
        assert_eq!(
            Arg::from_json(&CLType::U64, &json!(42)).unwrap(),
            Arg::U64(42)
        );
        assert!(matches!(
            Arg::from_json(&CLType::U8, &json!(300)),
            Err(ArgError::OutOfRange(_))
        ));
        assert!(Arg::from_json(&CLType::Key, &json!("not-a-key")).is_err());
        let path = Arg::from_json(
            &CLType::List(Box::new(CLType::Key)),
            &json!([format!("hash-{}", "ab".repeat(32)), format!("hash-{}", "cd".repeat(32))]),
        )
        .unwrap();
        assert_eq!(path.cl_type(), CLType::List(Box::new(CLType::Key)));
        assert_eq!(
            Arg::from_json(&CLType::Option(Box::new(CLType::U64)), &JsonValue::Null).unwrap(),
            Arg::none(CLType::U64)
        );
    }
}
