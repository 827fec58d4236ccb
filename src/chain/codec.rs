//! Byte codec for values exchanged with the chain
//!
//! Fixed-width integers, variable-width big unsigned integers, length-prefixed
//! byte strings, options and lists. Decoding never pads or defaults: a short
//! buffer, an unknown tag or leftover bytes are all `DecodeError`s, so callers
//! can tell "decoded as zero" apart from "could not decode".

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated buffer: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown {what} tag: {tag}")]
    UnknownTag { what: &'static str, tag: u8 },

    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    #[error("{what} length {len} exceeds maximum {max}")]
    LengthTooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Byte order for fixed-width integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// Cursor over an input buffer
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take exactly `n` bytes
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self, endianness: Endianness) -> Result<u32, DecodeError> {
        let raw = self.read_array::<4>()?;
        Ok(match endianness {
            Endianness::Big => u32::from_be_bytes(raw),
            Endianness::Little => u32::from_le_bytes(raw),
        })
    }

    pub fn read_u64(&mut self, endianness: Endianness) -> Result<u64, DecodeError> {
        let raw = self.read_array::<8>()?;
        Ok(match endianness {
            Endianness::Big => u64::from_be_bytes(raw),
            Endianness::Little => u64::from_le_bytes(raw),
        })
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    /// u32 little-endian length followed by that many bytes
    pub fn read_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32(Endianness::Little)? as usize;
        self.take(len)
    }

    /// Fail if any input is left over
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

pub fn write_u32(out: &mut Vec<u8>, value: u32, endianness: Endianness) {
    match endianness {
        Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
        Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
    }
}

pub fn write_u64(out: &mut Vec<u8>, value: u64, endianness: Endianness) {
    match endianness {
        Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
        Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Write a u32 little-endian length prefix followed by the bytes
pub fn write_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32, Endianness::Little);
    out.extend_from_slice(bytes);
}

/// Values with a canonical wire encoding
pub trait ToBytes {
    fn encode_into(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

/// Values decodable from their canonical wire encoding
pub trait FromBytes: Sized {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError>;

    /// Decode a complete buffer; leftover bytes are an error
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl ToBytes for u8 {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl FromBytes for u8 {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u8()
    }
}

impl ToBytes for u32 {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_u32(out, *self, Endianness::Little);
    }
}

impl FromBytes for u32 {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u32(Endianness::Little)
    }
}

impl ToBytes for u64 {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_u64(out, *self, Endianness::Little);
    }
}

impl FromBytes for u64 {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u64(Endianness::Little)
    }
}

impl ToBytes for bool {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl FromBytes for bool {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_bool()
    }
}

impl ToBytes for () {
    fn encode_into(&self, _out: &mut Vec<u8>) {}
}

impl FromBytes for () {
    fn decode_from(_reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl ToBytes for str {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_prefixed(out, self.as_bytes());
    }
}

impl ToBytes for String {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.as_str().encode_into(out);
    }
}

impl FromBytes for String {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let raw = reader.read_prefixed()?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Fixed-size byte arrays are written raw, without a length prefix
impl<const N: usize> ToBytes for [u8; N] {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<const N: usize> FromBytes for [u8; N] {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_array::<N>()
    }
}

impl<T: ToBytes> ToBytes for Option<T> {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(value) => {
                out.push(1);
                value.encode_into(out);
            }
        }
    }
}

impl<T: FromBytes> FromBytes for Option<T> {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => T::decode_from(reader).map(Some),
            tag => Err(DecodeError::UnknownTag {
                what: "option",
                tag,
            }),
        }
    }
}

impl<T: ToBytes> ToBytes for Vec<T> {
    fn encode_into(&self, out: &mut Vec<u8>) {
        write_u32(out, self.len() as u32, Endianness::Little);
        for item in self {
            item.encode_into(out);
        }
    }
}

impl<T: FromBytes> FromBytes for Vec<T> {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32(Endianness::Little)? as usize;
        // preallocation bounded by the input actually present
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::decode_from(reader)?);
        }
        Ok(items)
    }
}

fn encode_var_uint(value: &BigUint, out: &mut Vec<u8>) {
    if value.bits() == 0 {
        out.push(0);
        return;
    }
    let bytes = value.to_bytes_le();
    out.push(bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

fn decode_var_uint(
    reader: &mut ByteReader<'_>,
    what: &'static str,
    max: usize,
) -> Result<BigUint, DecodeError> {
    let len = reader.read_u8()? as usize;
    if len > max {
        return Err(DecodeError::LengthTooLarge { what, len, max });
    }
    Ok(BigUint::from_bytes_le(reader.take(len)?))
}

macro_rules! var_uint {
    ($(#[$meta:meta])* $name:ident, $label:literal, $bytes:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(BigUint);

        impl $name {
            pub const MAX_BYTES: usize = $bytes;

            /// Returns `None` when the value does not fit the width
            pub fn new(value: BigUint) -> Option<Self> {
                if value.bits() > (Self::MAX_BYTES as u64) * 8 {
                    None
                } else {
                    Some(Self(value))
                }
            }

            pub fn from_u64(value: u64) -> Self {
                Self(BigUint::from(value))
            }

            pub fn value(&self) -> &BigUint {
                &self.0
            }

            pub fn into_inner(self) -> BigUint {
                self.0
            }
        }

        impl ToBytes for $name {
            fn encode_into(&self, out: &mut Vec<u8>) {
                encode_var_uint(&self.0, out);
            }
        }

        impl FromBytes for $name {
            fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
                decode_var_uint(reader, $label, Self::MAX_BYTES).map(Self)
            }
        }
    };
}

var_uint!(
    /// 128-bit unsigned integer, length-prefixed little-endian on the wire
    U128,
    "U128",
    16
);
var_uint!(
    /// 256-bit unsigned integer (token balances, reserves)
    U256,
    "U256",
    32
);
var_uint!(
    /// 512-bit unsigned integer (native motes)
    U512,
    "U512",
    64
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_round_trip_and_order() {
        let mut out = Vec::new();
        write_u32(&mut out, 0x0102_0304, Endianness::Big);
        write_u32(&mut out, 0x0102_0304, Endianness::Little);
        assert_eq!(out, vec![1, 2, 3, 4, 4, 3, 2, 1]);

        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.read_u32(Endianness::Big).unwrap(), 0x0102_0304);
        assert_eq!(reader.read_u32(Endianness::Little).unwrap(), 0x0102_0304);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_truncated_fixed_width_is_an_error() {
        assert_eq!(
            u32::from_bytes(&[1, 2, 3]),
            Err(DecodeError::Truncated {
                needed: 4,
                remaining: 3
            })
        );
        assert!(matches!(
            u64::from_bytes(&[0; 7]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(u8::from_bytes(&[]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert_eq!(u8::from_bytes(&[1, 2]), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_var_uint_encoding() {
        assert_eq!(U256::from_u64(0).to_bytes(), vec![0]);
        assert_eq!(U256::from_u64(0x0100).to_bytes(), vec![2, 0x00, 0x01]);
        assert_eq!(
            U256::from_bytes(&[2, 0x00, 0x01]).unwrap(),
            U256::from_u64(256)
        );
        assert_eq!(U512::from_bytes(&[0]).unwrap(), U512::from_u64(0));
    }

    #[test]
    fn test_var_uint_rejects_oversized_and_short() {
        let mut oversized = vec![17u8];
        oversized.extend_from_slice(&[0xff; 17]);
        assert!(matches!(
            U128::from_bytes(&oversized),
            Err(DecodeError::LengthTooLarge { max: 16, .. })
        ));
        assert!(matches!(
            U256::from_bytes(&[4, 1, 2]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(U128::new(BigUint::from(1u8) << 128).is_none());
    }

    #[test]
    fn test_option_and_list() {
        let value: Option<u32> = Some(7);
        assert_eq!(value.to_bytes(), vec![1, 7, 0, 0, 0]);
        assert_eq!(Option::<u32>::from_bytes(&[0]).unwrap(), None);
        assert_eq!(
            Option::<u32>::from_bytes(&[2]),
            Err(DecodeError::UnknownTag {
                what: "option",
                tag: 2
            })
        );

        let list = vec![1u8, 2, 3];
        let bytes = list.to_bytes();
        assert_eq!(bytes, vec![3, 0, 0, 0, 1, 2, 3]);
        assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), list);
        assert!(Vec::<u8>::from_bytes(&[3, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_string_and_bool() {
        let bytes = "abc".to_bytes();
        assert_eq!(bytes, vec![3, 0, 0, 0, b'a', b'b', b'c']);
        assert_eq!(String::from_bytes(&bytes).unwrap(), "abc");
        assert_eq!(
            String::from_bytes(&[1, 0, 0, 0, 0xff]),
            Err(DecodeError::InvalidUtf8)
        );
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidBool(2)));
    }
}
