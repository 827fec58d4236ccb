//! Blake2b-256, the chain's content hash

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

pub const DIGEST_LENGTH: usize = 32;

pub fn blake2b256(data: &[u8]) -> [u8; DIGEST_LENGTH] {
    blake2b256_parts(&[data])
}

/// Hash the concatenation of `parts` without materializing it
pub fn blake2b256_parts(parts: &[&[u8]]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_match_concatenation() {
        assert_eq!(
            blake2b256_parts(&[b"ab", b"", b"cd"]),
            blake2b256(b"abcd")
        );
    }

    #[test]
    fn test_empty_input_vector() {
        assert_eq!(
            hex::encode(blake2b256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }
}
