//! Content hashing helpers

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Hash algorithms exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    /// Keccak-256 with the original (pre-FIPS) padding
    Keccak256,
    Sha256,
}

impl HashAlgo {
    pub fn hash_hex(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgo::Keccak256 => keccak_hex(bytes),
            HashAlgo::Sha256 => sha256_hex(bytes),
        }
    }
}

pub fn keccak_hex(bytes: &[u8]) -> String {
    hex::encode(Keccak256::digest(bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            keccak_hex(b""),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_algos_differ() {
        assert_ne!(
            HashAlgo::Keccak256.hash_hex(b"poi"),
            HashAlgo::Sha256.hash_hex(b"poi")
        );
    }
}
