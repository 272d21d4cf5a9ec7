//! # Chain Hashers
//!
//! The hash primitive behind `entry_hash` and `payload_digest`. SHA-256 is
//! the default; SHA3-256 is available for deployments that standardise on
//! Keccak-family hashes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;

/// 32-byte chain hash, hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({}..)", &self.to_hex()[..12])
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ChainHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash primitive over a sequence of byte slices.
pub trait ChainHasher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hash the concatenation of `parts`.
    fn hash(&self, parts: &[&[u8]]) -> ChainHash;
}

/// SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ChainHasher for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, parts: &[&[u8]]) -> ChainHash {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        ChainHash(hasher.finalize().into())
    }
}

/// SHA3-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha3Hasher;

impl ChainHasher for Sha3Hasher {
    fn name(&self) -> &'static str {
        "sha3-256"
    }

    fn hash(&self, parts: &[&[u8]]) -> ChainHash {
        let mut hasher = Sha3_256::new();
        for part in parts {
            hasher.update(part);
        }
        ChainHash(hasher.finalize().into())
    }
}
