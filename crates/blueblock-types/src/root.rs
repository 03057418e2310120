use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length in bytes of every Merkle root.
pub const ROOT_LEN: usize = 32;

/// A 32-byte Merkle commitment over an ordered batch of records.
///
/// The ledger treats a root as an opaque value: it is embedded in an
/// [`AnchorRecord`](crate::AnchorRecord) exactly as submitted and never
/// recomputed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MerkleRoot([u8; ROOT_LEN]);

impl MerkleRoot {
    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; ROOT_LEN]) -> Self {
        Self(hash)
    }

    /// Copy a root out of a byte slice, rejecting any length other than 32.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; ROOT_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: ROOT_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; ROOT_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoot({})", self.short_hex())
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; ROOT_LEN]> for MerkleRoot {
    fn from(bytes: [u8; ROOT_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for MerkleRoot {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serialized as a lowercase hex string.
impl Serialize for MerkleRoot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MerkleRoot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
