use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 256-bit hash function used for leaves and interior nodes.
///
/// Hashing is raw: no domain tag or separator is mixed in, so roots built
/// with [`HashAlgorithm::Sha256`] match those produced by any plain SHA-256
/// implementation of the same construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256. Every root anchored so far uses this.
    #[default]
    Sha256,
    /// BLAKE3 in its default 256-bit mode.
    Blake3,
}

impl HashAlgorithm {
    /// Hash a single byte string.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        match self {
            Self::Sha256 => Sha256::digest(data).into(),
            Self::Blake3 => *blake3::hash(data).as_bytes(),
        }
    }

    /// Hash `left || right` without materialising the concatenation.
    pub fn hash_concat(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                hasher.finalize().into()
            }
            Self::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(left);
                hasher.update(right);
                *hasher.finalize().as_bytes()
            }
        }
    }

    /// Lowercase name used in config files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}
