//! Merkle root construction for BlueBlock anchor batches.
//!
//! Provides the leaf/pair hashing primitives and the deterministic reduction
//! that turns an ordered record batch into one [`MerkleRoot`]. The ledger only
//! ever sees the resulting root.
//!
//! All hashing wraps established libraries (`sha2`, `blake3`); there is no custom
//! cryptography.
//!
//! [`MerkleRoot`]: blueblock_types::MerkleRoot

pub mod hasher;
pub mod json;
pub mod leaf;
pub mod merkle;

pub use hasher::HashAlgorithm;
pub use json::to_leaf_json;
pub use leaf::CanonicalLeaf;
pub use merkle::{build_root, build_root_json, empty_root, verify_batch, MerkleBuilder, MerkleError};
