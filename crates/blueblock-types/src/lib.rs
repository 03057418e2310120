//! Foundation types for the BlueBlock anchor ledger.
//!
//! Every other BlueBlock crate depends on `blueblock-types`. The types here are
//! plain values: they carry no ledger policy and perform no I/O.
//!
//! # Key Types
//!
//! - [`Principal`]: Opaque 32-byte account identity
//! - [`MerkleRoot`]: 32-byte commitment over an ordered record batch
//! - [`ProjectId`]: Byte-string project identifier carried in anchor metadata
//! - [`AnchorRecord`]: One committed, immutable anchor

pub mod error;
pub mod principal;
pub mod record;
pub mod root;

pub use error::TypeError;
pub use principal::Principal;
pub use record::{AnchorRecord, ProjectId};
pub use root::MerkleRoot;
