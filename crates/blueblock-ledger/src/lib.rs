//! Anchor ledger for BlueBlock.
//!
//! The ledger owns an append-only sequence of [`AnchorRecord`]s. Each record
//! commits one batch's Merkle root together with its project id, record
//! count, and time window. This crate provides:
//! - [`AnchorLedgerState`] and the pure [`apply`] transition function
//! - owner/approval authorization
//! - the `anchor_<slot>_<field>` keyspace and method-call argument codec
//! - [`StateStore`] backends (in-memory and atomic JSON file)
//! - [`HostGateway`], which serializes calls and supplies the ledger clock
//! - [`LedgerConfig`] loaded from TOML
//!
//! # Quick Start
//!
//! ```rust
//! use blueblock_crypto::MerkleBuilder;
//! use blueblock_ledger::{
//!     AnchorSubmission, HostGateway, InMemoryStateStore, LedgerGateway, LedgerSettings,
//!     Transition,
//! };
//! use blueblock_types::Principal;
//!
//! let gateway = HostGateway::new(InMemoryStateStore::new());
//! let owner = Principal::from_bytes([1; 32]);
//! gateway
//!     .execute(&owner, Transition::Create { settings: LedgerSettings::default() })
//!     .unwrap();
//!
//! let root = MerkleBuilder::default().build_root(["r1", "r2", "r3"]);
//! let submission = AnchorSubmission::new("proj1", root, 3, 1_700_000_000, 1_700_086_400);
//! gateway.execute(&owner, Transition::SubmitAnchor(submission)).unwrap();
//!
//! assert_eq!(gateway.get_anchor(0).unwrap().merkle_root, root);
//! ```
//!
//! [`AnchorRecord`]: blueblock_types::AnchorRecord

pub mod args;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod file;
pub mod gateway;
pub mod keyspace;
pub mod memory;
pub mod settings;
pub mod state;
pub mod traits;
pub mod transition;

pub use args::{decode_app_args, encode_app_args};
pub use auth::{authorize, is_owner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use file::FileStateStore;
pub use gateway::HostGateway;
pub use keyspace::{AnchorField, GlobalKeyspace, StateKey, StateValue};
pub use memory::InMemoryStateStore;
pub use settings::{LedgerSettings, StateSchema};
pub use state::{AnchorLedgerState, GlobalStateView, LocalState};
pub use traits::{LedgerGateway, StateStore};
pub use transition::{
    apply, Applied, AnchorSubmission, Transition, TransitionContext, TransitionOutput,
};
