//! Persisted key/value layout of the anchor ledger.
//!
//! Global keys:
//!
//! ```text
//! owner                      bytes   owner principal
//! anchor_count               uint    number of anchors
//! anchor_<i>                 bytes   merkle root
//! anchor_<i>_project         bytes   project id
//! anchor_<i>_count           uint    record count
//! anchor_<i>_from            uint    window start
//! anchor_<i>_to              uint    window end
//! anchor_<i>_timestamp       uint    committed_at
//! ```
//!
//! `<i>` is the storage slot as 8 big-endian bytes (`itob`), so keys are raw
//! bytes, not text. Slots are 1-based: record `index` lives under slot
//! `index + 1`, the value `anchor_count` held right after it was stored.
//! Per-principal local state holds a single `approved` uint.
//!
//! Deployed state keeps the integer fields as 8-byte `itob` values rather
//! than uints; decoding accepts either form.

use std::collections::BTreeMap;
use std::fmt;

use blueblock_types::{AnchorRecord, MerkleRoot, Principal, ProjectId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::state::{AnchorLedgerState, LocalState};

const OWNER_KEY: &[u8] = b"owner";
const ANCHOR_COUNT_KEY: &[u8] = b"anchor_count";
const ANCHOR_PREFIX: &[u8] = b"anchor_";
const APPROVED_KEY: &[u8] = b"approved";

/// Encode an integer as 8 big-endian bytes.
pub fn itob(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode an 8-byte big-endian integer.
pub fn btoi(bytes: &[u8]) -> Result<u64, LedgerError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        LedgerError::InvalidArgument(format!(
            "integer must be 8 big-endian bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(arr))
}

/// Metadata field stored under an anchor's index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnchorField {
    Root,
    Project,
    Count,
    From,
    To,
    Timestamp,
}

impl AnchorField {
    pub const ALL: [Self; 6] = [
        Self::Root,
        Self::Project,
        Self::Count,
        Self::From,
        Self::To,
        Self::Timestamp,
    ];

    fn suffix(&self) -> &'static [u8] {
        match self {
            Self::Root => b"",
            Self::Project => b"_project",
            Self::Count => b"_count",
            Self::From => b"_from",
            Self::To => b"_to",
            Self::Timestamp => b"_timestamp",
        }
    }

    fn from_suffix(suffix: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.suffix() == suffix)
    }
}

/// A global state key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Owner,
    AnchorCount,
    Anchor { index: u64, field: AnchorField },
}

impl StateKey {
    pub fn anchor(index: u64, field: AnchorField) -> Self {
        Self::Anchor { index, field }
    }

    /// The raw key bytes as stored.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Owner => OWNER_KEY.to_vec(),
            Self::AnchorCount => ANCHOR_COUNT_KEY.to_vec(),
            Self::Anchor { index, field } => {
                let mut key = Vec::with_capacity(ANCHOR_PREFIX.len() + 8 + 10);
                key.extend_from_slice(ANCHOR_PREFIX);
                key.extend_from_slice(&itob(slot_of(*index)));
                key.extend_from_slice(field.suffix());
                key
            }
        }
    }

    /// Parse raw key bytes. Returns `None` for keys outside the layout.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes == OWNER_KEY {
            return Some(Self::Owner);
        }
        if bytes == ANCHOR_COUNT_KEY {
            return Some(Self::AnchorCount);
        }
        let rest = bytes.strip_prefix(ANCHOR_PREFIX)?;
        if rest.len() < 8 {
            return None;
        }
        let (index, suffix) = rest.split_at(8);
        let index = btoi(index).ok()?.checked_sub(1)?;
        let field = AnchorField::from_suffix(suffix)?;
        Some(Self::Anchor { index, field })
    }
}

fn slot_of(index: u64) -> u64 {
    index.saturating_add(1)
}

/// Human-readable form, with the storage slot rendered in decimal.
impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => f.write_str("owner"),
            Self::AnchorCount => f.write_str("anchor_count"),
            Self::Anchor { index, field } => {
                let suffix = String::from_utf8_lossy(field.suffix());
                write!(f, "anchor_{}{suffix}", slot_of(*index))
            }
        }
    }
}

/// A stored value: either a byte slice or an unsigned integer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateValue {
    Bytes(Vec<u8>),
    Uint(u64),
}

impl StateValue {
    fn as_bytes(&self, key: &StateKey) -> Result<&[u8], LedgerError> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::Uint(_) => Err(LedgerError::InvalidArgument(format!(
                "{key} must hold bytes"
            ))),
        }
    }

    fn as_uint(&self, key: &StateKey) -> Result<u64, LedgerError> {
        match self {
            Self::Uint(v) => Ok(*v),
            Self::Bytes(b) if b.len() == 8 => btoi(b),
            Self::Bytes(_) => Err(LedgerError::InvalidArgument(format!(
                "{key} must hold a uint"
            ))),
        }
    }
}

/// Global state in keyspace form.
pub type GlobalKeyspace = BTreeMap<StateKey, StateValue>;

/// Flatten a state into its global keys.
pub fn encode_keyspace(state: &AnchorLedgerState) -> GlobalKeyspace {
    let mut map = BTreeMap::new();
    map.insert(
        StateKey::Owner,
        StateValue::Bytes(state.owner().as_bytes().to_vec()),
    );
    map.insert(StateKey::AnchorCount, StateValue::Uint(state.anchor_count()));

    for record in state.anchors() {
        let i = record.index;
        map.insert(
            StateKey::anchor(i, AnchorField::Root),
            StateValue::Bytes(record.merkle_root.as_bytes().to_vec()),
        );
        map.insert(
            StateKey::anchor(i, AnchorField::Project),
            StateValue::Bytes(record.project_id.as_bytes().to_vec()),
        );
        map.insert(
            StateKey::anchor(i, AnchorField::Count),
            StateValue::Uint(record.record_count),
        );
        map.insert(
            StateKey::anchor(i, AnchorField::From),
            StateValue::Uint(record.window_start),
        );
        map.insert(
            StateKey::anchor(i, AnchorField::To),
            StateValue::Uint(record.window_end),
        );
        map.insert(
            StateKey::anchor(i, AnchorField::Timestamp),
            StateValue::Uint(record.committed_at),
        );
    }
    map
}

/// Flatten a state into raw byte keys, as a storage backend would hold them.
pub fn encode_raw(state: &AnchorLedgerState) -> BTreeMap<Vec<u8>, StateValue> {
    encode_keyspace(state)
        .into_iter()
        .map(|(key, value)| (key.to_bytes(), value))
        .collect()
}

/// Global state recovered from a keyspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedGlobals {
    pub owner: Principal,
    pub anchors: Vec<AnchorRecord>,
}

/// Rebuild owner and records from raw byte keys. Unknown keys are ignored.
pub fn decode_raw(raw: &BTreeMap<Vec<u8>, StateValue>) -> Result<DecodedGlobals, LedgerError> {
    let map: GlobalKeyspace = raw
        .iter()
        .filter_map(|(key, value)| StateKey::parse(key).map(|k| (k, value.clone())))
        .collect();
    decode_keyspace(&map)
}

/// Rebuild owner and records from a keyspace.
///
/// Every index below `anchor_count` must carry all six fields.
pub fn decode_keyspace(map: &GlobalKeyspace) -> Result<DecodedGlobals, LedgerError> {
    let owner_key = StateKey::Owner;
    let owner_bytes = map
        .get(&owner_key)
        .ok_or_else(|| LedgerError::invalid("keyspace has no owner"))?
        .as_bytes(&owner_key)?;
    let owner = Principal::from_bytes(owner_bytes.try_into().map_err(|_| {
        LedgerError::InvalidArgument(format!("owner must be 32 bytes, got {}", owner_bytes.len()))
    })?);

    let count_key = StateKey::AnchorCount;
    let anchor_count = map
        .get(&count_key)
        .ok_or_else(|| LedgerError::invalid("keyspace has no anchor_count"))?
        .as_uint(&count_key)?;

    let mut anchors = Vec::new();
    for index in 0..anchor_count {
        let (root_key, root_value) = anchor_field(map, index, AnchorField::Root, anchor_count)?;
        let merkle_root = MerkleRoot::from_slice(root_value.as_bytes(&root_key)?)
            .map_err(|e| LedgerError::InvalidArgument(format!("{root_key}: {e}")))?;
        let (project_key, project_value) =
            anchor_field(map, index, AnchorField::Project, anchor_count)?;
        let project_id = ProjectId::new(project_value.as_bytes(&project_key)?.to_vec());

        anchors.push(AnchorRecord {
            index,
            project_id,
            merkle_root,
            record_count: anchor_uint(map, index, AnchorField::Count, anchor_count)?,
            window_start: anchor_uint(map, index, AnchorField::From, anchor_count)?,
            window_end: anchor_uint(map, index, AnchorField::To, anchor_count)?,
            committed_at: anchor_uint(map, index, AnchorField::Timestamp, anchor_count)?,
        });
    }

    Ok(DecodedGlobals { owner, anchors })
}

fn anchor_field(
    map: &GlobalKeyspace,
    index: u64,
    field: AnchorField,
    anchor_count: u64,
) -> Result<(StateKey, &StateValue), LedgerError> {
    let key = StateKey::anchor(index, field);
    map.get(&key)
        .map(|value| (key, value))
        .ok_or(LedgerError::NotFound {
            index,
            anchor_count,
        })
}

fn anchor_uint(
    map: &GlobalKeyspace,
    index: u64,
    field: AnchorField,
    anchor_count: u64,
) -> Result<u64, LedgerError> {
    let (key, value) = anchor_field(map, index, field, anchor_count)?;
    value.as_uint(&key)
}

/// Encode one principal's local state.
pub fn encode_local(local: &LocalState) -> BTreeMap<Vec<u8>, StateValue> {
    let mut map = BTreeMap::new();
    map.insert(
        APPROVED_KEY.to_vec(),
        StateValue::Uint(u64::from(local.approved)),
    );
    map
}

/// Decode one principal's local state; a missing flag means not approved.
pub fn decode_local(map: &BTreeMap<Vec<u8>, StateValue>) -> LocalState {
    let approved = matches!(map.get(APPROVED_KEY), Some(StateValue::Uint(1)));
    LocalState { approved }
}

impl AnchorLedgerState {
    /// Import a ledger from its keyspace form, with the given settings and
    /// local states.
    pub fn from_keyspace(
        globals: DecodedGlobals,
        locals: BTreeMap<Principal, LocalState>,
        settings: crate::settings::LedgerSettings,
    ) -> Result<Self, LedgerError> {
        let mut state = Self::new(globals.owner, settings);
        state.anchors = globals.anchors;
        state.locals = locals;
        state.validate()?;
        Ok(state)
    }
}
