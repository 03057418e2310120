use std::fmt;

use serde::{Deserialize, Serialize};

use crate::root::MerkleRoot;

/// Project identifier carried in anchor metadata.
///
/// Arbitrary bytes; nearly always UTF-8 in practice, which is how it is
/// displayed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(Vec<u8>);

impl ProjectId {
    /// Wrap raw id bytes as given; no UTF-8 or length check.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The exact stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes, as checked against `max_project_id_len`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the id has no bytes. Empty ids are rejected on submission.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The id as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A committed anchor: one Merkle root bound to its provenance metadata.
///
/// Created exactly once, when the ledger commits it, and never modified
/// afterwards. `index` is the record's position in commit order and
/// `committed_at` is the ledger's clock at commit time, in unix seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub index: u64,
    pub project_id: ProjectId,
    pub merkle_root: MerkleRoot,
    pub record_count: u64,
    pub window_start: u64,
    pub window_end: u64,
    pub committed_at: u64,
}

impl AnchorRecord {
    /// Length of the covered time window in seconds (zero if reversed).
    pub fn window_len(&self) -> u64 {
        self.window_end.saturating_sub(self.window_start)
    }

    /// Returns `true` if `timestamp` falls inside the inclusive window.
    pub fn covers(&self, timestamp: u64) -> bool {
        self.window_start <= timestamp && timestamp <= self.window_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AnchorRecord {
        AnchorRecord {
            index: 0,
            project_id: "proj1".into(),
            merkle_root: MerkleRoot::from_hash([7; 32]),
            record_count: 3,
            window_start: 100,
            window_end: 200,
            committed_at: 250,
        }
    }

    #[test]
    fn project_id_displays_utf8() {
        let id = ProjectId::from("mangrove-01");
        assert_eq!(id.to_string(), "mangrove-01");
        assert_eq!(id.as_str(), Some("mangrove-01"));
    }

    #[test]
    fn project_id_non_utf8_is_lossy() {
        let id = ProjectId::new(vec![0xff, b'a']);
        assert!(id.as_str().is_none());
        assert_eq!(id.to_string(), "\u{fffd}a");
        assert_eq!(id.as_bytes(), &[0xff, b'a']);
        assert_eq!(id.len(), 2);
        assert!(!id.is_empty());
        assert!(ProjectId::new(Vec::new()).is_empty());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let r = record();
        assert!(r.covers(100));
        assert!(r.covers(200));
        assert!(!r.covers(201));
        assert_eq!(r.window_len(), 100);
    }

    #[test]
    fn reversed_window_has_zero_len() {
        let mut r = record();
        r.window_start = 300;
        assert_eq!(r.window_len(), 0);
    }

    #[test]
    fn serde_roundtrip() {
        let r = record();
        let json = serde_json::to_string(&r).unwrap();
        let parsed: AnchorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }
}
