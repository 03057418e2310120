use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;
use crate::state::AnchorLedgerState;
use crate::traits::StateStore;

/// Snapshot file format version written by this crate.
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    format: u32,
    state: &'a AnchorLedgerState,
}

#[derive(Deserialize)]
struct SnapshotIn {
    format: u32,
    state: AnchorLedgerState,
}

/// JSON snapshot store backed by a single file.
///
/// Saves write a sibling temporary file, fsync it, and rename it over the
/// snapshot, so a reader sees either the previous snapshot or the new one.
/// Loaded snapshots are validated before they are returned.
///
/// [`StateStore::update`] holds an exclusive advisory lock on a sibling
/// `<path>.lock` file for the whole load-apply-save step, so processes
/// sharing one snapshot never commit from the same base.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Sibling file that guards read-modify-write cycles.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn open_lock_file(&self) -> Result<File, LedgerError> {
        fs::create_dir_all(self.parent_dir())?;
        let path = self.lock_path();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LedgerError::Store(format!("{}: {e}", path.display())))
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<AnchorLedgerState>, LedgerError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SnapshotIn = serde_json::from_slice(&data)
            .map_err(|e| LedgerError::Serialization(format!("{}: {e}", self.path.display())))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(LedgerError::Serialization(format!(
                "{}: unsupported snapshot format {} (expected {SNAPSHOT_FORMAT})",
                self.path.display(),
                snapshot.format
            )));
        }
        snapshot.state.validate()?;

        debug!(
            path = %self.path.display(),
            version = snapshot.state.version(),
            anchors = snapshot.state.anchor_count(),
            "loaded ledger snapshot"
        );
        Ok(Some(snapshot.state))
    }

    fn save(&self, state: &AnchorLedgerState) -> Result<(), LedgerError> {
        let encoded = serde_json::to_vec_pretty(&SnapshotOut {
            format: SNAPSHOT_FORMAT,
            state,
        })
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| LedgerError::Store(format!("{}: {}", self.path.display(), e.error)))?;

        debug!(
            path = %self.path.display(),
            version = state.version(),
            bytes = encoded.len(),
            "saved ledger snapshot"
        );
        Ok(())
    }

    fn update<R, F>(&self, f: F) -> Result<R, LedgerError>
    where
        Self: Sized,
        F: FnOnce(
            Option<&AnchorLedgerState>,
        ) -> Result<(Option<AnchorLedgerState>, R), LedgerError>,
    {
        let mut lock = fd_lock::RwLock::new(self.open_lock_file()?);
        let _guard = lock
            .write()
            .map_err(|e| LedgerError::Store(format!("{}: {e}", self.lock_path().display())))?;

        let current = self.load()?;
        let (next, output) = f(current.as_ref())?;
        if let Some(next) = &next {
            self.save(next)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LedgerSettings;
    use blueblock_types::{AnchorRecord, MerkleRoot, Principal};

    fn state() -> AnchorLedgerState {
        let mut state =
            AnchorLedgerState::new(Principal::from_bytes([1; 32]), LedgerSettings::default());
        state.anchors.push(AnchorRecord {
            index: 0,
            project_id: "proj1".into(),
            merkle_root: MerkleRoot::from_hash([5; 32]),
            record_count: 3,
            window_start: 100,
            window_end: 200,
            committed_at: 300,
        });
        state
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("ledger.json"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        FileStateStore::new(&path).save(&state()).unwrap();

        let reopened = FileStateStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(state()));
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("ledger.json"));
        let first = AnchorLedgerState::new(Principal::from_bytes([1; 32]), LedgerSettings::default());
        store.save(&first).unwrap();
        store.save(&state()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().anchor_count(), 1);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let body = serde_json::json!({ "format": 99, "state": state() });
        fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();
        assert!(matches!(
            FileStateStore::new(&path).load(),
            Err(LedgerError::Serialization(msg)) if msg.contains("format 99")
        ));
    }

    #[test]
    fn tampered_snapshot_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut bad = state();
        bad.anchors[0].index = 4;
        FileStateStore::new(&path).save(&bad).unwrap();
        assert!(matches!(
            FileStateStore::new(&path).load(),
            Err(LedgerError::IntegrityViolation { index: 4, .. })
        ));
    }

    #[test]
    fn update_saves_only_returned_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("ledger.json"));

        let seen = store
            .update(|current| Ok((Some(state()), current.is_some())))
            .unwrap();
        assert!(!seen);
        assert!(store.lock_path().exists());

        let count = store
            .update(|current| Ok((None, current.map(|s| s.anchor_count()))))
            .unwrap();
        assert_eq!(count, Some(1));

        let err = store
            .update(|_| -> Result<(Option<AnchorLedgerState>, ()), LedgerError> {
                Err(LedgerError::Deleted)
            })
            .unwrap_err();
        assert_eq!(err, LedgerError::Deleted);
        assert_eq!(store.load().unwrap(), Some(state()));
    }

    #[test]
    fn lock_file_sits_beside_snapshot() {
        let store = FileStateStore::new("/var/lib/blueblock/ledger.json");
        assert_eq!(
            store.lock_path(),
            PathBuf::from("/var/lib/blueblock/ledger.json.lock")
        );
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileStateStore::new(&path).load(),
            Err(LedgerError::Serialization(_))
        ));
    }
}
