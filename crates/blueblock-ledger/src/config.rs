use std::fs;
use std::path::{Path, PathBuf};

use blueblock_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::settings::LedgerSettings;

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "blueblock-ledger.json";

/// Host configuration, read from TOML.
///
/// ```toml
/// ledger_path = "/var/lib/blueblock/ledger.json"
/// hash_algorithm = "sha256"
///
/// [settings]
/// enforce_window_order = true
/// max_project_id_len = 64
///
/// [settings.schema]
/// num_uints = 32
/// num_byte_slices = 32
/// ```
///
/// Every field is optional. `settings` applies only when a ledger is
/// created; afterwards the settings stored inside the ledger win.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub ledger_path: PathBuf,
    /// Hash used when building and verifying batch roots.
    pub hash_algorithm: HashAlgorithm,
    pub settings: LedgerSettings,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            hash_algorithm: HashAlgorithm::default(),
            settings: LedgerSettings::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, LedgerError> {
        let config: Self = toml::from_str(input).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.settings.validate().map_err(|e| LedgerError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))
    }
}
