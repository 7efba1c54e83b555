//! Penalty table persistence backends.
//!
//! The durable backend is a JSON file in the user cache directory
//! (`~/.cache/mirrorfetch/penalties.json`), written atomically via a temp
//! file and rename so a crash mid-write never leaves a truncated table.
//!
//! ```json
//! {
//!   "https://catboy.best": { "api": 2, "media": 0 },
//!   "https://us.catboy.best": { "api": 0, "media": 4 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Penalties of one endpoint, per request class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPenalties {
    #[serde(default)]
    pub api: u32,
    #[serde(default)]
    pub media: u32,
}

impl ClassPenalties {
    pub fn get(&self, class: RequestClass) -> u32 {
        match class {
            RequestClass::Api => self.api,
            RequestClass::Media => self.media,
        }
    }

    pub fn set(&mut self, class: RequestClass, value: u32) {
        match class {
            RequestClass::Api => self.api = value,
            RequestClass::Media => self.media = value,
        }
    }
}

/// Endpoint URL → per-class penalties. Absent endpoints have penalty 0.
pub type PenaltyTable = BTreeMap<String, ClassPenalties>;

/// Storage for the penalty table.
///
/// Implementations load and save the whole table; the
/// [`PenaltyStore`](super::PenaltyStore) does the read-modify-write.
pub trait PenaltyBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Load the table. A table that was never saved loads as empty.
    fn load(&self) -> Result<PenaltyTable>;

    /// Replace the stored table.
    fn save(&self, table: &PenaltyTable) -> Result<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local backend. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryPenaltyBackend {
    table: Mutex<PenaltyTable>,
}

impl MemoryPenaltyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing table.
    pub fn with_table(table: PenaltyTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }
}

impl PenaltyBackend for MemoryPenaltyBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<PenaltyTable> {
        self.table
            .lock()
            .map(|t| t.clone())
            .map_err(|_| MirrorFetchError::Persistence("memory table poisoned".into()))
    }

    fn save(&self, table: &PenaltyTable) -> Result<()> {
        let mut guard = self
            .table
            .lock()
            .map_err(|_| MirrorFetchError::Persistence("memory table poisoned".into()))?;
        *guard = table.clone();
        Ok(())
    }
}

// ============================================================================
// JSON file backend
// ============================================================================

/// Durable backend storing the table as JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePenaltyBackend {
    path: PathBuf,
}

impl JsonFilePenaltyBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backend at the default location, `~/.cache/mirrorfetch/penalties.json`.
    pub fn default_location() -> Self {
        Self::new(default_penalty_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PenaltyBackend for JsonFilePenaltyBackend {
    fn name(&self) -> &str {
        "json-file"
    }

    fn load(&self) -> Result<PenaltyTable> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PenaltyTable::new()),
            Err(e) => {
                return Err(MirrorFetchError::Persistence(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            MirrorFetchError::Persistence(format!("corrupt {}: {e}", self.path.display()))
        })
    }

    fn save(&self, table: &PenaltyTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MirrorFetchError::Persistence(format!(
                    "failed to create dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(table)
            .map_err(|e| MirrorFetchError::Persistence(format!("failed to serialize: {e}")))?;
        std::fs::write(&tmp_path, &json).map_err(|e| {
            MirrorFetchError::Persistence(format!(
                "failed to write {}: {e}",
                tmp_path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            MirrorFetchError::Persistence(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;

        Ok(())
    }
}

/// Default table path: `~/.cache/mirrorfetch/penalties.json`.
pub fn default_penalty_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("mirrorfetch")
        .join("penalties.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> PenaltyTable {
        let mut table = PenaltyTable::new();
        table.insert(
            "https://a.example".into(),
            ClassPenalties { api: 2, media: 0 },
        );
        table.insert(
            "https://b.example".into(),
            ClassPenalties { api: 0, media: 7 },
        );
        table
    }

    #[test]
    fn file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFilePenaltyBackend::new(dir.path().join("penalties.json"));

        backend.save(&sample_table()).unwrap();
        assert_eq!(backend.load().unwrap(), sample_table());
    }

    #[test]
    fn file_missing_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFilePenaltyBackend::new(dir.path().join("absent.json"));
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn file_corrupt_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("penalties.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFilePenaltyBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, MirrorFetchError::Persistence(_)));
    }

    #[test]
    fn file_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("penalties.json");

        JsonFilePenaltyBackend::new(&path)
            .save(&sample_table())
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_partial_entries_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("penalties.json");
        std::fs::write(&path, r#"{"https://a.example": {"media": 3}}"#).unwrap();

        let table = JsonFilePenaltyBackend::new(&path).load().unwrap();
        let entry = table["https://a.example"];
        assert_eq!(entry.api, 0);
        assert_eq!(entry.media, 3);
    }

    #[test]
    fn memory_backend_keeps_last_save() {
        let backend = MemoryPenaltyBackend::new();
        assert!(backend.load().unwrap().is_empty());
        backend.save(&sample_table()).unwrap();
        assert_eq!(backend.load().unwrap().len(), 2);
    }

    #[test]
    fn default_path_ends_with_file_name() {
        assert!(default_penalty_path().ends_with("mirrorfetch/penalties.json"));
    }
}
