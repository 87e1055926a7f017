//! Wait-profile persistence.
//!
//! The full optimizer state (estimates, history, convergence) is written
//! as one pretty-JSON snapshot at shutdown and merged over the
//! compiled-in defaults at startup, so the timing model keeps improving
//! across runs. The snapshot layout is an implementation detail, not a
//! compatibility surface.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ConvergenceState, WaitOptimizer, WaitSample};
use crate::error::StoreError;

/// Serializable optimizer state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitProfileSnapshot {
    pub estimates: HashMap<String, f64>,
    #[serde(default)]
    pub history: HashMap<String, VecDeque<WaitSample>>,
    #[serde(default)]
    pub convergence: HashMap<String, ConvergenceState>,
}

/// Read a snapshot from `path`. `Ok(None)` when the file does not exist.
pub fn load(path: &Path) -> Result<Option<WaitProfileSnapshot>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let snapshot = serde_json::from_str(&content)?;
    Ok(Some(snapshot))
}

/// Write a snapshot to `path`, creating parent directories as needed.
pub fn save(path: &Path, snapshot: &WaitProfileSnapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    let content = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, content).map_err(|e| StoreError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

impl WaitOptimizer {
    /// Merge previously saved state over the defaults. A missing file is
    /// normal; a broken one is worth a warning, never a crash.
    pub fn load_saved(&mut self, path: &Path) {
        match load(path) {
            Ok(Some(snapshot)) => self.apply_snapshot(snapshot),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load saved wait times"),
        }
    }

    /// Persist the current state. A no-op while learning is disabled.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        if !self.enabled() {
            return Ok(());
        }
        save(path, &self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waits.json");

        let mut opt = WaitOptimizer::new(true, 4);
        opt.record_outcome("template_click", 0.5, true, 0);
        opt.record_outcome("station_entry_dialog", 3.0, true, 2);
        let snapshot = opt.snapshot();

        save(&path, &snapshot).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn load_then_apply_restores_estimates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waits.json");

        let mut opt = WaitOptimizer::new(true, 4);
        for _ in 0..10 {
            opt.record_outcome("template_click", 0.5, true, 0);
        }
        let learned = opt.estimate("template_click").unwrap();
        opt.persist(&path).unwrap();

        let mut fresh = WaitOptimizer::new(true, 4);
        fresh.load_saved(&path);
        assert!((fresh.estimate("template_click").unwrap() - learned).abs() < 1e-12);
        assert_eq!(fresh.is_stable("template_click"), opt.is_stable("template_click"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("nope.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn corrupt_file_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waits.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn unknown_keys_are_accepted() {
        let mut snapshot = WaitProfileSnapshot::default();
        snapshot.estimates.insert("some_future_op".to_string(), 2.5);

        let mut opt = WaitOptimizer::new(true, 4);
        opt.apply_snapshot(snapshot);
        assert!((opt.estimate("some_future_op").unwrap() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_optimizer_skips_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waits.json");
        let opt = WaitOptimizer::new(false, 4);
        opt.persist(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/waits.json");
        save(&path, &WaitProfileSnapshot::default()).unwrap();
        assert!(path.exists());
    }
}
