use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Stored form of the minimum-balance floor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredFloor {
    min_balance: f64,
    updated: DateTime<Utc>,
}

/// File-backed store for the minimum-balance floor
///
/// Written at shutdown and read back on the next start so the floor never
/// drops between runs. A missing, empty or unreadable file means "no floor".
#[derive(Debug, Clone)]
pub struct FloorStore {
    path: PathBuf,
}

impl FloorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted floor, if there is a usable one
    pub fn load(&self) -> Result<Option<f64>, PersistenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No persisted floor at {}", self.path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(parse_floor(&contents, &self.path))
    }

    pub fn save(&self, min_balance: f64) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let stored = StoredFloor {
            min_balance,
            updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        std::fs::write(&self.path, json).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(
            "Saved min balance {:.8} to {}",
            min_balance,
            self.path.display()
        );
        Ok(())
    }
}

fn parse_floor(contents: &str, path: &Path) -> Option<f64> {
    if contents.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<StoredFloor>(contents) {
        Ok(stored) if stored.min_balance.is_finite() && stored.min_balance >= 0.0 => {
            Some(stored.min_balance)
        }
        Ok(stored) => {
            tracing::warn!(
                "Ignoring invalid persisted floor {} in {}",
                stored.min_balance,
                path.display()
            );
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable floor file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FloorStore::new(dir.path().join("min_balance.json"));

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FloorStore::new(dir.path().join("nested/state/min_balance.json"));

        store.save(0.75).unwrap();
        assert_eq!(store.load().unwrap(), Some(0.75));

        store.save(0.9).unwrap();
        assert_eq!(store.load().unwrap(), Some(0.9));
    }

    #[test]
    fn test_empty_or_garbage_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("min_balance.json");
        let store = FloorStore::new(&path);

        std::fs::write(&path, "   \n").unwrap();
        assert_eq!(store.load().unwrap(), None);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(store.load().unwrap(), None);

        std::fs::write(&path, r#"{"min_balance": -1.0, "updated": "2024-01-01T00:00:00Z"}"#)
            .unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
