//! Persistence of the last selected player across client restarts.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::protocol_constants::{ACTIVE_PLAYER_KEY, CLIENT_STATE_FILE};

use super::ClientError;

/// Client-local storage for the selected player.
pub trait SelectionStore: Send {
    /// The remembered selection, if any.
    fn load(&self) -> Option<String>;

    /// Remembers a selection.
    fn save(&mut self, pid: &str) -> Result<(), ClientError>;
}

/// Keeps the selection in a JSON object file under [`ACTIVE_PLAYER_KEY`].
///
/// Other keys in the file are preserved on save.
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    /// Store backed by `client-state.json` inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::at(data_dir.as_ref().join(CLIENT_STATE_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Map<String, Value>, ClientError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SelectionStore for FileSelectionStore {
    fn load(&self) -> Option<String> {
        match self.read_object() {
            Ok(map) => match map.get(ACTIVE_PLAYER_KEY)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            Err(e) => {
                log::warn!(
                    "[Selection] Ignoring unreadable {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn save(&mut self, pid: &str) -> Result<(), ClientError> {
        let mut map = self.read_object().unwrap_or_default();
        map.insert(ACTIVE_PLAYER_KEY.to_string(), Value::String(pid.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&Value::Object(map))?)?;
        log::debug!("[Selection] Saved {} to {}", pid, self.path.display());
        Ok(())
    }
}

/// In-memory store, for tests and clients without a data directory.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    selected: Option<String>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(pid: impl Into<String>) -> Self {
        Self {
            selected: Some(pid.into()),
        }
    }
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self) -> Option<String> {
        self.selected.clone()
    }

    fn save(&mut self, pid: &str) -> Result<(), ClientError> {
        self.selected = Some(pid.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_no_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSelectionStore::in_dir(dir.path());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn selection_survives_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSelectionStore::in_dir(dir.path().join("nested"));
        store.save("-1234").unwrap();

        let reopened = FileSelectionStore::in_dir(dir.path().join("nested"));
        assert_eq!(reopened.load().as_deref(), Some("-1234"));
    }

    #[test]
    fn save_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CLIENT_STATE_FILE);
        fs::write(&path, r#"{"theme": "dark", "activePlayerPid": "1"}"#).unwrap();

        let mut store = FileSelectionStore::at(&path);
        store.save("2").unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value[ACTIVE_PLAYER_KEY], "2");
    }

    #[test]
    fn corrupt_file_is_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CLIENT_STATE_FILE);
        fs::write(&path, "not json").unwrap();
        assert_eq!(FileSelectionStore::at(&path).load(), None);
    }
}
