//! Save slots and the stores that hold them.
//!
//! A `SaveState` wraps the full `GameState` with a format version and a
//! small metadata block that can be read without loading the whole save.
//! `FileSaveStore` writes each slot to `<dir>/<slot>.json` through a
//! temporary file and a rename, so a crash mid-write leaves the previous
//! save intact.

use crate::store::{GameState, StateError};
use crate::world::Archetype;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("No save in slot {0}")]
    NotFound(SaveSlot),

    #[error("Save is corrupt: {0}")]
    Corrupt(#[from] StateError),

    #[error("Invalid save slot {0:?}: use 1 to 64 ASCII letters, digits, '-' or '_'")]
    InvalidSlot(String),
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// Longest accepted slot name.
pub const MAX_SLOT_LEN: usize = 64;

/// A save slot name, usable as a file stem as-is. Names that would need
/// rewriting are rejected so two names never share a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SaveSlot(String);

impl SaveSlot {
    pub fn new(name: &str) -> Result<Self, PersistError> {
        let valid = !name.is_empty()
            && name.len() <= MAX_SLOT_LEN
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(PersistError::InvalidSlot(name.to_string()))
        }
    }

    /// The default slot.
    pub fn autosave() -> Self {
        Self("autosave".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SaveSlot {
    type Error = PersistError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(&name)
    }
}

impl From<SaveSlot> for String {
    fn from(slot: SaveSlot) -> Self {
        slot.0
    }
}

impl FromStr for SaveSlot {
    type Err = PersistError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::new(name)
    }
}

impl fmt::Display for SaveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata about a save, readable without the full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub character_name: String,
    pub archetype: Archetype,
    pub level: u32,
    pub location: String,
    pub turn: u64,
    pub in_combat: bool,
    /// Seconds since the Unix epoch.
    pub saved_at: u64,
}

/// Everything written to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub version: u32,
    pub slot: SaveSlot,
    pub metadata: SaveMetadata,
    pub state: GameState,
}

impl SaveState {
    pub fn capture(slot: &SaveSlot, state: &GameState) -> Self {
        let metadata = SaveMetadata {
            character_name: state.character.name.clone(),
            archetype: state.character.archetype,
            level: state.character.level,
            location: state.world.current_name().to_string(),
            turn: state.turn,
            in_combat: state.in_combat(),
            saved_at: unix_now(),
        };
        Self {
            version: SAVE_VERSION,
            slot: slot.clone(),
            metadata,
            state: state.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse, check the version and validate the state's invariants.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(content)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        saved.state.validate()?;
        Ok(saved)
    }

    fn peek_metadata(content: &str) -> Result<SaveMetadata, PersistError> {
        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(content)?;
        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }
        Ok(partial.metadata)
    }
}

/// A listed save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveInfo {
    pub slot: SaveSlot,
    pub metadata: SaveMetadata,
}

/// Where saves live. Implementations must make `save` atomic: after a
/// failed save the slot still holds its previous contents.
#[async_trait]
pub trait SaveStore: Send + Sync {
    async fn save(&self, slot: &SaveSlot, save: &SaveState) -> Result<(), PersistError>;

    async fn load(&self, slot: &SaveSlot) -> Result<SaveState, PersistError>;

    async fn exists(&self, slot: &SaveSlot) -> bool;

    /// All readable saves, most recent first.
    async fn list(&self) -> Result<Vec<SaveInfo>, PersistError>;

    async fn delete(&self, slot: &SaveSlot) -> Result<(), PersistError>;
}

/// JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slot: &SaveSlot) -> PathBuf {
        self.dir.join(format!("{}.json", slot.as_str()))
    }

    fn temp_path_for(&self, slot: &SaveSlot) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", slot.as_str()))
    }
}

#[async_trait]
impl SaveStore for FileSaveStore {
    async fn save(&self, slot: &SaveSlot, save: &SaveState) -> Result<(), PersistError> {
        let content = save.to_json()?;
        fs::create_dir_all(&self.dir).await?;

        let temp = self.temp_path_for(slot);
        fs::write(&temp, content).await?;
        if let Err(e) = fs::rename(&temp, self.path_for(slot)).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tracing::debug!(slot = %slot, turn = save.state.turn, "saved");
        Ok(())
    }

    async fn load(&self, slot: &SaveSlot) -> Result<SaveState, PersistError> {
        let content = match fs::read_to_string(self.path_for(slot)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::NotFound(slot.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        SaveState::from_json(&content)
    }

    async fn exists(&self, slot: &SaveSlot) -> bool {
        fs::try_exists(self.path_for(slot)).await.unwrap_or(false)
    }

    async fn list(&self) -> Result<Vec<SaveInfo>, PersistError> {
        let mut saves = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(saves),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            // only files this store could have written
            let Some(slot) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| SaveSlot::new(stem).ok())
            else {
                continue;
            };
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match SaveState::peek_metadata(&content) {
                Ok(metadata) => saves.push(SaveInfo {
                    slot,
                    metadata,
                }),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable save"),
            }
        }

        saves.sort_by(|a, b| {
            b.metadata
                .saved_at
                .cmp(&a.metadata.saved_at)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        Ok(saves)
    }

    async fn delete(&self, slot: &SaveSlot) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PersistError::NotFound(slot.clone())),
            Err(e) => Err(e.into()),
        }
    }
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_state;
    use tempfile::TempDir;

    #[test]
    fn test_slot_names() {
        assert_eq!(SaveSlot::new("run-2").unwrap().as_str(), "run-2");
        assert_eq!(SaveSlot::new("a_b").unwrap().as_str(), "a_b");
        for bad in ["", "  ", "a b", "My Save/../x", "caf\u{e9}", "x".repeat(MAX_SLOT_LEN + 1).as_str()] {
            assert!(
                matches!(SaveSlot::new(bad), Err(PersistError::InvalidSlot(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_slot_deserialization_checks_name() {
        let slot: SaveSlot = serde_json::from_str("\"hero\"").unwrap();
        assert_eq!(slot, SaveSlot::new("hero").unwrap());
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"hero\"");
        assert!(serde_json::from_str::<SaveSlot>("\"../hero\"").is_err());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path());
        let slot = SaveSlot::new("hero").unwrap();
        let state = sample_state();

        store.save(&slot, &SaveState::capture(&slot, &state)).await.unwrap();
        let loaded = store.load(&slot).await.unwrap();

        assert_eq!(loaded.state, state);
        assert_eq!(loaded.metadata.character_name, state.character.name);
        assert!(!dir.path().join("hero.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_slot() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path());
        let slot = SaveSlot::new("nobody").unwrap();
        assert!(!store.exists(&slot).await);
        assert!(matches!(store.load(&slot).await, Err(PersistError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path());
        let slot = SaveSlot::new("old").unwrap();
        let mut save = SaveState::capture(&slot, &sample_state());
        save.version = SAVE_VERSION + 1;
        tokio::fs::write(store.path_for(&slot), save.to_json().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            store.load(&slot).await,
            Err(PersistError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_state_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path());
        let slot = SaveSlot::new("broken").unwrap();
        let mut state = sample_state();
        state.character.hit_points.current = -4;
        let save = SaveState::capture(&slot, &state);
        tokio::fs::write(store.path_for(&slot), save.to_json().unwrap())
            .await
            .unwrap();

        assert!(matches!(store.load(&slot).await, Err(PersistError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path());
        let state = sample_state();
        for name in ["alpha", "beta"] {
            let slot = SaveSlot::new(name).unwrap();
            store.save(&slot, &SaveState::capture(&slot, &state)).await.unwrap();
        }
        tokio::fs::write(dir.path().join("notes.txt"), "hi").await.unwrap();
        tokio::fs::write(dir.path().join("junk.json"), "{").await.unwrap();

        let saves = store.list().await.unwrap();
        let slots: Vec<_> = saves.iter().map(|s| s.slot.as_str()).collect();
        assert_eq!(slots.len(), 2);
        assert!(slots.contains(&"alpha") && slots.contains(&"beta"));

        store.delete(&SaveSlot::new("alpha").unwrap()).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.delete(&SaveSlot::new("alpha").unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSaveStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
