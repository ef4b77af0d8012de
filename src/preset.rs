//! Named, persisted bot settings.
//!
//! Presets live in a single JSON array file. Every mutation reads the whole
//! file, applies the change and writes it back through a temporary file and
//! rename, so a crash never leaves a half-written list. Mutations hold an
//! exclusive lock on a `.lock` sibling for the whole read-modify-write, so
//! concurrent writers in other threads or processes do not lose updates.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bot::settings::BotSettings;
use crate::error::PresetError;

/// A named set of bot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPreset {
    /// Random UUID v4, assigned on creation.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last time the preset was used to send a request.
    pub last_used_at: DateTime<Utc>,
    /// Settings applied when the preset is selected.
    pub settings: BotSettings,
}

/// Partial update for [`PresetStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetPatch {
    /// New name.
    pub name: Option<String>,
    /// Replacement settings.
    pub settings: Option<BotSettings>,
}

impl PresetPatch {
    /// Patch renaming a preset.
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            settings: None,
        }
    }
}

/// Storage for bot presets.
pub trait PresetStore {
    /// Returns all presets in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError`] if the backing store cannot be read.
    fn read(&self) -> Result<Vec<BotPreset>, PresetError>;

    /// Creates and persists a preset.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError`] if the backing store cannot be written.
    fn create(&self, name: &str, settings: BotSettings) -> Result<BotPreset, PresetError>;

    /// Applies `patch` to the preset with `id` and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError::NotFound`] for an unknown id.
    fn update(&self, id: &str, patch: PresetPatch) -> Result<BotPreset, PresetError>;

    /// Removes the preset with `id`, returning the remaining presets.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError::NotFound`] for an unknown id.
    fn remove(&self, id: &str) -> Result<Vec<BotPreset>, PresetError>;

    /// Records that the preset with `id` was just used.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError::NotFound`] for an unknown id.
    fn mark_used(&self, id: &str) -> Result<BotPreset, PresetError>;

    /// Looks up a single preset.
    ///
    /// # Errors
    ///
    /// Returns [`PresetError::NotFound`] for an unknown id.
    fn get(&self, id: &str) -> Result<BotPreset, PresetError> {
        self.read()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found(id))
    }
}

/// [`PresetStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonPresetStore {
    path: PathBuf,
}

impl JsonPresetStore {
    /// Creates a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, presets: &[BotPreset]) -> Result<(), PresetError> {
        let json = serde_json::to_vec_pretty(presets)?;
        atomic_write(&self.path, &json)?;
        debug!(path = %self.path.display(), count = presets.len(), "saved presets");
        Ok(())
    }

    fn lock(&self) -> io::Result<FileLock> {
        FileLock::acquire(&self.path.with_extension("lock"))
    }

    /// Loads, mutates the preset with `id` in place and saves.
    fn modify(
        &self,
        id: &str,
        apply: impl FnOnce(&mut BotPreset),
    ) -> Result<BotPreset, PresetError> {
        let _lock = self.lock()?;
        let mut presets = self.read()?;
        let preset = presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found(id))?;
        apply(preset);
        let updated = preset.clone();
        self.save(&presets)?;
        Ok(updated)
    }
}

impl PresetStore for JsonPresetStore {
    fn read(&self) -> Result<Vec<BotPreset>, PresetError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn create(&self, name: &str, settings: BotSettings) -> Result<BotPreset, PresetError> {
        let _lock = self.lock()?;
        let mut presets = self.read()?;
        let now = Utc::now();
        let preset = BotPreset {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            last_used_at: now,
            settings,
        };
        presets.push(preset.clone());
        self.save(&presets)?;
        Ok(preset)
    }

    fn update(&self, id: &str, patch: PresetPatch) -> Result<BotPreset, PresetError> {
        self.modify(id, |preset| {
            if let Some(name) = patch.name {
                preset.name = name;
            }
            if let Some(settings) = patch.settings {
                preset.settings = settings;
            }
            preset.updated_at = Utc::now();
        })
    }

    fn remove(&self, id: &str) -> Result<Vec<BotPreset>, PresetError> {
        let _lock = self.lock()?;
        let mut presets = self.read()?;
        let index = presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found(id))?;
        presets.remove(index);
        self.save(&presets)?;
        Ok(presets)
    }

    fn mark_used(&self, id: &str) -> Result<BotPreset, PresetError> {
        self.modify(id, |preset| preset.last_used_at = Utc::now())
    }
}

fn not_found(id: &str) -> PresetError {
    PresetError::NotFound { id: id.to_string() }
}

/// Exclusive advisory lock, released on drop.
struct FileLock {
    file: fs::File,
}

impl FileLock {
    fn acquire(lock_path: &Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Writes `contents` to a `.tmp` sibling, syncs it and renames it over `path`.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }
    file.sync_all()?;

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::bot::settings::{BotKind, CompletionBotSettings, TokenCap};
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonPresetStore) {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let store = JsonPresetStore::new(dir.path().join("nested").join("presets.json"));
        (dir, store)
    }

    fn completion(prompt: &str) -> BotSettings {
        BotSettings::Completion(CompletionBotSettings::new(prompt))
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let (_dir, store) = store();
        let presets = store.read().unwrap_or_else(|e| panic!("read: {e}"));
        assert!(presets.is_empty());
    }

    #[test]
    fn test_create_persists_preset() {
        let (_dir, store) = store();
        let created = store
            .create("Haiku", completion("Haiku about {{ input }}"))
            .unwrap_or_else(|e| panic!("create: {e}"));

        assert!(Uuid::parse_str(&created.id).is_ok());
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(created.settings.kind(), BotKind::Completion);

        let presets = store.read().unwrap_or_else(|e| panic!("read: {e}"));
        assert_eq!(presets, vec![created]);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_update_applies_patch() {
        let (_dir, store) = store();
        let created = store
            .create("Old", completion("{{input}}"))
            .unwrap_or_else(|e| panic!("create: {e}"));

        let mut settings = CompletionBotSettings::new("Translate: {{input}}");
        settings.max_tokens = Some(TokenCap::Unlimited);
        let updated = store
            .update(
                &created.id,
                PresetPatch {
                    name: Some("New".to_string()),
                    settings: Some(BotSettings::Completion(settings.clone())),
                },
            )
            .unwrap_or_else(|e| panic!("update: {e}"));

        assert_eq!(updated.name, "New");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.settings, BotSettings::Completion(settings));
        assert_eq!(
            store.get(&created.id).unwrap_or_else(|e| panic!("get: {e}")),
            updated
        );
    }

    #[test]
    fn test_remove_returns_remaining() {
        let (_dir, store) = store();
        let first = store
            .create("first", completion("a"))
            .unwrap_or_else(|e| panic!("create: {e}"));
        let second = store
            .create("second", completion("b"))
            .unwrap_or_else(|e| panic!("create: {e}"));

        let remaining = store
            .remove(&first.id)
            .unwrap_or_else(|e| panic!("remove: {e}"));
        assert_eq!(remaining, vec![second]);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.update("missing", PresetPatch::rename("x")),
            Err(PresetError::NotFound { ref id }) if id == "missing"
        ));
        assert!(matches!(
            store.remove("missing"),
            Err(PresetError::NotFound { .. })
        ));
        assert!(matches!(
            store.mark_used("missing"),
            Err(PresetError::NotFound { .. })
        ));
        assert_eq!(
            store.get("missing").map_err(|e| e.to_string()).err(),
            Some("preset with id missing not found".to_string())
        );
    }

    #[test]
    fn test_mark_used_touches_only_last_used() {
        let (_dir, store) = store();
        let created = store
            .create("p", completion("a"))
            .unwrap_or_else(|e| panic!("create: {e}"));
        let used = store
            .mark_used(&created.id)
            .unwrap_or_else(|e| panic!("mark_used: {e}"));
        assert_eq!(used.updated_at, created.updated_at);
        assert!(used.last_used_at >= created.last_used_at);
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let (_dir, store) = store();
        atomic_write(store.path(), b"{not json").unwrap_or_else(|e| panic!("write: {e}"));
        assert!(matches!(store.read(), Err(PresetError::Json(_))));
    }

    #[test]
    fn test_concurrent_creates_are_all_kept() {
        let (_dir, store) = store();
        let handles: Vec<_> = (0..2)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .create(&format!("w{worker}-{i}"), completion("{{input}}"))
                            .unwrap_or_else(|e| panic!("create: {e}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap_or_else(|_| panic!("worker panicked"));
        }

        let presets = store.read().unwrap_or_else(|e| panic!("read: {e}"));
        assert_eq!(presets.len(), 20);
        for worker in 0..2 {
            for i in 0..10 {
                let name = format!("w{worker}-{i}");
                assert!(presets.iter().any(|p| p.name == name), "missing {name}");
            }
        }
    }
}
