use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sync_model::Platform;

/// Shell integration entry for one synced folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub name: String,
    pub sync_id: String,
    pub added_at: String,
    #[serde(default)]
    pub shortcut: bool,
}

/// Folders currently exposed to the shell, keyed by local path
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncManifest {
    pub folders: BTreeMap<String, ManifestEntry>,
}

impl SyncManifest {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn save(&self, path: &Path) -> Result<(), crate::error::AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Desktop platform adapter
///
/// Keeps a JSON manifest of synced folders that the shell extension reads
/// for overlay icons and navigation shortcuts.
pub struct DesktopPlatform {
    manifest_path: PathBuf,
    manifest: Mutex<SyncManifest>,
}

impl DesktopPlatform {
    pub fn new(manifest_path: PathBuf) -> Self {
        let manifest = SyncManifest::load(&manifest_path);
        Self {
            manifest_path,
            manifest: Mutex::new(manifest),
        }
    }

    #[allow(dead_code)]
    pub fn manifest(&self) -> SyncManifest {
        self.manifest.lock().clone()
    }

    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut SyncManifest),
    {
        let mut guard = self.manifest.lock();
        change(&mut *guard);
        if let Err(e) = guard.save(&self.manifest_path) {
            log::error!("Failed to write sync manifest: {}", e);
        }
    }
}

impl Platform for DesktopPlatform {
    fn sync_folder_added(&self, local_folder: &str, name: &str, sync_id: &str) {
        log::info!("Sync folder added: {} ({})", local_folder, sync_id);
        self.update(|manifest| {
            let shortcut = manifest
                .folders
                .get(local_folder)
                .map(|e| e.shortcut)
                .unwrap_or(false);
            manifest.folders.insert(
                local_folder.to_string(),
                ManifestEntry {
                    name: name.to_string(),
                    sync_id: sync_id.to_string(),
                    added_at: Utc::now().to_rfc3339(),
                    shortcut,
                },
            );
        });
    }

    fn sync_folder_removed(&self, local_folder: &str, _name: &str, sync_id: &str) {
        log::info!("Sync folder removed: {} ({})", local_folder, sync_id);
        self.update(|manifest| {
            manifest.folders.remove(local_folder);
        });
    }

    fn add_sync_shortcut(&self, local_folder: &str, name: &str, sync_id: &str) {
        log::info!("Adding navigation shortcut for {}", local_folder);
        self.update(|manifest| {
            manifest
                .folders
                .entry(local_folder.to_string())
                .or_insert_with(|| ManifestEntry {
                    name: name.to_string(),
                    sync_id: sync_id.to_string(),
                    added_at: Utc::now().to_rfc3339(),
                    shortcut: false,
                })
                .shortcut = true;
        });
    }

    fn send_event(&self, code: i32, message: &str) {
        log::info!("Diagnostic event {}: {}", code, message);
    }
}
