use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sync_model::{OldSyncData, SdkSync, SyncAdded, SyncModel};

/// One sync callback as recorded from the SDK
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SdkEvent {
    /// Sync added, resumed or updated; `adding_state` 0 is a plain update
    Update {
        sync: SdkSync,
        #[serde(default)]
        adding_state: i32,
    },
    /// Sync deleted on the SDK side
    Removed { tag: i32 },
    /// Sync disabled by an error rather than by the user
    Disabled { tag: i32 },
}

/// Legacy sync entry with the tag the SDK assigned on import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacySync {
    pub tag: i32,
    #[serde(flatten)]
    pub data: OldSyncData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub updates: usize,
    pub removals: usize,
    pub disabled: usize,
}

/// Parses a JSON array of SDK events
pub fn parse_sdk_events(json: &str) -> Result<Vec<SdkEvent>, AppError> {
    Ok(serde_json::from_str(json)?)
}

/// Feeds recorded SDK events through the registry, in order
pub fn apply_sdk_events(model: &SyncModel, events: &[SdkEvent]) -> Result<ReplayStats, AppError> {
    let mut stats = ReplayStats::default();

    for event in events {
        match event {
            SdkEvent::Update { sync, adding_state } => {
                let adding = SyncAdded::from_code(*adding_state)?;
                if adding.is_none() && model.get_sync_setting_by_tag(sync.tag).is_none() {
                    log::warn!("Skipping update for unknown sync {}", sync.tag);
                    continue;
                }
                model.update_sync_settings(Some(sync), adding);
                stats.updates += 1;
            }
            SdkEvent::Removed { tag } => {
                model.remove_synced_folder_by_tag(*tag);
                stats.removals += 1;
            }
            SdkEvent::Disabled { tag } => {
                if model.get_sync_setting_by_tag(*tag).is_none() {
                    log::warn!("Skipping disable for unknown sync {}", tag);
                    continue;
                }
                model.add_unattended_disabled_sync(*tag);
                stats.disabled += 1;
            }
        }
    }

    Ok(stats)
}

/// Replays `path` if it exists
pub fn replay_sdk_events(model: &SyncModel, path: &Path) -> Result<ReplayStats, AppError> {
    if !path.exists() {
        log::debug!("No SDK event log at {}", path.display());
        return Ok(ReplayStats::default());
    }

    let content = std::fs::read_to_string(path)?;
    let events = parse_sdk_events(&content)?;
    log::info!("Replaying {} SDK events from {}", events.len(), path.display());
    apply_sdk_events(model, &events)
}

/// Imports legacy sync descriptions from `path` if it exists
///
/// Returns how many syncs were picked up.
pub fn migrate_legacy_syncs(model: &SyncModel, path: &Path) -> Result<usize, AppError> {
    if !path.exists() {
        return Ok(0);
    }

    let content = std::fs::read_to_string(path)?;
    let legacy: Vec<LegacySync> = serde_json::from_str(&content)?;

    let mut migrated = 0;
    for entry in &legacy {
        if model.get_sync_setting_by_tag(entry.tag).is_some() {
            log::debug!("Legacy sync {} already configured", entry.tag);
            continue;
        }
        if model
            .pick_info_from_old_sync(&entry.data, entry.tag, true)
            .is_some()
        {
            migrated += 1;
        }
    }

    log::info!("Migrated {} legacy syncs", migrated);
    Ok(migrated)
}
