use crate::error::SyncModelError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// State of a sync as reported by the SDK
///
/// This is a snapshot of the SDK's live sync object. The registry copies it
/// into the matching [`SyncSetting`] on every reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdkSync {
    pub tag: i32,
    pub local_folder: String,
    pub mega_folder: String,
    pub mega_handle: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub active: bool,
    #[serde(default)]
    pub error: SyncError,
}

fn default_true() -> bool {
    true
}

/// Error condition attached to a sync by the SDK
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum SyncError {
    #[default]
    NoSyncError,
    /// Local folder lives on a FAT filesystem (timestamp and large-file issues)
    LocalIsFat,
    /// Local folder is a VMWare shared folder without change notifications
    LocalIsHgfs,
    Other(i32),
}

impl SyncError {
    pub const LOCAL_IS_FAT_CODE: i32 = 23;
    pub const LOCAL_IS_HGFS_CODE: i32 = 24;

    pub fn code(&self) -> i32 {
        match self {
            SyncError::NoSyncError => 0,
            SyncError::LocalIsFat => Self::LOCAL_IS_FAT_CODE,
            SyncError::LocalIsHgfs => Self::LOCAL_IS_HGFS_CODE,
            SyncError::Other(code) => *code,
        }
    }

    pub fn is_error(&self) -> bool {
        *self != SyncError::NoSyncError
    }
}

impl From<i32> for SyncError {
    fn from(code: i32) -> Self {
        match code {
            0 => SyncError::NoSyncError,
            Self::LOCAL_IS_FAT_CODE => SyncError::LocalIsFat,
            Self::LOCAL_IS_HGFS_CODE => SyncError::LocalIsHgfs,
            other => SyncError::Other(other),
        }
    }
}

impl From<SyncError> for i32 {
    fn from(error: SyncError) -> Self {
        error.code()
    }
}

/// Why the SDK is reporting a sync that the caller may not know yet
///
/// A plain state update of an already tracked sync carries no adding state
/// (`Option::None`, code 0 on the SDK side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAdded {
    /// Configured by the user in this session
    New,
    /// Resumed from the SDK's own cache at startup
    FromCache,
    /// Resumed from cache but the SDK could not start it again
    FromCacheFailedToResume,
    /// Resumed from cache after being re-enabled
    FromCacheReenabled,
    /// Re-enabled, but starting it failed
    ReenabledFailed,
}

impl SyncAdded {
    pub fn code(&self) -> i32 {
        match self {
            SyncAdded::New => 1,
            SyncAdded::FromCache => 2,
            SyncAdded::FromCacheFailedToResume => 3,
            SyncAdded::FromCacheReenabled => 4,
            SyncAdded::ReenabledFailed => 5,
        }
    }

    /// Converts an SDK code, mapping 0 to `None`
    pub fn from_code(code: i32) -> Result<Option<Self>, SyncModelError> {
        if code == 0 {
            Ok(None)
        } else {
            Self::try_from(code).map(Some)
        }
    }
}

impl TryFrom<i32> for SyncAdded {
    type Error = SyncModelError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SyncAdded::New),
            2 => Ok(SyncAdded::FromCache),
            3 => Ok(SyncAdded::FromCacheFailedToResume),
            4 => Ok(SyncAdded::FromCacheReenabled),
            5 => Ok(SyncAdded::ReenabledFailed),
            other => Err(SyncModelError::UnknownAddingState(other)),
        }
    }
}

/// Legacy sync description from the pre-SDK sync configuration format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OldSyncData {
    pub local_folder: String,
    #[serde(default)]
    pub mega_folder: String,
    pub mega_handle: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sync_id: Option<String>,
}

/// One configured sync pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSetting {
    pub tag: i32,
    /// Assigned once on first activation, empty until then
    pub sync_id: String,
    pub local_folder: String,
    pub mega_folder: String,
    pub mega_handle: u64,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub error: SyncError,
}

impl SyncSetting {
    /// Fresh record for a sync the preferences cache knows nothing about
    pub fn from_sdk(sync: &SdkSync) -> Self {
        let mut setting = Self {
            tag: sync.tag,
            sync_id: String::new(),
            local_folder: String::new(),
            mega_folder: String::new(),
            mega_handle: 0,
            name: String::new(),
            enabled: false,
            active: false,
            error: SyncError::NoSyncError,
        };
        setting.set_sync(sync);
        setting
    }

    /// Record migrated from a legacy description
    ///
    /// The SDK has not started the sync yet, so the record is inactive until
    /// the first reconciliation. The tag is assigned by the caller.
    pub fn from_old_sync(old: &OldSyncData, loaded_from_previous_session: bool) -> Self {
        log::debug!(
            "Migrating legacy sync {} (previous session: {})",
            old.local_folder,
            loaded_from_previous_session
        );

        let name = if old.name.is_empty() {
            folder_display_name(&old.local_folder)
        } else {
            old.name.clone()
        };

        Self {
            tag: 0,
            sync_id: old.sync_id.clone().unwrap_or_default(),
            local_folder: old.local_folder.clone(),
            mega_folder: old.mega_folder.clone(),
            mega_handle: old.mega_handle,
            name,
            enabled: old.enabled,
            active: false,
            error: SyncError::NoSyncError,
        }
    }

    /// Copies live SDK state into this record
    ///
    /// Client-only fields (sync id, user-chosen name) survive.
    pub fn set_sync(&mut self, sync: &SdkSync) {
        self.tag = sync.tag;
        self.local_folder = sync.local_folder.clone();
        self.mega_folder = sync.mega_folder.clone();
        self.mega_handle = sync.mega_handle;
        self.enabled = sync.enabled;
        self.active = sync.active;
        self.error = sync.error;

        if self.name.is_empty() {
            self.name = if sync.name.is_empty() {
                folder_display_name(&sync.local_folder)
            } else {
                sync.name.clone()
            };
        }
    }

    pub fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }

    pub fn has_sync_id(&self) -> bool {
        !self.sync_id.is_empty()
    }

    /// Assigns a sync id if none is set yet. Returns true if one was assigned.
    pub fn ensure_sync_id(&mut self) -> bool {
        if self.has_sync_id() {
            return false;
        }
        self.sync_id = new_sync_id();
        true
    }
}

/// Generates a sync id in the `{XXXXXXXX-XXXX-...}` upper-case form
pub fn new_sync_id() -> String {
    Uuid::new_v4().braced().to_string().to_uppercase()
}

/// Checks that a stored sync id is empty or a (possibly braced) UUID
pub fn validate_sync_id(sync_id: &str) -> Result<(), SyncModelError> {
    if sync_id.is_empty() {
        return Ok(());
    }
    let inner = sync_id.trim_start_matches('{').trim_end_matches('}');
    Uuid::parse_str(inner)
        .map(|_| ())
        .map_err(|_| SyncModelError::InvalidSyncId(sync_id.to_string()))
}

fn folder_display_name(local_folder: &str) -> String {
    Path::new(local_folder)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| local_folder.to_string())
}
