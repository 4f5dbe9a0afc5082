//! # Sync Model
//!
//! Registry of configured sync pairs for the desktop client.
//!
//! This crate provides:
//! - The [`SyncSetting`] record for one local folder ↔ remote folder pair
//! - [`SyncModel`], which reconciles SDK-reported sync state with the
//!   configured syncs and drives activation and deactivation side effects
//! - A persistent preferences cache ([`Preferences`], backed by SQLite)
//! - Observer registration for registry notifications ([`SyncEvent`])
//!
//! ## Separation of Concerns
//!
//! This crate does **not** talk to the storage SDK or render anything. The
//! SDK layer feeds [`SdkSync`] snapshots in; UI panels and OS integration
//! receive notifications through [`SyncEvent`] and [`Platform`].
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sync_model::{NoopPlatform, RegistryOptions, SqlitePreferences, SyncAdded, SyncModel};
//!
//! let prefs = Arc::new(SqlitePreferences::open("prefs.db")?);
//! prefs.set_logged(true);
//! let model = Arc::new(SyncModel::new(prefs, Arc::new(NoopPlatform), RegistryOptions::default()));
//!
//! model.subscribe(|event| log::info!("sync event: {:?}", event));
//! model.update_sync_settings(Some(&sdk_sync), Some(SyncAdded::New));
//! ```

pub mod error;
pub mod events;
pub mod models;
pub mod platform;
pub mod preferences;
pub mod registry;
pub mod schema;

pub use error::SyncModelError;
pub use events::{FilesystemWarning, SubscriptionId, SyncEvent, SyncEvents};
pub use models::{OldSyncData, SdkSync, SyncAdded, SyncError, SyncSetting};
pub use platform::{NoopPlatform, Platform, FIRST_SYNC_EVENT};
pub use preferences::{OneTimeAction, Preferences, SqlitePreferences};
pub use registry::{RegistryOptions, SyncModel};
pub use schema::init_sync_schema;
