/// Diagnostic event sent the first time any sync is activated on this install
pub const FIRST_SYNC_EVENT: (i32, &str) = (99501, "MEGAsync first sync");

/// OS-specific side effects of syncs starting and stopping
///
/// Called on the thread that holds the registry lock, after the operation has
/// updated the registry. Implementations may call the registry's accessors.
pub trait Platform: Send + Sync {
    /// A local folder started syncing (shell icons, overlays)
    fn sync_folder_added(&self, local_folder: &str, name: &str, sync_id: &str);

    /// A local folder stopped syncing
    fn sync_folder_removed(&self, local_folder: &str, name: &str, sync_id: &str);

    /// Adds a navigation shortcut for a sync resumed after upgrading from a
    /// client version that did not create them
    fn add_sync_shortcut(&self, local_folder: &str, name: &str, sync_id: &str);

    /// Reports a diagnostic event to the storage backend
    fn send_event(&self, code: i32, message: &str);
}

/// Platform adapter without side effects
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl Platform for NoopPlatform {
    fn sync_folder_added(&self, _local_folder: &str, _name: &str, _sync_id: &str) {}

    fn sync_folder_removed(&self, _local_folder: &str, _name: &str, _sync_id: &str) {}

    fn add_sync_shortcut(&self, _local_folder: &str, _name: &str, _sync_id: &str) {}

    fn send_event(&self, code: i32, message: &str) {
        log::debug!("Dropping diagnostic event {}: {}", code, message);
    }
}
