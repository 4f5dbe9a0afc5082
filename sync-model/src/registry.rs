use crate::error::Result;
use crate::events::{FilesystemWarning, SubscriptionId, SyncEvent, SyncEvents};
use crate::models::{OldSyncData, SdkSync, SyncAdded, SyncError, SyncSetting};
use crate::platform::{Platform, FIRST_SYNC_EVENT};
use crate::preferences::{OneTimeAction, Preferences};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Last client version that did not create navigation shortcuts for syncs
const LEGACY_SHORTCUT_MAX_VERSION: u32 = 3001;

/// Startup facts the registry needs beyond its collaborators
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryOptions {
    /// Client version that ran before this one, if this start is an upgrade
    pub previous_version: Option<u32>,
}

/// Side effects queued while the state is borrowed, run once it is released
#[derive(Debug)]
enum Effect {
    Notify(SyncEvent),
    FolderAdded(FolderRef),
    FolderRemoved(FolderRef),
    Shortcut(FolderRef),
    FirstSync,
}

#[derive(Debug)]
struct FolderRef {
    local_folder: String,
    name: String,
    sync_id: String,
}

impl From<&SyncSetting> for FolderRef {
    fn from(setting: &SyncSetting) -> Self {
        Self {
            local_folder: setting.local_folder.clone(),
            name: setting.name.clone(),
            sync_id: setting.sync_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Tags in configuration order
    configured_syncs: Vec<i32>,
    configured_syncs_map: HashMap<i32, Arc<SyncSetting>>,
    unattended_disabled_syncs: HashSet<i32>,
    first_sync_done: bool,
}

/// Registry of configured sync pairs
///
/// One instance per process, shared as `Arc<SyncModel>`. Every public method
/// holds the registry lock for its whole duration. The lock is reentrant, and
/// platform calls and notifications run after the state borrow is released,
/// so collaborators may call back into the registry from the same thread.
pub struct SyncModel {
    state: ReentrantMutex<RefCell<RegistryState>>,
    preferences: Arc<dyn Preferences>,
    platform: Arc<dyn Platform>,
    events: SyncEvents,
    options: RegistryOptions,
}

impl SyncModel {
    pub fn new(
        preferences: Arc<dyn Preferences>,
        platform: Arc<dyn Platform>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            preferences,
            platform,
            events: SyncEvents::new(),
            options,
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SyncEvent>) {
        self.events.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Reconciles SDK-reported state with the configured syncs
    ///
    /// `adding_state` is `None` for a plain update of a tracked sync. Returns
    /// the resulting record, or `None` when no sync was given.
    pub fn update_sync_settings(
        &self,
        sync: Option<&SdkSync>,
        adding_state: Option<SyncAdded>,
    ) -> Option<Arc<SyncSetting>> {
        let sync = sync?;

        let guard = self.state.lock();
        let mut pending = Vec::new();

        let setting = {
            let mut state = guard.borrow_mut();
            let tag = sync.tag;
            let mut was_active = false;
            let mut was_inactive = false;

            let mut cs = match state.configured_syncs_map.get(&tag) {
                Some(existing) => {
                    was_active = existing.active;
                    was_inactive = !existing.active;

                    let mut cs = SyncSetting::clone(existing);
                    cs.set_sync(sync);
                    cs
                }
                None => {
                    debug_assert!(
                        adding_state.is_some(),
                        "no adding state for untracked sync {}",
                        tag
                    );
                    if adding_state.is_none() {
                        log::error!("Untracked sync {} reported without adding state", tag);
                    }

                    // The cache keeps client-only fields the SDK does not
                    let cs = match self.cached_setting(tag) {
                        Some(mut cached) => {
                            log::debug!("Recovered sync {} from preferences cache", tag);
                            cached.set_sync(sync);
                            cached
                        }
                        None => SyncSetting::from_sdk(sync),
                    };

                    state.configured_syncs.push(tag);
                    cs
                }
            };

            if let Some(adding) = adding_state {
                was_active = (adding == SyncAdded::FromCache && cs.active)
                    || adding == SyncAdded::FromCacheFailedToResume;
                was_inactive = (adding == SyncAdded::FromCache && !cs.active)
                    || matches!(
                        adding,
                        SyncAdded::New | SyncAdded::FromCacheReenabled | SyncAdded::ReenabledFailed
                    );
            }

            if cs.active && was_inactive {
                self.activate(&mut state, &mut cs, &mut pending);
                if state.unattended_disabled_syncs.contains(&tag) {
                    log::info!("Sync {} re-enabled, no longer listed as disabled", tag);
                    self.remove_unattended_locked(&mut state, tag, &mut pending);
                }
            } else if !cs.active && was_active {
                self.deactivate(&cs, &mut pending);
            }

            self.persist("write sync setting", self.preferences.write_sync_setting(&cs));

            if self.needs_legacy_shortcut(adding_state, &cs) {
                log::info!("Adding shortcut for resumed sync {}", cs.local_folder);
                pending.push(Effect::Shortcut(FolderRef::from(&cs)));
            }

            let cs = Arc::new(cs);
            state.configured_syncs_map.insert(tag, cs.clone());
            cs
        };

        pending.push(Effect::Notify(SyncEvent::StateChanged(setting.clone())));
        self.run_effects(pending);
        Some(setting)
    }

    /// Removes the sync at `index` in configuration order
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn remove_synced_folder(&self, index: usize) {
        let guard = self.state.lock();
        let mut pending = Vec::new();

        let removed = {
            let mut state = guard.borrow_mut();
            assert!(
                index < state.configured_syncs.len(),
                "sync index {} out of range ({} configured)",
                index,
                state.configured_syncs.len()
            );

            let tag = state.configured_syncs[index];
            let cs = state.configured_syncs_map[&tag].clone();
            if cs.active {
                self.deactivate(&cs, &mut pending);
            }

            self.warn_if_logged_out("remove sync");
            self.persist("remove sync setting", self.preferences.remove_sync_setting(&cs));
            state.configured_syncs_map.remove(&tag);
            state.configured_syncs.remove(index);

            self.remove_unattended_locked(&mut state, tag, &mut pending);
            cs
        };

        log::info!("Removed sync {} ({})", removed.tag, removed.local_folder);
        pending.push(Effect::Notify(SyncEvent::Removed(removed)));
        self.run_effects(pending);
    }

    /// Removes the sync with `tag`; does nothing if it is not tracked
    pub fn remove_synced_folder_by_tag(&self, tag: i32) {
        let guard = self.state.lock();
        let mut pending = Vec::new();

        let removed = {
            let mut state = guard.borrow_mut();
            let Some(cs) = state.configured_syncs_map.get(&tag).cloned() else {
                return;
            };

            if cs.active {
                self.deactivate(&cs, &mut pending);
            }

            self.warn_if_logged_out("remove sync");
            self.persist("remove sync setting", self.preferences.remove_sync_setting(&cs));
            state.configured_syncs_map.remove(&tag);
            state.configured_syncs.retain(|t| *t != tag);

            self.remove_unattended_locked(&mut state, tag, &mut pending);
            cs
        };

        log::info!("Removed sync {} ({})", removed.tag, removed.local_folder);
        pending.push(Effect::Notify(SyncEvent::Removed(removed)));
        self.run_effects(pending);
    }

    /// Removes every sync at once, without per-sync removal events
    pub fn remove_all_folders(&self) {
        let guard = self.state.lock();
        let mut pending = Vec::new();

        {
            let mut state = guard.borrow_mut();
            self.warn_if_logged_out("remove all syncs");
            self.persist(
                "remove all sync settings",
                self.preferences.remove_all_sync_settings(),
            );

            for cs in state.configured_syncs_map.values() {
                if cs.active {
                    self.deactivate(cs, &mut pending);
                }
            }

            log::info!("Removed all {} syncs", state.configured_syncs.len());
            state.configured_syncs.clear();
            state.configured_syncs_map.clear();
            state.unattended_disabled_syncs.clear();
            self.save_unattended_disabled_syncs(&state);
            pending.push(Effect::Notify(SyncEvent::DisabledListUpdated));
        }

        self.run_effects(pending);
    }

    /// Registers a sync described in the legacy format under the SDK's `tag`
    pub fn pick_info_from_old_sync(
        &self,
        old: &OldSyncData,
        tag: i32,
        loaded_from_previous_session: bool,
    ) -> Option<Arc<SyncSetting>> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        if !loaded_from_previous_session {
            self.warn_if_logged_out("migrate legacy sync");
        }

        debug_assert!(
            !state.configured_syncs_map.contains_key(&tag),
            "picking already configured sync {}",
            tag
        );
        if state.configured_syncs_map.contains_key(&tag) {
            log::error!("Legacy sync {} is already configured, ignoring", tag);
            return None;
        }

        let mut cs = SyncSetting::from_old_sync(old, loaded_from_previous_session);
        cs.set_tag(tag);

        state.configured_syncs.push(tag);
        self.persist("write sync setting", self.preferences.write_sync_setting(&cs));

        let cs = Arc::new(cs);
        state.configured_syncs_map.insert(tag, cs.clone());
        Some(cs)
    }

    /// Replaces the cached records with the configured ones, in order
    pub fn rewrite_sync_settings(&self) {
        let guard = self.state.lock();
        let state = guard.borrow();

        self.persist(
            "remove all sync settings",
            self.preferences.remove_all_sync_settings(),
        );
        for tag in &state.configured_syncs {
            let cs = &state.configured_syncs_map[tag];
            self.persist("write sync setting", self.preferences.write_sync_setting(cs));
        }
    }

    /// Forgets all in-memory state, leaving the preferences cache alone
    pub fn reset(&self) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.configured_syncs.clear();
        state.configured_syncs_map.clear();
        state.unattended_disabled_syncs.clear();
        state.first_sync_done = false;
    }

    pub fn get_num_synced_folders(&self) -> usize {
        let guard = self.state.lock();
        let count = guard.borrow().configured_syncs.len();
        count
    }

    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn get_sync_setting(&self, index: usize) -> Arc<SyncSetting> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let tag = state.configured_syncs[index];
        let setting = state.configured_syncs_map[&tag].clone();
        setting
    }

    pub fn get_sync_setting_by_tag(&self, tag: i32) -> Option<Arc<SyncSetting>> {
        let guard = self.state.lock();
        let setting = guard.borrow().configured_syncs_map.get(&tag).cloned();
        setting
    }

    /// All records in configuration order
    pub fn sync_settings(&self) -> Vec<Arc<SyncSetting>> {
        self.collect(|cs| cs.clone())
    }

    pub fn get_sync_names(&self) -> Vec<String> {
        self.collect(|cs| cs.name.clone())
    }

    /// Tags as decimal strings
    pub fn get_sync_ids(&self) -> Vec<String> {
        self.collect(|cs| cs.tag.to_string())
    }

    pub fn get_mega_folders(&self) -> Vec<String> {
        self.collect(|cs| cs.mega_folder.clone())
    }

    pub fn get_local_folders(&self) -> Vec<String> {
        self.collect(|cs| cs.local_folder.clone())
    }

    pub fn get_mega_folder_handles(&self) -> Vec<u64> {
        self.collect(|cs| cs.mega_handle)
    }

    pub fn has_unattended_disabled_syncs(&self) -> bool {
        let guard = self.state.lock();
        let has = !guard.borrow().unattended_disabled_syncs.is_empty();
        has
    }

    pub fn unattended_disabled_syncs(&self) -> HashSet<i32> {
        let guard = self.state.lock();
        let tags = guard.borrow().unattended_disabled_syncs.clone();
        tags
    }

    pub fn add_unattended_disabled_sync(&self, tag: i32) {
        self.mutate_unattended(|tags| {
            tags.insert(tag);
        });
    }

    pub fn remove_unattended_disabled_sync(&self, tag: i32) {
        self.mutate_unattended(|tags| {
            tags.remove(&tag);
        });
    }

    pub fn set_unattended_disabled_syncs(&self, tags: HashSet<i32>) {
        self.mutate_unattended(move |current| *current = tags);
    }

    /// The user acknowledged the disabled syncs without re-enabling them
    pub fn dismiss_unattended_disabled_syncs(&self) {
        self.mutate_unattended(|tags| tags.clear());
    }

    fn mutate_unattended<F>(&self, mutate: F)
    where
        F: FnOnce(&mut HashSet<i32>),
    {
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            mutate(&mut state.unattended_disabled_syncs);
            self.save_unattended_disabled_syncs(&state);
        }
        self.events.emit(&SyncEvent::DisabledListUpdated);
    }

    fn remove_unattended_locked(
        &self,
        state: &mut RegistryState,
        tag: i32,
        pending: &mut Vec<Effect>,
    ) {
        state.unattended_disabled_syncs.remove(&tag);
        self.save_unattended_disabled_syncs(state);
        pending.push(Effect::Notify(SyncEvent::DisabledListUpdated));
    }

    fn save_unattended_disabled_syncs(&self, state: &RegistryState) {
        if self.preferences.logged() {
            self.persist(
                "save disabled sync tags",
                self.preferences
                    .set_disabled_sync_tags(&state.unattended_disabled_syncs),
            );
        }
    }

    /// Must only run inside a locked operation
    fn activate(
        &self,
        state: &mut RegistryState,
        setting: &mut SyncSetting,
        pending: &mut Vec<Effect>,
    ) {
        #[cfg(debug_assertions)]
        warn_if_not_canonical(&setting.local_folder);

        if setting.ensure_sync_id() {
            log::info!(
                "Assigned sync id {} to {}",
                setting.sync_id,
                setting.local_folder
            );
        }

        if !state.first_sync_done
            && !self.read_flag("first sync done", self.preferences.is_first_sync_done())
        {
            pending.push(Effect::FirstSync);
        }
        state.first_sync_done = true;

        let warning = match setting.error {
            SyncError::LocalIsFat => Some((FilesystemWarning::Fat, OneTimeAction::FatWarning)),
            SyncError::LocalIsHgfs => Some((FilesystemWarning::Hgfs, OneTimeAction::HgfsWarning)),
            _ => None,
        };
        if let Some((kind, action)) = warning {
            let shown = self.read_flag(
                action.as_str(),
                self.preferences.is_one_time_action_done(action),
            );
            if !shown {
                log::warn!("Sync {} is on a {:?} filesystem", setting.local_folder, kind);
                pending.push(Effect::Notify(SyncEvent::FilesystemWarning {
                    kind,
                    local_folder: setting.local_folder.clone(),
                }));
                self.persist(
                    action.as_str(),
                    self.preferences.set_one_time_action_done(action, true),
                );
            }
        }

        log::debug!("Sync {} activated", setting.tag);
        pending.push(Effect::FolderAdded(FolderRef::from(&*setting)));
    }

    /// Must only run inside a locked operation
    fn deactivate(&self, setting: &SyncSetting, pending: &mut Vec<Effect>) {
        log::debug!("Sync {} deactivated", setting.tag);
        pending.push(Effect::FolderRemoved(FolderRef::from(setting)));
        pending.push(Effect::Notify(SyncEvent::ItemStateReset {
            local_folder: setting.local_folder.clone(),
        }));
    }

    fn needs_legacy_shortcut(&self, adding_state: Option<SyncAdded>, cs: &SyncSetting) -> bool {
        let upgraded = matches!(
            self.options.previous_version,
            Some(version) if version > 0 && version <= LEGACY_SHORTCUT_MAX_VERSION
        );

        upgraded
            && adding_state == Some(SyncAdded::FromCache)
            && cs.active
            && !self.read_flag(
                "left pane icons disabled",
                self.preferences.left_pane_icons_disabled(),
            )
    }

    fn cached_setting(&self, tag: i32) -> Option<SyncSetting> {
        match self.preferences.load_sync_setting(tag) {
            Ok(setting) => setting,
            Err(e) => {
                log::error!("Failed to load cached sync {}: {}", tag, e);
                None
            }
        }
    }

    fn collect<T, F>(&self, map: F) -> Vec<T>
    where
        F: Fn(&Arc<SyncSetting>) -> T,
    {
        let guard = self.state.lock();
        let state = guard.borrow();
        let values = state
            .configured_syncs
            .iter()
            .map(|tag| map(&state.configured_syncs_map[tag]))
            .collect();
        values
    }

    /// Runs queued effects in order; the caller holds the lock but no borrow
    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(event) => self.events.emit(&event),
                Effect::FolderAdded(folder) => {
                    self.platform
                        .sync_folder_added(&folder.local_folder, &folder.name, &folder.sync_id)
                }
                Effect::FolderRemoved(folder) => {
                    self.platform
                        .sync_folder_removed(&folder.local_folder, &folder.name, &folder.sync_id)
                }
                Effect::Shortcut(folder) => {
                    self.platform
                        .add_sync_shortcut(&folder.local_folder, &folder.name, &folder.sync_id)
                }
                Effect::FirstSync => {
                    let (code, message) = FIRST_SYNC_EVENT;
                    self.platform.send_event(code, message);
                    self.persist("set first sync done", self.preferences.set_first_sync_done());
                }
            }
        }
    }

    fn persist(&self, what: &str, result: Result<()>) {
        if let Err(e) = result {
            log::error!("Preferences cache: failed to {}: {}", what, e);
        }
    }

    /// Flags that cannot be read count as set, so warnings never repeat
    fn read_flag(&self, what: &str, result: Result<bool>) -> bool {
        result.unwrap_or_else(|e| {
            log::error!("Preferences cache: failed to read {}: {}", what, e);
            true
        })
    }

    fn warn_if_logged_out(&self, operation: &str) {
        if !self.preferences.logged() {
            log::warn!("{} while logged out, cache left untouched", operation);
        }
    }
}

#[cfg(debug_assertions)]
fn warn_if_not_canonical(local_folder: &str) {
    const VERBATIM: &str = r"\\?\";

    let folder = local_folder.strip_prefix(VERBATIM).unwrap_or(local_folder);
    if let Ok(canonical) = std::fs::canonicalize(folder) {
        let canonical = canonical.to_string_lossy();
        let canonical = canonical.strip_prefix(VERBATIM).unwrap_or(&canonical);
        if canonical != folder {
            log::warn!("Sync folder {} is not canonical ({})", folder, canonical);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::SqlitePreferences;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum PlatformCall {
        Added(String, String),
        Removed(String, String),
        Shortcut(String),
        Event(i32),
    }

    #[derive(Default)]
    struct RecordingPlatform {
        calls: Mutex<Vec<PlatformCall>>,
    }

    impl RecordingPlatform {
        fn calls(&self) -> Vec<PlatformCall> {
            self.calls.lock().clone()
        }

        fn added(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, PlatformCall::Added(..)))
                .count()
        }

        fn removed(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, PlatformCall::Removed(..)))
                .count()
        }
    }

    impl Platform for RecordingPlatform {
        fn sync_folder_added(&self, local_folder: &str, _name: &str, sync_id: &str) {
            self.calls
                .lock()
                .push(PlatformCall::Added(local_folder.to_string(), sync_id.to_string()));
        }

        fn sync_folder_removed(&self, local_folder: &str, _name: &str, sync_id: &str) {
            self.calls.lock().push(PlatformCall::Removed(
                local_folder.to_string(),
                sync_id.to_string(),
            ));
        }

        fn add_sync_shortcut(&self, local_folder: &str, _name: &str, _sync_id: &str) {
            self.calls
                .lock()
                .push(PlatformCall::Shortcut(local_folder.to_string()));
        }

        fn send_event(&self, code: i32, _message: &str) {
            self.calls.lock().push(PlatformCall::Event(code));
        }
    }

    struct Fixture {
        model: Arc<SyncModel>,
        prefs: Arc<SqlitePreferences>,
        platform: Arc<RecordingPlatform>,
        events: Arc<Mutex<Vec<SyncEvent>>>,
    }

    fn setup_with(options: RegistryOptions) -> Fixture {
        let prefs = Arc::new(SqlitePreferences::open_in_memory().unwrap());
        prefs.set_logged(true);
        let platform = Arc::new(RecordingPlatform::default());
        let model = Arc::new(SyncModel::new(prefs.clone(), platform.clone(), options));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        model.subscribe(move |event| sink.lock().push(event.clone()));

        Fixture {
            model,
            prefs,
            platform,
            events,
        }
    }

    fn setup() -> Fixture {
        setup_with(RegistryOptions::default())
    }

    fn sdk_sync(tag: i32, active: bool) -> SdkSync {
        SdkSync {
            tag,
            local_folder: format!("/nonexistent/sync{}", tag),
            mega_folder: format!("/Cloud/sync{}", tag),
            mega_handle: 1000 + tag as u64,
            name: String::new(),
            enabled: true,
            active,
            error: SyncError::NoSyncError,
        }
    }

    fn count_events(fx: &Fixture, pred: impl Fn(&SyncEvent) -> bool) -> usize {
        fx.events.lock().iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_new_active_sync_is_activated() {
        let fx = setup();
        let cs = fx
            .model
            .update_sync_settings(Some(&sdk_sync(42, true)), Some(SyncAdded::New))
            .unwrap();

        assert!(cs.active);
        assert!(cs.has_sync_id());
        assert_eq!(fx.model.get_num_synced_folders(), 1);
        assert_eq!(fx.model.get_sync_setting(0).tag, 42);
        assert_eq!(fx.platform.added(), 1);
        assert_eq!(fx.platform.removed(), 0);
        assert_eq!(
            count_events(&fx, |e| matches!(e, SyncEvent::StateChanged(_))),
            1
        );
    }

    #[test]
    fn test_plain_update_to_inactive_deactivates() {
        let fx = setup();
        let first = fx
            .model
            .update_sync_settings(Some(&sdk_sync(42, true)), Some(SyncAdded::New))
            .unwrap();
        let second = fx
            .model
            .update_sync_settings(Some(&sdk_sync(42, false)), None)
            .unwrap();

        assert!(!second.active);
        assert_eq!(second.sync_id, first.sync_id);
        assert_eq!(fx.platform.added(), 1);
        assert_eq!(fx.platform.removed(), 1);
        assert_eq!(
            count_events(&fx, |e| matches!(e, SyncEvent::ItemStateReset { .. })),
            1
        );
    }

    #[test]
    fn test_reapplying_same_tag_does_not_duplicate() {
        let fx = setup();
        for _ in 0..3 {
            fx.model
                .update_sync_settings(Some(&sdk_sync(7, true)), Some(SyncAdded::New))
                .unwrap();
        }

        assert_eq!(fx.model.get_sync_ids(), vec!["7".to_string()]);
        // Already active on the second and third call: activation is a no-op
        assert_eq!(fx.platform.added(), 1);
    }

    #[test]
    fn test_sync_id_survives_reconciliation_cycles() {
        let fx = setup();
        let id = fx
            .model
            .update_sync_settings(Some(&sdk_sync(3, true)), Some(SyncAdded::New))
            .unwrap()
            .sync_id
            .clone();

        for (active, adding) in [
            (false, None),
            (true, Some(SyncAdded::FromCacheReenabled)),
            (true, None),
            (false, Some(SyncAdded::FromCacheFailedToResume)),
        ] {
            let cs = fx
                .model
                .update_sync_settings(Some(&sdk_sync(3, active)), adding)
                .unwrap();
            assert_eq!(cs.sync_id, id);
        }
    }

    #[test]
    fn test_missing_sync_is_a_no_op() {
        let fx = setup();
        assert!(fx.model.update_sync_settings(None, Some(SyncAdded::New)).is_none());
        assert!(fx.events.lock().is_empty());
    }

    #[test]
    fn test_from_cache_keeps_state_without_side_effects() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::FromCache))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, false)), Some(SyncAdded::FromCache))
            .unwrap();

        assert!(fx.platform.calls().is_empty());
        assert_eq!(fx.model.get_num_synced_folders(), 2);
    }

    #[test]
    fn test_failed_resume_deactivates() {
        let fx = setup();
        let mut sync = sdk_sync(5, false);
        sync.error = SyncError::Other(13);
        let cs = fx
            .model
            .update_sync_settings(Some(&sync), Some(SyncAdded::FromCacheFailedToResume))
            .unwrap();

        assert_eq!(cs.error, SyncError::Other(13));
        assert_eq!(fx.platform.removed(), 1);
        assert_eq!(fx.platform.added(), 0);
    }

    #[test]
    fn test_reenabled_sync_leaves_disabled_list() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, false)), Some(SyncAdded::FromCache))
            .unwrap();
        fx.model.add_unattended_disabled_sync(1);
        assert_eq!(fx.prefs.disabled_sync_tags().unwrap(), HashSet::from([1]));

        let cs = fx
            .model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::FromCacheReenabled))
            .unwrap();

        assert!(cs.active);
        assert!(!fx.model.has_unattended_disabled_syncs());
        assert!(fx.prefs.disabled_sync_tags().unwrap().is_empty());
        assert_eq!(
            count_events(&fx, |e| *e == SyncEvent::DisabledListUpdated),
            2
        );
    }

    #[test]
    fn test_activation_of_listed_sync_only_touches_its_tag() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, false)), Some(SyncAdded::New))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, false)), Some(SyncAdded::New))
            .unwrap();
        fx.model.set_unattended_disabled_syncs(HashSet::from([1, 2]));

        fx.model
            .update_sync_settings(Some(&sdk_sync(2, true)), None)
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, true)), None)
            .unwrap();

        assert_eq!(fx.model.unattended_disabled_syncs(), HashSet::from([1]));
        assert_eq!(fx.prefs.disabled_sync_tags().unwrap(), HashSet::from([1]));
        assert_eq!(
            count_events(&fx, |e| *e == SyncEvent::DisabledListUpdated),
            2
        );
    }

    #[test]
    fn test_reenabled_failed_inactive_fires_nothing() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(5, false)), Some(SyncAdded::ReenabledFailed))
            .unwrap();
        assert_eq!(fx.platform.added(), 0);
        assert_eq!(fx.platform.removed(), 0);
    }

    #[test]
    fn test_activation_and_deactivation_never_both_fire() {
        let fx = setup();
        let states = [None, Some(SyncAdded::New), Some(SyncAdded::FromCache)];
        let mut expected_calls = 0;

        fx.model
            .update_sync_settings(Some(&sdk_sync(9, false)), Some(SyncAdded::New))
            .unwrap();
        for adding in states {
            for active in [true, false] {
                let before = fx.platform.calls().len();
                fx.model
                    .update_sync_settings(Some(&sdk_sync(9, active)), adding)
                    .unwrap();
                let fired = fx.platform.calls().len() - before;
                assert!(fired <= 2, "at most one transition plus first-sync event");
                expected_calls += fired;
            }
        }
        assert_eq!(fx.platform.calls().len(), expected_calls);
        let added = fx.platform.added();
        let removed = fx.platform.removed();
        assert!(added.abs_diff(removed) <= 1);
    }

    #[test]
    fn test_record_persisted_on_every_update() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(4, true)), Some(SyncAdded::New))
            .unwrap();
        assert!(fx.prefs.load_sync_setting(4).unwrap().unwrap().active);

        fx.model
            .update_sync_settings(Some(&sdk_sync(4, false)), None)
            .unwrap();
        assert!(!fx.prefs.load_sync_setting(4).unwrap().unwrap().active);
    }

    #[test]
    fn test_recovers_client_fields_from_cache() {
        let fx = setup();
        let mut cached = SyncSetting::from_sdk(&sdk_sync(11, false));
        cached.name = "Holiday photos".to_string();
        cached.ensure_sync_id();
        fx.prefs.write_sync_setting(&cached).unwrap();

        let cs = fx
            .model
            .update_sync_settings(Some(&sdk_sync(11, true)), Some(SyncAdded::FromCacheReenabled))
            .unwrap();

        assert_eq!(cs.name, "Holiday photos");
        assert_eq!(cs.sync_id, cached.sync_id);
        assert!(cs.active);
        assert_eq!(
            fx.platform.calls().last(),
            Some(&PlatformCall::Added(
                "/nonexistent/sync11".to_string(),
                cached.sync_id.clone()
            ))
        );
    }

    #[test]
    fn test_first_sync_event_sent_once_per_install() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, true)), Some(SyncAdded::New))
            .unwrap();
        fx.model.reset();
        fx.model
            .update_sync_settings(Some(&sdk_sync(3, true)), Some(SyncAdded::New))
            .unwrap();

        let events = fx
            .platform
            .calls()
            .into_iter()
            .filter(|c| *c == PlatformCall::Event(FIRST_SYNC_EVENT.0))
            .count();
        assert_eq!(events, 1);
        assert!(fx.prefs.is_first_sync_done().unwrap());
    }

    #[test]
    fn test_filesystem_warnings_shown_once() {
        let fx = setup();
        let mut fat = sdk_sync(1, true);
        fat.error = SyncError::LocalIsFat;
        let mut fat_again = sdk_sync(2, true);
        fat_again.error = SyncError::LocalIsFat;
        let mut hgfs = sdk_sync(3, true);
        hgfs.error = SyncError::LocalIsHgfs;

        for sync in [&fat, &fat_again, &hgfs] {
            fx.model
                .update_sync_settings(Some(sync), Some(SyncAdded::New))
                .unwrap();
        }

        let warnings: Vec<FilesystemWarning> = fx
            .events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SyncEvent::FilesystemWarning { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(warnings, vec![FilesystemWarning::Fat, FilesystemWarning::Hgfs]);
        assert!(fx
            .prefs
            .is_one_time_action_done(OneTimeAction::FatWarning)
            .unwrap());
    }

    #[test]
    fn test_legacy_shortcut_after_upgrade() {
        let fx = setup_with(RegistryOptions {
            previous_version: Some(3001),
        });
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::FromCache))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, true)), Some(SyncAdded::New))
            .unwrap();

        let shortcuts: Vec<PlatformCall> = fx
            .platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, PlatformCall::Shortcut(_)))
            .collect();
        assert_eq!(
            shortcuts,
            vec![PlatformCall::Shortcut("/nonexistent/sync1".to_string())]
        );
    }

    #[test]
    fn test_no_legacy_shortcut_when_icons_disabled() {
        let fx = setup_with(RegistryOptions {
            previous_version: Some(2900),
        });
        fx.prefs.set_left_pane_icons_disabled(true).unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::FromCache))
            .unwrap();
        assert!(fx.platform.calls().is_empty());
    }

    #[test]
    fn test_remove_by_index() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, false)), Some(SyncAdded::New))
            .unwrap();
        fx.model.add_unattended_disabled_sync(1);

        fx.model.remove_synced_folder(0);

        assert_eq!(fx.model.get_sync_ids(), vec!["2".to_string()]);
        assert!(fx.model.get_sync_setting_by_tag(1).is_none());
        assert!(!fx.model.has_unattended_disabled_syncs());
        assert!(fx.prefs.load_sync_setting(1).unwrap().is_none());
        assert_eq!(fx.platform.removed(), 1);

        let last = fx.events.lock().last().cloned();
        assert!(matches!(last, Some(SyncEvent::Removed(cs)) if cs.tag == 1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_remove_by_index_out_of_range_panics() {
        let fx = setup();
        fx.model.remove_synced_folder(0);
    }

    #[test]
    fn test_remove_by_tag() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, false)), Some(SyncAdded::New))
            .unwrap();
        fx.model
            .update_sync_settings(Some(&sdk_sync(2, true)), Some(SyncAdded::New))
            .unwrap();
        fx.model.set_unattended_disabled_syncs(HashSet::from([1, 2]));

        fx.model.remove_synced_folder_by_tag(2);

        assert_eq!(fx.model.get_sync_ids(), vec!["1".to_string()]);
        assert_eq!(fx.model.unattended_disabled_syncs(), HashSet::from([1]));
        assert_eq!(fx.prefs.disabled_sync_tags().unwrap(), HashSet::from([1]));
        assert_eq!(fx.platform.removed(), 1);
        assert_eq!(count_events(&fx, |e| matches!(e, SyncEvent::Removed(_))), 1);
    }

    #[test]
    fn test_remove_unknown_tag_is_silent() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        let events_before = fx.events.lock().len();

        fx.model.remove_synced_folder_by_tag(99);

        assert_eq!(fx.events.lock().len(), events_before);
        assert_eq!(fx.model.get_num_synced_folders(), 1);
    }

    #[test]
    fn test_remove_all_folders() {
        let fx = setup();
        for tag in 1..=3 {
            fx.model
                .update_sync_settings(Some(&sdk_sync(tag, tag != 2)), Some(SyncAdded::New))
                .unwrap();
        }
        fx.model.add_unattended_disabled_sync(2);
        let removed_before = count_events(&fx, |e| matches!(e, SyncEvent::Removed(_)));

        fx.model.remove_all_folders();

        assert_eq!(fx.model.get_num_synced_folders(), 0);
        assert!(fx.prefs.load_sync_settings().unwrap().is_empty());
        assert!(!fx.model.has_unattended_disabled_syncs());
        assert!(fx.prefs.disabled_sync_tags().unwrap().is_empty());
        assert_eq!(fx.events.lock().last(), Some(&SyncEvent::DisabledListUpdated));
        assert_eq!(fx.platform.removed(), 2);
        assert_eq!(
            count_events(&fx, |e| matches!(e, SyncEvent::Removed(_))),
            removed_before
        );
    }

    #[test]
    fn test_pick_info_from_old_sync() {
        let fx = setup();
        let old = OldSyncData {
            local_folder: "/nonexistent/legacy".to_string(),
            mega_folder: "/Legacy".to_string(),
            mega_handle: 77,
            name: "Legacy".to_string(),
            enabled: true,
            sync_id: None,
        };

        let cs = fx.model.pick_info_from_old_sync(&old, 12, true).unwrap();
        assert_eq!(cs.tag, 12);
        assert_eq!(fx.model.get_local_folders(), vec!["/nonexistent/legacy"]);
        assert_eq!(fx.prefs.load_sync_setting(12).unwrap().unwrap().name, "Legacy");

        // The SDK then resumes it: tracked tag, activation on first start
        let resumed = fx
            .model
            .update_sync_settings(Some(&sdk_sync(12, true)), Some(SyncAdded::FromCacheReenabled))
            .unwrap();
        assert_eq!(resumed.name, "Legacy");
        assert_eq!(fx.model.get_num_synced_folders(), 1);
        assert_eq!(fx.platform.added(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "picking already configured sync")]
    fn test_pick_info_for_tracked_tag_asserts() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        let old = OldSyncData {
            local_folder: "/x".to_string(),
            mega_folder: String::new(),
            mega_handle: 1,
            name: String::new(),
            enabled: true,
            sync_id: None,
        };
        fx.model.pick_info_from_old_sync(&old, 1, true);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "no adding state")]
    fn test_untracked_plain_update_asserts() {
        let fx = setup();
        fx.model.update_sync_settings(Some(&sdk_sync(1, true)), None);
    }

    #[test]
    fn test_reset_keeps_cache() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        fx.model.add_unattended_disabled_sync(1);

        fx.model.reset();

        assert_eq!(fx.model.get_num_synced_folders(), 0);
        assert!(!fx.model.has_unattended_disabled_syncs());
        assert!(fx.prefs.load_sync_setting(1).unwrap().is_some());
    }

    #[test]
    fn test_rewrite_sync_settings_drops_stale_rows() {
        let fx = setup();
        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        fx.prefs
            .write_sync_setting(&SyncSetting::from_sdk(&sdk_sync(50, false)))
            .unwrap();

        fx.model.rewrite_sync_settings();

        let tags: Vec<i32> = fx
            .prefs
            .load_sync_settings()
            .unwrap()
            .iter()
            .map(|s| s.tag)
            .collect();
        assert_eq!(tags, vec![1]);
    }

    #[test]
    fn test_accessors_follow_configuration_order() {
        let fx = setup();
        for tag in [30, 10, 20] {
            fx.model
                .update_sync_settings(Some(&sdk_sync(tag, false)), Some(SyncAdded::New))
                .unwrap();
        }

        assert_eq!(fx.model.get_sync_ids(), vec!["30", "10", "20"]);
        assert_eq!(fx.model.get_sync_names(), vec!["sync30", "sync10", "sync20"]);
        assert_eq!(
            fx.model.get_mega_folders(),
            vec!["/Cloud/sync30", "/Cloud/sync10", "/Cloud/sync20"]
        );
        assert_eq!(fx.model.get_mega_folder_handles(), vec![1030, 1010, 1020]);
        assert_eq!(fx.model.sync_settings().len(), 3);
    }

    #[test]
    fn test_unattended_disabled_bookkeeping() {
        let fx = setup();
        fx.model.add_unattended_disabled_sync(1);
        fx.model.add_unattended_disabled_sync(2);
        fx.model.remove_unattended_disabled_sync(1);
        assert_eq!(fx.prefs.disabled_sync_tags().unwrap(), HashSet::from([2]));

        fx.model.dismiss_unattended_disabled_syncs();
        assert!(fx.prefs.disabled_sync_tags().unwrap().is_empty());
        assert_eq!(
            count_events(&fx, |e| *e == SyncEvent::DisabledListUpdated),
            4
        );
    }

    #[test]
    fn test_unattended_not_persisted_when_logged_out() {
        let fx = setup();
        fx.prefs.set_logged(false);
        fx.model.add_unattended_disabled_sync(3);

        assert!(fx.model.has_unattended_disabled_syncs());
        fx.prefs.set_logged(true);
        assert!(fx.prefs.disabled_sync_tags().unwrap().is_empty());
    }

    #[test]
    fn test_observer_can_read_during_notification() {
        let fx = setup();
        let model = fx.model.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fx.model.subscribe(move |event| {
            if let SyncEvent::StateChanged(_) = event {
                sink.lock().push(model.get_num_synced_folders());
            }
        });

        fx.model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        assert_eq!(*seen.lock(), vec![1]);
    }

    /// Counts configured syncs from inside every platform callback
    #[derive(Default)]
    struct ReadingPlatform {
        model: Mutex<Option<std::sync::Weak<SyncModel>>>,
        counts: Mutex<Vec<usize>>,
    }

    impl ReadingPlatform {
        fn record(&self) {
            let model = self.model.lock().as_ref().and_then(std::sync::Weak::upgrade);
            if let Some(model) = model {
                self.counts.lock().push(model.get_num_synced_folders());
            }
        }
    }

    impl Platform for ReadingPlatform {
        fn sync_folder_added(&self, _local_folder: &str, _name: &str, _sync_id: &str) {
            self.record();
        }

        fn sync_folder_removed(&self, _local_folder: &str, _name: &str, _sync_id: &str) {
            self.record();
        }

        fn add_sync_shortcut(&self, _local_folder: &str, _name: &str, _sync_id: &str) {
            self.record();
        }

        fn send_event(&self, _code: i32, _message: &str) {
            self.record();
        }
    }

    #[test]
    fn test_platform_can_read_registry_from_callbacks() {
        let prefs = Arc::new(SqlitePreferences::open_in_memory().unwrap());
        prefs.set_logged(true);
        let platform = Arc::new(ReadingPlatform::default());
        let model = Arc::new(SyncModel::new(
            prefs,
            platform.clone(),
            RegistryOptions {
                previous_version: Some(3001),
            },
        ));
        *platform.model.lock() = Some(Arc::downgrade(&model));

        model
            .update_sync_settings(Some(&sdk_sync(1, true)), Some(SyncAdded::New))
            .unwrap();
        model
            .update_sync_settings(Some(&sdk_sync(2, true)), Some(SyncAdded::FromCache))
            .unwrap();
        model.remove_synced_folder_by_tag(1);
        model.remove_all_folders();

        // first sync event, added, shortcut, removed by tag, removed by bulk
        assert_eq!(*platform.counts.lock(), vec![1, 1, 2, 1, 0]);
    }

    #[test]
    fn test_concurrent_updates_for_different_tags() {
        let fx = setup();
        let handles: Vec<_> = (0..8)
            .map(|tag| {
                let model = fx.model.clone();
                std::thread::spawn(move || {
                    model
                        .update_sync_settings(Some(&sdk_sync(tag, true)), Some(SyncAdded::New))
                        .unwrap();
                    model
                        .update_sync_settings(Some(&sdk_sync(tag, false)), None)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut ids = fx.model.get_sync_ids();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(fx.model.get_num_synced_folders(), 8);
        assert_eq!(fx.platform.added(), 8);
        assert_eq!(fx.platform.removed(), 8);
    }
}
