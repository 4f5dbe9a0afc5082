use std::sync::Arc;
use sync_model::{Preferences, RegistryOptions, SyncEvent, SyncModel};

mod config;
mod database;
mod error;
mod services;

use config::AppConfig;
use error::AppError;
use services::{replay_service, DesktopPlatform};

const MANIFEST_FILE: &str = "synced_folders.json";
const LEGACY_SYNCS_FILE: &str = "legacy_syncs.json";
const SDK_EVENTS_FILE: &str = "sdk_events.json";

fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn run(config: &AppConfig) -> Result<(), AppError> {
    let prefs = Arc::new(database::open_preferences(config)?);
    prefs.set_logged(true);

    let platform = Arc::new(DesktopPlatform::new(config.data_file(MANIFEST_FILE)));
    let model = Arc::new(SyncModel::new(
        prefs.clone(),
        platform,
        RegistryOptions {
            previous_version: config.previous_version,
        },
    ));
    model.subscribe(log_sync_event);

    model.set_unattended_disabled_syncs(prefs.disabled_sync_tags()?);
    replay_service::migrate_legacy_syncs(&model, &config.data_file(LEGACY_SYNCS_FILE))?;
    let stats = replay_service::replay_sdk_events(&model, &config.data_file(SDK_EVENTS_FILE))?;
    log::debug!("Replay finished: {:?}", stats);

    log::info!("{} configured syncs", model.get_num_synced_folders());
    for cs in model.sync_settings() {
        log::info!(
            "[{}] {} -> {} ({}, {})",
            cs.tag,
            cs.local_folder,
            cs.mega_folder,
            if cs.active { "active" } else { "inactive" },
            if cs.sync_id.is_empty() { "no id" } else { cs.sync_id.as_str() }
        );
    }

    if model.has_unattended_disabled_syncs() {
        log::warn!(
            "Syncs disabled without user action: {:?}",
            model.unattended_disabled_syncs()
        );
    }

    Ok(())
}

fn log_sync_event(event: &SyncEvent) {
    match event {
        SyncEvent::Removed(cs) => log::info!("Sync {} removed", cs.tag),
        SyncEvent::StateChanged(cs) => {
            log::debug!("Sync {} state changed (active: {})", cs.tag, cs.active)
        }
        SyncEvent::DisabledListUpdated => log::debug!("Disabled sync list updated"),
        SyncEvent::ItemStateReset { local_folder } => {
            log::debug!("Overlay reset for {}", local_folder)
        }
        SyncEvent::FilesystemWarning { kind, local_folder } => {
            log::warn!("{:?} filesystem warning for {}", kind, local_folder)
        }
    }
}
