use std::path::PathBuf;
use std::time::Duration;

use crate::error::PersistenceError;
use crate::models::{Locale, Settings, SettingsFile};
use crate::storage::Storage;

pub const SCHEMA_VERSION: u32 = 1;
pub const APP_DIR_NAME: &str = "todo-board";

pub const ENV_DATA_DIR: &str = "TODO_BOARD_DATA_DIR";
pub const ENV_BACKEND: &str = "TODO_BOARD_BACKEND";
pub const ENV_API_URL: &str = "TODO_BOARD_API_URL";
pub const ENV_LOCALE: &str = "TODO_BOARD_LOCALE";

/// Everything the binary needs before it can build a store.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub settings: Settings,
    pub locale: Locale,
}

impl AppConfig {
    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.notice_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    /// Reads the process environment and the system locale.
    pub fn load() -> Result<Self, PersistenceError> {
        Self::load_with(|key| std::env::var(key).ok(), sys_locale::get_locale())
    }

    pub fn load_with<E>(env: E, system_locale: Option<String>) -> Result<Self, PersistenceError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let data_dir = resolve_data_dir(&env);
        let storage = Storage::new(data_dir.clone());
        storage.ensure_dirs()?;
        let mut settings = load_settings(&storage);
        apply_env_overrides(&mut settings, &env);
        let locale = resolve_locale(&settings.locale, system_locale.as_deref());
        Ok(Self {
            data_dir,
            settings,
            locale,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn resolve_data_dir<E>(env: E) -> PathBuf
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(dir) = non_empty(env(ENV_DATA_DIR)) {
        return PathBuf::from(dir.trim());
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Missing file: defaults, written back so users have something to edit.
/// Unreadable file: defaults, the file is left alone.
pub fn load_settings(storage: &Storage) -> Settings {
    match storage.load_settings() {
        Ok(file) => {
            if file.schema_version != SCHEMA_VERSION {
                log::warn!(
                    "settings schema_version={} (expected {SCHEMA_VERSION})",
                    file.schema_version
                );
            }
            file.settings
        }
        Err(PersistenceError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            let settings = Settings::default();
            let file = SettingsFile {
                schema_version: SCHEMA_VERSION,
                settings: settings.clone(),
            };
            if let Err(err) = storage.save_settings(&file) {
                log::warn!("failed to write default settings: {err}");
            }
            settings
        }
        Err(err) => {
            log::warn!("failed to read settings, using defaults: {err}");
            Settings::default()
        }
    }
}

pub fn apply_env_overrides<E>(settings: &mut Settings, env: E)
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_empty(env(ENV_BACKEND)) {
        match value.parse() {
            Ok(kind) => settings.backend = kind,
            Err(err) => log::warn!("ignoring {ENV_BACKEND}: {err}"),
        }
    }
    if let Some(value) = non_empty(env(ENV_API_URL)) {
        settings.api_base_url = value.trim().to_string();
    }
    if let Some(value) = non_empty(env(ENV_LOCALE)) {
        settings.locale = value.trim().to_string();
    }
}

/// `auto` follows the system locale; anything unrecognised falls back to English.
pub fn resolve_locale(setting: &str, system: Option<&str>) -> Locale {
    let setting = setting.trim();
    let tag = if setting.is_empty() || setting.eq_ignore_ascii_case("auto") {
        system.unwrap_or_default()
    } else {
        setting
    };
    Locale::from_tag(tag).unwrap_or_else(|| {
        log::debug!("locale {tag:?} not supported, using en");
        Locale::En
    })
}
