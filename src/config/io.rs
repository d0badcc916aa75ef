use std::path::{Path, PathBuf};

use crate::app_dirs;

use super::types::{AppSettings, ConfigError};

/// Default filename used to store the app configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable that overrides `service.base_url`.
pub const SERVICE_URL_ENV: &str = "ATMOS_SERVICE_URL";

/// Resolve the configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load settings from the app directory, falling back to defaults when absent.
///
/// `ATMOS_SERVICE_URL` overrides the stored base URL. The result is validated.
pub fn load_or_default() -> Result<AppSettings, ConfigError> {
    let mut settings = load_from_path(&config_path()?)?;
    apply_env_overrides(&mut settings, std::env::var(SERVICE_URL_ENV).ok());
    settings.service.validate()?;
    Ok(settings)
}

/// Load settings from a specific file; a missing file yields defaults.
pub fn load_from_path(path: &Path) -> Result<AppSettings, ConfigError> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist settings to the app directory.
pub fn save(settings: &AppSettings) -> Result<(), ConfigError> {
    save_to_path(settings, &config_path()?)
}

/// Write settings as TOML, creating parent directories as needed.
///
/// Writes a sibling temp file and renames it over `path`.
pub fn save_to_path(settings: &AppSettings, path: &Path) -> Result<(), ConfigError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;
    let data = toml::to_string_pretty(settings).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp_path = parent.join(format!(
        ".{CONFIG_FILE_NAME}.{}.tmp",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::write(&tmp_path, data).map_err(|source| ConfigError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp_path);
        ConfigError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

pub(super) fn apply_env_overrides(settings: &mut AppSettings, service_url: Option<String>) {
    if let Some(url) = service_url.filter(|url| !url.trim().is_empty()) {
        tracing::debug!("Using service URL from {SERVICE_URL_ENV}: {url}");
        settings.service.base_url = url.trim().to_string();
    }
}
