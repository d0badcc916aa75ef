//! Location of the client's own files.
//!
//! Everything lives in one `.atmos` directory under the OS config root.
//! Setting `ATMOS_CONFIG_HOME` replaces that root.

use std::{ffi::OsString, path::PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory inside the config root.
pub const APP_DIR_NAME: &str = ".atmos";
/// Environment variable that replaces the OS config root.
pub const CONFIG_HOME_ENV: &str = "ATMOS_CONFIG_HOME";
const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No config directory could be determined; set {CONFIG_HOME_ENV}")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.atmos` directory, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(base_dir()?.join(APP_DIR_NAME))
}

/// The `logs` directory inside the app root, created on first use.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join(LOGS_DIR_NAME))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    match std::fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(AppDirError::CreateDir { path, source }),
    }
}

fn base_dir() -> Result<PathBuf, AppDirError> {
    if let Some(path) = test_base_dir() {
        return Ok(path);
    }
    resolve_base_dir(std::env::var_os(CONFIG_HOME_ENV))
}

fn resolve_base_dir(env_value: Option<OsString>) -> Result<PathBuf, AppDirError> {
    match env_value {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => BaseDirs::new()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(AppDirError::NoBaseDir),
    }
}

#[cfg(test)]
thread_local! {
    static TEST_BASE_DIR: std::cell::RefCell<Option<PathBuf>> = const { std::cell::RefCell::new(None) };
}

#[cfg(test)]
fn test_base_dir() -> Option<PathBuf> {
    TEST_BASE_DIR.with(|cell| cell.borrow().clone())
}

#[cfg(not(test))]
fn test_base_dir() -> Option<PathBuf> {
    None
}
