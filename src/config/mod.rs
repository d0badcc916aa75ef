//! Client configuration persisted as TOML in the app directory.

mod io;
mod types;

pub use io::{
    CONFIG_FILE_NAME, SERVICE_URL_ENV, config_path, load_from_path, load_or_default, save,
    save_to_path,
};
pub use types::{AppSettings, ConfigError, RetrySettings, ServiceSettings, SessionSettings};
