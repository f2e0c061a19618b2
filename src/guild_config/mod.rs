//! Per guild options, stored as one json file per guild.

pub mod flags;
pub mod format;
pub mod option;
pub mod store;

use std::collections::BTreeMap;
use thiserror::Error;

pub use flags::LogsFlags;
pub use option::{ConfigOption, ConfigSchema, OptionKind};
pub use store::{ConfigManager, ServerConfig};

/// Option name to value.
pub type Record = BTreeMap<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid guild id '{0}'")]
    InvalidGuildKey(String),
    #[error("Invalid config key '{0}'")]
    UnknownOption(String),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Corrupt guild config: {0}")]
    Json(#[from] serde_json::Error),
}
