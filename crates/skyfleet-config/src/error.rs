use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "configuration file not found. Checked:\n\
        - current directory: skyfleet.local.yaml, skyfleet.yaml\n\
        - ./.skyfleet/ directory\n\
        - ~/.config/skyfleet/skyfleet.yaml\n\
        Set SKYFLEET_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
