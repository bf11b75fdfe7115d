use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Deployment file not found. Looked in:\n\
        - current directory: stackflow.local.kdl, .stackflow.local.kdl, stackflow.kdl, .stackflow.kdl\n\
        - ./.stackflow/ directory\n\
        - ~/.config/stackflow/stackflow.kdl\n\
        Set STACKFLOW_CONFIG_PATH to point at a file directly"
    )]
    DeploymentFileNotFound,

    #[error("Invalid settings file {path}: {message}")]
    InvalidSettings { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
