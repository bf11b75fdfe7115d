//! 合成エラー型

use std::path::PathBuf;
use thiserror::Error;

/// ロード・構成・合成時のエラー
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid props for unit '{unit}': {message}")]
    InvalidProps { unit: String, message: String },

    #[error("Template error: {file}\nreason: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("Template expansion error: {0}")]
    TemplateRenderError(String),

    #[error("Unit '{id}' is already defined (target {target})")]
    DuplicateUnit { id: String, target: String },

    #[error("Invalid unit id '{0}': use letters, digits and '-', starting with a letter")]
    InvalidUnitId(String),

    #[error("Invalid logical id '{logical_id}' in unit '{unit}': use letters and digits only")]
    InvalidLogicalId { unit: String, logical_id: String },

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Logical id '{logical_id}' is already declared in unit '{unit}'")]
    DuplicateLogicalId { unit: String, logical_id: String },

    #[error("Unit '{unit}' references '{logical_id}', which is not declared in unit '{owner}'")]
    UnresolvedReference {
        unit: String,
        logical_id: String,
        owner: String,
    },

    #[error("Unit '{unit}' references unit '{referenced}', which has not been added yet")]
    ForwardReference { unit: String, referenced: String },

    #[error(
        "Unit '{unit}' ({unit_target}) references '{logical_id}' in unit '{referenced}' ({referenced_target})\nhint: pass identifiers across targets as a ForeignRef"
    )]
    CrossTargetReference {
        unit: String,
        unit_target: String,
        referenced: String,
        referenced_target: String,
        logical_id: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Assembly error: {0}")]
    AssemblyError(String),
}

impl SynthError {
    /// props 検証エラーのショートハンド
    pub fn invalid_props(unit: impl Into<String>, message: impl Into<String>) -> Self {
        SynthError::InvalidProps {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
