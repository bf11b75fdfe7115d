//! ユーザー設定（`~/.config/stackflow/config.yaml`）

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SETTINGS_FILE: &str = "config.yaml";

/// テンプレートの出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown format '{}' (expected json or yaml)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserSettings {
    /// `--out` 未指定時のクラウドアセンブリ出力先
    pub out_dir: PathBuf,

    pub format: OutputFormat,

    /// テンプレート変数（`--var` で上書き可能）
    pub variables: BTreeMap<String, String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("cdk.out"),
            format: OutputFormat::Json,
            variables: BTreeMap::new(),
        }
    }
}

/// ユーザー設定を読み込む（ファイルがなければデフォルト）
///
/// [`get_config_dir`](crate::get_config_dir) と違いディレクトリは作成しない
pub fn load_settings() -> Result<UserSettings> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    load_settings_from(&dir.join("stackflow").join(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Result<UserSettings> {
    if !path.exists() {
        return Ok(UserSettings::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(UserSettings::default());
    }
    serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&temp_dir.path().join("config.yaml")).unwrap();
        assert_eq!(settings, UserSettings::default());
        assert_eq!(settings.out_dir, PathBuf::from("cdk.out"));
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(
            &path,
            "format: yaml\nvariables:\n  environment: staging\n",
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.format, OutputFormat::Yaml);
        assert_eq!(settings.out_dir, PathBuf::from("cdk.out"));
        assert_eq!(settings.variables["environment"], "staging");
    }

    #[test]
    fn test_invalid_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "format: toml\n").unwrap();

        let err = load_settings_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings { .. }));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
