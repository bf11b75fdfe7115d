use anyhow::{Context, bail};
use stackflow_aws::Composition;
use stackflow_config::{ConfigError, UserSettings};
use stackflow_core::{Deployment, Variables, load_deployment};
use std::path::{Path, PathBuf};
use tracing::warn;

/// ロード済みのデプロイメントとユーザー設定
pub struct Project {
    pub path: PathBuf,
    pub deployment: Deployment,
    pub settings: UserSettings,
}

impl Project {
    pub fn load(config: Option<&Path>, vars: &[String]) -> anyhow::Result<Self> {
        let path = match config {
            Some(path) => path.to_path_buf(),
            None => stackflow_config::find_deployment_file()?,
        };
        let settings = settings_or_default(stackflow_config::load_settings())?;

        let mut overrides = Variables::new();
        for (key, value) in &settings.variables {
            overrides.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        for var in vars {
            let (key, value) = parse_var(var)?;
            overrides.insert(key, serde_json::Value::String(value));
        }

        let deployment = load_deployment(&path, &overrides)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(Self {
            path,
            deployment,
            settings,
        })
    }

    pub fn compose(&self) -> anyhow::Result<Composition> {
        stackflow_aws::compose(&self.deployment)
            .with_context(|| format!("failed to compose {}", self.path.display()))
    }
}

/// 設定ディレクトリが解決できない場合はデフォルト設定を使う
fn settings_or_default(
    loaded: stackflow_config::Result<UserSettings>,
) -> anyhow::Result<UserSettings> {
    match loaded {
        Ok(settings) => Ok(settings),
        Err(ConfigError::ConfigDirNotFound) => {
            warn!("No user config directory; using default settings");
            Ok(UserSettings::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// `KEY=VALUE`
fn parse_var(var: &str) -> anyhow::Result<(String, String)> {
    match var.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("invalid --var '{}': expected KEY=VALUE", var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_dir_falls_back_to_defaults() {
        let settings = settings_or_default(Err(ConfigError::ConfigDirNotFound)).unwrap();
        assert_eq!(settings, UserSettings::default());
    }

    #[test]
    fn test_invalid_settings_still_fail() {
        let result = settings_or_default(Err(ConfigError::InvalidSettings {
            path: PathBuf::from("config.yaml"),
            message: "bad format".to_string(),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("environment=prod").unwrap(),
            ("environment".to_string(), "prod".to_string())
        );
        assert_eq!(
            parse_var("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_var("empty=").unwrap().1, "");
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=value").is_err());
    }
}
