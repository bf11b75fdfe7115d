pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{OutputFormat, UserSettings, load_settings, load_settings_from};

use std::path::{Path, PathBuf};

/// デプロイメントファイルを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "stackflow.local.kdl",
    ".stackflow.local.kdl",
    "stackflow.kdl",
    ".stackflow.kdl",
];

/// StackFlowの設定ディレクトリ（`~/.config/stackflow`、なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのデプロイメントファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stackflow.local.kdl, .stackflow.local.kdl, stackflow.kdl, .stackflow.kdl
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/stackflow.kdl (グローバル設定)
pub fn find_deployment_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in_project(&current_dir) {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("stackflow").join("stackflow.kdl");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::DeploymentFileNotFound)
}

/// `dir`、次に `dir/.stackflow/` で候補を探す
fn find_in_project(dir: &Path) -> Option<PathBuf> {
    let nested = dir.join(".stackflow");
    let mut search = vec![dir.to_path_buf()];
    if nested.is_dir() {
        search.push(nested);
    }
    search
        .iter()
        .flat_map(|base| CANDIDATES.iter().map(move |name| base.join(name)))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("stackflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("stackflow.kdl"), "// test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_deployment_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stackflow.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("stackflow.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("stackflow.local.kdl"), "// local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_deployment_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with("stackflow.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_hidden_local_beats_plain() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(".stackflow.local.kdl"), "// hidden local").unwrap();
        fs::write(temp_dir.path().join("stackflow.kdl"), "// visible").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_deployment_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".stackflow.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_in_stackflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let nested = temp_dir.path().join(".stackflow");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("stackflow.kdl"), "// nested").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_deployment_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".stackflow/stackflow.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        }
        let result = find_deployment_file();
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        let previous_home = std::env::var_os("XDG_CONFIG_HOME");

        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", config_home.path());
        }
        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_deployment_file();
        std::env::set_current_dir(original_dir).unwrap();
        unsafe {
            match previous_home {
                Some(home) => std::env::set_var("XDG_CONFIG_HOME", home),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }

        assert!(matches!(result, Err(ConfigError::DeploymentFileNotFound)));
    }
}
