//! デプロイメントローダー
//!
//! ファイル読み込み、Teraによるテンプレート展開、KDLパースを統合

use crate::error::{Result, SynthError};
use crate::model::Deployment;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, Variables, extract_variables};
use std::path::Path;
use tracing::{debug, info, instrument};

/// デプロイメントファイルをロード
///
/// 変数の優先順位（低い順）:
/// 1. `PROJECT_ROOT`
/// 2. 環境変数（`STACKFLOW_*`, `CI_*`）
/// 3. `variables { }` ブロック
/// 4. `overrides`
#[instrument(skip(overrides), fields(path = %path.display()))]
pub fn load_deployment(path: &Path, overrides: &Variables) -> Result<Deployment> {
    info!("Loading deployment");
    let content = std::fs::read_to_string(path).map_err(|e| SynthError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let project_root = path.parent().unwrap_or_else(|| Path::new("."));
    let default_name = project_root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .unwrap_or_else(|| "unnamed".to_string());

    let mut processor = prepare_template_processor(&content, project_root, overrides)?;

    debug!("Expanding template");
    let expanded = processor.render_str(&content).map_err(|e| match e {
        SynthError::TemplateRenderError(message) => SynthError::TemplateError {
            file: path.to_path_buf(),
            message,
        },
        other => other,
    })?;

    debug!("Parsing KDL");
    let deployment = parse_kdl_string(&expanded, default_name)?;
    info!(
        project = %deployment.project,
        targets = deployment.targets.len(),
        units = deployment.units.len(),
        "Deployment loaded"
    );
    Ok(deployment)
}

/// メモリ上のデプロイメント定義を展開してパース
#[instrument(skip(content, overrides))]
pub fn load_deployment_str(
    content: &str,
    default_name: &str,
    overrides: &Variables,
) -> Result<Deployment> {
    let mut processor = prepare_template_processor(content, Path::new("."), overrides)?;
    let expanded = processor.render_str(content)?;
    parse_kdl_string(&expanded, default_name.to_string())
}

fn prepare_template_processor(
    content: &str,
    project_root: &Path,
    overrides: &Variables,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();
    processor.add_variable(
        "PROJECT_ROOT",
        serde_json::Value::String(project_root.to_string_lossy().to_string()),
    );
    processor.add_env_variables();

    let file_variables = extract_variables(content)?;
    debug!(count = file_variables.len(), "Collected file variables");
    processor.add_variables(file_variables);

    if !overrides.is_empty() {
        debug!(count = overrides.len(), "Applying variable overrides");
        processor.add_variables(overrides.clone());
    }
    Ok(processor)
}
