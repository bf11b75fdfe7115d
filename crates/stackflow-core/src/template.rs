//! テンプレート展開
//!
//! デプロイメントファイルはパース前にTeraで展開される。

use crate::error::{Result, SynthError};
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 変数コンテキスト
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートから参照できる環境変数のプレフィックス
const ALLOWED_ENV_PREFIXES: &[&str] = &["STACKFLOW_", "CI_"];

pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 許可されたプレフィックスの環境変数を追加（`STACKFLOW_*`, `CI_*`）
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;

        for (key, value) in std::env::vars() {
            if ALLOWED_ENV_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
            {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &serde_json::Value::String(value));
                count += 1;
            }
        }

        info!(
            env_var_count = count,
            "Added filtered environment variables"
        );
    }

    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| SynthError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| SynthError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            SynthError::TemplateRenderError(message) => SynthError::TemplateError {
                file: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// デプロイメントファイルから `variables { ... }` ブロックを収集
///
/// ブロックを正規表現で切り出して単独でパースするため、
/// ファイル内の他のテンプレート式があってもKDLパースは失敗しない。
pub fn extract_variables(kdl_content: &str) -> Result<Variables> {
    let re = regex::Regex::new(r"(?m)^\s*variables\s*\{")
        .map_err(|e| SynthError::InvalidConfig(format!("regex compile error: {}", e)))?;

    let mut variables = HashMap::new();
    for mat in re.find_iter(kdl_content) {
        let open = mat.end() - 1;
        let Some(close) = find_matching_brace(kdl_content, open) else {
            return Err(SynthError::InvalidConfig(
                "unterminated variables block".to_string(),
            ));
        };

        let block = format!("extracted {{\n{}\n}}", &kdl_content[open + 1..close]);
        let doc: kdl::KdlDocument = block.parse().map_err(|e| {
            SynthError::InvalidConfig(format!("KDL parse error in variables block: {}", e))
        })?;

        if let Some(node) = doc.nodes().first()
            && let Some(children) = node.children()
        {
            for var in children.nodes() {
                if let Some(entry) = var.entries().first() {
                    variables.insert(
                        var.name().value().to_string(),
                        kdl_value_to_json(entry.value()),
                    );
                }
            }
        }
    }

    Ok(variables)
}

/// `open_pos` の括弧に対応する閉じ括弧の位置
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if open_pos >= bytes.len() || bytes[open_pos] != b'{' {
        return None;
    }

    let mut depth = 1;
    let mut pos = open_pos + 1;
    let mut in_string = false;
    let mut escape_next = false;

    while pos < bytes.len() && depth > 0 {
        let c = bytes[pos];
        if escape_next {
            escape_next = false;
        } else if c == b'\\' {
            escape_next = true;
        } else if c == b'"' {
            in_string = !in_string;
        } else if !in_string {
            if c == b'{' {
                depth += 1;
            } else if c == b'}' {
                depth -= 1;
            }
        }
        pos += 1;
    }

    if depth == 0 { Some(pos - 1) } else { None }
}

fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "undefined variable: `{}`\nhint: define it in a variables block, pass --var {}=..., or export STACKFLOW_{}",
            var_name,
            var_name,
            var_name.to_uppercase()
        );
    }

    full_error
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        serde_json::Value::Number((i as i64).into())
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_variable_expansion() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("env", serde_json::Value::String("dev".to_string()));

        let result = processor.render_str(r#"environment "{{ env }}""#).unwrap();
        assert_eq!(result, r#"environment "dev""#);
    }

    #[test]
    fn test_if_condition() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("with_replica", serde_json::Value::Bool(false));

        let template = r#"
{% if with_replica %}
replication "cdk-demo-ReplicationStack"
{% endif %}
network "cdk-demo-NetworkStack"
"#;
        let result = processor.render_str(template).unwrap();
        assert!(!result.contains("replication"));
        assert!(result.contains("network"));
    }

    #[test]
    fn test_extract_variables() {
        let kdl = r#"
variables {
    env "dev"
    zones 3
    with_replica #true
}

backend "cdk-demo-BackendStack" {
    environment "{{ env }}"
}

variables {
    env "prod"
}
"#;

        let vars = extract_variables(kdl).unwrap();
        assert_eq!(vars.get("env").unwrap(), "prod");
        assert_eq!(vars.get("zones").unwrap(), 3);
        assert_eq!(vars.get("with_replica").unwrap(), true);
    }

    #[test]
    fn test_unterminated_variables_block() {
        assert!(extract_variables("variables {\n env \"dev\"\n").is_err());
    }

    #[test]
    fn test_undefined_variable_error() {
        let mut processor = TemplateProcessor::new();
        let err = processor.render_str("db-name \"{{ db_name }}\"").unwrap_err();

        let message = err.to_string();
        assert!(message.contains("db_name"), "unexpected error: {}", message);
    }

    #[test]
    fn test_find_matching_brace() {
        let content = r#"variables { name "a}b" nested { x 1 } } tail"#;
        let open = content.find('{').unwrap();
        let close = find_matching_brace(content, open).unwrap();
        assert_eq!(&content[close + 1..], " tail");
    }
}
