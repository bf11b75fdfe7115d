//! KDLパーサー
//!
//! デプロイメントファイルを [`Deployment`] にパースします。
//! ターゲットを先に収集するので、ユニットノードは参照先ターゲットより前に書けます。

mod target;
mod unit;

pub use unit::parse_setting;

use crate::error::{Result, SynthError};
use crate::model::{Deployment, UnitSpec};
use kdl::KdlDocument;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use target::parse_target;
use tracing::debug;
use unit::parse_unit;

/// KDLファイルをパースしてDeploymentを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Deployment> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| SynthError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース（`project` ノードがなければ `default_name` を使用）
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Deployment> {
    let doc: KdlDocument = content.parse()?;

    let mut project = default_name;
    let mut targets = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(name) = node.entries().first().and_then(|e| e.value().as_string()) {
                    project = name.to_string();
                }
            }
            "target" => {
                let (name, target) = parse_target(node)?;
                if targets.insert(name.clone(), target).is_some() {
                    return Err(SynthError::InvalidConfig(format!(
                        "target '{}' is defined more than once",
                        name
                    )));
                }
            }
            _ => {}
        }
    }

    let mut units: Vec<UnitSpec> = Vec::new();
    for node in doc.nodes() {
        match node.name().value() {
            // テンプレート展開で処理済み
            "project" | "target" | "variables" => {}
            _ => {
                let raw = parse_unit(node)?;
                let target_name = match raw.target {
                    Some(name) => name,
                    None if targets.len() == 1 => targets.keys().next().cloned().unwrap_or_default(),
                    None if targets.is_empty() => {
                        return Err(SynthError::InvalidConfig(format!(
                            "unit '{}' has no target and no target is declared",
                            raw.name
                        )));
                    }
                    None => {
                        return Err(SynthError::invalid_props(
                            &raw.name,
                            "several targets are declared; set target=\"...\"",
                        ));
                    }
                };
                let target = targets.get(&target_name).cloned().ok_or_else(|| {
                    SynthError::invalid_props(
                        &raw.name,
                        format!("unknown target '{}'", target_name),
                    )
                })?;

                if let Some(existing) = units.iter().find(|u| u.name == raw.name) {
                    return Err(SynthError::DuplicateUnit {
                        id: raw.name,
                        target: existing.target.to_string(),
                    });
                }

                debug!(kind = %raw.kind, unit = %raw.name, target = %target_name, "Parsed unit");
                units.push(UnitSpec {
                    kind: raw.kind,
                    name: raw.name,
                    target_name,
                    target,
                    inputs: raw.inputs,
                    settings: raw.settings,
                });
            }
        }
    }

    Ok(Deployment {
        project,
        targets,
        units,
    })
}
