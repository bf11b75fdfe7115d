//! target ノードのパース

use crate::error::{Result, SynthError};
use crate::model::Target;
use kdl::KdlNode;

/// `target "primary" account="445362076974" region="us-east-1"`
pub fn parse_target(node: &KdlNode) -> Result<(String, Target)> {
    let name = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| SynthError::InvalidConfig("target requires a name".to_string()))?
        .to_string();

    let mut account = None;
    let mut region = None;

    for entry in node.entries() {
        let Some(key) = entry.name() else {
            continue;
        };
        let value = entry.value().as_string().ok_or_else(|| {
            SynthError::InvalidConfig(format!(
                "target '{}': {} must be a string",
                name,
                key.value()
            ))
        })?;
        match key.value() {
            "account" => account = Some(value.to_string()),
            "region" => region = Some(value.to_string()),
            other => {
                return Err(SynthError::InvalidConfig(format!(
                    "target '{}': unknown property '{}'",
                    name, other
                )));
            }
        }
    }

    let region = region.ok_or_else(|| {
        SynthError::InvalidConfig(format!("target '{}' requires a region", name))
    })?;

    let mut target = Target::new(region);
    if let Some(account) = account {
        target = target.with_account(account);
    }
    Ok((name, target))
}
