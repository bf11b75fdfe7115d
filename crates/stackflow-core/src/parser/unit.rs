//! ユニットノードのパース

use crate::error::{Result, SynthError};
use crate::model::{Setting, validate_unit_id};
use kdl::{KdlNode, KdlValue};
use std::collections::BTreeMap;

/// ターゲット解決前のユニットノード
pub struct RawUnit {
    pub kind: String,
    pub name: String,
    pub target: Option<String>,
    pub inputs: BTreeMap<String, String>,
    pub settings: BTreeMap<String, Setting>,
}

/// `<kind> "<name>" target="..." <input>="<unit>" { <settings> }`
pub fn parse_unit(node: &KdlNode) -> Result<RawUnit> {
    let kind = node.name().value().to_string();
    let name = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| SynthError::InvalidConfig(format!("{} requires a name", kind)))?
        .to_string();
    validate_unit_id(&name)?;

    let mut target = None;
    let mut inputs = BTreeMap::new();

    for entry in node.entries() {
        let Some(key) = entry.name() else {
            continue;
        };
        let value = entry.value().as_string().ok_or_else(|| {
            SynthError::invalid_props(
                &name,
                format!("'{}' must name a unit or target", key.value()),
            )
        })?;
        match key.value() {
            "target" => target = Some(value.to_string()),
            input => {
                if inputs.insert(input.to_string(), value.to_string()).is_some() {
                    return Err(SynthError::invalid_props(
                        &name,
                        format!("input '{}' is given more than once", input),
                    ));
                }
            }
        }
    }

    let settings = match node.children() {
        Some(children) => parse_block(children.nodes()).map_err(|e| match e {
            SynthError::InvalidConfig(message) => SynthError::invalid_props(&name, message),
            other => other,
        })?,
        None => BTreeMap::new(),
    };

    Ok(RawUnit {
        kind,
        name,
        target,
        inputs,
        settings,
    })
}

fn parse_block(nodes: &[KdlNode]) -> Result<BTreeMap<String, Setting>> {
    let mut settings = BTreeMap::new();
    for node in nodes {
        insert_setting(&mut settings, node.name().value(), parse_setting(node)?)?;
    }
    Ok(settings)
}

fn insert_setting(
    settings: &mut BTreeMap<String, Setting>,
    key: &str,
    value: Setting,
) -> Result<()> {
    if settings.insert(key.to_string(), value).is_some() {
        return Err(SynthError::InvalidConfig(format!(
            "setting '{}' is defined more than once",
            key
        )));
    }
    Ok(())
}

/// 設定ノードの値
///
/// - 子ノードまたはプロパティ: ブロック
/// - 複数の引数: リスト
/// - 引数1つ: スカラー
/// - ノード名のみ: `true` フラグ
pub fn parse_setting(node: &KdlNode) -> Result<Setting> {
    let args: Vec<&KdlValue> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect();
    let has_props = node.entries().iter().any(|e| e.name().is_some());

    if node.children().is_some() || has_props {
        if !args.is_empty() {
            return Err(SynthError::InvalidConfig(format!(
                "setting '{}' mixes arguments with a block",
                node.name().value()
            )));
        }
        let mut block = match node.children() {
            Some(children) => parse_block(children.nodes())?,
            None => BTreeMap::new(),
        };
        for entry in node.entries() {
            if let Some(key) = entry.name() {
                insert_setting(&mut block, key.value(), scalar(entry.value())?)?;
            }
        }
        return Ok(Setting::Block(block));
    }

    match args.as_slice() {
        [] => Ok(Setting::Bool(true)),
        [value] => scalar(value),
        values => values
            .iter()
            .map(|v| scalar(v))
            .collect::<Result<Vec<_>>>()
            .map(Setting::List),
    }
}

fn scalar(value: &KdlValue) -> Result<Setting> {
    if let Some(s) = value.as_string() {
        Ok(Setting::String(s.to_string()))
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Setting::Integer)
            .map_err(|_| SynthError::InvalidConfig(format!("integer out of range: {}", i)))
    } else if let Some(f) = value.as_float() {
        Ok(Setting::Float(f))
    } else if let Some(b) = value.as_bool() {
        Ok(Setting::Bool(b))
    } else {
        Err(SynthError::InvalidConfig("null is not a valid setting value".to_string()))
    }
}
