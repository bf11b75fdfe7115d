//! パース済みのデプロイメント定義
//!
//! [`Deployment`] はユニット構築前のKDLファイルの内容。名前付きターゲットと、
//! ユニットノードごとの [`UnitSpec`]（他ユニットへの名前参照である入力と自由形式の設定）を持つ。

use super::target::Target;
use crate::error::{Result, SynthError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Deployment {
    /// プロジェクト名
    pub project: String,

    /// 名前付きデプロイターゲット
    pub targets: BTreeMap<String, Target>,

    /// ファイル記述順のユニット定義
    pub units: Vec<UnitSpec>,
}

impl Deployment {
    pub fn unit(&self, name: &str) -> Option<&UnitSpec> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn units_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a UnitSpec> + 'a {
        self.units.iter().filter(move |u| u.kind == kind)
    }
}

/// デプロイメントファイルのユニットノード1つ分
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    /// ノード名（network, security, load-balancer, backend, replication）
    pub kind: String,

    /// ユニットID
    pub name: String,

    /// 紐づくターゲット名
    pub target_name: String,

    /// 解決済みターゲット
    pub target: Target,

    /// 入力名 -> 出力元ユニット名
    pub inputs: BTreeMap<String, String>,

    /// ユニットの子ノード
    pub settings: BTreeMap<String, Setting>,
}

impl UnitSpec {
    pub fn input(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).map(String::as_str)
    }

    pub fn require_input(&self, key: &str) -> Result<&str> {
        self.input(key).ok_or_else(|| {
            SynthError::invalid_props(&self.name, format!("missing input '{}'", key))
        })
    }

    pub fn settings(&self) -> Settings<'_> {
        Settings {
            unit: &self.name,
            entries: &self.settings,
        }
    }
}

/// 設定ノードの値
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Setting>),
    Block(BTreeMap<String, Setting>),
}

impl Setting {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Setting::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Setting::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Setting::Float(f) => Some(*f),
            Setting::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Setting::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Setting::String(_) => "a string",
            Setting::Integer(_) => "an integer",
            Setting::Float(_) => "a number",
            Setting::Bool(_) => "a boolean",
            Setting::List(_) => "a list",
            Setting::Block(_) => "a block",
        }
    }
}

/// 設定ブロックへの型付きアクセス
///
/// キーがなければ `Ok(None)`、型が違えばユニット名付きの `InvalidProps` エラーを返す。
#[derive(Debug, Clone, Copy)]
pub struct Settings<'a> {
    unit: &'a str,
    entries: &'a BTreeMap<String, Setting>,
}

impl<'a> Settings<'a> {
    pub fn keys(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&'a Setting> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn mismatch(&self, key: &str, expected: &str, found: &Setting) -> SynthError {
        SynthError::invalid_props(
            self.unit,
            format!(
                "setting '{}' must be {}, found {}",
                key,
                expected,
                found.kind()
            ),
        )
    }

    pub fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Setting::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?.ok_or_else(|| {
            SynthError::invalid_props(self.unit, format!("missing setting '{}'", key))
        })
    }

    /// 文字列リスト（単一の文字列は要素1つのリストとして扱う）
    pub fn str_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Setting::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Setting::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.mismatch(key, "a list of strings", item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(self.mismatch(key, "a list of strings", other)),
        }
    }

    pub fn i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Setting::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(self.mismatch(key, "an integer", other)),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(setting) => setting
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.mismatch(key, "a number", setting)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Setting::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(key, "a boolean", other)),
        }
    }

    pub fn block(&self, key: &str) -> Result<Option<Settings<'a>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Setting::Block(entries)) => Ok(Some(Settings {
                unit: self.unit,
                entries,
            })),
            Some(other) => Err(self.mismatch(key, "a block", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> UnitSpec {
        let mut health = BTreeMap::new();
        health.insert("interval".to_string(), Setting::Integer(30));
        health.insert("path".to_string(), Setting::String("/".to_string()));

        let mut settings = BTreeMap::new();
        settings.insert(
            "zones".to_string(),
            Setting::List(vec![
                Setting::String("us-east-1a".to_string()),
                Setting::String("us-east-1b".to_string()),
            ]),
        );
        settings.insert("cidr".to_string(), Setting::String("10.0.0.0/16".to_string()));
        settings.insert("min-capacity".to_string(), Setting::Integer(1));
        settings.insert("health-check".to_string(), Setting::Block(health));

        let mut inputs = BTreeMap::new();
        inputs.insert("network".to_string(), "cdk-demo-NetworkStack".to_string());

        UnitSpec {
            kind: "backend".to_string(),
            name: "cdk-demo-BackendStack".to_string(),
            target_name: "primary".to_string(),
            target: Target::new("us-east-1"),
            inputs,
            settings,
        }
    }

    #[test]
    fn test_typed_getters() {
        let spec = spec();
        let settings = spec.settings();

        assert_eq!(settings.require_str("cidr").unwrap(), "10.0.0.0/16");
        assert_eq!(settings.str_list("zones").unwrap().unwrap().len(), 2);
        assert_eq!(settings.str_list("cidr").unwrap().unwrap(), ["10.0.0.0/16"]);
        assert_eq!(settings.f64("min-capacity").unwrap(), Some(1.0));
        assert_eq!(settings.i64("missing").unwrap(), None);

        let health = settings.block("health-check").unwrap().unwrap();
        assert_eq!(health.i64("interval").unwrap(), Some(30));
        assert_eq!(health.keys().collect::<Vec<_>>(), ["interval", "path"]);
    }

    #[test]
    fn test_type_mismatch_names_unit_and_key() {
        let spec = spec();
        let err = spec.settings().i64("cidr").unwrap_err();
        let message = err.to_string();

        assert!(message.contains("cdk-demo-BackendStack"));
        assert!(message.contains("'cidr' must be an integer"));
        assert!(spec.settings().require_str("db-name").is_err());
    }

    #[test]
    fn test_inputs() {
        let spec = spec();
        assert_eq!(spec.require_input("network").unwrap(), "cdk-demo-NetworkStack");
        assert!(matches!(
            spec.require_input("security"),
            Err(SynthError::InvalidProps { .. })
        ));
    }
}
