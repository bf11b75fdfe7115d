//! リソース定義

use super::prop::{Handle, Prop};
use std::collections::BTreeMap;

/// ユニット内で宣言されたインフラリソース
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// 論理ID（ユニット内で一意）
    logical_id: String,

    /// プロバイダのリソース型（例: "AWS::EC2::VPC"）
    resource_type: String,

    /// プロパティ
    properties: BTreeMap<String, Prop>,

    /// 同一ユニット内の他リソースへの明示的な依存
    depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// プロパティを設定
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 値がある場合のみプロパティを設定
    pub fn with_opt<V: Into<Prop>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// 同一ユニット内のリソースへの依存を追加
    pub fn depends_on(mut self, dependency: &Handle) -> Self {
        self.push_dependency(dependency.logical_id());
        self
    }

    pub(crate) fn push_dependency(&mut self, logical_id: &str) {
        if !self.depends_on.iter().any(|d| d == logical_id) {
            self.depends_on.push(logical_id.to_string());
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn properties(&self) -> &BTreeMap<String, Prop> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Prop> {
        self.properties.get(key)
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    /// プロパティから参照されている全ハンドル
    pub fn handles(&self) -> Vec<&Handle> {
        self.properties.values().flat_map(|p| p.handles()).collect()
    }
}
