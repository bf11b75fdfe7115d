//! ユニット（デプロイスタック）

use super::prop::{Handle, Prop};
use super::resource::Resource;
use super::target::Target;
use crate::error::{Result, SynthError};
use crate::graph::DependencyGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// ユニットが公開する出力
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Prop,
    pub export_name: Option<String>,
    pub description: Option<String>,
}

impl Output {
    pub fn new(value: impl Into<Prop>) -> Self {
        Self {
            value: value.into(),
            export_name: None,
            description: None,
        }
    }

    pub fn with_export(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 1つのターゲットに紐づく名前付きのプロビジョニング単位
///
/// リソースは宣言順に追加され、参照できるのは先に宣言されたリソースのみ。
/// そのためユニット内の参照グラフは常に非巡回。後から追加する明示的な依存は循環チェックを通す。
#[derive(Debug, Clone)]
pub struct Unit {
    id: String,
    target: Target,
    description: Option<String>,
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    outputs: BTreeMap<String, Output>,
}

impl Unit {
    pub fn new(id: impl Into<String>, target: Target) -> Self {
        Self {
            id: id.into(),
            target,
            description: None,
            resources: Vec::new(),
            index: HashMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.index.get(logical_id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.index.contains_key(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type() == resource_type)
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// 存在を確認せずにこのユニットの論理IDへのハンドルを作成
    ///
    /// 参照先が先に宣言されていなければ、このハンドルを使うリソースの宣言は失敗する。
    pub fn reference(&self, logical_id: impl Into<String>) -> Handle {
        Handle::new(self.id.clone(), logical_id)
    }

    /// リソースを宣言してハンドルを返す
    pub fn add_resource(&mut self, resource: Resource) -> Result<Handle> {
        let logical_id = resource.logical_id().to_string();
        if !is_logical_id(&logical_id) {
            return Err(SynthError::InvalidLogicalId {
                unit: self.id.clone(),
                logical_id,
            });
        }
        if self.index.contains_key(&logical_id) {
            return Err(SynthError::DuplicateLogicalId {
                unit: self.id.clone(),
                logical_id,
            });
        }

        for handle in resource.handles() {
            self.check_local(handle.unit(), handle.logical_id())?;
        }
        for dependency in resource.dependencies() {
            self.check_local(&self.id, dependency)?;
        }

        debug!(
            unit = %self.id,
            logical_id = %logical_id,
            resource_type = %resource.resource_type(),
            "Declared resource"
        );
        self.index.insert(logical_id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(Handle::new(self.id.clone(), logical_id))
    }

    /// ユニット内の2リソース間に明示的な依存を追加
    pub fn add_dependency(&mut self, dependent: &Handle, dependency: &Handle) -> Result<()> {
        for handle in [dependent, dependency] {
            if handle.unit() != self.id {
                return Err(SynthError::InvalidConfig(format!(
                    "explicit dependency {} -> {} crosses unit '{}'",
                    dependent, dependency, self.id
                )));
            }
            self.check_local(handle.unit(), handle.logical_id())?;
        }

        let mut graph = self.local_graph();
        graph.add_edge(dependent.logical_id(), dependency.logical_id());
        if let Some(cycle) = graph.find_cycle() {
            return Err(SynthError::CircularDependency(format!(
                "{}: {}",
                self.id,
                cycle.join(" -> ")
            )));
        }

        let idx = self.index[dependent.logical_id()];
        self.resources[idx].push_dependency(dependency.logical_id());
        debug!(
            unit = %self.id,
            dependent = %dependent.logical_id(),
            dependency = %dependency.logical_id(),
            "Added explicit dependency"
        );
        Ok(())
    }

    /// 名前付き出力を公開
    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::InvalidConfig(format!(
                "output '{}' is already defined in unit '{}'",
                name, self.id
            )));
        }
        for handle in output.value.handles() {
            self.check_local(handle.unit(), handle.logical_id())?;
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    /// リソースと出力に含まれる他ユニットへのハンドル
    pub fn foreign_handles(&self) -> Vec<&Handle> {
        self.resources
            .iter()
            .flat_map(|r| r.handles())
            .chain(self.outputs.values().flat_map(|o| o.value.handles()))
            .filter(|h| h.unit() != self.id)
            .collect()
    }

    /// 参照先ユニットのID
    pub fn referenced_units(&self) -> BTreeSet<String> {
        self.foreign_handles()
            .into_iter()
            .map(|h| h.unit().to_string())
            .collect()
    }

    /// ユニット内のリソースグラフ（参照と明示的な依存）
    pub fn local_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for resource in &self.resources {
            graph.add_node(resource.logical_id());
            for handle in resource.handles() {
                if handle.unit() == self.id {
                    graph.add_edge(resource.logical_id(), handle.logical_id());
                }
            }
            for dependency in resource.dependencies() {
                graph.add_edge(resource.logical_id(), dependency);
            }
        }
        graph
    }

    fn check_local(&self, unit: &str, logical_id: &str) -> Result<()> {
        if unit == self.id && !self.index.contains_key(logical_id) {
            return Err(SynthError::UnresolvedReference {
                unit: self.id.clone(),
                logical_id: logical_id.to_string(),
                owner: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// ユニットIDの検証
///
/// IDはテンプレートのファイル名とスタック名になるため `[A-Za-z][A-Za-z0-9-]*` に限る
pub fn validate_unit_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SynthError::InvalidUnitId(id.to_string()))
    }
}

fn is_logical_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}
