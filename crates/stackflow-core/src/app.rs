//! App: 1デプロイ分のユニットとその依存関係

use crate::assembly::Assembly;
use crate::error::{Result, SynthError};
use crate::graph::DependencyGraph;
use crate::model::{Unit, validate_unit_id};
use crate::synth;
use tracing::info;

/// デプロイの全ユニットを保持するコンポジションルート
///
/// ユニットは依存順に追加する。参照できるのは先に追加されたユニットの
/// ハンドルのみなので、ユニットグラフはDAGに保たれる。
#[derive(Debug, Default)]
pub struct App {
    units: Vec<Unit>,
    explicit: Vec<(String, String)>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// 構築済みのユニットを追加
    pub fn add_unit(&mut self, unit: Unit) -> Result<()> {
        validate_unit_id(unit.id())?;
        if self.units.iter().any(|u| u.id() == unit.id()) {
            return Err(SynthError::DuplicateUnit {
                id: unit.id().to_string(),
                target: unit.target().to_string(),
            });
        }

        for handle in unit.foreign_handles() {
            let producer = self
                .unit(handle.unit())
                .ok_or_else(|| SynthError::ForwardReference {
                    unit: unit.id().to_string(),
                    referenced: handle.unit().to_string(),
                })?;

            if producer.target() != unit.target() {
                return Err(SynthError::CrossTargetReference {
                    unit: unit.id().to_string(),
                    unit_target: unit.target().to_string(),
                    referenced: producer.id().to_string(),
                    referenced_target: producer.target().to_string(),
                    logical_id: handle.logical_id().to_string(),
                });
            }

            if !producer.contains(handle.logical_id()) {
                return Err(SynthError::UnresolvedReference {
                    unit: unit.id().to_string(),
                    logical_id: handle.logical_id().to_string(),
                    owner: producer.id().to_string(),
                });
            }
        }

        info!(
            unit = %unit.id(),
            target = %unit.target(),
            resources = unit.resources().len(),
            "Added unit"
        );
        self.units.push(unit);
        Ok(())
    }

    /// データ参照のない2ユニット間に順序を追加
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        for id in [dependent, dependency] {
            if self.unit(id).is_none() {
                return Err(SynthError::UnitNotFound(id.to_string()));
            }
        }

        let mut graph = self.dependency_graph();
        graph.add_edge(dependent, dependency);
        if let Some(cycle) = graph.find_cycle() {
            return Err(SynthError::CircularDependency(cycle.join(" -> ")));
        }

        self.explicit
            .push((dependent.to_string(), dependency.to_string()));
        Ok(())
    }

    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.id() == id)
    }

    /// 追加順のユニット一覧
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// ユニット間ハンドルと明示的な依存からユニットグラフを構築
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for unit in &self.units {
            graph.add_node(unit.id());
            for referenced in unit.referenced_units() {
                graph.add_edge(unit.id(), referenced);
            }
        }
        for (dependent, dependency) in &self.explicit {
            graph.add_edge(dependent.as_str(), dependency.as_str());
        }
        graph
    }

    /// 依存先が先に来るよう並べたユニット一覧
    pub fn deployment_order(&self) -> Result<Vec<&Unit>> {
        self.dependency_graph()
            .topological_order()?
            .iter()
            .map(|id| {
                self.unit(id)
                    .ok_or_else(|| SynthError::UnitNotFound(id.clone()))
            })
            .collect()
    }

    /// 全ユニットをテンプレートに合成
    pub fn synth(&self) -> Result<Assembly> {
        synth::synthesize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ForeignRef, Handle, Resource, Target};

    fn primary() -> Target {
        Target::new("us-east-1").with_account("445362076974")
    }

    fn network(id: &str, target: Target) -> (Unit, Handle) {
        let mut unit = Unit::new(id, target);
        let vpc = unit
            .add_resource(Resource::new("AWS::EC2::VPC", "Vpc").with("CidrBlock", "10.0.0.0/16"))
            .unwrap();
        (unit, vpc)
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut app = App::new();
        app.add_unit(network("network", primary()).0).unwrap();

        let err = app.add_unit(network("network", primary()).0).unwrap_err();
        assert!(matches!(err, SynthError::DuplicateUnit { .. }));
    }

    #[test]
    fn test_unit_id_outside_allowed_characters_rejected() {
        let mut app = App::new();
        for id in ["../x", "a b"] {
            let err = app.add_unit(network(id, primary()).0).unwrap_err();
            assert!(matches!(err, SynthError::InvalidUnitId(_)), "{}", id);
        }
        assert!(app.units().is_empty());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let (_, vpc) = network("network", primary());
        let mut security = Unit::new("security", primary());
        security
            .add_resource(Resource::new("AWS::EC2::SecurityGroup", "ALBSG").with("VpcId", &vpc))
            .unwrap();

        let mut app = App::new();
        let err = app.add_unit(security).unwrap_err();
        assert!(matches!(err, SynthError::ForwardReference { ref referenced, .. } if referenced == "network"));
    }

    #[test]
    fn test_cross_target_handle_rejected() {
        let (net, vpc) = network("network", primary());
        let mut replica = Unit::new("replication", Target::new("us-west-2"));
        replica
            .add_resource(Resource::new("AWS::EC2::SecurityGroup", "Group").with("VpcId", &vpc))
            .unwrap();

        let mut app = App::new();
        app.add_unit(net).unwrap();
        let err = app.add_unit(replica).unwrap_err();
        assert!(matches!(err, SynthError::CrossTargetReference { .. }));
    }

    #[test]
    fn test_foreign_ref_crosses_targets() {
        let (net, _) = network("network", primary());
        let mut replica = Unit::new("replication", Target::new("us-west-2"));
        replica
            .add_resource(
                Resource::new("AWS::RDS::DBCluster", "Cluster")
                    .with("VpcSecurityGroupIds", vec![ForeignRef::new("sg-0abc", primary())]),
            )
            .unwrap();

        let mut app = App::new();
        app.add_unit(net).unwrap();
        app.add_unit(replica).unwrap();
        assert_eq!(app.units().len(), 2);
    }

    #[test]
    fn test_unknown_logical_id_in_producer_rejected() {
        let (net, _) = network("network", primary());
        let mut security = Unit::new("security", primary());
        security
            .add_resource(
                Resource::new("AWS::EC2::SecurityGroup", "ALBSG")
                    .with("VpcId", Handle::new("network", "MissingVpc")),
            )
            .unwrap();

        let mut app = App::new();
        app.add_unit(net).unwrap();
        let err = app.add_unit(security).unwrap_err();
        assert!(matches!(err, SynthError::UnresolvedReference { ref owner, .. } if owner == "network"));
    }

    #[test]
    fn test_deployment_order_and_explicit_edges() {
        let (net, vpc) = network("network", primary());
        let mut security = Unit::new("security", primary());
        security
            .add_resource(Resource::new("AWS::EC2::SecurityGroup", "ALBSG").with("VpcId", &vpc))
            .unwrap();
        let monitoring = Unit::new("monitoring", primary());

        let mut app = App::new();
        app.add_unit(monitoring).unwrap();
        app.add_unit(net).unwrap();
        app.add_unit(security).unwrap();
        app.add_dependency("monitoring", "security").unwrap();

        let order: Vec<&str> = app.deployment_order().unwrap().iter().map(|u| u.id()).collect();
        assert_eq!(order, ["network", "security", "monitoring"]);

        let err = app.add_dependency("network", "monitoring").unwrap_err();
        assert!(matches!(err, SynthError::CircularDependency(_)));
        assert!(matches!(
            app.add_dependency("network", "missing"),
            Err(SynthError::UnitNotFound(_))
        ));
    }
}
