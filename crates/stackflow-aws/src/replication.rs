//! Replication unit: secondary Aurora cluster joined to a global database
//!
//! Lives in a different target than the primary cluster, so the only values
//! it shares with the primary side are the global cluster identifier and raw
//! identifiers carried as [`ForeignRef`]s.

use crate::types;
use stackflow_core::{ForeignRef, Handle, Prop, Resource, Result, SynthError, Target, Unit};
use tracing::{debug, warn};

pub const DEFAULT_KEY_ALIAS: &str = "alias/rds_replication_key";

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationProps {
    /// Private subnets of the secondary target's network
    pub private_subnets: Vec<Handle>,
    pub security_group: ForeignRef,
    pub global_cluster_identifier: String,
    pub engine_version: String,
    pub cluster_identifier: String,
    pub key_alias: String,
    pub backup_retention_days: u32,
    pub min_capacity: f64,
    pub max_capacity: f64,
}

impl ReplicationProps {
    pub fn new(
        private_subnets: Vec<Handle>,
        security_group: ForeignRef,
        global_cluster_identifier: impl Into<String>,
        engine_version: impl Into<String>,
        cluster_identifier: impl Into<String>,
    ) -> Self {
        Self {
            private_subnets,
            security_group,
            global_cluster_identifier: global_cluster_identifier.into(),
            engine_version: engine_version.into(),
            cluster_identifier: cluster_identifier.into(),
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            backup_retention_days: 7,
            min_capacity: 1.0,
            max_capacity: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationOutputs {
    pub key: Handle,
    pub subnet_group: Handle,
    pub cluster: Handle,
    pub instance: Handle,
}

pub fn build(
    id: &str,
    target: Target,
    props: &ReplicationProps,
) -> Result<(Unit, ReplicationOutputs)> {
    if props.private_subnets.is_empty() {
        return Err(SynthError::invalid_props(id, "no private subnets given"));
    }
    if props.global_cluster_identifier.trim().is_empty() {
        return Err(SynthError::invalid_props(
            id,
            "global cluster identifier must not be empty",
        ));
    }
    if !(props.min_capacity > 0.0 && props.min_capacity <= props.max_capacity) {
        return Err(SynthError::invalid_props(
            id,
            format!(
                "capacity {}..{} is not a valid range",
                props.min_capacity, props.max_capacity
            ),
        ));
    }
    if props.security_group.origin() == &target {
        warn!(
            unit = %id,
            value = %props.security_group.value(),
            "Foreign reference originates in the unit's own target"
        );
    }

    let mut unit = Unit::new(id, target);

    let key = unit.add_resource(
        Resource::new(types::KMS_KEY, "dbreplicakey")
            .with("Description", "KMS key for database encryption")
            .with("EnableKeyRotation", true),
    )?;
    unit.add_resource(
        Resource::new(types::KMS_ALIAS, "dbreplicakeyAlias")
            .with("AliasName", props.key_alias.as_str())
            .with("TargetKeyId", &key),
    )?;

    let subnet_group = unit.add_resource(
        Resource::new(types::DB_SUBNET_GROUP, "AuroraSubnetGroup")
            .with("DBSubnetGroupDescription", "Subnet group for Aurora database")
            .with("SubnetIds", Prop::list(props.private_subnets.iter())),
    )?;

    let cluster = unit.add_resource(
        Resource::new(types::DB_CLUSTER, "itfolderDBCluster")
            .with("Engine", "aurora-postgresql")
            .with("EngineVersion", props.engine_version.as_str())
            .with("DBClusterIdentifier", props.cluster_identifier.as_str())
            .with("GlobalClusterIdentifier", props.global_cluster_identifier.as_str())
            .with("AutoMinorVersionUpgrade", false)
            .with("BackupRetentionPeriod", props.backup_retention_days)
            .with("StorageEncrypted", true)
            .with("KmsKeyId", key.arn())
            .with("EnableCloudwatchLogsExports", Prop::list(["postgresql"]))
            .with("Port", 5432)
            .with("DBSubnetGroupName", &subnet_group)
            .with("VpcSecurityGroupIds", Prop::list([&props.security_group]))
            .with(
                "ServerlessV2ScalingConfiguration",
                Prop::map([
                    ("MinCapacity", Prop::from(props.min_capacity)),
                    ("MaxCapacity", Prop::from(props.max_capacity)),
                ]),
            ),
    )?;
    let instance = unit.add_resource(
        Resource::new(types::DB_INSTANCE, "AuroraDBInstance")
            .with("DBClusterIdentifier", &cluster)
            .with("DBInstanceClass", "db.serverless")
            .with("Engine", "aurora-postgresql"),
    )?;

    unit.add_dependency(&cluster, &subnet_group)?;
    unit.add_dependency(&instance, &subnet_group)?;

    debug!(
        unit = %id,
        global_cluster = %props.global_cluster_identifier,
        "Declared replication unit"
    );

    let outputs = ReplicationOutputs {
        key,
        subnet_group,
        cluster,
        instance,
    };
    Ok((unit, outputs))
}
