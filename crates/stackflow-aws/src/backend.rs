//! Backend unit
//!
//! Queue-driven mail function, Aurora PostgreSQL serverless cluster and an
//! ECS cluster on autoscaled EC2 capacity whose service sits behind the
//! staging front target group.

use crate::load_balancer::LoadBalancerOutputs;
use crate::network::NetworkOutputs;
use crate::security::SecurityOutputs;
use crate::types;
use stackflow_core::{Handle, Output, Prop, Resource, Result, SynthError, Target, Unit};
use tracing::{debug, info};

const DB_ENGINE: &str = "aurora-postgresql";
const ECS_OPTIMIZED_AMI: &str =
    "{{resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id}}";
const SECRET_EXCLUDED_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

/// Where the processing function's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCode {
    /// Local directory, staged by the deploy tooling under `assets/<name>.zip`
    Asset { path: String },
    S3 { bucket: String, key: String },
}

impl FunctionCode {
    fn render(&self, target: &Target) -> Prop {
        match self {
            FunctionCode::Asset { path } => {
                let name = path
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or(path.as_str());
                Prop::map([
                    ("S3Bucket", Prop::from(format!("stackflow-assets-{}", target.region))),
                    ("S3Key", Prop::from(format!("assets/{}.zip", name))),
                ])
            }
            FunctionCode::S3 { bucket, key } => Prop::map([
                ("S3Bucket", Prop::from(bucket)),
                ("S3Key", Prop::from(key)),
            ]),
        }
    }
}

/// Tunables of the backend unit
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub function_code: FunctionCode,
    pub function_handler: String,
    pub function_runtime: String,
    pub function_timeout_secs: u32,
    pub batch_size: u32,
    pub queue_delay_secs: u32,
    pub db_cluster_identifier: String,
    pub db_username: String,
    pub db_subnet_group_name: String,
    pub db_min_capacity: f64,
    pub db_max_capacity: f64,
    pub instance_type: String,
    pub image_id: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub container_image: String,
    pub container_memory_mib: u32,
    pub container_port: u16,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            function_code: FunctionCode::Asset {
                path: "cdk_demo/lambda_functions".to_string(),
            },
            function_handler: "lambda_function.lambda_handler".to_string(),
            function_runtime: "python3.11".to_string(),
            function_timeout_secs: 30,
            batch_size: 10,
            queue_delay_secs: 1,
            db_cluster_identifier: "cdkdemodbdev".to_string(),
            db_username: "clusteradmin".to_string(),
            db_subnet_group_name: "subnetGroup-cdk-demo".to_string(),
            db_min_capacity: 0.5,
            db_max_capacity: 2.0,
            instance_type: "t2.micro".to_string(),
            image_id: ECS_OPTIMIZED_AMI.to_string(),
            min_capacity: 0,
            max_capacity: 2,
            container_image: "amazon/amazon-ecs-sample".to_string(),
            container_memory_mib: 256,
            container_port: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendProps {
    pub vpc: Handle,
    pub private_subnets: Vec<Handle>,
    pub security: SecurityOutputs,
    pub staging_front_tg: Handle,
    pub resource_prefix: String,
    pub environment: String,
    pub db_name: String,
    pub db_engine_version: String,
    pub settings: BackendSettings,
}

impl BackendProps {
    pub fn new(
        network: &NetworkOutputs,
        security: &SecurityOutputs,
        load_balancer: &LoadBalancerOutputs,
        resource_prefix: impl Into<String>,
        environment: impl Into<String>,
        db_name: impl Into<String>,
        db_engine_version: impl Into<String>,
    ) -> Self {
        Self {
            vpc: network.vpc.clone(),
            private_subnets: network.private_subnets.clone(),
            security: security.clone(),
            staging_front_tg: load_balancer.staging_front_tg.clone(),
            resource_prefix: resource_prefix.into(),
            environment: environment.into(),
            db_name: db_name.into(),
            db_engine_version: db_engine_version.into(),
            settings: BackendSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: BackendSettings) -> Self {
        self.settings = settings;
        self
    }

    fn qualified_name(&self) -> String {
        format!("{}-{}", self.resource_prefix, self.environment)
    }

    fn validate(&self, id: &str) -> Result<()> {
        let s = &self.settings;
        let checks = [
            (self.environment.trim().is_empty(), "environment must not be empty".to_string()),
            (self.db_name.trim().is_empty(), "database name must not be empty".to_string()),
            (
                self.db_engine_version.trim().is_empty(),
                "database engine version must not be empty".to_string(),
            ),
            (
                self.private_subnets.is_empty(),
                "the backend needs at least one private subnet".to_string(),
            ),
            (
                !(s.db_min_capacity > 0.0 && s.db_min_capacity <= s.db_max_capacity),
                format!(
                    "database capacity {}..{} is not a valid range",
                    s.db_min_capacity, s.db_max_capacity
                ),
            ),
            (
                s.min_capacity > s.max_capacity,
                format!(
                    "instance capacity {}..{} is not a valid range",
                    s.min_capacity, s.max_capacity
                ),
            ),
            (s.batch_size == 0, "batch size must be at least 1".to_string()),
        ];
        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SynthError::invalid_props(id, message)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutputs {
    pub queue: Handle,
    pub function: Handle,
    pub database_cluster: Handle,
    pub compute_cluster: Handle,
    pub service: Handle,
}

fn secret_reference(secret: &Handle, field: &str) -> Prop {
    Prop::join(
        "",
        [
            Prop::from("{{resolve:secretsmanager:"),
            Prop::from(secret),
            Prop::from(format!(":SecretString:{}}}}}", field)),
        ],
    )
}

pub fn build(id: &str, target: Target, props: &BackendProps) -> Result<(Unit, BackendOutputs)> {
    props.validate(id)?;
    let s = &props.settings;
    let sec = &props.security;
    let mut unit = Unit::new(id, target.clone());

    // Messaging
    let queue = unit.add_resource(
        Resource::new(types::SQS_QUEUE, "WorkerQueue")
            .with("QueueName", props.qualified_name())
            .with("DelaySeconds", s.queue_delay_secs),
    )?;
    let function = unit.add_resource(
        Resource::new(types::LAMBDA_FUNCTION, "SendEmailFunction")
            .with("FunctionName", format!("SendEmailFromSQS-{}", props.environment))
            .with("Handler", s.function_handler.as_str())
            .with("Runtime", s.function_runtime.as_str())
            .with("Timeout", s.function_timeout_secs)
            .with("Role", sec.roles.lambda.arn())
            .with("Code", s.function_code.render(&target)),
    )?;
    unit.add_resource(
        Resource::new(types::EVENT_SOURCE_MAPPING, "SendEmailEventSource")
            .with("EventSourceArn", queue.arn())
            .with("FunctionName", &function)
            .with("BatchSize", s.batch_size)
            .with("Enabled", true)
            // failed records stay on the queue for redelivery
            .with("FunctionResponseTypes", vec!["ReportBatchItemFailures"]),
    )?;

    // Database
    let secret = unit.add_resource(
        Resource::new(types::SECRET, "DatabaseSecret").with(
            "GenerateSecretString",
            Prop::map([
                (
                    "SecretStringTemplate",
                    Prop::from(format!(r#"{{"username":"{}"}}"#, s.db_username)),
                ),
                ("GenerateStringKey", Prop::from("password")),
                ("PasswordLength", Prop::from(30)),
                ("ExcludeCharacters", Prop::from(SECRET_EXCLUDED_CHARACTERS)),
            ]),
        ),
    )?;
    let subnet_group = unit.add_resource(
        Resource::new(types::DB_SUBNET_GROUP, "DatabaseSubnetGroup")
            .with("DBSubnetGroupName", s.db_subnet_group_name.as_str())
            .with("DBSubnetGroupDescription", "description")
            .with("SubnetIds", Prop::list(props.private_subnets.iter())),
    )?;
    let database_cluster = unit.add_resource(
        Resource::new(types::DB_CLUSTER, "DatabaseCluster")
            .with("Engine", DB_ENGINE)
            .with("EngineVersion", props.db_engine_version.as_str())
            .with("DBClusterIdentifier", s.db_cluster_identifier.as_str())
            .with("DatabaseName", props.db_name.as_str())
            .with("MasterUsername", secret_reference(&secret, "username"))
            .with("MasterUserPassword", secret_reference(&secret, "password"))
            .with("DBSubnetGroupName", &subnet_group)
            .with("VpcSecurityGroupIds", Prop::list([sec.db_group.attr("GroupId")]))
            .with(
                "ServerlessV2ScalingConfiguration",
                Prop::map([
                    ("MinCapacity", Prop::from(s.db_min_capacity)),
                    ("MaxCapacity", Prop::from(s.db_max_capacity)),
                ]),
            ),
    )?;
    unit.add_resource(
        Resource::new(types::SECRET_TARGET_ATTACHMENT, "DatabaseSecretAttachment")
            .with("SecretId", &secret)
            .with("TargetId", &database_cluster)
            .with("TargetType", types::DB_CLUSTER),
    )?;
    unit.add_resource(
        Resource::new(types::DB_INSTANCE, "DatabaseWriter")
            .with("DBClusterIdentifier", &database_cluster)
            .with("DBInstanceClass", "db.serverless")
            .with("Engine", DB_ENGINE),
    )?;

    // Compute
    let compute_cluster = unit.add_resource(
        Resource::new(types::ECS_CLUSTER, "EcsCluster").with("ClusterName", props.qualified_name()),
    )?;
    let launch_template = unit.add_resource(
        Resource::new(types::LAUNCH_TEMPLATE, "EcsLaunchTemplate").with(
            "LaunchTemplateData",
            Prop::map([
                ("ImageId", Prop::from(s.image_id.as_str())),
                ("InstanceType", Prop::from(s.instance_type.as_str())),
                (
                    "IamInstanceProfile",
                    Prop::map([("Arn", Prop::from(sec.instance_profile.arn()))]),
                ),
                ("SecurityGroupIds", Prop::list([sec.ecs_group.attr("GroupId")])),
                (
                    "UserData",
                    Prop::base64(Prop::join(
                        "",
                        [
                            Prop::from("#!/bin/bash\necho ECS_CLUSTER="),
                            Prop::from(&compute_cluster),
                            Prop::from(" >> /etc/ecs/ecs.config\n"),
                        ],
                    )),
                ),
            ]),
        ),
    )?;
    let autoscaling_group = unit.add_resource(
        Resource::new(types::AUTOSCALING_GROUP, "EcsAutoScalingGroup")
            .with("MinSize", s.min_capacity.to_string())
            .with("MaxSize", s.max_capacity.to_string())
            .with(
                "LaunchTemplate",
                Prop::map([
                    ("LaunchTemplateId", Prop::from(&launch_template)),
                    ("Version", Prop::from(launch_template.attr("LatestVersionNumber"))),
                ]),
            )
            .with("VPCZoneIdentifier", Prop::list(props.private_subnets.iter())),
    )?;
    let capacity_provider = unit.add_resource(
        Resource::new(types::CAPACITY_PROVIDER, "AsgCapacityProvider").with(
            "AutoScalingGroupProvider",
            Prop::map([
                ("AutoScalingGroupArn", Prop::from(&autoscaling_group)),
                (
                    "ManagedScaling",
                    Prop::map([
                        ("Status", Prop::from("ENABLED")),
                        ("TargetCapacity", Prop::from(100)),
                    ]),
                ),
                ("ManagedTerminationProtection", Prop::from("DISABLED")),
            ]),
        ),
    )?;
    let associations = unit.add_resource(
        Resource::new(
            types::CLUSTER_CAPACITY_PROVIDER_ASSOCIATIONS,
            "EcsClusterCapacityProviders",
        )
        .with("Cluster", &compute_cluster)
        .with("CapacityProviders", Prop::list([&capacity_provider]))
        .with("DefaultCapacityProviderStrategy", Prop::List(Vec::new())),
    )?;
    let task_definition = unit.add_resource(
        Resource::new(types::TASK_DEFINITION, "FrontendTaskDef")
            .with("NetworkMode", "bridge")
            .with("RequiresCompatibilities", Prop::list(["EC2"]))
            .with("TaskRoleArn", sec.roles.ecs_task.arn())
            .with(
                "ContainerDefinitions",
                Prop::list([Prop::map([
                    ("Name", Prop::from("web")),
                    ("Image", Prop::from(s.container_image.as_str())),
                    ("Memory", Prop::from(s.container_memory_mib)),
                    ("Essential", Prop::from(true)),
                    (
                        "PortMappings",
                        Prop::list([Prop::map([
                            ("ContainerPort", Prop::from(s.container_port)),
                            ("Protocol", Prop::from("tcp")),
                        ])]),
                    ),
                ])]),
            ),
    )?;

    // Attaching the service to the target group comes last
    let service = unit.add_resource(
        Resource::new(types::ECS_SERVICE, "EC2Service")
            .with("Cluster", &compute_cluster)
            .with("TaskDefinition", &task_definition)
            .with(
                "CapacityProviderStrategy",
                Prop::list([Prop::map([
                    ("CapacityProvider", Prop::from(&capacity_provider)),
                    ("Weight", Prop::from(1)),
                ])]),
            )
            .with(
                "LoadBalancers",
                Prop::list([Prop::map([
                    ("ContainerName", Prop::from("web")),
                    ("ContainerPort", Prop::from(s.container_port)),
                    ("TargetGroupArn", Prop::from(&props.staging_front_tg)),
                ])]),
            )
            .depends_on(&associations),
    )?;

    unit.add_output("QueueUrl", Output::new(&queue))?;
    unit.add_output(
        "DatabaseEndpoint",
        Output::new(database_cluster.attr("Endpoint.Address")),
    )?;

    info!(
        unit = %id,
        queue = %props.qualified_name(),
        engine_version = %props.db_engine_version,
        "Declared backend"
    );
    debug!(unit = %id, resources = unit.resources().len(), "Backend unit complete");

    let outputs = BackendOutputs {
        queue,
        function,
        database_cluster,
        compute_cluster,
        service,
    };
    Ok((unit, outputs))
}
