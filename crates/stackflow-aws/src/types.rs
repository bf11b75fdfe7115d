//! CloudFormation resource type names

pub const VPC: &str = "AWS::EC2::VPC";
pub const SUBNET: &str = "AWS::EC2::Subnet";
pub const INTERNET_GATEWAY: &str = "AWS::EC2::InternetGateway";
pub const VPC_GATEWAY_ATTACHMENT: &str = "AWS::EC2::VPCGatewayAttachment";
pub const ROUTE_TABLE: &str = "AWS::EC2::RouteTable";
pub const ROUTE: &str = "AWS::EC2::Route";
pub const SUBNET_ROUTE_TABLE_ASSOCIATION: &str = "AWS::EC2::SubnetRouteTableAssociation";
pub const EIP: &str = "AWS::EC2::EIP";
pub const NAT_GATEWAY: &str = "AWS::EC2::NatGateway";
pub const SECURITY_GROUP: &str = "AWS::EC2::SecurityGroup";
pub const LAUNCH_TEMPLATE: &str = "AWS::EC2::LaunchTemplate";

pub const IAM_ROLE: &str = "AWS::IAM::Role";
pub const INSTANCE_PROFILE: &str = "AWS::IAM::InstanceProfile";

pub const LOAD_BALANCER: &str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
pub const TARGET_GROUP: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";
pub const LISTENER: &str = "AWS::ElasticLoadBalancingV2::Listener";
pub const LISTENER_RULE: &str = "AWS::ElasticLoadBalancingV2::ListenerRule";

pub const SQS_QUEUE: &str = "AWS::SQS::Queue";
pub const LAMBDA_FUNCTION: &str = "AWS::Lambda::Function";
pub const EVENT_SOURCE_MAPPING: &str = "AWS::Lambda::EventSourceMapping";

pub const SECRET: &str = "AWS::SecretsManager::Secret";
pub const SECRET_TARGET_ATTACHMENT: &str = "AWS::SecretsManager::SecretTargetAttachment";
pub const DB_SUBNET_GROUP: &str = "AWS::RDS::DBSubnetGroup";
pub const DB_CLUSTER: &str = "AWS::RDS::DBCluster";
pub const DB_INSTANCE: &str = "AWS::RDS::DBInstance";

pub const ECS_CLUSTER: &str = "AWS::ECS::Cluster";
pub const CAPACITY_PROVIDER: &str = "AWS::ECS::CapacityProvider";
pub const CLUSTER_CAPACITY_PROVIDER_ASSOCIATIONS: &str =
    "AWS::ECS::ClusterCapacityProviderAssociations";
pub const TASK_DEFINITION: &str = "AWS::ECS::TaskDefinition";
pub const ECS_SERVICE: &str = "AWS::ECS::Service";
pub const AUTOSCALING_GROUP: &str = "AWS::AutoScaling::AutoScalingGroup";

pub const KMS_KEY: &str = "AWS::KMS::Key";
pub const KMS_ALIAS: &str = "AWS::KMS::Alias";
