//! Security unit
//!
//! IAM roles for the services of the backend, an instance profile for the
//! container hosts, and the ALBSG -> ECSSG -> DBSG security group chain.

use crate::network::NetworkOutputs;
use crate::types;
use stackflow_core::{Handle, Output, Prop, Resource, Result, SynthError, Target, Unit};
use tracing::{debug, warn};

const POLICY_VERSION: &str = "2012-10-17";

/// Trust principal and inline policy of one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    /// Service principal allowed to assume the role
    pub principal: String,
    pub policy_name: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl RolePolicy {
    pub fn new(principal: &str, policy_name: &str, actions: &[&str]) -> Self {
        Self {
            principal: principal.to_string(),
            policy_name: policy_name.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: vec!["*".to_string()],
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    /// Actions that grant a whole service (`svc:*` or `*`) on every resource
    pub fn wildcard_actions(&self) -> Vec<&str> {
        if !self.resources.iter().any(|r| r == "*") {
            return Vec::new();
        }
        self.actions
            .iter()
            .map(String::as_str)
            .filter(|a| *a == "*" || a.ends_with(":*"))
            .collect()
    }

    fn to_role(&self, logical_id: &str) -> Resource {
        let assume = Prop::map([
            ("Version", Prop::from(POLICY_VERSION)),
            (
                "Statement",
                Prop::list([Prop::map([
                    ("Action", Prop::from("sts:AssumeRole")),
                    ("Effect", Prop::from("Allow")),
                    (
                        "Principal",
                        Prop::map([("Service", Prop::from(self.principal.as_str()))]),
                    ),
                ])]),
            ),
        ]);
        let policy = Prop::map([
            ("PolicyName", Prop::from(self.policy_name.as_str())),
            (
                "PolicyDocument",
                Prop::map([
                    ("Version", Prop::from(POLICY_VERSION)),
                    (
                        "Statement",
                        Prop::list([Prop::map([
                            ("Action", Prop::list(self.actions.iter())),
                            ("Effect", Prop::from("Allow")),
                            ("Resource", resource_prop(&self.resources)),
                        ])]),
                    ),
                ]),
            ),
        ]);

        Resource::new(types::IAM_ROLE, logical_id)
            .with("AssumeRolePolicyDocument", assume)
            .with("Policies", Prop::list([policy]))
    }
}

fn resource_prop(resources: &[String]) -> Prop {
    match resources {
        [single] => Prop::from(single),
        many => Prop::list(many.iter()),
    }
}

/// Policy configuration of every role the security unit declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicies {
    pub ecs_task: RolePolicy,
    pub ecs_service: RolePolicy,
    pub autoscaling: RolePolicy,
    pub lambda: RolePolicy,
    pub ec2: RolePolicy,
}

impl Default for RolePolicies {
    fn default() -> Self {
        Self {
            ecs_task: RolePolicy::new(
                "ecs-tasks.amazonaws.com",
                "ECSTaskPolicy",
                &[
                    "sqs:*",
                    "logs:*",
                    "s3:*",
                    "rds:*",
                    "ecr:*",
                    "secretsmanager:*",
                    "quicksight:GetDashboardEmbedUrl",
                    "quicksight:GetAuthCode",
                    "iam:PassRole",
                ],
            ),
            ecs_service: RolePolicy::new(
                "ecs.amazonaws.com",
                "ECSServicePolicy",
                &[
                    "elasticloadbalancing:*",
                    "secretsmanager:*",
                    "ec2:*",
                    "sqs:*",
                    "s3:*",
                ],
            ),
            autoscaling: RolePolicy::new(
                "application-autoscaling.amazonaws.com",
                "AutoscalingPolicy",
                &["application-autoscaling:*", "cloudwatch:*", "ecs:*", "ec2:*"],
            ),
            lambda: RolePolicy::new(
                "lambda.amazonaws.com",
                "LambdaPolicy",
                &[
                    "cloudwatch:*",
                    "logs:*",
                    "ec2:*",
                    "sqs:*",
                    "sns:*",
                    "rds:*",
                    "lambda:*",
                ],
            ),
            ec2: RolePolicy::new(
                "ec2.amazonaws.com",
                "EC2ServicePolicy",
                &[
                    "ecs:*",
                    "sqs:*",
                    "ecr:*",
                    "logs:*",
                    "elasticloadbalancing:*",
                    "s3:*",
                    "cloudwatch:*",
                    "rds:*",
                    "ec2:*",
                    "iam:PassRole",
                    "kinesis:*",
                ],
            ),
        }
    }
}

impl RolePolicies {
    /// Role logical ids paired with their policy, in declaration order
    pub fn entries(&self) -> [(&'static str, &RolePolicy); 5] {
        [
            ("ECSTaskRole", &self.ecs_task),
            ("ECSServiceRole", &self.ecs_service),
            ("AutoscalingRole", &self.autoscaling),
            ("LambdaRole", &self.lambda),
            ("EC2Role", &self.ec2),
        ]
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut RolePolicy> {
        match key {
            "ecs-task" => Some(&mut self.ecs_task),
            "ecs-service" => Some(&mut self.ecs_service),
            "autoscaling" => Some(&mut self.autoscaling),
            "lambda" => Some(&mut self.lambda),
            "ec2" => Some(&mut self.ec2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityProps {
    pub vpc: Handle,
    pub vpc_cidr: Handle,
    pub policies: RolePolicies,
}

impl SecurityProps {
    pub fn new(network: &NetworkOutputs) -> Self {
        Self {
            vpc: network.vpc.clone(),
            vpc_cidr: network.vpc_cidr.clone(),
            policies: RolePolicies::default(),
        }
    }

    pub fn with_policies(mut self, policies: RolePolicies) -> Self {
        self.policies = policies;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Roles {
    pub ecs_task: Handle,
    pub ecs_service: Handle,
    pub autoscaling: Handle,
    pub lambda: Handle,
    pub ec2: Handle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityOutputs {
    pub roles: Roles,
    pub instance_profile: Handle,
    pub alb_group: Handle,
    pub ecs_group: Handle,
    pub db_group: Handle,
}

/// Source of an ingress rule
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    AnyIpv4,
    /// A CIDR literal or a handle resolving to one
    Cidr(Prop),
    Group(Handle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngressRule {
    pub peer: Peer,
    pub from_port: u16,
    pub to_port: u16,
    pub description: String,
}

impl IngressRule {
    pub fn tcp(peer: Peer, port: u16, description: impl Into<String>) -> Self {
        Self::tcp_range(peer, port, port, description)
    }

    pub fn tcp_range(peer: Peer, from: u16, to: u16, description: impl Into<String>) -> Self {
        Self {
            peer,
            from_port: from,
            to_port: to,
            description: description.into(),
        }
    }

    fn to_prop(&self) -> Prop {
        let source = match &self.peer {
            Peer::AnyIpv4 => ("CidrIp", Prop::from("0.0.0.0/0")),
            Peer::Cidr(cidr) => ("CidrIp", cidr.clone()),
            Peer::Group(group) => ("SourceSecurityGroupId", Prop::from(group.attr("GroupId"))),
        };
        Prop::map([
            ("IpProtocol", Prop::from("tcp")),
            ("FromPort", Prop::from(self.from_port)),
            ("ToPort", Prop::from(self.to_port)),
            ("Description", Prop::from(self.description.as_str())),
            source,
        ])
    }
}

/// Declare a security group with all outbound traffic allowed
///
/// A rule whose peer is a group of this unit that has not been declared yet
/// fails with `UnresolvedReference`.
pub fn declare_security_group(
    unit: &mut Unit,
    logical_id: &str,
    vpc: &Handle,
    description: &str,
    rules: &[IngressRule],
) -> Result<Handle> {
    let group = Resource::new(types::SECURITY_GROUP, logical_id)
        .with("GroupName", logical_id)
        .with("GroupDescription", description)
        .with("VpcId", vpc)
        .with(
            "SecurityGroupEgress",
            Prop::list([Prop::map([
                ("CidrIp", Prop::from("0.0.0.0/0")),
                ("IpProtocol", Prop::from("-1")),
                ("Description", Prop::from("Allow all outbound traffic by default")),
            ])]),
        )
        .with(
            "SecurityGroupIngress",
            Prop::list(rules.iter().map(IngressRule::to_prop)),
        );
    unit.add_resource(group)
}

pub fn build(id: &str, target: Target, props: &SecurityProps) -> Result<(Unit, SecurityOutputs)> {
    let mut unit = Unit::new(id, target);

    let mut roles = Vec::with_capacity(5);
    for (logical_id, policy) in props.policies.entries() {
        if policy.actions.is_empty() {
            return Err(SynthError::invalid_props(
                id,
                format!("role {} has no policy actions", logical_id),
            ));
        }
        let wildcards = policy.wildcard_actions();
        if !wildcards.is_empty() {
            warn!(
                unit = %id,
                role = logical_id,
                actions = ?wildcards,
                "Role grants wildcard actions on all resources"
            );
        }
        roles.push(unit.add_resource(policy.to_role(logical_id))?);
    }
    let [ecs_task, ecs_service, autoscaling, lambda, ec2]: [Handle; 5] =
        roles.try_into().map_err(|_| {
            SynthError::invalid_props(id, "expected exactly five roles")
        })?;

    let instance_profile = unit.add_resource(
        Resource::new(types::INSTANCE_PROFILE, "EC2InstanceProfile")
            .with("Roles", Prop::list([&ec2])),
    )?;

    let alb_group = declare_security_group(
        &mut unit,
        "ALBSG",
        &props.vpc,
        "ALB security group",
        &[
            IngressRule::tcp(Peer::AnyIpv4, 80, "Allow HTTP inbound from any IPv4"),
            IngressRule::tcp(Peer::AnyIpv4, 443, "Allow HTTPS inbound from any IPv4"),
        ],
    )?;
    let ecs_group = declare_security_group(
        &mut unit,
        "ECSSG",
        &props.vpc,
        "ECS Security Group",
        &[
            IngressRule::tcp_range(
                Peer::Group(alb_group.clone()),
                31000,
                61000,
                "Allow ECS inbound from ALB SG",
            ),
            IngressRule::tcp(
                Peer::Cidr(Prop::from(&props.vpc_cidr)),
                22,
                "Allow SSH inbound from within VPC",
            ),
        ],
    )?;
    let db_group = declare_security_group(
        &mut unit,
        "DBSG",
        &props.vpc,
        "DBSG Security Group",
        &[IngressRule::tcp(
            Peer::Group(ecs_group.clone()),
            5432,
            "Allow PostgreSQL inbound from ECS SG",
        )],
    )?;

    let exports = [
        ("ECSTaskRoleArn", ecs_task.arn(), "ECSTaskRole"),
        ("ECSServiceRoleArn", ecs_service.arn(), "ECSServiceRole"),
        ("AutoscalingRoleArn", autoscaling.arn(), "AutoscalingRole"),
        ("LambdaRoleArn", lambda.arn(), "LambdaRole"),
        ("EC2InstanceProfileArn", instance_profile.arn(), "EC2InstanceProfile"),
        ("ALBSGId", alb_group.attr("GroupId"), "ALBSG"),
        ("ECSSGId", ecs_group.attr("GroupId"), "ECSSG"),
        ("DBSGId", db_group.attr("GroupId"), "DBSG"),
    ];
    for (name, value, suffix) in exports {
        unit.add_output(name, Output::new(value).with_export(format!("{}-{}", id, suffix)))?;
    }
    debug!(unit = %id, resources = unit.resources().len(), "Declared security unit");

    let outputs = SecurityOutputs {
        roles: Roles {
            ecs_task,
            ecs_service,
            autoscaling,
            lambda,
            ec2,
        },
        instance_profile,
        alb_group,
        ecs_group,
        db_group,
    };
    Ok((unit, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> SecurityProps {
        let vpc = Handle::new("cdk-demo-NetworkStack", "Vpc");
        SecurityProps {
            vpc_cidr: vpc.attr("CidrBlock"),
            vpc,
            policies: RolePolicies::default(),
        }
    }

    fn build_default() -> (Unit, SecurityOutputs) {
        build("cdk-demo-SecurityStack", Target::new("us-east-1"), &props()).unwrap()
    }

    fn ingress(unit: &Unit, group: &str) -> Vec<Prop> {
        match unit.resource(group).and_then(|r| r.property("SecurityGroupIngress")) {
            Some(Prop::List(rules)) => rules.clone(),
            other => panic!("unexpected ingress: {:?}", other),
        }
    }

    #[test]
    fn test_roles_and_profile() {
        let (unit, outputs) = build_default();

        assert_eq!(unit.count_of_type(types::IAM_ROLE), 5);
        assert_eq!(unit.count_of_type(types::INSTANCE_PROFILE), 1);
        assert_eq!(outputs.roles.lambda.logical_id(), "LambdaRole");

        let lambda = unit.resource("LambdaRole").unwrap();
        let principal = lambda
            .property("AssumeRolePolicyDocument")
            .and_then(|d| d.get("Statement"))
            .and_then(|s| match s {
                Prop::List(items) => items.first(),
                _ => None,
            })
            .and_then(|s| s.get("Principal"))
            .and_then(|p| p.get("Service"))
            .and_then(Prop::as_str);
        assert_eq!(principal, Some("lambda.amazonaws.com"));
    }

    #[test]
    fn test_group_chain() {
        let (unit, outputs) = build_default();
        assert_eq!(unit.count_of_type(types::SECURITY_GROUP), 3);

        let alb = ingress(&unit, "ALBSG");
        assert_eq!(alb.len(), 2);
        assert_eq!(alb[1].get("FromPort"), Some(&Prop::Integer(443)));

        let ecs = ingress(&unit, "ECSSG");
        assert_eq!(ecs[0].get("FromPort"), Some(&Prop::Integer(31000)));
        assert_eq!(ecs[0].get("ToPort"), Some(&Prop::Integer(61000)));
        assert_eq!(
            ecs[0].get("SourceSecurityGroupId"),
            Some(&Prop::from(outputs.alb_group.attr("GroupId")))
        );
        assert_eq!(
            ecs[1].get("CidrIp"),
            Some(&Prop::from(Handle::new("cdk-demo-NetworkStack", "Vpc").attr("CidrBlock")))
        );

        let db = ingress(&unit, "DBSG");
        assert_eq!(db[0].get("FromPort"), Some(&Prop::Integer(5432)));
        assert_eq!(
            db[0].get("SourceSecurityGroupId"),
            Some(&Prop::from(outputs.ecs_group.attr("GroupId")))
        );
    }

    #[test]
    fn test_group_declared_before_its_source_rejected() {
        let mut unit = Unit::new("security", Target::new("us-east-1"));
        let vpc = Handle::new("network", "Vpc");
        let ecs_group = unit.reference("ECSSG");

        let err = declare_security_group(
            &mut unit,
            "DBSG",
            &vpc,
            "DBSG Security Group",
            &[IngressRule::tcp(Peer::Group(ecs_group), 5432, "postgres")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SynthError::UnresolvedReference { ref logical_id, .. } if logical_id == "ECSSG"
        ));
    }

    #[test]
    fn test_exports_named_after_unit() {
        let (unit, _) = build_default();
        let output = &unit.outputs()["DBSGId"];
        assert_eq!(output.export_name.as_deref(), Some("cdk-demo-SecurityStack-DBSG"));
        assert_eq!(unit.outputs().len(), 8);
    }

    #[test]
    fn test_wildcard_detection() {
        let policies = RolePolicies::default();
        assert!(policies.lambda.wildcard_actions().contains(&"lambda:*"));

        let scoped = policies
            .lambda
            .clone()
            .with_resources(vec!["arn:aws:sqs:us-east-1:445362076974:queue".to_string()]);
        assert!(scoped.wildcard_actions().is_empty());

        let narrow = RolePolicy::new("lambda.amazonaws.com", "LambdaPolicy", &["sqs:ReceiveMessage"]);
        assert!(narrow.wildcard_actions().is_empty());
    }

    #[test]
    fn test_empty_policy_rejected() {
        let mut props = props();
        props.policies.ec2 = props.policies.ec2.clone().with_actions(Vec::new());
        assert!(build("security", Target::new("us-east-1"), &props).is_err());
    }
}
