//! Load-balancing unit
//!
//! An internet-facing application load balancer with four instance target
//! groups (staging/prod x front/api). The HTTP listener routes to staging;
//! an HTTPS listener routing to prod exists only when a certificate is set.

use crate::network::NetworkOutputs;
use crate::security::SecurityOutputs;
use crate::types;
use stackflow_core::{Handle, Output, Prop, Resource, Result, SynthError, Target, Unit};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const DEFAULT_IDLE_TIMEOUT_SECS: u32 = 30;
const TARGET_PORT: u16 = 80;

/// Which listeners the load balancer gets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Listeners {
    #[default]
    HttpOnly,
    WithHttps { certificate_arn: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub interval_secs: u32,
    pub path: String,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// HTTP codes counted as healthy (e.g. "200-499")
    pub matcher: Option<String>,
}

impl HealthCheck {
    /// Front-end pools: 30 s interval, any non-5xx answer is healthy
    pub fn front() -> Self {
        Self {
            interval_secs: 30,
            path: "/".to_string(),
            timeout_secs: 20,
            healthy_threshold: 2,
            unhealthy_threshold: 10,
            matcher: Some("200-499".to_string()),
        }
    }

    /// API pools: 70 s interval, default matcher
    pub fn api() -> Self {
        Self {
            interval_secs: 70,
            path: "/".to_string(),
            timeout_secs: 50,
            healthy_threshold: 2,
            unhealthy_threshold: 10,
            matcher: None,
        }
    }

    fn apply(&self, resource: Resource) -> Resource {
        resource
            .with("HealthCheckIntervalSeconds", self.interval_secs)
            .with("HealthCheckPath", self.path.as_str())
            .with("HealthCheckTimeoutSeconds", self.timeout_secs)
            .with("HealthyThresholdCount", self.healthy_threshold)
            .with("UnhealthyThresholdCount", self.unhealthy_threshold)
            .with_opt(
                "Matcher",
                self.matcher
                    .as_ref()
                    .map(|codes| Prop::map([("HttpCode", Prop::from(codes))])),
            )
    }
}

/// Health checks of the four target pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthChecks {
    pub staging_front: HealthCheck,
    pub staging_api: HealthCheck,
    pub prod_front: HealthCheck,
    pub prod_api: HealthCheck,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self {
            staging_front: HealthCheck::front(),
            staging_api: HealthCheck::api(),
            prod_front: HealthCheck::front(),
            prod_api: HealthCheck::api(),
        }
    }
}

impl HealthChecks {
    pub fn get_mut(&mut self, key: &str) -> Option<&mut HealthCheck> {
        match key {
            "staging-front" => Some(&mut self.staging_front),
            "staging-api" => Some(&mut self.staging_api),
            "prod-front" => Some(&mut self.prod_front),
            "prod-api" => Some(&mut self.prod_api),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerProps {
    pub vpc: Handle,
    pub public_subnets: Vec<Handle>,
    pub alb_group: Handle,
    pub listeners: Listeners,
    pub health_checks: HealthChecks,
    pub idle_timeout_secs: u32,
}

impl LoadBalancerProps {
    pub fn new(network: &NetworkOutputs, security: &SecurityOutputs) -> Self {
        Self {
            vpc: network.vpc.clone(),
            public_subnets: network.public_subnets.clone(),
            alb_group: security.alb_group.clone(),
            listeners: Listeners::HttpOnly,
            health_checks: HealthChecks::default(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }

    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerOutputs {
    pub load_balancer: Handle,
    pub http_listener: Handle,
    pub https_listener: Option<Handle>,
    pub staging_front_tg: Handle,
    pub staging_api_tg: Handle,
    pub prod_front_tg: Handle,
    pub prod_api_tg: Handle,
}

/// Path-based forwarding rule on a listener
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerRule {
    pub logical_id: String,
    pub priority: u32,
    pub path_patterns: Vec<String>,
    pub target_group: Handle,
}

impl ListenerRule {
    pub fn new(logical_id: &str, priority: u32, path: &str, target_group: &Handle) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            priority,
            path_patterns: vec![path.to_string()],
            target_group: target_group.clone(),
        }
    }
}

/// Declare the rules of one listener; priorities must be unique per listener
pub fn declare_listener_rules(
    unit: &mut Unit,
    listener: &Handle,
    rules: &[ListenerRule],
) -> Result<Vec<Handle>> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.priority) {
            return Err(SynthError::invalid_props(
                unit.id(),
                format!(
                    "priority {} is used twice on listener {}",
                    rule.priority,
                    listener.logical_id()
                ),
            ));
        }
    }

    rules
        .iter()
        .map(|rule| {
            unit.add_resource(
                Resource::new(types::LISTENER_RULE, rule.logical_id.as_str())
                    .with("ListenerArn", listener)
                    .with("Priority", rule.priority)
                    .with("Actions", forward(&rule.target_group))
                    .with(
                        "Conditions",
                        Prop::list([Prop::map([
                            ("Field", Prop::from("path-pattern")),
                            (
                                "PathPatternConfig",
                                Prop::map([("Values", Prop::list(rule.path_patterns.iter()))]),
                            ),
                        ])]),
                    ),
            )
        })
        .collect()
}

fn forward(target_group: &Handle) -> Prop {
    Prop::list([Prop::map([
        ("Type", Prop::from("forward")),
        ("TargetGroupArn", Prop::from(target_group)),
    ])])
}

fn target_group(unit: &mut Unit, logical_id: &str, vpc: &Handle, check: &HealthCheck) -> Result<Handle> {
    let resource = Resource::new(types::TARGET_GROUP, logical_id)
        .with("Port", TARGET_PORT)
        .with("Protocol", "HTTP")
        .with("TargetType", "instance")
        .with("VpcId", vpc);
    unit.add_resource(check.apply(resource))
}

pub fn build(
    id: &str,
    target: Target,
    props: &LoadBalancerProps,
) -> Result<(Unit, LoadBalancerOutputs)> {
    if props.public_subnets.is_empty() {
        return Err(SynthError::invalid_props(
            id,
            "the load balancer needs at least one public subnet",
        ));
    }

    let mut unit = Unit::new(id, target);

    let load_balancer = unit.add_resource(
        Resource::new(types::LOAD_BALANCER, "ECSALB")
            .with("Type", "application")
            .with("Scheme", "internet-facing")
            .with("SecurityGroups", Prop::list([props.alb_group.attr("GroupId")]))
            .with("Subnets", Prop::list(props.public_subnets.iter()))
            .with(
                "LoadBalancerAttributes",
                Prop::list([Prop::map([
                    ("Key", Prop::from("idle_timeout.timeout_seconds")),
                    ("Value", Prop::from(props.idle_timeout_secs.to_string())),
                ])]),
            ),
    )?;

    let checks = &props.health_checks;
    let staging_front_tg = target_group(&mut unit, "stagingFrontTG", &props.vpc, &checks.staging_front)?;
    let staging_api_tg = target_group(&mut unit, "stagingApiTG", &props.vpc, &checks.staging_api)?;
    let prod_front_tg = target_group(&mut unit, "prodFrontTG", &props.vpc, &checks.prod_front)?;
    let prod_api_tg = target_group(&mut unit, "prodApiTG", &props.vpc, &checks.prod_api)?;

    let http_listener = unit.add_resource(
        Resource::new(types::LISTENER, "HTTPListener")
            .with("LoadBalancerArn", &load_balancer)
            .with("Port", 80)
            .with("Protocol", "HTTP")
            .with("DefaultActions", forward(&staging_front_tg)),
    )?;
    declare_listener_rules(
        &mut unit,
        &http_listener,
        &[
            ListenerRule::new("HTTPRuleBackend", 1, "/backend", &staging_api_tg),
            ListenerRule::new("HTTPRuleFrontend", 2, "/frontend", &staging_front_tg),
        ],
    )?;

    let https_listener = match &props.listeners {
        Listeners::HttpOnly => None,
        Listeners::WithHttps { certificate_arn } => {
            if certificate_arn.trim().is_empty() {
                return Err(SynthError::invalid_props(id, "certificate ARN is empty"));
            }
            let listener = unit.add_resource(
                Resource::new(types::LISTENER, "HTTPSListener")
                    .with("LoadBalancerArn", &load_balancer)
                    .with("Port", 443)
                    .with("Protocol", "HTTPS")
                    .with(
                        "Certificates",
                        Prop::list([Prop::map([(
                            "CertificateArn",
                            Prop::from(certificate_arn.as_str()),
                        )])]),
                    )
                    .with("DefaultActions", forward(&prod_front_tg)),
            )?;
            declare_listener_rules(
                &mut unit,
                &listener,
                &[ListenerRule::new("HTTPSRuleBackend", 1, "/backend", &prod_api_tg)],
            )?;
            Some(listener)
        }
    };

    for (name, group) in [
        ("stagingFrontTGOutput", &staging_front_tg),
        ("stagingApiTGOutput", &staging_api_tg),
        ("prodFrontTGOutput", &prod_front_tg),
        ("prodApiTGOutput", &prod_api_tg),
    ] {
        unit.add_output(name, Output::new(group.attr("TargetGroupFullName")))?;
    }

    info!(
        unit = %id,
        https = https_listener.is_some(),
        "Declared load balancer"
    );
    debug!(unit = %id, resources = unit.resources().len(), "Load-balancing unit complete");

    let outputs = LoadBalancerOutputs {
        load_balancer,
        http_listener,
        https_listener,
        staging_front_tg,
        staging_api_tg,
        prod_front_tg,
        prod_api_tg,
    };
    Ok((unit, outputs))
}
