//! Build an [`App`] from a parsed deployment file
//!
//! Each unit node is turned into props, built by its adapter and added to
//! the app in file order. Inputs (`network="..."` and friends) name an
//! earlier unit whose typed outputs are threaded into the props.

use crate::backend::{self, BackendOutputs, BackendProps, FunctionCode};
use crate::load_balancer::{self, HealthCheck, Listeners, LoadBalancerOutputs, LoadBalancerProps};
use crate::network::{self, NetworkOutputs, NetworkProps};
use crate::replication::{self, ReplicationOutputs, ReplicationProps};
use crate::security::{self, SecurityOutputs, SecurityProps};
use stackflow_core::{
    App, Deployment, ForeignRef, Result, Settings, SynthError, UnitSpec,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// The unit node names a deployment file may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Network,
    Security,
    LoadBalancer,
    Backend,
    Replication,
}

impl UnitKind {
    pub const ALL: [UnitKind; 5] = [
        UnitKind::Network,
        UnitKind::Security,
        UnitKind::LoadBalancer,
        UnitKind::Backend,
        UnitKind::Replication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Network => "network",
            UnitKind::Security => "security",
            UnitKind::LoadBalancer => "load-balancer",
            UnitKind::Backend => "backend",
            UnitKind::Replication => "replication",
        }
    }

    /// Input names the unit node accepts
    fn inputs(&self) -> &'static [&'static str] {
        match self {
            UnitKind::Network => &[],
            UnitKind::Security => &["network"],
            UnitKind::LoadBalancer => &["network", "security"],
            UnitKind::Backend => &["network", "security", "load-balancer"],
            UnitKind::Replication => &["network"],
        }
    }

    /// Setting names the unit node accepts
    fn settings(&self) -> &'static [&'static str] {
        match self {
            UnitKind::Network => &["name", "cidr", "zones", "nat-gateways", "subnet-prefix"],
            UnitKind::Security => &["role-policies"],
            UnitKind::LoadBalancer => &["certificate-arn", "idle-timeout", "health-checks"],
            UnitKind::Backend => &[
                "resource-prefix",
                "environment",
                "db-name",
                "db-engine-version",
                "function-code",
                "function-handler",
                "function-runtime",
                "function-timeout",
                "batch-size",
                "queue-delay",
                "db-cluster-identifier",
                "db-username",
                "db-subnet-group-name",
                "db-min-capacity",
                "db-max-capacity",
                "instance-type",
                "image-id",
                "min-capacity",
                "max-capacity",
                "container-image",
                "container-memory",
                "container-port",
            ],
            UnitKind::Replication => &[
                "security-group",
                "global-cluster-identifier",
                "engine-version",
                "cluster-identifier",
                "key-alias",
                "backup-retention",
                "min-capacity",
                "max-capacity",
            ],
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        UnitKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = UnitKind::ALL.iter().map(UnitKind::as_str).collect();
                format!("unknown unit kind '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Typed outputs of a built unit
#[derive(Debug, Clone)]
pub enum BuiltOutputs {
    Network(NetworkOutputs),
    Security(SecurityOutputs),
    LoadBalancer(LoadBalancerOutputs),
    Backend(BackendOutputs),
    Replication(ReplicationOutputs),
}

impl BuiltOutputs {
    fn kind(&self) -> UnitKind {
        match self {
            BuiltOutputs::Network(_) => UnitKind::Network,
            BuiltOutputs::Security(_) => UnitKind::Security,
            BuiltOutputs::LoadBalancer(_) => UnitKind::LoadBalancer,
            BuiltOutputs::Backend(_) => UnitKind::Backend,
            BuiltOutputs::Replication(_) => UnitKind::Replication,
        }
    }
}

/// Result of composing a deployment
#[derive(Debug)]
pub struct Composition {
    pub app: App,
    pub outputs: BTreeMap<String, BuiltOutputs>,
}

/// Build every unit of the deployment, in file order
#[instrument(skip(deployment), fields(project = %deployment.project))]
pub fn compose(deployment: &Deployment) -> Result<Composition> {
    let mut composer = Composer {
        deployment,
        app: App::new(),
        outputs: BTreeMap::new(),
    };
    for spec in &deployment.units {
        composer.add(spec)?;
    }
    info!(units = composer.outputs.len(), "Composed deployment");
    Ok(Composition {
        app: composer.app,
        outputs: composer.outputs,
    })
}

struct Composer<'a> {
    deployment: &'a Deployment,
    app: App,
    outputs: BTreeMap<String, BuiltOutputs>,
}

impl Composer<'_> {
    fn add(&mut self, spec: &UnitSpec) -> Result<()> {
        let kind: UnitKind = spec
            .kind
            .parse()
            .map_err(|message: String| SynthError::invalid_props(&spec.name, message))?;
        check_known_keys(spec, kind)?;
        debug!(unit = %spec.name, kind = %kind, "Building unit");

        let target = spec.target.clone();
        let (unit, outputs) = match kind {
            UnitKind::Network => {
                let props = network_props(spec)?;
                let (unit, out) = network::build(&spec.name, target, &props)?;
                (unit, BuiltOutputs::Network(out))
            }
            UnitKind::Security => {
                let network = self.network(spec)?;
                let props = security_props(spec, network)?;
                let (unit, out) = security::build(&spec.name, target, &props)?;
                (unit, BuiltOutputs::Security(out))
            }
            UnitKind::LoadBalancer => {
                let props = load_balancer_props(spec, self.network(spec)?, self.security(spec)?)?;
                let (unit, out) = load_balancer::build(&spec.name, target, &props)?;
                (unit, BuiltOutputs::LoadBalancer(out))
            }
            UnitKind::Backend => {
                let props = backend_props(
                    spec,
                    self.network(spec)?,
                    self.security(spec)?,
                    self.load_balancer(spec)?,
                )?;
                let (unit, out) = backend::build(&spec.name, target, &props)?;
                (unit, BuiltOutputs::Backend(out))
            }
            UnitKind::Replication => {
                let props = replication_props(self.deployment, spec, self.network(spec)?)?;
                let (unit, out) = replication::build(&spec.name, target, &props)?;
                (unit, BuiltOutputs::Replication(out))
            }
        };

        self.app.add_unit(unit)?;
        self.outputs.insert(spec.name.clone(), outputs);
        Ok(())
    }

    /// Name and outputs of the earlier unit named by `input`
    fn resolve(&self, spec: &UnitSpec, input: &str) -> Result<(&str, &BuiltOutputs)> {
        let name = spec.require_input(input)?;
        match self.outputs.get_key_value(name) {
            Some((name, outputs)) => Ok((name.as_str(), outputs)),
            None if self.deployment.unit(name).is_some() => Err(SynthError::ForwardReference {
                unit: spec.name.clone(),
                referenced: name.to_string(),
            }),
            None => Err(SynthError::invalid_props(
                &spec.name,
                format!("input '{}' names unknown unit '{}'", input, name),
            )),
        }
    }

    fn network(&self, spec: &UnitSpec) -> Result<&NetworkOutputs> {
        match self.resolve(spec, "network")? {
            (_, BuiltOutputs::Network(out)) => Ok(out),
            (name, other) => Err(wrong_kind(spec, "network", UnitKind::Network, name, other)),
        }
    }

    fn security(&self, spec: &UnitSpec) -> Result<&SecurityOutputs> {
        match self.resolve(spec, "security")? {
            (_, BuiltOutputs::Security(out)) => Ok(out),
            (name, other) => Err(wrong_kind(spec, "security", UnitKind::Security, name, other)),
        }
    }

    fn load_balancer(&self, spec: &UnitSpec) -> Result<&LoadBalancerOutputs> {
        match self.resolve(spec, "load-balancer")? {
            (_, BuiltOutputs::LoadBalancer(out)) => Ok(out),
            (name, other) => Err(wrong_kind(
                spec,
                "load-balancer",
                UnitKind::LoadBalancer,
                name,
                other,
            )),
        }
    }
}

fn wrong_kind(
    spec: &UnitSpec,
    input: &str,
    expected: UnitKind,
    name: &str,
    found: &BuiltOutputs,
) -> SynthError {
    SynthError::invalid_props(
        &spec.name,
        format!(
            "input '{}' must name a {} unit, '{}' is a {} unit",
            input,
            expected,
            name,
            found.kind()
        ),
    )
}

fn check_known_keys(spec: &UnitSpec, kind: UnitKind) -> Result<()> {
    if let Some(input) = spec.inputs.keys().find(|k| !kind.inputs().contains(&k.as_str())) {
        return Err(SynthError::invalid_props(
            &spec.name,
            format!("unknown input '{}' for a {} unit", input, kind),
        ));
    }
    let settings = spec.settings();
    if let Some(key) = settings.keys().find(|k| !kind.settings().contains(k)) {
        return Err(SynthError::invalid_props(
            &spec.name,
            format!("unknown setting '{}' for a {} unit", key, kind),
        ));
    }
    Ok(())
}

fn u32_setting(settings: &Settings<'_>, unit: &str, key: &str) -> Result<Option<u32>> {
    settings
        .i64(key)?
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                SynthError::invalid_props(
                    unit,
                    format!("setting '{}' is out of range: {}", key, value),
                )
            })
        })
        .transpose()
}

fn network_props(spec: &UnitSpec) -> Result<NetworkProps> {
    let settings = spec.settings();
    let name = settings.str("name")?.unwrap_or(&spec.name);
    let cidr = settings.require_str("cidr")?;
    let zones = settings
        .str_list("zones")?
        .ok_or_else(|| SynthError::invalid_props(&spec.name, "missing setting 'zones'"))?;

    let mut props = NetworkProps::new(name, cidr, zones);
    if let Some(count) = u32_setting(&settings, &spec.name, "nat-gateways")? {
        props = props.with_nat_gateways(count as usize);
    }
    if let Some(prefix) = u32_setting(&settings, &spec.name, "subnet-prefix")? {
        let prefix = u8::try_from(prefix).map_err(|_| {
            SynthError::invalid_props(&spec.name, format!("subnet prefix /{} is invalid", prefix))
        })?;
        props = props.with_subnet_prefix(prefix);
    }
    Ok(props)
}

fn security_props(spec: &UnitSpec, network: &NetworkOutputs) -> Result<SecurityProps> {
    let mut props = SecurityProps::new(network);
    let Some(policies) = spec.settings().block("role-policies")? else {
        return Ok(props);
    };

    for role in policies.keys() {
        let Some(policy) = props.policies.get_mut(role) else {
            return Err(SynthError::invalid_props(
                &spec.name,
                format!("unknown role '{}' in role-policies", role),
            ));
        };
        let Some(block) = policies.block(role)? else {
            continue;
        };
        if let Some(actions) = block.str_list("actions")? {
            policy.actions = actions;
        }
        if let Some(resources) = block.str_list("resources")? {
            policy.resources = resources;
        }
    }
    Ok(props)
}

fn load_balancer_props(
    spec: &UnitSpec,
    network: &NetworkOutputs,
    security: &SecurityOutputs,
) -> Result<LoadBalancerProps> {
    let settings = spec.settings();
    let mut props = LoadBalancerProps::new(network, security);

    if let Some(arn) = settings.str("certificate-arn")? {
        props = props.with_listeners(Listeners::WithHttps {
            certificate_arn: arn.to_string(),
        });
    }
    if let Some(secs) = u32_setting(&settings, &spec.name, "idle-timeout")? {
        props.idle_timeout_secs = secs;
    }
    if let Some(checks) = settings.block("health-checks")? {
        for pool in checks.keys() {
            let Some(check) = props.health_checks.get_mut(pool) else {
                return Err(SynthError::invalid_props(
                    &spec.name,
                    format!("unknown target pool '{}' in health-checks", pool),
                ));
            };
            if let Some(block) = checks.block(pool)? {
                apply_health_check(&block, &spec.name, check)?;
            }
        }
    }
    Ok(props)
}

fn apply_health_check(block: &Settings<'_>, unit: &str, check: &mut HealthCheck) -> Result<()> {
    if let Some(v) = u32_setting(block, unit, "interval")? {
        check.interval_secs = v;
    }
    if let Some(v) = block.str("path")? {
        check.path = v.to_string();
    }
    if let Some(v) = u32_setting(block, unit, "timeout")? {
        check.timeout_secs = v;
    }
    if let Some(v) = u32_setting(block, unit, "healthy")? {
        check.healthy_threshold = v;
    }
    if let Some(v) = u32_setting(block, unit, "unhealthy")? {
        check.unhealthy_threshold = v;
    }
    if let Some(v) = block.str("matcher")? {
        check.matcher = Some(v.to_string());
    }
    Ok(())
}

fn backend_props(
    spec: &UnitSpec,
    network: &NetworkOutputs,
    security: &SecurityOutputs,
    load_balancer: &LoadBalancerOutputs,
) -> Result<BackendProps> {
    let settings = spec.settings();
    let unit = spec.name.as_str();
    let mut props = BackendProps::new(
        network,
        security,
        load_balancer,
        settings.require_str("resource-prefix")?,
        settings.require_str("environment")?,
        settings.require_str("db-name")?,
        settings.require_str("db-engine-version")?,
    );

    let s = &mut props.settings;
    if let Some(code) = settings.block("function-code")? {
        s.function_code = match (code.str("path")?, code.str("bucket")?, code.str("key")?) {
            (Some(path), None, None) => FunctionCode::Asset {
                path: path.to_string(),
            },
            (None, Some(bucket), Some(key)) => FunctionCode::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => {
                return Err(SynthError::invalid_props(
                    unit,
                    "function-code needs either path= or bucket= and key=",
                ));
            }
        };
    }
    for (key, field) in [
        ("function-handler", &mut s.function_handler),
        ("function-runtime", &mut s.function_runtime),
        ("db-cluster-identifier", &mut s.db_cluster_identifier),
        ("db-username", &mut s.db_username),
        ("db-subnet-group-name", &mut s.db_subnet_group_name),
        ("instance-type", &mut s.instance_type),
        ("image-id", &mut s.image_id),
        ("container-image", &mut s.container_image),
    ] {
        if let Some(value) = settings.str(key)? {
            *field = value.to_string();
        }
    }
    for (key, field) in [
        ("function-timeout", &mut s.function_timeout_secs),
        ("batch-size", &mut s.batch_size),
        ("queue-delay", &mut s.queue_delay_secs),
        ("min-capacity", &mut s.min_capacity),
        ("max-capacity", &mut s.max_capacity),
        ("container-memory", &mut s.container_memory_mib),
    ] {
        if let Some(value) = u32_setting(&settings, unit, key)? {
            *field = value;
        }
    }
    if let Some(v) = settings.f64("db-min-capacity")? {
        s.db_min_capacity = v;
    }
    if let Some(v) = settings.f64("db-max-capacity")? {
        s.db_max_capacity = v;
    }
    if let Some(port) = u32_setting(&settings, unit, "container-port")? {
        s.container_port = u16::try_from(port).map_err(|_| {
            SynthError::invalid_props(unit, format!("container port {} is out of range", port))
        })?;
    }
    Ok(props)
}

fn replication_props(
    deployment: &Deployment,
    spec: &UnitSpec,
    network: &NetworkOutputs,
) -> Result<ReplicationProps> {
    let settings = spec.settings();
    let unit = spec.name.as_str();

    let group = settings
        .block("security-group")?
        .ok_or_else(|| SynthError::invalid_props(unit, "missing setting 'security-group'"))?;
    let origin_name = group.require_str("origin")?;
    let origin = deployment.targets.get(origin_name).ok_or_else(|| {
        SynthError::invalid_props(
            unit,
            format!("security-group origin names unknown target '{}'", origin_name),
        )
    })?;
    let security_group = ForeignRef::new(group.require_str("id")?, origin.clone());

    let mut props = ReplicationProps::new(
        network.private_subnets.clone(),
        security_group,
        settings.require_str("global-cluster-identifier")?,
        settings.require_str("engine-version")?,
        settings.require_str("cluster-identifier")?,
    );
    if let Some(alias) = settings.str("key-alias")? {
        props.key_alias = alias.to_string();
    }
    if let Some(days) = u32_setting(&settings, unit, "backup-retention")? {
        props.backup_retention_days = days;
    }
    if let Some(v) = settings.f64("min-capacity")? {
        props.min_capacity = v;
    }
    if let Some(v) = settings.f64("max-capacity")? {
        props.max_capacity = v;
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types;
    use stackflow_core::parse_kdl_string;

    const DEMO: &str = r#"
project "cdk-demo"
target "primary" account="445362076974" region="us-east-1"

network "net" {
    name "cdk-demo-vpc"
    cidr "10.0.0.0/16"
    zones "us-east-1a" "us-east-1b" "us-east-1c"
}
security "sec" network="net"
load-balancer "elb" network="net" security="sec"
backend "app" network="net" security="sec" load-balancer="elb" {
    resource-prefix "cdk-demo"
    environment "dev"
    db-name "test"
    db-engine-version "15.3"
}
"#;

    fn compose_str(content: &str) -> Result<Composition> {
        let deployment = parse_kdl_string(content, "test".to_string())?;
        compose(&deployment)
    }

    #[test]
    fn test_compose_demo() {
        let composition = compose_str(DEMO).unwrap();
        let ids: Vec<&str> = composition.app.units().iter().map(|u| u.id()).collect();
        assert_eq!(ids, ["net", "sec", "elb", "app"]);
        assert!(matches!(
            composition.outputs.get("elb"),
            Some(BuiltOutputs::LoadBalancer(_))
        ));

        let backend = composition.app.unit("app").unwrap();
        assert_eq!(backend.count_of_type(types::ECS_SERVICE), 1);
    }

    #[test]
    fn test_unknown_kind() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
cache "c"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown unit kind 'cache'"));
    }

    #[test]
    fn test_missing_input() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
security "sec"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing input 'network'"));
    }

    #[test]
    fn test_input_of_wrong_kind() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
network "net" {
    cidr "10.0.0.0/16"
    zones "us-east-1a"
}
security "sec" network="net"
load-balancer "elb" network="sec" security="sec"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must name a network unit"));
    }

    #[test]
    fn test_forward_reference() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
security "sec" network="net"
network "net" {
    cidr "10.0.0.0/16"
    zones "us-east-1a"
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SynthError::ForwardReference { .. }));
    }

    #[test]
    fn test_missing_setting() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
network "net" {
    zones "us-east-1a"
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing setting 'cidr'"));
    }

    #[test]
    fn test_unknown_setting() {
        let err = compose_str(
            r#"
target "primary" region="us-east-1"
network "net" {
    cidr "10.0.0.0/16"
    zones "us-east-1a"
    nat "1"
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown setting 'nat'"));
    }

    #[test]
    fn test_health_checks_and_certificate() {
        let content = DEMO.replace(
            r#"load-balancer "elb" network="net" security="sec""#,
            r#"load-balancer "elb" network="net" security="sec" {
    certificate-arn "arn:aws:acm:us-east-1:445362076974:certificate/demo"
    health-checks {
        staging-api {
            path "/health"
            interval 60
        }
    }
}"#,
        );
        let composition = compose_str(&content).unwrap();
        let elb = composition.app.unit("elb").unwrap();
        assert_eq!(elb.count_of_type(types::LISTENER), 2);

        let api = elb.resource("stagingApiTG").unwrap();
        assert_eq!(
            api.property("HealthCheckPath").and_then(|p| p.as_str()),
            Some("/health")
        );
        assert_eq!(
            api.property("HealthCheckIntervalSeconds").and_then(|p| p.as_i64()),
            Some(60)
        );
    }

    #[test]
    fn test_role_policy_override() {
        let content = DEMO.replace(
            r#"security "sec" network="net""#,
            r#"security "sec" network="net" {
    role-policies {
        lambda {
            actions "sqs:ReceiveMessage" "sqs:DeleteMessage" "ses:SendEmail"
        }
    }
}"#,
        );
        let composition = compose_str(&content).unwrap();
        let sec = composition.app.unit("sec").unwrap();
        let role = sec.resource("LambdaRole").unwrap();
        let rendered = format!("{:?}", role.property("Policies"));
        assert!(rendered.contains("ses:SendEmail"));
    }

    #[test]
    fn test_replication_across_targets() {
        let composition = compose_str(
            r#"
target "primary" region="us-east-1"
target "secondary" region="us-west-2"
network "net-west" target="secondary" {
    cidr "10.1.0.0/16"
    zones "us-west-2a" "us-west-2b"
}
replication "replica" target="secondary" network="net-west" {
    security-group {
        id "sg-0123456789abcdef0"
        origin "primary"
    }
    global-cluster-identifier "cdk-demo-global"
    engine-version "15.3"
    cluster-identifier "cdkdemodbreplica"
}
"#,
        )
        .unwrap();

        let replica = composition.app.unit("replica").unwrap();
        assert_eq!(replica.target().region, "us-west-2");
        assert_eq!(replica.count_of_type(types::DB_CLUSTER), 1);
    }

    #[test]
    fn test_replication_unknown_origin() {
        let err = compose_str(
            r#"
target "secondary" region="us-west-2"
network "net-west" {
    cidr "10.1.0.0/16"
    zones "us-west-2a"
}
replication "replica" network="net-west" {
    security-group {
        id "sg-0123"
        origin "primary"
    }
    global-cluster-identifier "g"
    engine-version "15.3"
    cluster-identifier "c"
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown target 'primary'"));
    }
}
