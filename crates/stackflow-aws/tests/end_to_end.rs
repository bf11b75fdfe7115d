use serde_json::json;
use stackflow_aws::{
    BackendProps, Listeners, LoadBalancerProps, NetworkProps, SecurityProps, backend,
    load_balancer, network, security, types,
};
use stackflow_core::{App, Assembly, ChangeType, Target, diff_assemblies};

const NETWORK: &str = "cdk-demo-NetworkStack";
const SECURITY: &str = "cdk-demo-SecurityStack";
const ELB: &str = "cdk-demo-ElbStack";
const BACKEND: &str = "cdk-demo-BackendStack";

fn primary() -> Target {
    Target::new("us-east-1").with_account("445362076974")
}

fn demo_app(listeners: Listeners) -> App {
    let mut app = App::new();

    let zones = ["us-east-1a", "us-east-1b", "us-east-1c"]
        .map(String::from)
        .to_vec();
    let (unit, net) = network::build(
        NETWORK,
        primary(),
        &NetworkProps::new("cdk-demo-vpc", "10.0.0.0/16", zones),
    )
    .unwrap();
    app.add_unit(unit).unwrap();

    let (unit, sec) = security::build(SECURITY, primary(), &SecurityProps::new(&net)).unwrap();
    app.add_unit(unit).unwrap();

    let (unit, elb) = load_balancer::build(
        ELB,
        primary(),
        &LoadBalancerProps::new(&net, &sec).with_listeners(listeners),
    )
    .unwrap();
    app.add_unit(unit).unwrap();

    let (unit, _) = backend::build(
        BACKEND,
        primary(),
        &BackendProps::new(&net, &sec, &elb, "cdk-demo-", "dev", "test", "15.3"),
    )
    .unwrap();
    app.add_unit(unit).unwrap();

    app
}

fn synth() -> Assembly {
    demo_app(Listeners::HttpOnly).synth().unwrap()
}

#[test]
fn test_one_of_each_primary_type() {
    let assembly = synth();

    let network = assembly.get(NETWORK).unwrap();
    assert_eq!(network.count_of_type(types::VPC), 1);
    assert_eq!(network.count_of_type(types::SUBNET), 6);
    assert_eq!(network.count_of_type(types::NAT_GATEWAY), 2);

    let backend = assembly.get(BACKEND).unwrap();
    for resource_type in [
        types::SQS_QUEUE,
        types::LAMBDA_FUNCTION,
        types::DB_CLUSTER,
        types::ECS_CLUSTER,
        types::AUTOSCALING_GROUP,
    ] {
        assert_eq!(backend.count_of_type(resource_type), 1, "{}", resource_type);
    }

    let elb = assembly.get(ELB).unwrap();
    assert_eq!(elb.count_of_type(types::LISTENER), 1);
    let https = elb.template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .filter(|r| r["Properties"]["Protocol"] == "HTTPS")
        .count();
    assert_eq!(https, 0);
}

#[test]
fn test_health_checks_in_rendered_template() {
    let assembly = synth();
    let elb = assembly.template(ELB).unwrap();

    for front in ["stagingFrontTG", "prodFrontTG"] {
        let props = &elb["Resources"][front]["Properties"];
        assert_eq!(props["HealthCheckIntervalSeconds"], json!(30), "{}", front);
        assert_eq!(props["HealthCheckPath"], json!("/"));
        assert_eq!(props["HealthCheckTimeoutSeconds"], json!(20));
        assert_eq!(props["HealthyThresholdCount"], json!(2));
        assert_eq!(props["UnhealthyThresholdCount"], json!(10));
        assert_eq!(props["Matcher"], json!({ "HttpCode": "200-499" }));
    }
    for api in ["stagingApiTG", "prodApiTG"] {
        let props = &elb["Resources"][api]["Properties"];
        assert_eq!(props["HealthCheckIntervalSeconds"], json!(70), "{}", api);
        assert_eq!(props["HealthCheckTimeoutSeconds"], json!(50));
        assert_eq!(props["HealthyThresholdCount"], json!(2));
        assert_eq!(props["UnhealthyThresholdCount"], json!(10));
        assert!(props.get("Matcher").is_none());
    }

    assert_eq!(
        elb["Resources"]["ECSALB"]["Properties"]["LoadBalancerAttributes"],
        json!([{ "Key": "idle_timeout.timeout_seconds", "Value": "30" }])
    );
}

#[test]
fn test_event_source_reports_item_failures() {
    let assembly = synth();
    let backend = assembly.template(BACKEND).unwrap();

    assert_eq!(
        backend["Resources"]["SendEmailEventSource"]["Properties"]["FunctionResponseTypes"],
        json!(["ReportBatchItemFailures"])
    );
}

#[test]
fn test_https_listener_with_certificate() {
    let assembly = demo_app(Listeners::WithHttps {
        certificate_arn: "arn:aws:acm:us-east-1:445362076974:certificate/demo".to_string(),
    })
    .synth()
    .unwrap();

    let elb = assembly.template(ELB).unwrap();
    assert_eq!(elb["Resources"]["HTTPSListener"]["Properties"]["Port"], 443);
    assert_eq!(
        elb["Resources"]["HTTPSRuleBackend"]["Properties"]["ListenerArn"],
        json!({ "Ref": "HTTPSListener" })
    );
}

#[test]
fn test_cross_unit_references_become_imports() {
    let assembly = synth();

    let backend = assembly.template(BACKEND).unwrap();
    let attachment = &backend["Resources"]["EC2Service"]["Properties"]["LoadBalancers"][0];
    assert_eq!(
        attachment["TargetGroupArn"],
        json!({ "Fn::ImportValue": "cdk-demo-ElbStack:ExportsOutputRefstagingFrontTG" })
    );

    let elb = assembly.template(ELB).unwrap();
    let export = &elb["Outputs"]["ExportsOutputRefstagingFrontTG"];
    assert_eq!(export["Value"], json!({ "Ref": "stagingFrontTG" }));
    assert_eq!(
        export["Export"]["Name"],
        "cdk-demo-ElbStack:ExportsOutputRefstagingFrontTG"
    );

    let security = assembly.template(SECURITY).unwrap();
    let ecs_sg = &security["Resources"]["ECSSG"]["Properties"];
    assert_eq!(
        ecs_sg["VpcId"],
        json!({ "Fn::ImportValue": "cdk-demo-NetworkStack:ExportsOutputRefVpc" })
    );
}

#[test]
fn test_deployment_order_and_dependencies() {
    let assembly = synth();

    let ids: Vec<&str> = assembly.units.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, [NETWORK, SECURITY, ELB, BACKEND]);

    let backend = assembly.get(BACKEND).unwrap();
    assert_eq!(backend.dependencies, [ELB, NETWORK, SECURITY]);
}

#[test]
fn test_synthesis_is_deterministic() {
    let first = synth();
    let second = synth();

    for (a, b) in first.units.iter().zip(&second.units) {
        assert_eq!(
            serde_json::to_string_pretty(&a.template).unwrap(),
            serde_json::to_string_pretty(&b.template).unwrap()
        );
    }

    let plan = diff_assemblies(Some(&first), &second);
    assert!(!plan.has_changes);
    assert_eq!(plan.summary().no_change, first.resource_count());
    assert!(plan.changes_by_type(ChangeType::Create).is_empty());
}
