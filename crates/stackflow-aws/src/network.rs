//! Network unit
//!
//! One VPC with a public and a private subnet per availability zone.
//! Subnet blocks are allocated sequentially from the VPC block: every public
//! subnet first, then every private subnet. Private subnets reach the
//! internet through NAT gateways placed in the first public subnets.

use crate::cidr::Ipv4Cidr;
use crate::tags::name_tag;
use crate::types;
use stackflow_core::{Handle, Output, Prop, Resource, Result, SynthError, Target, Unit};
use tracing::{debug, warn};

pub const DEFAULT_NAT_GATEWAYS: usize = 2;
pub const DEFAULT_SUBNET_PREFIX: u8 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkProps {
    /// Value of the VPC `Name` tag
    pub name: String,
    pub cidr: String,
    pub zones: Vec<String>,
    pub nat_gateways: usize,
    pub subnet_prefix: u8,
}

impl NetworkProps {
    pub fn new(name: impl Into<String>, cidr: impl Into<String>, zones: Vec<String>) -> Self {
        Self {
            name: name.into(),
            cidr: cidr.into(),
            zones,
            nat_gateways: DEFAULT_NAT_GATEWAYS,
            subnet_prefix: DEFAULT_SUBNET_PREFIX,
        }
    }

    pub fn with_nat_gateways(mut self, count: usize) -> Self {
        self.nat_gateways = count;
        self
    }

    pub fn with_subnet_prefix(mut self, prefix: u8) -> Self {
        self.subnet_prefix = prefix;
        self
    }
}

/// Handles published by the network unit
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutputs {
    pub vpc: Handle,
    /// The VPC's `CidrBlock` attribute
    pub vpc_cidr: Handle,
    pub public_subnets: Vec<Handle>,
    pub private_subnets: Vec<Handle>,
}

pub fn build(id: &str, target: Target, props: &NetworkProps) -> Result<(Unit, NetworkOutputs)> {
    if props.zones.is_empty() {
        return Err(SynthError::invalid_props(
            id,
            "at least one availability zone is required",
        ));
    }
    let block: Ipv4Cidr = props
        .cidr
        .parse()
        .map_err(|e: crate::cidr::CidrError| SynthError::invalid_props(id, e.to_string()))?;

    let zone_count = props.zones.len();
    let needed = (zone_count * 2) as u64;
    let available = block
        .block_count(props.subnet_prefix)
        .map_err(|e| SynthError::invalid_props(id, e.to_string()))?;
    if needed > available {
        return Err(SynthError::invalid_props(
            id,
            format!(
                "{} holds {} /{} subnets but {} zones need {}",
                block, available, props.subnet_prefix, zone_count, needed
            ),
        ));
    }

    let nat_count = if props.nat_gateways > zone_count {
        warn!(
            unit = %id,
            requested = props.nat_gateways,
            zones = zone_count,
            "More NAT gateways than zones requested; using one per zone"
        );
        zone_count
    } else {
        props.nat_gateways
    };
    if nat_count == 0 {
        return Err(SynthError::invalid_props(
            id,
            "private subnets need at least one NAT gateway for egress",
        ));
    }

    let mut unit = Unit::new(id, target);

    let vpc = unit.add_resource(
        Resource::new(types::VPC, "Vpc")
            .with("CidrBlock", block.to_string())
            .with("EnableDnsHostnames", true)
            .with("EnableDnsSupport", true)
            .with("InstanceTenancy", "default")
            .with("Tags", name_tag(&props.name)),
    )?;

    let igw = unit.add_resource(
        Resource::new(types::INTERNET_GATEWAY, "IGW").with("Tags", name_tag(&props.name)),
    )?;
    let attachment = unit.add_resource(
        Resource::new(types::VPC_GATEWAY_ATTACHMENT, "VPCGW")
            .with("VpcId", &vpc)
            .with("InternetGatewayId", &igw),
    )?;

    let mut public_subnets = Vec::with_capacity(zone_count);
    let mut nat_gateways = Vec::with_capacity(nat_count);
    for (i, zone) in props.zones.iter().enumerate() {
        let name = format!("PublicSubnet{}", i + 1);
        let cidr = block
            .subnet(props.subnet_prefix, i as u32)
            .map_err(|e| SynthError::invalid_props(id, e.to_string()))?;

        let subnet = unit.add_resource(
            Resource::new(types::SUBNET, name.as_str())
                .with("VpcId", &vpc)
                .with("AvailabilityZone", zone)
                .with("CidrBlock", cidr.to_string())
                .with("MapPublicIpOnLaunch", true)
                .with("Tags", subnet_tags(&props.name, &name, "public")),
        )?;
        let route_table = unit.add_resource(
            Resource::new(types::ROUTE_TABLE, format!("{}RouteTable", name))
                .with("VpcId", &vpc)
                .with("Tags", name_tag(format!("{}/{}", props.name, name))),
        )?;
        let association = unit.add_resource(
            Resource::new(
                types::SUBNET_ROUTE_TABLE_ASSOCIATION,
                format!("{}RouteTableAssociation", name),
            )
            .with("RouteTableId", &route_table)
            .with("SubnetId", &subnet),
        )?;
        let route = unit.add_resource(
            Resource::new(types::ROUTE, format!("{}DefaultRoute", name))
                .with("RouteTableId", &route_table)
                .with("DestinationCidrBlock", "0.0.0.0/0")
                .with("GatewayId", &igw)
                .depends_on(&attachment),
        )?;

        if i < nat_count {
            let eip = unit.add_resource(
                Resource::new(types::EIP, format!("{}EIP", name))
                    .with("Domain", "vpc")
                    .with("Tags", name_tag(format!("{}/{}", props.name, name))),
            )?;
            let nat = unit.add_resource(
                Resource::new(types::NAT_GATEWAY, format!("{}NATGateway", name))
                    .with("SubnetId", &subnet)
                    .with("AllocationId", eip.attr("AllocationId"))
                    .with("Tags", name_tag(format!("{}/{}", props.name, name)))
                    .depends_on(&route)
                    .depends_on(&association),
            )?;
            nat_gateways.push(nat);
        }

        debug!(unit = %id, zone = %zone, cidr = %cidr, "Declared public subnet");
        public_subnets.push(subnet);
    }

    let mut private_subnets = Vec::with_capacity(zone_count);
    for (i, zone) in props.zones.iter().enumerate() {
        let name = format!("PrivateSubnet{}", i + 1);
        let cidr = block
            .subnet(props.subnet_prefix, (zone_count + i) as u32)
            .map_err(|e| SynthError::invalid_props(id, e.to_string()))?;

        let subnet = unit.add_resource(
            Resource::new(types::SUBNET, name.as_str())
                .with("VpcId", &vpc)
                .with("AvailabilityZone", zone)
                .with("CidrBlock", cidr.to_string())
                .with("MapPublicIpOnLaunch", false)
                .with("Tags", subnet_tags(&props.name, &name, "private")),
        )?;
        let route_table = unit.add_resource(
            Resource::new(types::ROUTE_TABLE, format!("{}RouteTable", name))
                .with("VpcId", &vpc)
                .with("Tags", name_tag(format!("{}/{}", props.name, name))),
        )?;
        unit.add_resource(
            Resource::new(
                types::SUBNET_ROUTE_TABLE_ASSOCIATION,
                format!("{}RouteTableAssociation", name),
            )
            .with("RouteTableId", &route_table)
            .with("SubnetId", &subnet),
        )?;
        unit.add_resource(
            Resource::new(types::ROUTE, format!("{}DefaultRoute", name))
                .with("RouteTableId", &route_table)
                .with("DestinationCidrBlock", "0.0.0.0/0")
                .with("NatGatewayId", &nat_gateways[i % nat_count]),
        )?;

        debug!(unit = %id, zone = %zone, cidr = %cidr, "Declared private subnet");
        private_subnets.push(subnet);
    }

    unit.add_output(
        "vpcid",
        Output::new(&vpc).with_export(format!("{}-vpcid", id)),
    )?;

    let outputs = NetworkOutputs {
        vpc_cidr: vpc.attr("CidrBlock"),
        vpc,
        public_subnets,
        private_subnets,
    };
    Ok((unit, outputs))
}

fn subnet_tags(network: &str, subnet: &str, kind: &str) -> Prop {
    Prop::list([
        Prop::map([
            ("Key", Prop::from("Name")),
            ("Value", Prop::from(format!("{}/{}", network, subnet))),
        ]),
        Prop::map([
            ("Key", Prop::from("stackflow:subnet-type")),
            ("Value", Prop::from(kind)),
        ]),
    ])
}
