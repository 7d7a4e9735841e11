//! VPC, subnets, internet gateway and routing.

use super::{tags, Plan};
use crate::config::StackConfig;
use crate::deferred::OutputRef;
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};

pub const VPC: &str = "vpc";
pub const INTERNET_GATEWAY: &str = "internet-gateway";
pub const PUBLIC_ROUTE_TABLE: &str = "public-route-table";
pub const PRIVATE_ROUTE_TABLE: &str = "private-route-table";
pub const DEFAULT_ROUTE: &str = "route-to-gateway";

/// Name of the public subnet in zone `index` (0-based).
pub fn public_subnet(index: usize) -> String {
    format!("public-subnet-{}", index + 1)
}

/// Name of the private subnet in zone `index` (0-based).
pub fn private_subnet(index: usize) -> String {
    format!("private-subnet-{}", index + 1)
}

pub fn build(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    plan.add(
        ResourceSpec::new(ResourceKind::Vpc, VPC)
            .prop("cidr_block", config.vpc_cidr.network())
            .prop("enable_dns_support", true)
            .prop("enable_dns_hostnames", true)
            .prop("tags", tags(config, VPC)),
    )?;
    plan.export("vpcId", OutputRef::id(VPC));

    let pairs = plan.zones().pairs.clone();
    for pair in &pairs {
        let public = public_subnet(pair.index);
        plan.add(
            ResourceSpec::new(ResourceKind::Subnet, public.as_str())
                .prop("vpc_id", Value::id(VPC))
                .prop("cidr_block", pair.public)
                .prop("availability_zone", pair.zone.as_str())
                .prop("map_public_ip_on_launch", true)
                .prop("tags", tags(config, &public)),
        )?;

        let private = private_subnet(pair.index);
        plan.add(
            ResourceSpec::new(ResourceKind::Subnet, private.as_str())
                .prop("vpc_id", Value::id(VPC))
                .prop("cidr_block", pair.private)
                .prop("availability_zone", pair.zone.as_str())
                .prop("map_public_ip_on_launch", false)
                .prop("tags", tags(config, &private)),
        )?;
    }

    plan.add(
        ResourceSpec::new(ResourceKind::InternetGateway, INTERNET_GATEWAY)
            .prop("vpc_id", Value::id(VPC))
            .prop("tags", tags(config, INTERNET_GATEWAY)),
    )?;

    for table in [PUBLIC_ROUTE_TABLE, PRIVATE_ROUTE_TABLE] {
        plan.add(
            ResourceSpec::new(ResourceKind::RouteTable, table)
                .prop("vpc_id", Value::id(VPC))
                .prop("tags", tags(config, table)),
        )?;
    }

    for pair in &pairs {
        for (table, subnet, prefix) in [
            (PUBLIC_ROUTE_TABLE, public_subnet(pair.index), "public"),
            (PRIVATE_ROUTE_TABLE, private_subnet(pair.index), "private"),
        ] {
            plan.add(
                ResourceSpec::new(
                    ResourceKind::RouteTableAssociation,
                    format!("{prefix}-route-table-assoc-{}", pair.index + 1),
                )
                .prop("subnet_id", Value::id(&subnet))
                .prop("route_table_id", Value::id(table)),
            )?;
        }
    }

    plan.add(
        ResourceSpec::new(ResourceKind::Route, DEFAULT_ROUTE)
            .prop("route_table_id", Value::id(PUBLIC_ROUTE_TABLE))
            .prop("destination_cidr_block", config.igw_route)
            .prop("gateway_id", Value::id(INTERNET_GATEWAY)),
    )?;
    Ok(())
}
