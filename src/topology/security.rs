//! Security groups and the rules between them.
//!
//! In single mode the application group is reachable on every configured
//! port from `ipv4-cidr`/`ipv6-cidr`. In autoscaling mode only the load
//! balancer group is, and the application group admits the load balancer.

use super::network::VPC;
use super::{tags, Plan};
use crate::config::{ComputeMode, StackConfig, DB_PORT};
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};

pub const APP_SECURITY_GROUP: &str = "application-security-group";
pub const DB_SECURITY_GROUP: &str = "database-security-group";
pub const LB_SECURITY_GROUP: &str = "load-balancer-security-group";
pub const APP_DB_EGRESS: &str = "application-security-group-egress-rule";
pub const APP_HTTPS_EGRESS: &str = "application-security-group-port-egress-rule";

const HTTPS_PORT: u16 = 443;

/// TCP ingress on `port` from the configured IPv4 and IPv6 ranges.
fn cidr_ingress(config: &StackConfig, port: u16) -> Value {
    Value::map([
        ("protocol", Value::from("tcp")),
        ("from_port", Value::from(port)),
        ("to_port", Value::from(port)),
        ("cidr_blocks", Value::list([config.ipv4_cidr])),
        ("ipv6_cidr_blocks", Value::list([config.ipv6_cidr.as_str()])),
    ])
}

/// TCP ingress on `port` from members of `group`.
fn group_ingress(group: &str, port: u16) -> Value {
    Value::map([
        ("protocol", Value::from("tcp")),
        ("from_port", Value::from(port)),
        ("to_port", Value::from(port)),
        ("security_groups", Value::list([Value::id(group)])),
    ])
}

pub fn build(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    let app_ingress = match config.compute_mode {
        ComputeMode::Single => config
            .ports
            .iter()
            .map(|&port| cidr_ingress(config, port))
            .collect(),
        ComputeMode::Autoscaling => {
            plan.add(
                ResourceSpec::new(ResourceKind::SecurityGroup, LB_SECURITY_GROUP)
                    .prop("vpc_id", Value::id(VPC))
                    .prop("description", "load balancer security group")
                    .prop(
                        "ingress",
                        Value::List(
                            config
                                .alb_ports
                                .iter()
                                .map(|&port| cidr_ingress(config, port))
                                .collect(),
                        ),
                    )
                    .prop(
                        "egress",
                        Value::list([Value::map([
                            ("protocol", Value::from("-1")),
                            ("from_port", Value::from(0u16)),
                            ("to_port", Value::from(0u16)),
                            ("cidr_blocks", Value::list([config.ipv4_cidr])),
                        ])]),
                    )
                    .prop("tags", tags(config, LB_SECURITY_GROUP)),
            )?;
            config
                .ports
                .iter()
                .map(|&port| group_ingress(LB_SECURITY_GROUP, port))
                .collect()
        }
    };

    plan.add(
        ResourceSpec::new(ResourceKind::SecurityGroup, APP_SECURITY_GROUP)
            .prop("vpc_id", Value::id(VPC))
            .prop("description", "application security group")
            .prop("ingress", Value::List(app_ingress))
            .prop("tags", tags(config, APP_SECURITY_GROUP)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::SecurityGroup, DB_SECURITY_GROUP)
            .prop("vpc_id", Value::id(VPC))
            .prop("description", "database security group")
            .prop("ingress", Value::list([group_ingress(APP_SECURITY_GROUP, DB_PORT)]))
            .prop("tags", tags(config, DB_SECURITY_GROUP)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::SecurityGroupRule, APP_DB_EGRESS)
            .prop("type", "egress")
            .prop("protocol", "tcp")
            .prop("from_port", DB_PORT)
            .prop("to_port", DB_PORT)
            .prop("security_group_id", Value::id(APP_SECURITY_GROUP))
            .prop("source_security_group_id", Value::id(DB_SECURITY_GROUP)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::SecurityGroupRule, APP_HTTPS_EGRESS)
            .prop("type", "egress")
            .prop("protocol", "tcp")
            .prop("from_port", HTTPS_PORT)
            .prop("to_port", HTTPS_PORT)
            .prop("security_group_id", Value::id(APP_SECURITY_GROUP))
            .prop("cidr_blocks", Value::list([config.ipv4_cidr]))
            .prop("ipv6_cidr_blocks", Value::list([config.ipv6_cidr.as_str()])),
    )?;
    Ok(())
}
