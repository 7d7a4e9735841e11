//! Application tier.
//!
//! `single` runs one instance in the first public subnet. `autoscaling` runs a
//! launch template in an autoscaling group behind an application load
//! balancer, scaled on CPU. Both boot with the bootstrap script rendered once
//! the database endpoint is known.

use super::database::{endpoint, DB_INSTANCE};
use super::identity::INSTANCE_PROFILE;
use super::network::public_subnet;
use super::notifications::topic_arn;
use super::security::{APP_SECURITY_GROUP, LB_SECURITY_GROUP};
use super::{tags, Lookups, Plan};
use crate::config::{ComputeMode, StackConfig};
use crate::deferred::{Deferred, OutputRef};
use crate::error::{TopologyError, TopologyResult};
use crate::models::{ResourceKind, ResourceSpec, Value};
use crate::template::{self, encode_user_data, Template};

pub const INSTANCE: &str = "webapp";
pub const LAUNCH_TEMPLATE: &str = "webapp-launch-template";
pub const TARGET_GROUP: &str = "webapp-target-group";
pub const LOAD_BALANCER: &str = "webapp-load-balancer";
pub const LISTENER: &str = "webapp-listener";
pub const AUTOSCALING_GROUP: &str = "webapp-asg";
pub const SCALE_UP_POLICY: &str = "scale-up-policy";
pub const SCALE_DOWN_POLICY: &str = "scale-down-policy";
pub const CPU_HIGH_ALARM: &str = "cpu-high-alarm";
pub const CPU_LOW_ALARM: &str = "cpu-low-alarm";

const HEALTH_CHECK_PATH: &str = "/healthz";
const TLS_POLICY: &str = "ELBSecurityPolicy-2016-08";

/// Bootstrap script, rendered once its sources resolve.
///
/// Binds the database settings now and `HOST` (plus the SNS topic ARN when
/// notifications are enabled) when the engine reports them.
pub fn bootstrap(plan: &mut Plan, config: &StackConfig) -> (Vec<OutputRef>, Deferred<String>) {
    let base = Template::bootstrap()
        .set(template::DB_NAME, config.db_name.as_str())
        .set(template::DB_USER, config.db_master_user.as_str())
        .set(template::DB_PASSWORD, config.db_master_password.as_str());

    let host = plan.watch(endpoint());
    match topic_arn(config) {
        Some(topic) => {
            let arn = plan.watch(topic.clone());
            let script = host.zip(arn).map(move |(host, arn)| {
                base
                    .set(template::HOST, host)
                    .set(template::SNS_TOPIC_ARN, arn)
                    .render()
            });
            (vec![endpoint(), topic], script)
        }
        None => {
            let script = host.map(move |host| {
                base
                    .set(template::HOST, host)
                    .set(template::SNS_TOPIC_ARN, "")
                    .render()
            });
            (vec![endpoint()], script)
        }
    }
}

pub fn build(plan: &mut Plan, config: &StackConfig, lookups: &Lookups) -> TopologyResult<()> {
    if plan.zones().is_empty() {
        return Err(TopologyError::Configuration(format!(
            "no availability zone offered in {}, cannot place the application",
            config.region
        )));
    }
    match config.compute_mode {
        ComputeMode::Single => build_single(plan, config),
        ComputeMode::Autoscaling => build_autoscaling(plan, config, lookups),
    }
}

fn public_subnet_ids(plan: &Plan) -> Value {
    Value::List(
        plan.zones()
            .pairs
            .iter()
            .map(|p| Value::id(&public_subnet(p.index)))
            .collect(),
    )
}

fn build_single(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    let (sources, script) = bootstrap(plan, config);
    plan.add(
        ResourceSpec::new(ResourceKind::Instance, INSTANCE)
            .prop("ami", config.ami_id.as_str())
            .prop("instance_type", config.ec2_instance_type.as_str())
            .prop("key_name", config.ssh_key.as_str())
            .prop("subnet_id", Value::id(&public_subnet(0)))
            .prop("vpc_security_group_ids", Value::list([Value::id(APP_SECURITY_GROUP)]))
            .prop("iam_instance_profile", Value::id(INSTANCE_PROFILE))
            .prop("disable_api_termination", false)
            .prop(
                "user_data",
                Value::Deferred {
                    sources,
                    value: script,
                },
            )
            .prop("tags", tags(config, INSTANCE))
            .depends_on(DB_INSTANCE),
    )?;
    Ok(())
}

fn build_autoscaling(plan: &mut Plan, config: &StackConfig, lookups: &Lookups) -> TopologyResult<()> {
    let scaling = &config.autoscaling;
    let (sources, script) = bootstrap(plan, config);
    plan.add(
        ResourceSpec::new(ResourceKind::LaunchTemplate, LAUNCH_TEMPLATE)
            .prop("image_id", config.ami_id.as_str())
            .prop("instance_type", config.ec2_instance_type.as_str())
            .prop("key_name", config.ssh_key.as_str())
            .prop(
                "iam_instance_profile",
                Value::map([("name", Value::output(INSTANCE_PROFILE, "name"))]),
            )
            .prop(
                "network_interfaces",
                Value::list([Value::map([
                    ("associate_public_ip_address", Value::from(true)),
                    ("security_groups", Value::list([Value::id(APP_SECURITY_GROUP)])),
                ])]),
            )
            .prop(
                "user_data",
                Value::Deferred {
                    sources,
                    value: script.map(|s| encode_user_data(&s)),
                },
            )
            .prop("tags", tags(config, LAUNCH_TEMPLATE))
            .depends_on(DB_INSTANCE),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::TargetGroup, TARGET_GROUP)
            .prop("port", config.app_port)
            .prop("protocol", "HTTP")
            .prop("target_type", "instance")
            .prop("vpc_id", Value::id(super::network::VPC))
            .prop(
                "health_check",
                Value::map([
                    ("path", Value::from(HEALTH_CHECK_PATH)),
                    ("port", Value::from(config.app_port)),
                    ("protocol", Value::from("HTTP")),
                    ("healthy_threshold", Value::from(2u32)),
                    ("unhealthy_threshold", Value::from(2u32)),
                    ("interval", Value::from(30u32)),
                    ("timeout", Value::from(5u32)),
                ]),
            )
            .prop("tags", tags(config, TARGET_GROUP)),
    )?;

    let lb_subnets = public_subnet_ids(plan);
    plan.add(
        ResourceSpec::new(ResourceKind::LoadBalancer, LOAD_BALANCER)
            .prop("load_balancer_type", "application")
            .prop("internal", false)
            .prop("security_groups", Value::list([Value::id(LB_SECURITY_GROUP)]))
            .prop("subnets", lb_subnets)
            .prop("tags", tags(config, LOAD_BALANCER)),
    )?;
    plan.export("albDnsName", OutputRef::new(LOAD_BALANCER, "dns_name"));

    let listener = ResourceSpec::new(ResourceKind::Listener, LISTENER)
        .prop("load_balancer_arn", Value::output(LOAD_BALANCER, "arn"))
        .prop(
            "default_actions",
            Value::list([Value::map([
                ("type", Value::from("forward")),
                ("target_group_arn", Value::output(TARGET_GROUP, "arn")),
            ])]),
        );
    let listener = match &lookups.certificate {
        Some(arn) => {
            log::info!("Certificate found for {}, listening on HTTPS", config.domain_name);
            listener
                .prop("port", 443u16)
                .prop("protocol", "HTTPS")
                .prop("ssl_policy", TLS_POLICY)
                .prop("certificate_arn", arn.as_str())
        }
        None => listener.prop("port", 80u16).prop("protocol", "HTTP"),
    };
    plan.add(listener)?;

    let asg_subnets = public_subnet_ids(plan);
    plan.add(
        ResourceSpec::new(ResourceKind::AutoscalingGroup, AUTOSCALING_GROUP)
            .prop("vpc_zone_identifiers", asg_subnets)
            .prop("min_size", scaling.min_size)
            .prop("max_size", scaling.max_size)
            .prop("desired_capacity", scaling.desired_capacity)
            .prop("default_cooldown", scaling.cooldown)
            .prop("health_check_type", "ELB")
            .prop(
                "launch_template",
                Value::map([
                    ("id", Value::id(LAUNCH_TEMPLATE)),
                    ("version", Value::output(LAUNCH_TEMPLATE, "latest_version")),
                ]),
            )
            .prop(
                "target_group_arns",
                Value::list([Value::output(TARGET_GROUP, "arn")]),
            )
            .prop(
                "tags",
                Value::list([Value::map([
                    ("key", Value::from("Name")),
                    ("value", Value::from(INSTANCE)),
                    ("propagate_at_launch", Value::from(true)),
                ])]),
            ),
    )?;

    for (policy, alarm, adjustment, comparison, threshold) in [
        (
            SCALE_UP_POLICY,
            CPU_HIGH_ALARM,
            1i64,
            "GreaterThanThreshold",
            scaling.scale_up_cpu,
        ),
        (
            SCALE_DOWN_POLICY,
            CPU_LOW_ALARM,
            -1i64,
            "LessThanThreshold",
            scaling.scale_down_cpu,
        ),
    ] {
        plan.add(
            ResourceSpec::new(ResourceKind::AutoscalingPolicy, policy)
                .prop("autoscaling_group_name", Value::output(AUTOSCALING_GROUP, "name"))
                .prop("adjustment_type", "ChangeInCapacity")
                .prop("policy_type", "SimpleScaling")
                .prop("scaling_adjustment", adjustment)
                .prop("cooldown", scaling.cooldown),
        )?;
        plan.add(
            ResourceSpec::new(ResourceKind::MetricAlarm, alarm)
                .prop("comparison_operator", comparison)
                .prop("metric_name", "CPUUtilization")
                .prop("namespace", "AWS/EC2")
                .prop("statistic", "Average")
                .prop("period", 60u32)
                .prop("evaluation_periods", 1u32)
                .prop("threshold", threshold)
                .prop(
                    "dimensions",
                    Value::map([(
                        "AutoScalingGroupName",
                        Value::output(AUTOSCALING_GROUP, "name"),
                    )]),
                )
                .prop("alarm_actions", Value::list([Value::output(policy, "arn")])),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Outputs;
    use crate::topology::tests::{autoscaling_config, sample_config, sample_lookups, with_notifications};
    use crate::topology::TopologyBuilder;

    #[tokio::test]
    async fn test_bootstrap_renders_endpoint() {
        let config = sample_config();
        let mut plan = TopologyBuilder::new(&config, &sample_lookups()).build().unwrap();
        let (sources, script) = bootstrap(&mut plan, &config);
        assert_eq!(sources, vec![endpoint()]);

        let (_, _, mut registry) = plan.into_parts();
        let outputs = Outputs::from([("endpoint".to_string(), "db.rds:3306".to_string())]);
        registry.record(DB_INSTANCE, &outputs);

        let script = script.await.unwrap();
        assert!(script.contains("jdbc:mariadb://db.rds:3306/csye6225"));
        assert!(script.contains("username=csye6225"));
        assert!(script.contains("password=12345678"));
        assert!(script.contains("sns-topic-arn=\""));
        assert!(script.contains("\\${USERS_CSV:users.csv}"));
    }

    #[tokio::test]
    async fn test_bootstrap_waits_for_topic() {
        let config = with_notifications(sample_config());
        let mut plan = TopologyBuilder::new(&config, &sample_lookups()).build().unwrap();
        let (sources, script) = bootstrap(&mut plan, &config);
        assert_eq!(sources.len(), 2);

        let (_, _, mut registry) = plan.into_parts();
        registry.record(
            DB_INSTANCE,
            &Outputs::from([("endpoint".to_string(), "db.rds:3306".to_string())]),
        );
        registry.record(
            "sns-topic",
            &Outputs::from([("arn".to_string(), "arn:aws:sns:us-east-1:1:topic".to_string())]),
        );
        let script = script.await.unwrap();
        assert!(script.contains("sns-topic-arn=arn:aws:sns:us-east-1:1:topic"));
    }

    #[test]
    fn test_listener_uses_https_with_certificate() {
        let config = autoscaling_config();
        let mut lookups = sample_lookups();

        let plan = TopologyBuilder::new(&config, &lookups).build().unwrap();
        let http = format!("{:?}", plan.get(LISTENER).unwrap().properties);
        assert!(http.contains("\"protocol\": \"HTTP\""), "{http}");
        assert!(!http.contains("certificate_arn"));

        lookups.certificate = Some("arn:aws:acm:us-east-1:1:certificate/abc".to_string());
        let plan = TopologyBuilder::new(&config, &lookups).build().unwrap();
        let https = format!("{:?}", plan.get(LISTENER).unwrap().properties);
        assert!(https.contains("\"protocol\": \"HTTPS\""), "{https}");
        assert!(https.contains("\"port\": 443"), "{https}");
    }

    #[test]
    fn test_autoscaling_group_spans_public_subnets() {
        let config = autoscaling_config();
        let plan = TopologyBuilder::new(&config, &sample_lookups()).build().unwrap();
        let asg = plan.get(AUTOSCALING_GROUP).unwrap();
        assert_eq!(
            asg.dependencies(),
            vec![
                LAUNCH_TEMPLATE,
                TARGET_GROUP,
                "public-subnet-1",
                "public-subnet-2",
                "public-subnet-3",
            ]
        );
        let graph = plan.graph().unwrap();
        assert!(graph.requires(CPU_HIGH_ALARM, SCALE_UP_POLICY));
        assert!(graph.requires(CPU_LOW_ALARM, AUTOSCALING_GROUP));
    }
}
