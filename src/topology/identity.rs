//! Instance role, instance profile and the CloudWatch agent policy.

use super::{tags, Plan};
use crate::config::StackConfig;
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};
use serde_json::json;

pub const INSTANCE_ROLE: &str = "cloudwatch-agent-role";
pub const INSTANCE_PROFILE: &str = "cloudwatch-instance-profile";
pub const CLOUDWATCH_POLICY: &str = "cloudwatch-agent-policy";

const CLOUDWATCH_POLICY_ARN: &str = "arn:aws:iam::aws:policy/CloudWatchAgentServerPolicy";

/// Trust policy letting `service` assume a role.
pub fn assume_role_policy(service: &str) -> TopologyResult<String> {
    let policy = json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Sid": "",
            "Principal": { "Service": service },
        }],
    });
    Ok(serde_json::to_string(&policy)?)
}

pub fn build(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    plan.add(
        ResourceSpec::new(ResourceKind::IamRole, INSTANCE_ROLE)
            .prop("assume_role_policy", assume_role_policy("ec2.amazonaws.com")?)
            .prop("tags", tags(config, INSTANCE_ROLE)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::IamInstanceProfile, INSTANCE_PROFILE)
            .prop("role", Value::output(INSTANCE_ROLE, "name"))
            .prop("tags", tags(config, INSTANCE_PROFILE)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::IamRolePolicyAttachment, CLOUDWATCH_POLICY)
            .prop("role", Value::output(INSTANCE_ROLE, "name"))
            .prop("policy_arn", CLOUDWATCH_POLICY_ARN),
    )?;
    Ok(())
}
