//! Optional notification pipeline.
//!
//! The application publishes to an SNS topic; a Lambda subscribed to it
//! sends the mail, tracks it in DynamoDB and uploads artifacts to a GCP
//! bucket with a service account key handed over through its environment.

use super::identity::{assume_role_policy, INSTANCE_ROLE};
use super::{tags, Plan};
use crate::config::{NotificationConfig, StackConfig};
use crate::deferred::OutputRef;
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};

pub const SNS_TOPIC: &str = "sns-topic";
pub const SNS_PUBLISH_POLICY: &str = "sns-publish-policy";
pub const TRACKING_TABLE: &str = "email-tracking-table";
pub const GCP_BUCKET: &str = "gcp-bucket";
pub const GCP_SERVICE_ACCOUNT: &str = "gcp-service-account";
pub const GCP_SERVICE_ACCOUNT_KEY: &str = "gcp-service-account-key";
pub const LAMBDA_ROLE: &str = "lambda-role";
pub const LAMBDA_FUNCTION: &str = "lambda-function";
pub const LAMBDA_PERMISSION: &str = "lambda-permission";
pub const SNS_SUBSCRIPTION: &str = "sns-subscription";

const LAMBDA_POLICIES: [(&str, &str); 2] = [
    (
        "lambda-basic-execution",
        "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
    ),
    (
        "lambda-dynamodb-access",
        "arn:aws:iam::aws:policy/AmazonDynamoDBFullAccess",
    ),
];

const SNS_PUBLISH_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonSNSFullAccess";

/// Output holding the topic ARN, if the pipeline is enabled.
pub fn topic_arn(config: &StackConfig) -> Option<OutputRef> {
    config
        .notifications
        .as_ref()
        .map(|_| OutputRef::new(SNS_TOPIC, "arn"))
}

pub fn build(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    let Some(notifications) = &config.notifications else {
        log::debug!("notification pipeline disabled");
        return Ok(());
    };

    plan.add(
        ResourceSpec::new(ResourceKind::SnsTopic, SNS_TOPIC)
            .prop("name", SNS_TOPIC)
            .prop("tags", tags(config, SNS_TOPIC)),
    )?;

    // Instances publish with the instance role.
    plan.add(
        ResourceSpec::new(ResourceKind::IamRolePolicyAttachment, SNS_PUBLISH_POLICY)
            .prop("role", Value::output(INSTANCE_ROLE, "name"))
            .prop("policy_arn", SNS_PUBLISH_POLICY_ARN),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::DynamoDbTable, TRACKING_TABLE)
            .prop("name", notifications.dynamodb_table.as_str())
            .prop("billing_mode", "PAY_PER_REQUEST")
            .prop("hash_key", "id")
            .prop(
                "attributes",
                Value::list([Value::map([("name", "id"), ("type", "S")])]),
            )
            .prop("tags", tags(config, &notifications.dynamodb_table)),
    )?;

    build_gcp(plan, notifications)?;

    plan.add(
        ResourceSpec::new(ResourceKind::IamRole, LAMBDA_ROLE)
            .prop("assume_role_policy", assume_role_policy("lambda.amazonaws.com")?)
            .prop("tags", tags(config, LAMBDA_ROLE)),
    )?;
    for (name, arn) in LAMBDA_POLICIES {
        plan.add(
            ResourceSpec::new(ResourceKind::IamRolePolicyAttachment, name)
                .prop("role", Value::output(LAMBDA_ROLE, "name"))
                .prop("policy_arn", arn),
        )?;
    }

    let mut function = ResourceSpec::new(ResourceKind::LambdaFunction, LAMBDA_FUNCTION)
        .prop("code", notifications.lambda_path.as_str())
        .prop("handler", notifications.lambda_handler.as_str())
        .prop("runtime", notifications.lambda_runtime.as_str())
        .prop("role", Value::output(LAMBDA_ROLE, "arn"))
        .prop(
            "environment",
            Value::map([(
                "variables",
                Value::map([
                    ("GCP_BUCKET_NAME", Value::output(GCP_BUCKET, "name")),
                    (
                        "GOOGLE_CREDENTIALS",
                        Value::output(GCP_SERVICE_ACCOUNT_KEY, "private_key"),
                    ),
                    ("DYNAMODB_TABLE", Value::output(TRACKING_TABLE, "name")),
                    ("SMTP_USER", Value::from(&notifications.smtp_user)),
                    ("SMTP_PASSWORD", Value::from(&notifications.smtp_password)),
                ]),
            )]),
        )
        .prop("tags", tags(config, LAMBDA_FUNCTION));
    // Policies must be attached before the first invocation.
    for (name, _) in LAMBDA_POLICIES {
        function = function.depends_on(name);
    }
    plan.add(function)?;

    plan.add(
        ResourceSpec::new(ResourceKind::LambdaPermission, LAMBDA_PERMISSION)
            .prop("action", "lambda:InvokeFunction")
            .prop("function", Value::output(LAMBDA_FUNCTION, "name"))
            .prop("principal", "sns.amazonaws.com")
            .prop("source_arn", Value::output(SNS_TOPIC, "arn")),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::SnsTopicSubscription, SNS_SUBSCRIPTION)
            .prop("topic", Value::output(SNS_TOPIC, "arn"))
            .prop("protocol", "lambda")
            .prop("endpoint", Value::output(LAMBDA_FUNCTION, "arn"))
            .depends_on(LAMBDA_PERMISSION),
    )?;
    Ok(())
}

fn build_gcp(plan: &mut Plan, notifications: &NotificationConfig) -> TopologyResult<()> {
    let project = notifications.gcp_project.as_str();
    plan.add(
        ResourceSpec::new(ResourceKind::GcpBucket, GCP_BUCKET)
            .prop("name", format!("{project}-submissions"))
            .prop("project", project)
            .prop("location", notifications.gcp_location.as_str())
            .prop("force_destroy", true)
            .prop("uniform_bucket_level_access", true),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::GcpServiceAccount, GCP_SERVICE_ACCOUNT)
            .prop("account_id", "lambda-bucket-writer")
            .prop("project", project)
            .prop("display_name", "Lambda bucket writer"),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::GcpServiceAccountKey, GCP_SERVICE_ACCOUNT_KEY)
            .prop("service_account_id", Value::output(GCP_SERVICE_ACCOUNT, "email"))
            .prop("public_key_type", "TYPE_X509_PEM_FILE"),
    )?;
    Ok(())
}
