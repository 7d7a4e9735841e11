//! Resource descriptors handed to the provisioning engine.

use crate::deferred::{Deferred, OutputRef, OutputRegistry};
use crate::error::{TopologyError, TopologyResult};
use futures::future::{BoxFuture, FutureExt};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Every resource type the topology declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    RouteTableAssociation,
    Route,
    SecurityGroup,
    SecurityGroupRule,
    IamRole,
    IamInstanceProfile,
    IamRolePolicyAttachment,
    DbSubnetGroup,
    DbParameterGroup,
    DbInstance,
    Instance,
    LaunchTemplate,
    TargetGroup,
    LoadBalancer,
    Listener,
    AutoscalingGroup,
    AutoscalingPolicy,
    MetricAlarm,
    SnsTopic,
    SnsTopicSubscription,
    LambdaFunction,
    LambdaPermission,
    DynamoDbTable,
    GcpBucket,
    GcpServiceAccount,
    GcpServiceAccountKey,
    Route53Record,
}

impl ResourceKind {
    /// Engine type token, in the `provider:module/type` form.
    pub fn type_token(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "aws:ec2/vpc",
            ResourceKind::Subnet => "aws:ec2/subnet",
            ResourceKind::InternetGateway => "aws:ec2/internetGateway",
            ResourceKind::RouteTable => "aws:ec2/routeTable",
            ResourceKind::RouteTableAssociation => "aws:ec2/routeTableAssociation",
            ResourceKind::Route => "aws:ec2/route",
            ResourceKind::SecurityGroup => "aws:ec2/securityGroup",
            ResourceKind::SecurityGroupRule => "aws:ec2/securityGroupRule",
            ResourceKind::IamRole => "aws:iam/role",
            ResourceKind::IamInstanceProfile => "aws:iam/instanceProfile",
            ResourceKind::IamRolePolicyAttachment => "aws:iam/rolePolicyAttachment",
            ResourceKind::DbSubnetGroup => "aws:rds/subnetGroup",
            ResourceKind::DbParameterGroup => "aws:rds/parameterGroup",
            ResourceKind::DbInstance => "aws:rds/instance",
            ResourceKind::Instance => "aws:ec2/instance",
            ResourceKind::LaunchTemplate => "aws:ec2/launchTemplate",
            ResourceKind::TargetGroup => "aws:lb/targetGroup",
            ResourceKind::LoadBalancer => "aws:lb/loadBalancer",
            ResourceKind::Listener => "aws:lb/listener",
            ResourceKind::AutoscalingGroup => "aws:autoscaling/group",
            ResourceKind::AutoscalingPolicy => "aws:autoscaling/policy",
            ResourceKind::MetricAlarm => "aws:cloudwatch/metricAlarm",
            ResourceKind::SnsTopic => "aws:sns/topic",
            ResourceKind::SnsTopicSubscription => "aws:sns/topicSubscription",
            ResourceKind::LambdaFunction => "aws:lambda/function",
            ResourceKind::LambdaPermission => "aws:lambda/permission",
            ResourceKind::DynamoDbTable => "aws:dynamodb/table",
            ResourceKind::GcpBucket => "gcp:storage/bucket",
            ResourceKind::GcpServiceAccount => "gcp:serviceaccount/account",
            ResourceKind::GcpServiceAccountKey => "gcp:serviceaccount/key",
            ResourceKind::Route53Record => "aws:route53/record",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

/// A property value, either literal or bound to another resource's output.
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Output of a resource created earlier in the plan.
    Output(OutputRef),
    /// A value computed from `sources` once they resolve.
    Deferred {
        sources: Vec<OutputRef>,
        value: Deferred<String>,
    },
}

impl Value {
    /// The `id` output of `resource`.
    pub fn id(resource: &str) -> Value {
        Value::Output(OutputRef::id(resource))
    }

    pub fn output(resource: &str, attribute: &str) -> Value {
        Value::Output(OutputRef::new(resource, attribute))
    }

    pub fn list<I, V>(items: I) -> Value
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Every output this value (recursively) depends on.
    pub fn references(&self) -> Vec<&OutputRef> {
        match self {
            Value::Output(r) => vec![r],
            Value::Deferred { sources, .. } => sources.iter().collect(),
            Value::List(items) => items.iter().flat_map(|v| v.references()).collect(),
            Value::Map(entries) => entries.values().flat_map(|v| v.references()).collect(),
            Value::Str(_) | Value::Int(_) | Value::Bool(_) => vec![],
        }
    }

    /// Replace references with the values the engine reported.
    ///
    /// Plain outputs are read from `registry`; deferred values are awaited.
    pub fn resolve(self, registry: &Mutex<OutputRegistry>) -> BoxFuture<'_, TopologyResult<JsonValue>> {
        async move {
            let resolved = match self {
                Value::Str(s) => JsonValue::String(s),
                Value::Int(i) => JsonValue::from(i),
                Value::Bool(b) => JsonValue::Bool(b),
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(item.resolve(registry).await?);
                    }
                    JsonValue::Array(out)
                }
                Value::Map(entries) => {
                    let mut out = serde_json::Map::new();
                    for (key, item) in entries {
                        out.insert(key, item.resolve(registry).await?);
                    }
                    JsonValue::Object(out)
                }
                Value::Output(output) => JsonValue::String(lookup(registry, &output)?),
                Value::Deferred { value, .. } => JsonValue::String(value.await?),
            };
            Ok(resolved)
        }
        .boxed()
    }
}

fn lookup(registry: &Mutex<OutputRegistry>, output: &OutputRef) -> TopologyResult<String> {
    let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    registry
        .get(output)
        .map(str::to_string)
        .ok_or_else(|| TopologyError::Unresolved(output.to_string()))
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => f.debug_map().entries(entries).finish(),
            Value::Output(r) => write!(f, "${{{r}}}"),
            Value::Deferred { sources, .. } => {
                let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
                write!(f, "deferred({})", sources.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<OutputRef> for Value {
    fn from(r: OutputRef) -> Self {
        Value::Output(r)
    }
}

impl From<super::Ipv4> for Value {
    fn from(ip: super::Ipv4) -> Self {
        Value::Str(ip.to_string())
    }
}

/// One resource to create: a name unique within the plan, its type and inputs.
#[derive(Debug)]
pub struct ResourceSpec {
    pub name: String,
    pub kind: ResourceKind,
    pub properties: BTreeMap<String, Value>,
    /// Ordering constraints not visible through property references.
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> ResourceSpec {
        ResourceSpec {
            name: name.into(),
            kind,
            properties: BTreeMap::new(),
            depends_on: vec![],
        }
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> ResourceSpec {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, resource: &str) -> ResourceSpec {
        if !self.depends_on.iter().any(|d| d == resource) {
            self.depends_on.push(resource.to_string());
        }
        self
    }

    /// Names of every resource this one needs created first, deduplicated.
    pub fn dependencies(&self) -> Vec<&str> {
        self.properties
            .values()
            .flat_map(|v| v.references())
            .map(|r| r.resource.as_str())
            .chain(self.depends_on.iter().map(|d| d.as_str()))
            .unique()
            .collect()
    }
}

/// A resource with every reference replaced by a concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub name: String,
    pub kind: ResourceKind,
    pub properties: BTreeMap<String, JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Outputs;

    #[test]
    fn test_dependencies_from_refs_and_depends_on() {
        let spec = ResourceSpec::new(ResourceKind::RouteTableAssociation, "assoc")
            .prop("subnet_id", Value::id("public-subnet-1"))
            .prop("route_table_id", Value::id("public-route-table"))
            .prop("tags", Value::map([("Name", Value::id("public-subnet-1"))]))
            .depends_on("vpc")
            .depends_on("vpc");
        assert_eq!(
            spec.dependencies(),
            vec!["public-route-table", "public-subnet-1", "vpc"]
        );
    }

    #[tokio::test]
    async fn test_resolve_outputs_and_deferred() {
        let mut registry = OutputRegistry::new();
        let deferred = registry
            .watch(OutputRef::new("db", "endpoint"))
            .map(|host| format!("host={host}"));

        let mut outputs = Outputs::new();
        outputs.insert("id".to_string(), "db-0001".to_string());
        outputs.insert("endpoint".to_string(), "db:3306".to_string());
        registry.record("db", &outputs);
        let registry = Mutex::new(registry);

        let value = Value::list([
            Value::id("db"),
            Value::Deferred {
                sources: vec![OutputRef::new("db", "endpoint")],
                value: deferred,
            },
            Value::from(3306u16),
        ]);
        let resolved = value.resolve(&registry).await.unwrap();
        assert_eq!(resolved, serde_json::json!(["db-0001", "host=db:3306", 3306]));

        let missing = Value::id("web").resolve(&registry).await;
        assert!(matches!(missing, Err(TopologyError::Unresolved(_))));
    }
}
