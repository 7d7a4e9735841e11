//! Topology builder.
//!
//! Turns a [`StackConfig`] plus the answers of the engine's lookups into a
//! [`Plan`]: every resource of the stack with its inputs, references to the
//! outputs of other resources, and the values exported to the operator.
//!
//! Stages run in a fixed order and each declares its resources into the plan:
//! - [`network`] - VPC, subnets, gateway, route tables
//! - [`security`] - security groups and their rules
//! - [`identity`] - instance role and profile
//! - [`database`] - RDS subnet group, parameter group and instance
//! - [`notifications`] - SNS, Lambda, DynamoDB and GCP (optional)
//! - [`compute`] - single instance, or launch template + ALB + autoscaling group
//! - [`dns`] - Route53 record for the domain

pub mod compute;
pub mod database;
pub mod dns;
pub mod identity;
pub mod network;
pub mod notifications;
pub mod security;

use crate::config::StackConfig;
use crate::deferred::{Deferred, OutputRef, OutputRegistry};
use crate::error::{TopologyError, TopologyResult};
use crate::graph::DependencyGraph;
use crate::models::{partition, Ipv4, ResourceSpec, Value, ZoneAssignment};
use crate::provider::{HostedZone, Provider};
use std::collections::{BTreeMap, HashSet};

/// Facts about the target account that the plan needs before it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookups {
    /// Available zones in the stack's region, in provider order.
    pub zones: Vec<String>,
    pub hosted_zone: HostedZone,
    /// Issued certificate for the domain, looked up in autoscaling mode only.
    pub certificate: Option<String>,
}

impl Lookups {
    /// Ask the engine for zones, hosted zone and certificate.
    pub async fn query(config: &StackConfig, provider: &dyn Provider) -> TopologyResult<Lookups> {
        let zones = provider.availability_zones(&config.region).await?;
        let hosted_zone = provider.hosted_zone(&config.domain_name).await?;
        let certificate = match config.compute_mode {
            crate::config::ComputeMode::Autoscaling => {
                provider.certificate(&config.domain_name).await?
            }
            crate::config::ComputeMode::Single => None,
        };
        log::info!(
            "Lookups: {} zone(s), hosted zone {}, certificate {}",
            zones.len(),
            hosted_zone.id,
            certificate.as_deref().unwrap_or("none")
        );
        Ok(Lookups {
            zones,
            hosted_zone,
            certificate,
        })
    }
}

/// Resources to create, in declaration order, plus their exported outputs.
pub struct Plan {
    resources: Vec<ResourceSpec>,
    names: HashSet<String>,
    exports: BTreeMap<String, OutputRef>,
    registry: OutputRegistry,
    subnets: Vec<Ipv4>,
    zones: ZoneAssignment,
}

impl Plan {
    pub fn new(subnets: Vec<Ipv4>, zones: ZoneAssignment) -> Plan {
        Plan {
            resources: vec![],
            names: HashSet::new(),
            exports: BTreeMap::new(),
            registry: OutputRegistry::new(),
            subnets,
            zones,
        }
    }

    /// Declare a resource. Names are unique within a plan.
    pub fn add(&mut self, spec: ResourceSpec) -> TopologyResult<()> {
        if !self.names.insert(spec.name.clone()) {
            return Err(TopologyError::Configuration(format!(
                "duplicate resource name '{}'",
                spec.name
            )));
        }
        log::debug!("plan: {} {}", spec.kind, spec.name);
        self.resources.push(spec);
        Ok(())
    }

    /// Surface an output to the operator under `name`.
    pub fn export(&mut self, name: &str, output: OutputRef) {
        self.exports.insert(name.to_string(), output);
    }

    /// A value that resolves once `output`'s resource has been created.
    pub fn watch(&mut self, output: OutputRef) -> Deferred<String> {
        self.registry.watch(output)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn exports(&self) -> &BTreeMap<String, OutputRef> {
        &self.exports
    }

    /// Full partition of the VPC block.
    pub fn subnets(&self) -> &[Ipv4] {
        &self.subnets
    }

    pub fn zones(&self) -> &ZoneAssignment {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn graph(&self) -> TopologyResult<DependencyGraph> {
        DependencyGraph::from_resources(&self.resources)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<ResourceSpec>,
        BTreeMap<String, OutputRef>,
        OutputRegistry,
    ) {
        (self.resources, self.exports, self.registry)
    }
}

/// Builds the plan for one stack.
pub struct TopologyBuilder<'a> {
    config: &'a StackConfig,
    lookups: &'a Lookups,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(config: &'a StackConfig, lookups: &'a Lookups) -> TopologyBuilder<'a> {
        TopologyBuilder { config, lookups }
    }

    /// Run every stage. The first failing stage aborts the build.
    pub fn build(self) -> TopologyResult<Plan> {
        let config = self.config;
        let parent = config.vpc_cidr.network();
        if parent != config.vpc_cidr {
            log::warn!("vpc-cidr {} normalised to {}", config.vpc_cidr, parent);
        }
        let subnets = partition(parent, config.subnet_prefix)?;
        let zones = ZoneAssignment::assign(&subnets, &self.lookups.zones, config.zone_count)?;
        log::info!(
            "Partitioned {} into {} /{} subnets over {} zone(s)",
            parent,
            subnets.len(),
            config.subnet_prefix,
            zones.len()
        );

        let mut plan = Plan::new(subnets, zones);
        network::build(&mut plan, config)?;
        security::build(&mut plan, config)?;
        identity::build(&mut plan, config)?;
        database::build(&mut plan, config)?;
        notifications::build(&mut plan, config)?;
        compute::build(&mut plan, config, self.lookups)?;
        dns::build(&mut plan, config, self.lookups)?;

        // Surfaces unknown references and cycles before anything is applied.
        plan.graph()?.order()?;
        log::info!("Plan holds {} resources", plan.len());
        Ok(plan)
    }
}

/// Query the engine and build the plan for `config`.
pub async fn plan(config: &StackConfig, provider: &dyn Provider) -> TopologyResult<Plan> {
    let lookups = Lookups::query(config, provider).await?;
    TopologyBuilder::new(config, &lookups).build()
}

/// Stack tags plus the resource's `Name`.
pub(crate) fn tags(config: &StackConfig, name: &str) -> Value {
    let mut tags: BTreeMap<String, Value> = config
        .tags
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect();
    tags.insert("Name".to_string(), Value::from(name));
    Value::Map(tags)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_STACK;
    use crate::config::{ComputeMode, NotificationConfig};

    pub(crate) fn sample_config() -> StackConfig {
        StackConfig::from_yaml(SAMPLE_STACK, vec![]).unwrap()
    }

    pub(crate) fn autoscaling_config() -> StackConfig {
        let mut config = sample_config();
        config.compute_mode = ComputeMode::Autoscaling;
        config
    }

    pub(crate) fn with_notifications(mut config: StackConfig) -> StackConfig {
        config.notifications = Some(NotificationConfig {
            lambda_path: "lambda/function.zip".to_string(),
            lambda_handler: "main".to_string(),
            lambda_runtime: "go1.x".to_string(),
            gcp_project: "webapp-dev".to_string(),
            gcp_location: "US".to_string(),
            smtp_user: "mailer".to_string(),
            smtp_password: "secret".to_string(),
            dynamodb_table: "email-tracking".to_string(),
        });
        config
    }

    pub(crate) fn sample_lookups() -> Lookups {
        Lookups {
            zones: ["us-east-1a", "us-east-1b", "us-east-1c", "us-east-1d"]
                .iter()
                .map(|z| z.to_string())
                .collect(),
            hosted_zone: HostedZone {
                id: "Z0123456789".to_string(),
                name: "dev.example.com.".to_string(),
            },
            certificate: None,
        }
    }

    fn build(config: &StackConfig, lookups: &Lookups) -> Plan {
        TopologyBuilder::new(config, lookups).build().unwrap()
    }

    #[test]
    fn test_single_mode_plan() {
        let plan = build(&sample_config(), &sample_lookups());
        assert_eq!(plan.subnets().len(), 256);
        assert_eq!(plan.zones().len(), 3);

        for name in [
            "vpc",
            "public-subnet-1",
            "private-subnet-3",
            "internet-gateway",
            "route-to-gateway",
            "application-security-group",
            "database-security-group",
            "cloudwatch-agent-role",
            "db",
            "webapp",
            "webapp-a-record",
        ] {
            assert!(plan.get(name).is_some(), "missing {name}");
        }
        assert!(plan.get("public-subnet-4").is_none());
        assert!(plan.get("webapp-load-balancer").is_none());
        assert!(plan.get("sns-topic").is_none());
        assert_eq!(
            plan.exports().keys().collect::<Vec<_>>(),
            vec!["dbEndpoint", "vpcId"]
        );
    }

    #[test]
    fn test_dependency_chain() {
        let plan = build(&sample_config(), &sample_lookups());
        let graph = plan.graph().unwrap();
        assert!(graph.requires("public-subnet-1", "vpc"));
        assert!(graph.requires("public-route-table-assoc-1", "public-subnet-1"));
        assert!(graph.requires("private-route-table-assoc-2", "private-route-table"));
        assert!(graph.requires(
            "application-security-group-egress-rule",
            "application-security-group"
        ));
        assert!(graph.requires(
            "application-security-group-egress-rule",
            "database-security-group"
        ));
        assert!(graph.requires("webapp", "db"));
        assert!(graph.requires("webapp-a-record", "webapp"));

        let order = graph.order().unwrap();
        assert_eq!(order[0], "vpc");
        let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
        assert!(pos("db") < pos("webapp"));
        assert!(pos("db-subnet-group") < pos("db"));
    }

    #[test]
    fn test_autoscaling_dependency_chain() {
        let config = with_notifications(autoscaling_config());
        let plan = build(&config, &sample_lookups());
        let graph = plan.graph().unwrap();
        assert!(plan.get("webapp").is_none());
        assert!(graph.requires("webapp-alias-record", "webapp-load-balancer"));
        assert!(graph.requires("webapp-alias-record", "webapp-asg"));
        assert!(graph.requires("webapp-asg", "webapp-launch-template"));
        assert!(graph.requires("webapp-launch-template", "db"));
        assert!(graph.requires("webapp-launch-template", "sns-topic"));
        assert!(graph.requires("sns-subscription", "lambda-function"));
        assert!(plan.exports().contains_key("albDnsName"));
    }

    #[test]
    fn test_fewer_zones_scale_down() {
        let mut lookups = sample_lookups();
        lookups.zones.truncate(2);
        let plan = build(&sample_config(), &lookups);
        assert_eq!(plan.zones().len(), 2);
        assert!(plan.get("public-subnet-2").is_some());
        assert!(plan.get("public-subnet-3").is_none());
        assert!(plan.get("private-route-table-assoc-3").is_none());
    }

    #[test]
    fn test_partition_too_small_for_zones() {
        let mut config = sample_config();
        config.vpc_cidr = Ipv4::new("10.0.0.0/23").unwrap();
        let err = TopologyBuilder::new(&config, &sample_lookups())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, TopologyError::InvalidPrefix(_)), "{err}");
    }

    #[test]
    fn test_subnet_prefix_wider_than_vpc() {
        let mut config = sample_config();
        config.subnet_prefix = 8;
        let err = TopologyBuilder::new(&config, &sample_lookups())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, TopologyError::InvalidPrefix(_)), "{err}");
    }

    #[test]
    fn test_no_zones_fails() {
        let mut lookups = sample_lookups();
        lookups.zones.clear();
        let err = TopologyBuilder::new(&sample_config(), &lookups)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, TopologyError::Configuration(_)), "{err}");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut plan = Plan::new(vec![], ZoneAssignment { pairs: vec![] });
        plan.add(ResourceSpec::new(crate::models::ResourceKind::Vpc, "vpc"))
            .unwrap();
        assert!(plan
            .add(ResourceSpec::new(crate::models::ResourceKind::Vpc, "vpc"))
            .is_err());
    }

    #[test]
    fn test_tags_carry_name() {
        let config = sample_config();
        let tags = format!("{:?}", tags(&config, "vpc"));
        assert!(tags.contains("\"Name\": \"vpc\""), "{tags}");
        assert!(tags.contains("\"course\": \"CSYE-6225\""), "{tags}");
    }
}
