//! In-memory provisioning engine.
//!
//! Mints identifiers and endpoints instead of calling a cloud API, and keeps
//! what it created in a [`State`], optionally persisted after every step.

use super::state::{read_state_file, write_state_file, State, StateEntry};
use super::{Change, CreateResult, HostedZone, Provider};
use crate::deferred::Outputs;
use crate::error::{TopologyError, TopologyResult};
use crate::models::{ResolvedResource, ResourceKind};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Account id used in minted ARNs.
const ACCOUNT_ID: &str = "123456789012";

/// Hosted zone id of application load balancers in us-east-1.
const ELB_ZONE_ID: &str = "Z35SXDOTRQ7X7K";

pub struct DryRunProvider {
    region: String,
    zones: Option<Vec<String>>,
    hosted_zones: BTreeMap<String, String>,
    certificates: BTreeMap<String, String>,
    fail_on: HashSet<String>,
    state_file: Option<PathBuf>,
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
}

impl DryRunProvider {
    /// Engine with empty, unpersisted state.
    pub fn new(region: &str) -> DryRunProvider {
        DryRunProvider {
            region: region.to_string(),
            zones: None,
            hosted_zones: BTreeMap::new(),
            certificates: BTreeMap::new(),
            fail_on: HashSet::new(),
            state_file: None,
            state: Mutex::new(State::default()),
            calls: Mutex::new(vec![]),
        }
    }

    /// Engine loading from and saving to `state_file`.
    pub fn with_state_file(region: &str, state_file: &Path) -> TopologyResult<DryRunProvider> {
        let state = read_state_file(state_file)?;
        let mut provider = DryRunProvider::new(region);
        provider.state = Mutex::new(state);
        provider.state_file = Some(state_file.to_path_buf());
        Ok(provider)
    }

    /// Override the zones reported for every region.
    pub fn with_zones(mut self, zones: &[&str]) -> DryRunProvider {
        self.zones = Some(zones.iter().map(|z| z.to_string()).collect());
        self
    }

    pub fn with_hosted_zone(mut self, domain: &str, id: &str) -> DryRunProvider {
        self.hosted_zones.insert(domain.to_string(), id.to_string());
        self
    }

    pub fn with_certificate(mut self, domain: &str, arn: &str) -> DryRunProvider {
        self.certificates.insert(domain.to_string(), arn.to_string());
        self
    }

    /// Make `create` fail for the named resource.
    pub fn fail_on(mut self, resource: &str) -> DryRunProvider {
        self.fail_on.insert(resource.to_string());
        self
    }

    /// Names passed to `create`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{service}:{}:{ACCOUNT_ID}:{resource}", self.region)
    }

    /// Outputs the real service would report for a freshly created resource.
    fn mint_outputs(&self, resource: &ResolvedResource, serial: u64) -> Outputs {
        let name = resource.name.as_str();
        let prop = |key: &str| {
            resource
                .properties
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(name)
                .to_string()
        };
        let id = format!("{}-{serial:08x}", id_prefix(resource.kind));

        let mut outputs = Outputs::new();
        match resource.kind {
            ResourceKind::IamRole => {
                let role = format!("{name}-{serial:07x}");
                outputs.insert("arn".into(), format!("arn:aws:iam::{ACCOUNT_ID}:role/{role}"));
                outputs.insert("name".into(), role.clone());
                outputs.insert("id".into(), role);
            }
            ResourceKind::IamInstanceProfile | ResourceKind::DbSubnetGroup
            | ResourceKind::DbParameterGroup => {
                let group = format!("{name}-{serial:07x}");
                outputs.insert("name".into(), group.clone());
                outputs.insert("id".into(), group);
            }
            ResourceKind::DbInstance => {
                let address = format!("{name}.c{serial:010x}.{}.rds.amazonaws.com", self.region);
                outputs.insert("address".into(), address.clone());
                outputs.insert("endpoint".into(), format!("{address}:3306"));
                outputs.insert("id".into(), id);
            }
            ResourceKind::Instance => {
                let octets = serial.to_be_bytes();
                outputs.insert(
                    "public_ip".into(),
                    format!("54.{}.{}.{}", octets[5], octets[6], octets[7]),
                );
                outputs.insert(
                    "private_ip".into(),
                    format!("10.0.{}.{}", octets[6], octets[7]),
                );
                outputs.insert("id".into(), id);
            }
            ResourceKind::LoadBalancer => {
                outputs.insert(
                    "dns_name".into(),
                    format!("{name}-{serial}.{}.elb.amazonaws.com", self.region),
                );
                outputs.insert("zone_id".into(), ELB_ZONE_ID.into());
                outputs.insert(
                    "arn".into(),
                    self.arn("elasticloadbalancing", &format!("loadbalancer/app/{name}/{id}")),
                );
                outputs.insert("id".into(), id);
            }
            ResourceKind::TargetGroup | ResourceKind::Listener | ResourceKind::AutoscalingPolicy => {
                outputs.insert("arn".into(), self.arn("elasticloadbalancing", &format!("{name}/{id}")));
                outputs.insert("id".into(), id);
            }
            ResourceKind::LaunchTemplate => {
                outputs.insert("latest_version".into(), "1".into());
                outputs.insert("id".into(), id);
            }
            ResourceKind::AutoscalingGroup => {
                outputs.insert("name".into(), name.to_string());
                outputs.insert("id".into(), name.to_string());
            }
            ResourceKind::SnsTopic => {
                let arn = self.arn("sns", name);
                outputs.insert("arn".into(), arn.clone());
                outputs.insert("id".into(), arn);
            }
            ResourceKind::LambdaFunction => {
                outputs.insert("arn".into(), self.arn("lambda", &format!("function:{name}")));
                outputs.insert("name".into(), name.to_string());
                outputs.insert("id".into(), name.to_string());
            }
            ResourceKind::DynamoDbTable => {
                let table = prop("name");
                outputs.insert("arn".into(), self.arn("dynamodb", &format!("table/{table}")));
                outputs.insert("name".into(), table.clone());
                outputs.insert("id".into(), table);
            }
            ResourceKind::GcpBucket => {
                let bucket = prop("name");
                outputs.insert("url".into(), format!("gs://{bucket}"));
                outputs.insert("name".into(), bucket.clone());
                outputs.insert("id".into(), bucket);
            }
            ResourceKind::GcpServiceAccount => {
                let email = format!("{}@{}.iam.gserviceaccount.com", prop("account_id"), prop("project"));
                outputs.insert("email".into(), email.clone());
                outputs.insert("id".into(), email);
            }
            ResourceKind::GcpServiceAccountKey => {
                let key = format!("{{\"type\":\"service_account\",\"private_key_id\":\"{id}\"}}");
                outputs.insert("private_key".into(), general_purpose::STANDARD.encode(key));
                outputs.insert("id".into(), id);
            }
            ResourceKind::Route53Record => {
                outputs.insert("fqdn".into(), prop("name"));
                outputs.insert("id".into(), id);
            }
            _ => {
                outputs.insert("id".into(), id);
            }
        }
        outputs
    }

    fn persist(&self, state: &mut State) -> TopologyResult<()> {
        match &self.state_file {
            Some(path) => write_state_file(path, state),
            None => Ok(()),
        }
    }
}

/// Identifier prefix the real service uses for the kind.
fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vpc => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::InternetGateway => "igw",
        ResourceKind::RouteTable => "rtb",
        ResourceKind::RouteTableAssociation => "rtbassoc",
        ResourceKind::Route => "r-rtb",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::SecurityGroupRule => "sgr",
        ResourceKind::Instance => "i",
        ResourceKind::LaunchTemplate => "lt",
        ResourceKind::DbInstance => "db",
        _ => "res",
    }
}

#[async_trait]
impl Provider for DryRunProvider {
    async fn availability_zones(&self, region: &str) -> TopologyResult<Vec<String>> {
        let zones = match &self.zones {
            Some(zones) => zones.clone(),
            None => ["a", "b", "c", "d", "e", "f"]
                .iter()
                .map(|suffix| format!("{region}{suffix}"))
                .collect(),
        };
        log::debug!("availability zones in {region}: {zones:?}");
        Ok(zones)
    }

    async fn hosted_zone(&self, domain: &str) -> TopologyResult<HostedZone> {
        let id = match self.hosted_zones.get(domain) {
            Some(id) => id.clone(),
            None => {
                let hash = domain
                    .bytes()
                    .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
                format!("Z{:013X}", hash & 0xF_FFFF_FFFF_FFFF)
            }
        };
        Ok(HostedZone {
            id,
            name: format!("{}.", domain.trim_end_matches('.')),
        })
    }

    async fn certificate(&self, domain: &str) -> TopologyResult<Option<String>> {
        Ok(self.certificates.get(domain).cloned())
    }

    async fn create(&self, resource: &ResolvedResource) -> TopologyResult<CreateResult> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource.name.clone());

        if self.fail_on.contains(&resource.name) {
            return Err(TopologyError::ResourceCreation {
                resource: resource.name.clone(),
                message: format!("{} rejected by the engine", resource.kind),
            });
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let change = match state.resources.get_mut(&resource.name) {
            Some(entry) if entry.kind == resource.kind && entry.properties == resource.properties => {
                log::debug!("{} unchanged", resource.name);
                return Ok(CreateResult {
                    change: Change::Unchanged,
                    outputs: entry.outputs.clone(),
                });
            }
            Some(entry) if entry.kind == resource.kind => {
                log::debug!("{} updated in place", resource.name);
                // outputs derived from properties follow them, serial-based ids stay
                entry.outputs = self.mint_outputs(resource, entry.serial);
                entry.properties = resource.properties.clone();
                entry.updated = now;
                Change::Updated
            }
            _ => {
                state.serial += 1;
                let serial = state.serial;
                let outputs = self.mint_outputs(resource, serial);
                state.resources.insert(
                    resource.name.clone(),
                    StateEntry {
                        kind: resource.kind,
                        serial,
                        properties: resource.properties.clone(),
                        outputs,
                        created: now,
                        updated: now,
                    },
                );
                Change::Created
            }
        };

        self.persist(&mut state)?;
        let outputs = state
            .resources
            .get(&resource.name)
            .map(|e| e.outputs.clone())
            .unwrap_or_default();
        Ok(CreateResult { change, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(name: &str, kind: ResourceKind, cidr: &str) -> ResolvedResource {
        ResolvedResource {
            name: name.to_string(),
            kind,
            properties: BTreeMap::from([("cidr_block".to_string(), json!(cidr))]),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let provider = DryRunProvider::new("us-east-1");
        let vpc = resource("vpc", ResourceKind::Vpc, "10.0.0.0/16");

        let first = provider.create(&vpc).await.unwrap();
        assert_eq!(first.change, Change::Created);
        assert_eq!(first.outputs["id"], "vpc-00000001");

        let second = provider.create(&vpc).await.unwrap();
        assert_eq!(second.change, Change::Unchanged);
        assert_eq!(second.outputs, first.outputs);

        let changed = resource("vpc", ResourceKind::Vpc, "10.1.0.0/16");
        let third = provider.create(&changed).await.unwrap();
        assert_eq!(third.change, Change::Updated);
        assert_eq!(third.outputs["id"], "vpc-00000001");
        assert_eq!(provider.calls(), vec!["vpc", "vpc", "vpc"]);
    }

    #[tokio::test]
    async fn test_db_outputs() {
        let provider = DryRunProvider::new("us-east-1");
        let db = resource("db", ResourceKind::DbInstance, "");
        let outputs = provider.create(&db).await.unwrap().outputs;
        assert_eq!(
            outputs["endpoint"],
            format!("{}:3306", outputs["address"])
        );
        assert!(outputs["address"].ends_with(".us-east-1.rds.amazonaws.com"));
    }

    #[tokio::test]
    async fn test_fail_on() {
        let provider = DryRunProvider::new("us-east-1").fail_on("vpc");
        let err = provider
            .create(&resource("vpc", ResourceKind::Vpc, "10.0.0.0/16"))
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::ResourceCreation { resource, .. } if resource == "vpc"));
        assert!(provider.state().resources.is_empty());
    }

    #[tokio::test]
    async fn test_lookups() {
        let provider = DryRunProvider::new("us-east-1")
            .with_hosted_zone("dev.example.com", "Z123")
            .with_certificate("dev.example.com", "arn:aws:acm:cert");
        assert_eq!(
            provider.availability_zones("us-east-1").await.unwrap().len(),
            6
        );
        assert_eq!(
            provider.hosted_zone("dev.example.com").await.unwrap().id,
            "Z123"
        );
        let other = provider.hosted_zone("prod.example.com").await.unwrap();
        assert!(other.id.starts_with('Z'));
        assert_eq!(other.name, "prod.example.com.");
        assert_eq!(
            provider.certificate("dev.example.com").await.unwrap().as_deref(),
            Some("arn:aws:acm:cert")
        );
        assert!(provider.certificate("x.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_file_persists_between_engines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let vpc = resource("vpc", ResourceKind::Vpc, "10.0.0.0/16");

        let first = DryRunProvider::with_state_file("us-east-1", &path).unwrap();
        assert_eq!(first.create(&vpc).await.unwrap().change, Change::Created);

        let second = DryRunProvider::with_state_file("us-east-1", &path).unwrap();
        assert_eq!(second.create(&vpc).await.unwrap().change, Change::Unchanged);
    }

    #[tokio::test]
    async fn test_update_remints_named_outputs() {
        let provider = DryRunProvider::new("us-east-1");
        let table = |name: &str| ResolvedResource {
            name: "email-tracking-table".to_string(),
            kind: ResourceKind::DynamoDbTable,
            properties: BTreeMap::from([("name".to_string(), json!(name))]),
        };
        provider.create(&resource("vpc", ResourceKind::Vpc, "10.0.0.0/16")).await.unwrap();

        let first = provider.create(&table("email-tracking")).await.unwrap();
        assert_eq!(first.outputs["name"], "email-tracking");

        let renamed = provider.create(&table("new-table")).await.unwrap();
        assert_eq!(renamed.change, Change::Updated);
        assert_eq!(renamed.outputs["name"], "new-table");
        assert!(renamed.outputs["arn"].ends_with(":table/new-table"));
        assert_eq!(provider.state().resources["email-tracking-table"].serial, 2);
        assert_eq!(provider.state().serial, 2);
    }

    #[tokio::test]
    async fn test_with_zones() {
        let provider = DryRunProvider::new("us-east-1").with_zones(&["zone-a", "zone-b"]);
        assert_eq!(
            provider.availability_zones("eu-west-1").await.unwrap(),
            vec!["zone-a", "zone-b"]
        );
    }
}
