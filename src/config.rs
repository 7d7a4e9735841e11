//! Stack configuration.
//!
//! The stack file is YAML with the kebab-case keys the provisioning scripts
//! always used (`vpc-cidr`, `db-name`, ...). Stack files written for a
//! `config:` namespace (`webapp:vpc-cidr`, `aws:region`) are accepted too.
//! Any top-level key can be overridden from the environment (or `.env`) as
//! `TOPOLOGY_<KEY>`, e.g. `TOPOLOGY_DB_MASTER_PASSWORD`.

use crate::error::{TopologyError, TopologyResult};
use crate::models::{Ipv4, DEFAULT_ZONE_COUNT, MAX_ZONE_COUNT};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::path::Path;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TOPOLOGY_";

/// Keys whose overrides are read as YAML. Every other override is a string.
const TYPED_KEYS: &[&str] = &[
    "db-storage-size",
    "ports",
    "alb-ports",
    "app-port",
    "subnet-prefix",
    "zone-count",
    "autoscaling",
    "notifications",
    "tags",
];

/// Default stack file name.
pub const DEFAULT_CONFIG_FILE: &str = "stack.yaml";

/// Default state file name for the dry-run engine.
pub const DEFAULT_STATE_FILE: &str = "topology_state.json";

/// Port the application listens on behind the load balancer.
pub const DEFAULT_APP_PORT: u16 = 8080;

/// MariaDB / MySQL port opened from the application to the database.
pub const DB_PORT: u16 = 3306;

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_subnet_prefix() -> u8 {
    24
}

fn default_zone_count() -> usize {
    DEFAULT_ZONE_COUNT
}

fn default_app_port() -> u16 {
    DEFAULT_APP_PORT
}

/// How the application tier is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeMode {
    /// One EC2 instance in the first public subnet.
    #[default]
    Single,
    /// Launch template + autoscaling group behind an application load balancer.
    Autoscaling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AutoscalingConfig {
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub cooldown: u32,
    /// CPU percentage above which an instance is added.
    pub scale_up_cpu: u32,
    /// CPU percentage below which an instance is removed.
    pub scale_down_cpu: u32,
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        AutoscalingConfig {
            min_size: 1,
            max_size: 3,
            desired_capacity: 1,
            cooldown: 60,
            scale_up_cpu: 5,
            scale_down_cpu: 3,
        }
    }
}

/// SNS -> Lambda -> DynamoDB pipeline, with a GCP bucket for artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotificationConfig {
    /// Path of the zipped Lambda deployment package.
    pub lambda_path: String,
    pub lambda_handler: String,
    #[serde(default = "default_lambda_runtime")]
    pub lambda_runtime: String,
    pub gcp_project: String,
    #[serde(default = "default_gcp_location")]
    pub gcp_location: String,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_dynamodb_table")]
    pub dynamodb_table: String,
}

fn default_lambda_runtime() -> String {
    "go1.x".to_string()
}

fn default_gcp_location() -> String {
    "US".to_string()
}

fn default_dynamodb_table() -> String {
    "email-tracking".to_string()
}

/// Everything a stack needs to build its plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackConfig {
    #[serde(default = "default_region")]
    pub region: String,
    pub vpc_cidr: Ipv4,
    pub igw_route: Ipv4,
    pub ipv4_cidr: Ipv4,
    pub ipv6_cidr: String,
    pub ssh_key: String,
    pub ami_id: String,
    pub ec2_instance_type: String,
    pub db_engine_name: String,
    pub db_family: String,
    pub db_engine_version: String,
    pub db_instance_class: String,
    pub db_name: String,
    pub db_storage_size: u32,
    pub db_master_user: String,
    pub db_master_password: String,
    pub domain_name: String,
    pub ports: Vec<u16>,
    #[serde(default)]
    pub alb_ports: Vec<u16>,
    #[serde(default = "default_app_port")]
    pub app_port: u16,
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: u8,
    #[serde(default = "default_zone_count")]
    pub zone_count: usize,
    #[serde(default)]
    pub compute_mode: ComputeMode,
    #[serde(default)]
    pub autoscaling: AutoscalingConfig,
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
    /// Tags applied to every taggable resource, next to its `Name`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StackConfig {
    /// Read, override from the environment, parse and validate a stack file.
    pub fn load(path: impl AsRef<Path>) -> TopologyResult<StackConfig> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TopologyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        log::info!("Reading stack config: {}", path.display());
        StackConfig::from_yaml(&yaml, std::env::vars())
    }

    /// Parse a stack from YAML text and `(name, value)` environment pairs.
    pub fn from_yaml<I>(yaml: &str, env: I) -> TopologyResult<StackConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: YamlValue = serde_yaml::from_str(yaml)?;
        let mut mapping = flatten_namespaces(raw)?;
        apply_env_overrides(&mut mapping, env);

        let config: StackConfig = serde_path_to_error::deserialize(YamlValue::Mapping(mapping))
            .map_err(|e| TopologyError::Configuration(format!("{}: {}", e.path(), e.inner())))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks serde cannot express.
    pub fn validate(&self) -> TopologyResult<()> {
        let fail = |msg: String| Err(TopologyError::Configuration(msg));

        let (addr, len) = self
            .ipv6_cidr
            .split_once('/')
            .unwrap_or((self.ipv6_cidr.as_str(), ""));
        if addr.parse::<Ipv6Addr>().is_err() || len.parse::<u8>().map_or(true, |l| l > 128) {
            return fail(format!("ipv6-cidr '{}' is not an IPv6 CIDR", self.ipv6_cidr));
        }
        if self.ports.is_empty() {
            return fail("ports must list at least one port".to_string());
        }
        if self.db_storage_size == 0 {
            return fail("db-storage-size must be positive".to_string());
        }
        for (key, value) in [
            ("ssh-key", &self.ssh_key),
            ("ami-id", &self.ami_id),
            ("ec2-instance-type", &self.ec2_instance_type),
            ("db-name", &self.db_name),
            ("db-master-user", &self.db_master_user),
            ("db-master-password", &self.db_master_password),
            ("domain-name", &self.domain_name),
        ] {
            if value.trim().is_empty() {
                return fail(format!("{key} must not be empty"));
            }
        }
        if !(1..=MAX_ZONE_COUNT).contains(&self.zone_count) {
            return fail(format!(
                "zone-count must be between 1 and {MAX_ZONE_COUNT}, got {}",
                self.zone_count
            ));
        }
        if self.compute_mode == ComputeMode::Autoscaling {
            if self.alb_ports.is_empty() {
                return fail("alb-ports is required for compute-mode autoscaling".to_string());
            }
            let a = &self.autoscaling;
            if !(a.min_size <= a.desired_capacity && a.desired_capacity <= a.max_size) {
                return fail(format!(
                    "autoscaling sizes must satisfy min <= desired <= max, got {}/{}/{}",
                    a.min_size, a.desired_capacity, a.max_size
                ));
            }
        }
        if let Some(n) = &self.notifications {
            if n.lambda_path.trim().is_empty() || n.lambda_handler.trim().is_empty() {
                return fail("notifications need lambda-path and lambda-handler".to_string());
            }
            if n.gcp_project.trim().is_empty() {
                return fail("notifications need gcp-project".to_string());
            }
        }
        Ok(())
    }
}

/// Accept both a flat mapping and a `config:` block with `ns:key` entries.
fn flatten_namespaces(raw: YamlValue) -> TopologyResult<Mapping> {
    let YamlValue::Mapping(mut top) = raw else {
        return Err(TopologyError::Configuration(
            "stack file must be a YAML mapping".to_string(),
        ));
    };
    let Some(YamlValue::Mapping(block)) = top.remove("config") else {
        return Ok(top);
    };

    let mut flat = Mapping::new();
    for (key, value) in block {
        let key = match key {
            YamlValue::String(k) => k
                .split_once(':')
                .map(|(_, k)| k.to_string())
                .unwrap_or(k),
            other => {
                return Err(TopologyError::Configuration(format!(
                    "config keys must be strings, got {other:?}"
                )))
            }
        };
        // Values stored as `{ value: ... }` or `{ secure: ... }` unwrap to the value.
        let value = match value {
            YamlValue::Mapping(mut m) if m.len() == 1 && m.contains_key("value") => {
                m.remove("value").unwrap_or(YamlValue::Null)
            }
            other => other,
        };
        flat.insert(YamlValue::String(key), value);
    }
    Ok(flat)
}

/// Apply `TOPOLOGY_<KEY>` overrides, typed by the key they target.
fn apply_env_overrides<I>(mapping: &mut Mapping, env: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in env {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key = key.to_lowercase().replace('_', "-");
        let value = if TYPED_KEYS.contains(&key.as_str()) {
            serde_yaml::from_str(&raw).unwrap_or(YamlValue::String(raw))
        } else {
            YamlValue::String(raw)
        };
        log::debug!("Config override from {name}");
        mapping.insert(YamlValue::String(key), value);
    }
}
