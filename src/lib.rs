//! VPC topology planner.
//!
//! Partitions a VPC block into subnets, builds the ordered plan of a web
//! application stack on top of it and applies that plan against a
//! provisioning engine.

pub mod config;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod graph;
pub mod logging;
pub mod models;
pub mod output;
pub mod provider;
pub mod template;
pub mod topology;

use std::path::Path;

pub use config::{ComputeMode, StackConfig};
pub use error::{CidrError, TopologyError, TopologyResult};
pub use executor::{ApplyReport, Executor};
pub use graph::DependencyGraph;
pub use models::{partition, Ipv4, ZoneAssignment};
pub use provider::{DryRunProvider, Provider};
pub use topology::{plan, Lookups, Plan, TopologyBuilder};

/// Load the stack file, falling back to [`config::DEFAULT_CONFIG_FILE`].
pub fn load_config(path: Option<&Path>) -> TopologyResult<StackConfig> {
    let path = path.unwrap_or_else(|| Path::new(config::DEFAULT_CONFIG_FILE));
    StackConfig::load(path)
}

/// Dry-run engine for `config`'s region, persisted to `state_file`.
pub fn open_provider(config: &StackConfig, state_file: Option<&Path>) -> TopologyResult<DryRunProvider> {
    let state_file = state_file.unwrap_or_else(|| Path::new(config::DEFAULT_STATE_FILE));
    DryRunProvider::with_state_file(&config.region, state_file)
}

/// Build the plan for `config` and apply it.
pub async fn apply_stack(
    config: &StackConfig,
    provider: &dyn Provider,
    parallel: bool,
) -> TopologyResult<ApplyReport> {
    let plan = plan(config, provider).await?;
    Executor::new(provider).parallel(parallel).apply(plan).await
}
