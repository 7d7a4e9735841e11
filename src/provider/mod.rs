//! Provisioning engine interface.
//!
//! This module covers everything the plan needs from the outside world:
//! - [`Provider`] - lookups (zones, hosted zone, certificate) and resource creation
//! - [`DryRunProvider`] - in-memory engine persisting to a JSON state file
//! - [`state`] - the state file format and its cache-style loading

mod dry_run;
pub mod state;

use crate::deferred::Outputs;
use crate::error::TopologyResult;
use crate::models::ResolvedResource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use dry_run::DryRunProvider;
pub use state::{read_state_file, write_state_file, State, StateEntry};

/// A Route53 hosted zone found by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

/// What the engine did with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Change::Created => "created",
            Change::Updated => "updated",
            Change::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Engine response for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResult {
    pub change: Change,
    pub outputs: Outputs,
}

/// The external engine a plan is applied against.
///
/// `create` must be idempotent: re-submitting a resource whose inputs did not
/// change reports [`Change::Unchanged`] with the outputs it reported before.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Availability zones in state `available`, in provider order.
    async fn availability_zones(&self, region: &str) -> TopologyResult<Vec<String>>;

    /// The hosted zone serving `domain`.
    async fn hosted_zone(&self, domain: &str) -> TopologyResult<HostedZone>;

    /// ARN of an issued certificate for `domain`, if any.
    async fn certificate(&self, domain: &str) -> TopologyResult<Option<String>>;

    /// Create (or confirm) one resource and report its outputs.
    async fn create(&self, resource: &ResolvedResource) -> TopologyResult<CreateResult>;
}
