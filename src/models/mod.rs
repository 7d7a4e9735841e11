//! Domain models for the VPC topology.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`Ipv4`] - IPv4 network with CIDR notation support and [`partition`]
//! - [`ZoneAssignment`] - availability zone to subnet pair mapping
//! - [`ResourceSpec`] and [`Value`] - resources handed to the engine

mod ipv4;
mod resource;
mod zone;

// Re-export public types
pub use ipv4::{get_cidr_mask, num_aws_hosts, partition, Ipv4, Subnets};
pub use resource::{ResolvedResource, ResourceKind, ResourceSpec, Value};
pub use zone::{ZoneAssignment, ZonePair, DEFAULT_ZONE_COUNT, MAX_ZONE_COUNT};
