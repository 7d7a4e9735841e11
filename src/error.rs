//! Error types for address math and plan construction.

use thiserror::Error;

/// Errors raised by the IPv4/CIDR helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// Input could not be parsed as `a.b.c.d/n`.
    #[error("invalid CIDR '{0}'")]
    Parse(String),

    /// Prefix length above 32.
    #[error("network length /{0} is too long")]
    MaskTooLong(u8),

    /// Requested child prefix is wider than the parent block.
    #[error("cannot partition {parent} into /{new_prefix} blocks")]
    InvalidPrefix { parent: String, new_prefix: u8 },

    /// A zone assignment asked for more subnets than the partition holds.
    #[error("zone assignment needs {needed} subnets, partition has {available}")]
    NotEnoughSubnets { needed: usize, available: usize },

    /// Two blocks handed to a zone assignment share addresses.
    #[error("subnets {first} and {second} overlap")]
    Overlapping { first: String, second: String },

    /// Address arithmetic ran past 255.255.255.255.
    #[error("address calculation overflowed")]
    Overflow,
}

/// Errors that abort building or applying a topology plan.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Required option missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Subnet partition request wider than its parent, or too few subnets.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(#[from] CidrError),

    /// Opaque failure reported by the provisioning engine for one step.
    #[error("failed to create {resource}: {message}")]
    ResourceCreation { resource: String, message: String },

    /// The dependency graph contains a cycle through these resources.
    #[error("dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// A resource references one that was never declared.
    #[error("{resource} references unknown resource '{target}'")]
    UnknownReference { resource: String, target: String },

    /// A deferred value's producer went away without resolving it.
    #[error("deferred value {0} was never resolved")]
    Unresolved(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias used across the crate.
pub type TopologyResult<T> = Result<T, TopologyError>;

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        TopologyError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TopologyError {
    fn from(err: serde_yaml::Error) -> Self {
        TopologyError::Configuration(err.to_string())
    }
}
