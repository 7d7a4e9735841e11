//! RDS subnet group, parameter group and database instance.

use super::network::private_subnet;
use super::security::DB_SECURITY_GROUP;
use super::{tags, Plan};
use crate::config::StackConfig;
use crate::deferred::OutputRef;
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};

pub const DB_SUBNET_GROUP: &str = "db-subnet-group";
pub const DB_PARAMETER_GROUP: &str = "param-group";
pub const DB_INSTANCE: &str = "db";

/// Output holding `host:port` of the database.
pub fn endpoint() -> OutputRef {
    OutputRef::new(DB_INSTANCE, "endpoint")
}

pub fn build(plan: &mut Plan, config: &StackConfig) -> TopologyResult<()> {
    let subnet_ids: Vec<Value> = plan
        .zones()
        .pairs
        .iter()
        .map(|p| Value::id(&private_subnet(p.index)))
        .collect();

    plan.add(
        ResourceSpec::new(ResourceKind::DbSubnetGroup, DB_SUBNET_GROUP)
            .prop("subnet_ids", Value::List(subnet_ids))
            .prop("tags", tags(config, DB_SUBNET_GROUP)),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::DbParameterGroup, DB_PARAMETER_GROUP)
            .prop("family", config.db_family.as_str())
            .prop("tags", tags(config, "db-parameter-group")),
    )?;

    plan.add(
        ResourceSpec::new(ResourceKind::DbInstance, DB_INSTANCE)
            .prop("allocated_storage", config.db_storage_size)
            .prop("engine", config.db_engine_name.as_str())
            .prop("engine_version", config.db_engine_version.as_str())
            .prop("instance_class", config.db_instance_class.as_str())
            .prop("db_name", config.db_name.as_str())
            .prop("username", config.db_master_user.as_str())
            .prop("password", config.db_master_password.as_str())
            .prop("multi_az", false)
            .prop("publicly_accessible", false)
            .prop("skip_final_snapshot", true)
            .prop("db_subnet_group_name", Value::output(DB_SUBNET_GROUP, "name"))
            .prop("parameter_group_name", Value::output(DB_PARAMETER_GROUP, "name"))
            .prop("vpc_security_group_ids", Value::list([Value::id(DB_SECURITY_GROUP)]))
            .prop("tags", tags(config, &config.db_name)),
    )?;
    plan.export("dbEndpoint", endpoint());
    Ok(())
}
