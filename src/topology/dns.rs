//! Route53 record for the stack's domain.

use super::compute::{AUTOSCALING_GROUP, INSTANCE, LOAD_BALANCER};
use super::{Lookups, Plan};
use crate::config::{ComputeMode, StackConfig};
use crate::error::TopologyResult;
use crate::models::{ResourceKind, ResourceSpec, Value};

pub const A_RECORD: &str = "webapp-a-record";
pub const ALIAS_RECORD: &str = "webapp-alias-record";

const TTL: u32 = 60;

pub fn build(plan: &mut Plan, config: &StackConfig, lookups: &Lookups) -> TopologyResult<()> {
    let zone_id = lookups.hosted_zone.id.as_str();
    log::debug!(
        "Hosted zone for {}: {} ({})",
        config.domain_name,
        lookups.hosted_zone.name,
        zone_id
    );

    let record = match config.compute_mode {
        ComputeMode::Single => ResourceSpec::new(ResourceKind::Route53Record, A_RECORD)
            .prop("records", Value::list([Value::output(INSTANCE, "public_ip")]))
            .prop("ttl", TTL)
            .depends_on(INSTANCE),
        ComputeMode::Autoscaling => ResourceSpec::new(ResourceKind::Route53Record, ALIAS_RECORD)
            .prop(
                "aliases",
                Value::list([Value::map([
                    ("name", Value::output(LOAD_BALANCER, "dns_name")),
                    ("zone_id", Value::output(LOAD_BALANCER, "zone_id")),
                    ("evaluate_target_health", Value::from(true)),
                ])]),
            )
            .depends_on(AUTOSCALING_GROUP),
    };

    plan.add(
        record
            .prop("name", config.domain_name.as_str())
            .prop("type", "A")
            .prop("zone_id", zone_id)
            .prop("allow_overwrite", true),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::{autoscaling_config, sample_config, sample_lookups};
    use crate::topology::TopologyBuilder;

    #[test]
    fn test_a_record_points_at_instance() {
        let plan = TopologyBuilder::new(&sample_config(), &sample_lookups())
            .build()
            .unwrap();
        let record = plan.get(A_RECORD).unwrap();
        assert_eq!(record.dependencies(), vec![INSTANCE]);
        let props = format!("{:?}", record.properties);
        assert!(props.contains("\"ttl\": 60"), "{props}");
        assert!(props.contains("\"zone_id\": \"Z0123456789\""), "{props}");
    }

    #[test]
    fn test_alias_record_follows_load_balancer() {
        let plan = TopologyBuilder::new(&autoscaling_config(), &sample_lookups())
            .build()
            .unwrap();
        assert!(plan.get(A_RECORD).is_none());
        assert_eq!(
            plan.get(ALIAS_RECORD).unwrap().dependencies(),
            vec![LOAD_BALANCER, AUTOSCALING_GROUP]
        );
    }
}
