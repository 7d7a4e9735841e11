//! Plan and subnet listings.

use super::terminal::format_field;
use crate::error::TopologyResult;
use crate::models::{num_aws_hosts, ResourceKind};
use crate::topology::Plan;
use colored::Colorize;

/// One step of the plan as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRow {
    pub step: usize,
    pub level: usize,
    pub kind: ResourceKind,
    pub name: String,
    pub depends_on: Vec<String>,
}

/// Steps of `plan` in creation order.
pub fn plan_rows(plan: &Plan) -> TopologyResult<Vec<PlanRow>> {
    let graph = plan.graph()?;
    let depths = graph.depths()?;
    let rows = graph
        .order()?
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let spec = plan.get(name)?;
            Some(PlanRow {
                step: i + 1,
                level: depths.get(name).copied().unwrap_or_default(),
                kind: spec.kind,
                name: name.to_string(),
                depends_on: graph.dependencies(name).iter().map(|d| d.to_string()).collect(),
            })
        })
        .collect();
    Ok(rows)
}

fn format_plan_row(row: &PlanRow) -> String {
    format!(
        "{step},{level},{kind},{name},{deps}",
        step = format_field(row.step, 6),
        level = format_field(row.level, 7),
        kind = format_field(row.kind, 32),
        name = format_field(&row.name, 40),
        deps = format_field(row.depends_on.join(" "), 1),
    )
}

/// Print the ordered plan and its exports.
pub fn print_plan(plan: &Plan) -> TopologyResult<()> {
    let rows = plan_rows(plan)?;
    log::info!("# Plan with {} steps", rows.len());

    println!(
        r#"{},{},{},{},"depends_on""#,
        format_field("step", 6),
        format_field("level", 7),
        format_field("kind", 32),
        format_field("name", 40)
    );
    for row in &rows {
        println!("{}", format_plan_row(row));
    }
    for (name, output) in plan.exports() {
        println!("#{}# {name} = {output}", "EXPORT".on_blue());
    }
    Ok(())
}

/// Print the VPC partition, marking the subnets assigned to zones.
pub fn print_subnets(plan: &Plan) -> TopologyResult<()> {
    let zones = plan.zones();
    println!(
        r#"{},{},{},{},"zone""#,
        format_field("cnt", 6),
        format_field("subnet_cidr", 18),
        format_field("hosts", 7),
        format_field("role", 9)
    );
    for (i, subnet) in plan.subnets().iter().enumerate() {
        let assigned = zones.pairs.iter().find_map(|p| {
            if p.public == *subnet {
                Some(("public", p.zone.as_str()))
            } else if p.private == *subnet {
                Some(("private", p.zone.as_str()))
            } else {
                None
            }
        });
        let (role, zone) = assigned.unwrap_or(("-", ""));
        let hosts = num_aws_hosts(subnet.mask).map_or("-".to_string(), |h| h.to_string());
        println!(
            "{},{},{},{},{}",
            format_field(i, 6),
            format_field(subnet, 18),
            format_field(hosts, 7),
            format_field(role, 9),
            format_field(zone, 1),
        );
    }
    let unassigned = plan.subnets().len().saturating_sub(zones.len() * 2);
    if unassigned > 0 {
        println!(
            "#{}# {} of {} subnets unassigned",
            "NOTE".on_red(),
            unassigned,
            plan.subnets().len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::{sample_config, sample_lookups};
    use crate::topology::TopologyBuilder;

    #[test]
    fn test_plan_rows_follow_order() {
        let plan = TopologyBuilder::new(&sample_config(), &sample_lookups())
            .build()
            .unwrap();
        let rows = plan_rows(&plan).unwrap();
        assert_eq!(rows.len(), plan.len());
        assert_eq!(rows[0].name, "vpc");
        assert_eq!(rows[0].level, 0);
        assert!(rows[0].depends_on.is_empty());

        let subnet = rows.iter().find(|r| r.name == "public-subnet-1").unwrap();
        assert_eq!(subnet.level, 1);
        assert_eq!(subnet.depends_on, vec!["vpc"]);

        let line = format_plan_row(subnet);
        assert!(line.contains("\"aws:ec2/subnet\""), "{line}");
        assert!(line.ends_with("\"vpc\""), "{line}");
    }
}
