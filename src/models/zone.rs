//! Availability zone to subnet assignment.

use super::Ipv4;
use crate::error::CidrError;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

/// Number of zones the topology spreads across.
pub const DEFAULT_ZONE_COUNT: usize = 3;

/// Upper bound accepted for `zone-count`; no region offers more zones.
pub const MAX_ZONE_COUNT: usize = 16;

/// The public/private subnet pair placed in one availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonePair {
    /// Zone index, 0-based.
    pub index: usize,
    /// Availability zone name, e.g. `us-east-1a`.
    pub zone: String,
    pub public: Ipv4,
    pub private: Ipv4,
}

/// Mapping from zone index to its subnet pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneAssignment {
    pub pairs: Vec<ZonePair>,
}

impl ZoneAssignment {
    /// Assign subnets to the first `min(zone_count, zones.len())` zones.
    ///
    /// Zone `i` gets `subnets[i]` as its public subnet and
    /// `subnets[i + zone_count]` as its private one, so `subnets` must hold at
    /// least `2 * zone_count` entries whatever the number of zones offered.
    /// The assigned blocks must not overlap.
    pub fn assign(
        subnets: &[Ipv4],
        zones: &[String],
        zone_count: usize,
    ) -> Result<ZoneAssignment, CidrError> {
        let needed = zone_count.checked_mul(2).unwrap_or(usize::MAX);
        if subnets.len() < needed {
            return Err(CidrError::NotEnoughSubnets {
                needed,
                available: subnets.len(),
            });
        }

        let pairs: Vec<ZonePair> = zones
            .iter()
            .take(zone_count)
            .enumerate()
            .map(|(i, zone)| ZonePair {
                index: i,
                zone: zone.clone(),
                public: subnets[i],
                private: subnets[i + zone_count],
            })
            .collect();

        if pairs.len() < zone_count {
            log::warn!(
                "Only {} availability zone(s) offered, wanted {}",
                pairs.len(),
                zone_count
            );
        }

        let assignment = ZoneAssignment { pairs };
        let overlap = assignment
            .public_subnets()
            .chain(assignment.private_subnets())
            .tuple_combinations()
            .find(|(a, b)| a.overlaps(b));
        if let Some((a, b)) = overlap {
            return Err(CidrError::Overlapping {
                first: a.to_string(),
                second: b.to_string(),
            });
        }
        Ok(assignment)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Ipv4> + Clone {
        self.pairs.iter().map(|p| &p.public)
    }

    pub fn private_subnets(&self) -> impl Iterator<Item = &Ipv4> + Clone {
        self.pairs.iter().map(|p| &p.private)
    }
}

impl fmt::Display for ZoneAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ZoneAssignment ({} zones):", self.pairs.len())?;
        for pair in &self.pairs {
            writeln!(
                f,
                "  - {} public={} private={}",
                pair.zone, pair.public, pair.private
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::partition;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_assign_three_zones() {
        let subnets = partition(Ipv4::new("10.0.0.0/16").unwrap(), 24).unwrap();
        let assignment = ZoneAssignment::assign(
            &subnets,
            &zones(&["us-east-1a", "us-east-1b", "us-east-1c"]),
            DEFAULT_ZONE_COUNT,
        )
        .unwrap();

        assert_eq!(assignment.len(), 3);
        for (i, pair) in assignment.pairs.iter().enumerate() {
            assert_eq!(pair.public, subnets[i]);
            assert_eq!(pair.private, subnets[i + 3]);
        }
        assert_eq!(assignment.pairs[2].private.to_string(), "10.0.5.0/24");
    }

    #[test]
    fn test_assign_only_first_three_zones() {
        let subnets = partition(Ipv4::new("10.0.0.0/16").unwrap(), 24).unwrap();
        let assignment = ZoneAssignment::assign(
            &subnets,
            &zones(&["a", "b", "c", "d", "e", "f"]),
            DEFAULT_ZONE_COUNT,
        )
        .unwrap();
        assert_eq!(
            assignment
                .pairs
                .iter()
                .map(|p| p.zone.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_assign_fewer_zones() {
        let subnets = partition(Ipv4::new("10.0.0.0/16").unwrap(), 24).unwrap();
        let assignment =
            ZoneAssignment::assign(&subnets, &zones(&["a", "b"]), DEFAULT_ZONE_COUNT).unwrap();
        assert_eq!(assignment.len(), 2);
        // private offsets stay at +3 even with two zones
        assert_eq!(assignment.pairs[1].private, subnets[4]);
    }

    #[test]
    fn test_assign_not_enough_subnets() {
        // /22 into /24 gives 4 subnets, 6 are required
        let subnets = partition(Ipv4::new("10.0.0.0/22").unwrap(), 24).unwrap();
        let err = ZoneAssignment::assign(&subnets, &zones(&["a"]), DEFAULT_ZONE_COUNT).unwrap_err();
        assert_eq!(
            err,
            CidrError::NotEnoughSubnets {
                needed: 6,
                available: 4
            }
        );
    }

    #[test]
    fn test_assign_huge_zone_count() {
        let subnets = partition(Ipv4::new("10.0.0.0/16").unwrap(), 24).unwrap();
        let err = ZoneAssignment::assign(&subnets, &zones(&["a"]), usize::MAX).unwrap_err();
        assert_eq!(
            err,
            CidrError::NotEnoughSubnets {
                needed: usize::MAX,
                available: 256
            }
        );
    }

    #[test]
    fn test_assign_rejects_overlapping_subnets() {
        let subnets: Vec<Ipv4> = ["10.0.0.0/24", "10.0.1.0/24", "10.0.0.0/16", "10.0.3.0/24"]
            .iter()
            .map(|s| Ipv4::new(s).unwrap())
            .collect();
        let err = ZoneAssignment::assign(&subnets, &zones(&["a", "b"]), 2).unwrap_err();
        assert_eq!(
            err,
            CidrError::Overlapping {
                first: "10.0.0.0/24".to_string(),
                second: "10.0.0.0/16".to_string()
            }
        );
    }
}
