//! Applies a plan against a provisioning engine.
//!
//! Resources are created dependencies first. After each creation the
//! reported outputs are recorded, which resolves every deferred value waiting
//! on them. The first failure aborts the run; whatever was already created is
//! left to the engine.

use crate::deferred::{OutputRegistry, Outputs};
use crate::error::{TopologyError, TopologyResult};
use crate::graph::DependencyGraph;
use crate::models::{ResolvedResource, ResourceKind, ResourceSpec};
use crate::provider::{Change, Provider};
use crate::topology::Plan;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// Outcome for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResource {
    pub name: String,
    pub kind: ResourceKind,
    pub change: Change,
    pub outputs: Outputs,
}

/// Outcome of a whole run, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ApplyReport {
    pub applied: Vec<AppliedResource>,
    pub exports: BTreeMap<String, String>,
}

impl ApplyReport {
    pub fn count(&self, change: Change) -> usize {
        self.applied.iter().filter(|r| r.change == change).count()
    }
}

pub struct Executor<'a> {
    provider: &'a dyn Provider,
    parallel: bool,
}

impl<'a> Executor<'a> {
    pub fn new(provider: &'a dyn Provider) -> Executor<'a> {
        Executor {
            provider,
            parallel: false,
        }
    }

    /// Create the members of each dependency level concurrently.
    pub fn parallel(mut self, parallel: bool) -> Executor<'a> {
        self.parallel = parallel;
        self
    }

    pub async fn apply(&self, plan: Plan) -> TopologyResult<ApplyReport> {
        let graph = plan.graph()?;
        let (resources, exports, registry) = plan.into_parts();
        let registry = Mutex::new(registry);
        let mut pending: HashMap<String, ResourceSpec> = resources
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let mut applied = Vec::with_capacity(pending.len());
        if self.parallel {
            for (depth, level) in graph.levels()?.into_iter().enumerate() {
                log::debug!("level {depth}: {}", level.join(", "));
                let steps = level
                    .into_iter()
                    .map(|name| take(&mut pending, name))
                    .collect::<TopologyResult<Vec<_>>>()?
                    .into_iter()
                    .map(|spec| self.apply_one(spec, &registry));
                applied.extend(try_join_all(steps).await?);
            }
        } else {
            for name in graph.order()? {
                let spec = take(&mut pending, name)?;
                applied.push(self.apply_one(spec, &registry).await?);
            }
        }

        let registry = registry.into_inner().unwrap_or_else(PoisonError::into_inner);
        let exports = exports
            .into_iter()
            .map(|(name, output)| {
                registry
                    .get(&output)
                    .map(|v| (name, v.to_string()))
                    .ok_or_else(|| TopologyError::Unresolved(output.to_string()))
            })
            .collect::<TopologyResult<BTreeMap<_, _>>>()?;

        let report = ApplyReport { applied, exports };
        log::info!(
            "Apply finished: {} created, {} updated, {} unchanged",
            report.count(Change::Created),
            report.count(Change::Updated),
            report.count(Change::Unchanged)
        );
        Ok(report)
    }

    async fn apply_one(
        &self,
        spec: ResourceSpec,
        registry: &Mutex<OutputRegistry>,
    ) -> TopologyResult<AppliedResource> {
        let ResourceSpec {
            name,
            kind,
            properties,
            ..
        } = spec;

        let mut resolved = BTreeMap::new();
        for (key, value) in properties {
            resolved.insert(key, value.resolve(registry).await?);
        }
        let resource = ResolvedResource {
            name,
            kind,
            properties: resolved,
        };

        log::debug!("creating {} {}", resource.kind, resource.name);
        let result = self
            .provider
            .create(&resource)
            .await
            .map_err(|e| match e {
                TopologyError::ResourceCreation { .. } => e,
                other => TopologyError::ResourceCreation {
                    resource: resource.name.clone(),
                    message: other.to_string(),
                },
            })?;
        log::info!("{} {}: {}", resource.kind, resource.name, result.change);

        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&resource.name, &result.outputs);

        Ok(AppliedResource {
            name: resource.name,
            kind: resource.kind,
            change: result.change,
            outputs: result.outputs,
        })
    }
}

fn take(pending: &mut HashMap<String, ResourceSpec>, name: &str) -> TopologyResult<ResourceSpec> {
    pending
        .remove(name)
        .ok_or_else(|| TopologyError::Configuration(format!("resource '{name}' planned twice")))
}

/// Order the resources of `plan` would be created in.
pub fn creation_order(plan: &Plan) -> TopologyResult<Vec<String>> {
    let graph: DependencyGraph = plan.graph()?;
    Ok(graph.order()?.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DryRunProvider;
    use crate::topology::tests::{autoscaling_config, sample_config, sample_lookups, with_notifications};
    use crate::topology::TopologyBuilder;

    fn plan_for(config: &crate::config::StackConfig) -> Plan {
        TopologyBuilder::new(config, &sample_lookups()).build().unwrap()
    }

    #[tokio::test]
    async fn test_apply_creates_in_dependency_order() {
        let config = sample_config();
        let plan = plan_for(&config);
        let expected = creation_order(&plan).unwrap();
        let total = plan.len();

        let provider = DryRunProvider::new("us-east-1");
        let report = Executor::new(&provider).apply(plan).await.unwrap();

        assert_eq!(report.applied.len(), total);
        assert_eq!(report.count(Change::Created), total);
        assert_eq!(provider.calls(), expected);
        assert_eq!(report.exports["vpcId"], "vpc-00000001");
        assert!(report.exports["dbEndpoint"].ends_with(".rds.amazonaws.com:3306"));
    }

    #[tokio::test]
    async fn test_user_data_embeds_db_endpoint() {
        let provider = DryRunProvider::new("us-east-1");
        let report = Executor::new(&provider)
            .apply(plan_for(&sample_config()))
            .await
            .unwrap();
        let endpoint = &report.exports["dbEndpoint"];

        let state = provider.state();
        let user_data = state.resources["webapp"].properties["user_data"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(user_data.contains(&format!("jdbc:mariadb://{endpoint}/csye6225")));
        assert!(!user_data.contains("${HOST}"));
    }

    #[tokio::test]
    async fn test_second_apply_is_noop() {
        let config = sample_config();
        let provider = DryRunProvider::new("us-east-1");
        let first = Executor::new(&provider).apply(plan_for(&config)).await.unwrap();
        let second = Executor::new(&provider).apply(plan_for(&config)).await.unwrap();

        assert_eq!(second.count(Change::Unchanged), second.applied.len());
        assert_eq!(first.exports, second.exports);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let provider = DryRunProvider::new("us-east-1").fail_on("db");
        let err = Executor::new(&provider)
            .apply(plan_for(&sample_config()))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, TopologyError::ResourceCreation { resource, .. } if resource == "db"),
            "{err}"
        );

        let calls = provider.calls();
        assert_eq!(calls.last().map(String::as_str), Some("db"));
        assert!(!calls.iter().any(|c| c == "webapp"));
        assert!(provider.state().resources.contains_key("vpc"));
    }

    #[tokio::test]
    async fn test_parallel_apply_matches_sequential() {
        let config = with_notifications(autoscaling_config());
        let sequential = DryRunProvider::new("us-east-1");
        let parallel = DryRunProvider::new("us-east-1");

        let a = Executor::new(&sequential).apply(plan_for(&config)).await.unwrap();
        let b = Executor::new(&parallel)
            .parallel(true)
            .apply(plan_for(&config))
            .await
            .unwrap();

        assert_eq!(a.applied.len(), b.applied.len());
        assert!(b.exports.contains_key("albDnsName"));

        // every resource is created after all of its dependencies
        let graph = plan_for(&config).graph().unwrap();
        let calls = parallel.calls();
        let pos = |n: &str| calls.iter().position(|c| c == n).unwrap();
        for name in &calls {
            for dep in graph.dependencies(name) {
                assert!(pos(dep) < pos(name), "{dep} after {name}");
            }
        }
    }

    #[tokio::test]
    async fn test_launch_template_user_data_is_base64() {
        use base64::{engine::general_purpose, Engine as _};

        let provider = DryRunProvider::new("us-east-1");
        Executor::new(&provider)
            .apply(plan_for(&autoscaling_config()))
            .await
            .unwrap();
        let state = provider.state();
        let encoded = state.resources["webapp-launch-template"].properties["user_data"]
            .as_str()
            .unwrap()
            .to_string();
        let script = String::from_utf8(general_purpose::STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains(".rds.amazonaws.com:3306/csye6225"));
    }
}
