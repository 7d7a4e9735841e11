//! Dependency graph over the resources of a plan.
//!
//! Nodes are resource names, an edge `a -> b` means `b` needs an identifier
//! produced by `a`. Ordering is Kahn's algorithm with ties broken by insertion
//! order, so a plan declared stage by stage keeps that order where it can.

use crate::error::{TopologyError, TopologyResult};
use crate::models::ResourceSpec;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    /// node -> nodes it depends on
    deps: Vec<Vec<usize>>,
    /// node -> nodes depending on it
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> DependencyGraph {
        DependencyGraph::default()
    }

    /// Build the graph for a list of resources.
    pub fn from_resources(resources: &[ResourceSpec]) -> TopologyResult<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for resource in resources {
            graph.add_node(&resource.name)?;
        }
        for resource in resources {
            for dep in resource.dependencies() {
                graph.add_edge(dep, &resource.name)?;
            }
        }
        Ok(graph)
    }

    pub fn add_node(&mut self, name: &str) -> TopologyResult<()> {
        if self.index.contains_key(name) {
            return Err(TopologyError::Configuration(format!(
                "duplicate resource name '{name}'"
            )));
        }
        self.index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(name.to_string());
        self.deps.push(vec![]);
        self.dependents.push(vec![]);
        Ok(())
    }

    /// Record that `dependent` requires `dependency` to exist first.
    pub fn add_edge(&mut self, dependency: &str, dependent: &str) -> TopologyResult<()> {
        let to = self.position(dependent, dependent)?;
        let from = self.position(dependency, dependent)?;
        if !self.deps[to].contains(&from) {
            self.deps[to].push(from);
            self.dependents[from].push(to);
        }
        Ok(())
    }

    fn position(&self, name: &str, referenced_by: &str) -> TopologyResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownReference {
                resource: referenced_by.to_string(),
                target: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| self.deps[i].iter().map(|&d| self.nodes[d].as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether `dependent` reaches `dependency` through any chain of edges.
    pub fn requires(&self, dependent: &str, dependency: &str) -> bool {
        let (Some(&start), Some(&target)) = (self.index.get(dependent), self.index.get(dependency))
        else {
            return false;
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dep in &self.deps[node] {
                if dep == target {
                    return true;
                }
                if !seen[dep] {
                    seen[dep] = true;
                    stack.push(dep);
                }
            }
        }
        false
    }

    fn sorted_indices(&self) -> TopologyResult<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(|d| d.len()).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &next in &self.dependents[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(i, _)| self.nodes[i].clone())
                .collect();
            return Err(TopologyError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Every resource name, dependencies before dependents.
    pub fn order(&self) -> TopologyResult<Vec<&str>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|i| self.nodes[i].as_str())
            .collect())
    }

    /// Resources grouped by depth; members of one level are independent.
    pub fn levels(&self) -> TopologyResult<Vec<Vec<&str>>> {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<&str>> = Vec::new();
        for node in self.sorted_indices()? {
            let d = self.deps[node]
                .iter()
                .map(|&dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
            depth[node] = d;
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(self.nodes[node].as_str());
        }
        Ok(levels)
    }

    /// Depth of every resource, keyed by name.
    pub fn depths(&self) -> TopologyResult<HashMap<&str, usize>> {
        Ok(self
            .levels()?
            .into_iter()
            .enumerate()
            .flat_map(|(d, names)| names.into_iter().map(move |n| (n, d)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceKind, Value};

    fn graph(edges: &[(&str, &str)], nodes: &[&str]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(n).unwrap();
        }
        for (from, to) in edges {
            g.add_edge(from, to).unwrap();
        }
        g
    }

    #[test]
    fn test_order_respects_edges() {
        let g = graph(
            &[("vpc", "subnet"), ("subnet", "assoc"), ("rt", "assoc"), ("vpc", "rt")],
            &["assoc", "rt", "subnet", "vpc"],
        );
        let order = g.order().unwrap();
        let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
        assert!(pos("vpc") < pos("subnet"));
        assert!(pos("vpc") < pos("rt"));
        assert!(pos("subnet") < pos("assoc"));
        assert!(pos("rt") < pos("assoc"));
    }

    #[test]
    fn test_order_keeps_insertion_order_for_ties() {
        let g = graph(&[("vpc", "b"), ("vpc", "a")], &["vpc", "b", "a", "c"]);
        assert_eq!(g.order().unwrap(), vec!["vpc", "b", "a", "c"]);
    }

    #[test]
    fn test_levels() {
        let g = graph(
            &[("vpc", "s1"), ("vpc", "s2"), ("s1", "db"), ("s2", "db")],
            &["vpc", "s1", "s2", "db"],
        );
        assert_eq!(
            g.levels().unwrap(),
            vec![vec!["vpc"], vec!["s1", "s2"], vec!["db"]]
        );
        assert_eq!(g.depths().unwrap()["db"], 2);
    }

    #[test]
    fn test_cycle_detected() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a")], &["a", "b", "c", "d"]);
        match g.order() {
            Err(TopologyError::Cycle(names)) => assert_eq!(names, vec!["a", "b", "c"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_reference_and_duplicates() {
        let resources = vec![ResourceSpec::new(ResourceKind::Subnet, "subnet")
            .prop("vpc_id", Value::id("vpc"))];
        assert!(matches!(
            DependencyGraph::from_resources(&resources),
            Err(TopologyError::UnknownReference { target, .. }) if target == "vpc"
        ));

        let mut g = DependencyGraph::new();
        g.add_node("vpc").unwrap();
        assert!(g.add_node("vpc").is_err());
    }

    #[test]
    fn test_requires_is_transitive() {
        let g = graph(&[("vpc", "sg"), ("sg", "rule")], &["vpc", "sg", "rule"]);
        assert!(g.requires("rule", "vpc"));
        assert!(!g.requires("vpc", "rule"));
        assert_eq!(g.dependencies("rule"), vec!["sg"]);
    }
}
