//! Dependency ordering
//!
//! The closure of a configuration's dependencies is ordered so that every
//! configuration comes after everything it depends on, the root last.
//! Ordering is a topological sort over a priority queue keyed by each
//! node's remaining out-degree.

use super::Configuration;
use crate::error::{Error, Result};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;
use tracing::trace;

/// `root` and every configuration reachable from it, dependencies first
///
/// Fails with [`Error::CyclicDependency`] when two configurations depend
/// on each other, directly or through others.
pub fn all_dependencies(root: &Arc<Configuration>) -> Result<Vec<Arc<Configuration>>> {
    let nodes = closure(root);
    if nodes.len() < 2 {
        return Ok(nodes);
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.namespace(), i))
        .collect();

    let mut graph = Graph::new(nodes.len());
    for (from, configuration) in nodes.iter().enumerate() {
        for dependency in configuration.dependencies() {
            let to = index[dependency.namespace()];
            graph.add_edge(from, to).map_err(|(first, second)| Error::CyclicDependency {
                first: nodes[first].namespace().to_string(),
                second: nodes[second].namespace().to_string(),
            })?;
        }
    }

    let order = graph.sort().map_err(|(first, second)| Error::CyclicDependency {
        first: nodes[first].namespace().to_string(),
        second: nodes[second].namespace().to_string(),
    })?;
    Ok(order.into_iter().map(|i| nodes[i].clone()).collect())
}

/// Reachable configurations in discovery order, root first
fn closure(root: &Arc<Configuration>) -> Vec<Arc<Configuration>> {
    let mut nodes: Vec<Arc<Configuration>> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(configuration) = stack.pop() {
        if !seen.insert(configuration.namespace().to_string()) {
            continue;
        }
        let dependencies = configuration.dependencies();
        nodes.push(configuration);
        stack.extend(dependencies.into_iter().rev());
    }
    nodes
}

/// Directed graph over node indices; an edge points from a dependent to
/// its dependency
struct Graph {
    outgoing: Vec<BTreeSet<usize>>,
    incoming: Vec<BTreeSet<usize>>,
}

impl Graph {
    fn new(size: usize) -> Self {
        Self {
            outgoing: vec![BTreeSet::new(); size],
            incoming: vec![BTreeSet::new(); size],
        }
    }

    /// Add `from -> to`; an edge that closes a two-node cycle is rejected
    fn add_edge(&mut self, from: usize, to: usize) -> std::result::Result<(), (usize, usize)> {
        if from == to || self.outgoing[to].contains(&from) {
            return Err((from, to));
        }
        self.outgoing[from].insert(to);
        self.incoming[to].insert(from);
        Ok(())
    }

    /// Nodes with no remaining dependencies first
    fn sort(&self) -> std::result::Result<Vec<usize>, (usize, usize)> {
        let mut degree: Vec<usize> = self.outgoing.iter().map(BTreeSet::len).collect();
        let mut queue: BinaryHeap<Reverse<(usize, usize)>> =
            degree.iter().enumerate().map(|(i, d)| Reverse((*d, i))).collect();
        let mut emitted = vec![false; degree.len()];
        let mut order = Vec::with_capacity(degree.len());

        while let Some(Reverse((d, node))) = queue.pop() {
            if emitted[node] || d != degree[node] {
                continue;
            }
            if d > 0 {
                // every remaining node still waits on another one
                let next = self.outgoing[node]
                    .iter()
                    .copied()
                    .find(|n| !emitted[*n])
                    .unwrap_or(node);
                return Err((node, next));
            }
            trace!(node, "dependency resolved");
            emitted[node] = true;
            order.push(node);
            for dependent in &self.incoming[node] {
                degree[*dependent] -= 1;
                queue.push(Reverse((degree[*dependent], *dependent)));
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XSD_NAMESPACE;

    fn namespaces(configurations: &[Arc<Configuration>]) -> Vec<&str> {
        configurations.iter().map(|c| c.namespace()).collect()
    }

    #[test]
    fn test_single_configuration() {
        let xs = super::super::xs_configuration();
        let order = all_dependencies(&xs).unwrap();
        assert_eq!(namespaces(&order), vec![XSD_NAMESPACE]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let base = Arc::new(Configuration::new("urn:base"));
        let middle = Arc::new(Configuration::new("urn:middle").with_dependency(base.clone()));
        let root = Arc::new(
            Configuration::new("urn:root")
                .with_dependency(middle.clone())
                .with_dependency(base.clone()),
        );

        let order = all_dependencies(&root).unwrap();
        assert_eq!(
            namespaces(&order),
            vec![XSD_NAMESPACE, "urn:base", "urn:middle", "urn:root"]
        );
    }

    #[test]
    fn test_mutual_dependency_is_rejected() {
        let a = Arc::new(Configuration::new("urn:a"));
        let b = Arc::new(Configuration::new("urn:b").with_dependency(a.clone()));
        a.add_dependency(b.clone());

        match all_dependencies(&a) {
            Err(Error::CyclicDependency { first, second }) => {
                let mut pair = vec![first, second];
                pair.sort();
                assert_eq!(pair, vec!["urn:a".to_string(), "urn:b".to_string()]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_longer_cycle_is_rejected() {
        let a = Arc::new(Configuration::new("urn:a"));
        let b = Arc::new(Configuration::new("urn:b").with_dependency(a.clone()));
        let c = Arc::new(Configuration::new("urn:c").with_dependency(b.clone()));
        a.add_dependency(c.clone());

        assert!(matches!(
            all_dependencies(&c),
            Err(Error::CyclicDependency { .. })
        ));
    }
}
