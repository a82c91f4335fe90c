//! Property tests for configuration dependency ordering

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use xsdbind::config::all_dependencies;
use xsdbind::{Configuration, Error, XSD_NAMESPACE};

fn namespace(index: usize) -> String {
    format!("urn:node{}", index)
}

/// Edges `(from, to)` with `from > to`, so the graph is acyclic
fn dag(size: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    let edges = proptest::collection::vec((1..size, 0..size), 0..size * 2)
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(from, to)| (from, to % from))
                .collect::<Vec<_>>()
        });
    (Just(size), edges)
}

/// Configurations for each index plus a root depending on all of them
fn build(size: usize, edges: &[(usize, usize)]) -> (Arc<Configuration>, Vec<Arc<Configuration>>) {
    let nodes: Vec<Arc<Configuration>> = (0..size)
        .map(|i| Arc::new(Configuration::new(namespace(i))))
        .collect();
    for (from, to) in edges {
        nodes[*from].add_dependency(nodes[*to].clone());
    }
    let root = nodes
        .iter()
        .fold(Configuration::new("urn:root"), |root, node| root.with_dependency(node.clone()));
    (Arc::new(root), nodes)
}

proptest! {
    #[test]
    fn test_dependencies_precede_dependents((size, edges) in (2usize..8).prop_flat_map(dag)) {
        let (root, _nodes) = build(size, &edges);
        let order = all_dependencies(&root).unwrap();
        let names: Vec<&str> = order.iter().map(|c| c.namespace()).collect();

        prop_assert_eq!(names.len(), size + 2);
        prop_assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
        prop_assert_eq!(names[0], XSD_NAMESPACE);
        prop_assert_eq!(*names.last().unwrap(), "urn:root");

        let position = |ns: &str| names.iter().position(|n| *n == ns).unwrap();
        for (from, to) in &edges {
            prop_assert!(position(&namespace(*to)) < position(&namespace(*from)));
        }
    }

    #[test]
    fn test_cycles_are_rejected(size in 2usize..7) {
        let nodes: Vec<Arc<Configuration>> = (0..size)
            .map(|i| Arc::new(Configuration::new(namespace(i))))
            .collect();
        for i in 1..size {
            nodes[i].add_dependency(nodes[i - 1].clone());
        }
        nodes[0].add_dependency(nodes[size - 1].clone());

        let cyclic = matches!(
            all_dependencies(&nodes[size - 1]),
            Err(Error::CyclicDependency { .. })
        );
        prop_assert!(cyclic);
    }
}
