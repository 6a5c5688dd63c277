//! Dependency ordering of graph nodes.
//!
//! Kahn's algorithm over the reference edges of a graph. Ties are broken by
//! declaration order so generated programs are stable across runs.

use super::graph::{Graph, NodeKey};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Topological order of every node in `graph`, dependencies first.
/// Returns the members of the cycle (in declaration order) on failure.
pub fn dependency_order(graph: &Graph) -> Result<Vec<NodeKey>, Vec<NodeKey>> {
    let keys = graph.node_keys();
    let index: FxHashMap<&NodeKey, usize> = keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

    let mut in_degree = vec![0usize; keys.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];

    for (i, key) in keys.iter().enumerate() {
        for dep in graph.dependencies(key) {
            // Edges to nodes outside the graph were rejected by the binder.
            let Some(&d) = index.get(&dep) else {
                continue;
            };
            dependents[d].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(keys.len());
    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != keys.len() {
        let cycle = (0..keys.len())
            .filter(|i| in_degree[*i] > 0)
            .map(|i| keys[i].clone())
            .collect();
        return Err(cycle);
    }

    Ok(order.into_iter().map(|i| keys[i].clone()).collect())
}
