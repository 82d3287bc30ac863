//! Execution order resolution.
//!
//! Orders the nodes of a [`PipelineGraph`] so that every node comes after
//! all of its predecessors, using Kahn's algorithm with a FIFO worklist.
//!
//! Ordering rules:
//!
//! - The worklist is seeded with zero in-degree nodes in input order, and a
//!   node freed by an edge is appended when its last incoming edge is
//!   processed. Equal inputs always yield equal outputs.
//! - Edges whose source or target is not in the graph are ignored.
//! - Parallel edges between the same pair each count once toward in-degree
//!   and are released together, so they never change the order.
//! - Nodes on a cycle, or downstream of one, never reach in-degree zero.
//!   They are returned in [`Resolution::blocked`] instead of failing here;
//!   the runner decides whether that is fatal.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

use crate::graph::{Node, NodeId, PipelineGraph};

/// Reasons a pipeline cannot be ordered at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No nodes in pipeline")]
    EmptyPipeline,

    #[error("No data input node found. Please add a Data Input node to start your pipeline.")]
    NoEntryPoint,
}

/// Result of resolving a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Nodes in execution order.
    pub order: Vec<Node>,
    /// Nodes left out because they sit on or behind a cycle, in input order.
    pub blocked: Vec<NodeId>,
    /// Number of data input nodes in the graph.
    pub entry_points: usize,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn order_ids(&self) -> Vec<NodeId> {
        self.order.iter().map(|n| n.id.clone()).collect()
    }
}

/// Resolve the execution order of a pipeline graph.
pub fn resolve(graph: &PipelineGraph) -> Result<Resolution, ResolveError> {
    let nodes = graph.nodes();
    if nodes.is_empty() {
        return Err(ResolveError::EmptyPipeline);
    }
    let entry_points = nodes.iter().filter(|n| n.kind.is_entry_point()).count();
    if entry_points == 0 {
        return Err(ResolveError::NoEntryPoint);
    }

    // First occurrence wins if an id was duplicated outside the editor;
    // later copies are neither ordered nor reported as blocked.
    let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(&node.id).or_insert(i);
    }
    let first: Vec<bool> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| index.get(&n.id) == Some(&i))
        .collect();
    let duplicates = first.iter().filter(|f| !**f).count();
    if duplicates > 0 {
        debug!(duplicates, "Ignoring nodes with repeated ids");
    }

    let mut in_degree = vec![0usize; nodes.len()];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut dangling = 0usize;

    for edge in graph.edges() {
        match (index.get(&edge.source), index.get(&edge.target)) {
            (Some(&from), Some(&to)) => {
                outgoing[from].push(to);
                in_degree[to] += 1;
            }
            _ => dangling += 1,
        }
    }
    if dangling > 0 {
        debug!(dangling, "Ignoring edges that reference missing nodes");
    }

    let mut queue: VecDeque<usize> = (0..nodes.len())
        .filter(|&i| first[i] && in_degree[i] == 0)
        .collect();
    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(current) = queue.pop_front() {
        placed[current] = true;
        order.push(nodes[current].clone());

        for &next in &outgoing[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let blocked: Vec<NodeId> = nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| first[*i] && !placed[*i])
        .map(|(_, n)| n.id.clone())
        .collect();

    debug!(
        ordered = order.len(),
        blocked = blocked.len(),
        entry_points,
        "Resolved execution order"
    );

    Ok(Resolution {
        order,
        blocked,
        entry_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, NodeKind};

    fn graph(nodes: &[(&str, NodeKind)], edges: &[(&str, &str)]) -> PipelineGraph {
        PipelineGraph::from_parts(
            nodes.iter().map(|(id, kind)| Node::new(*id, *kind)).collect(),
            edges
                .iter()
                .enumerate()
                .map(|(i, (s, t))| Edge::new(format!("e{}", i), *s, *t))
                .collect(),
        )
    }

    fn ids(resolution: &Resolution) -> Vec<&str> {
        resolution.order.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_linear_chain() {
        let g = graph(
            &[
                ("d1", NodeKind::DataInput),
                ("p1", NodeKind::Preprocessing),
                ("m1", NodeKind::Model),
            ],
            &[("d1", "p1"), ("p1", "m1")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1", "p1", "m1"]);
        assert!(resolution.is_complete());
        assert_eq!(resolution.entry_points, 1);
    }

    #[test]
    fn test_input_order_does_not_override_edges() {
        let g = graph(
            &[
                ("m1", NodeKind::Model),
                ("p1", NodeKind::Preprocessing),
                ("d1", NodeKind::DataInput),
            ],
            &[("d1", "p1"), ("p1", "m1")],
        );

        assert_eq!(ids(&resolve(&g).unwrap()), vec!["d1", "p1", "m1"]);
    }

    #[test]
    fn test_fifo_tie_break() {
        // d1 and d2 both start; t1 waits for both.
        let g = graph(
            &[
                ("d2", NodeKind::DataInput),
                ("d1", NodeKind::DataInput),
                ("t1", NodeKind::Training),
                ("o1", NodeKind::Output),
            ],
            &[("d1", "t1"), ("d2", "t1"), ("d2", "o1")],
        );

        assert_eq!(ids(&resolve(&g).unwrap()), vec!["d2", "d1", "o1", "t1"]);
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(
            resolve(&PipelineGraph::new()),
            Err(ResolveError::EmptyPipeline)
        );
    }

    #[test]
    fn test_no_entry_point() {
        let g = graph(&[("m1", NodeKind::Model)], &[]);
        assert_eq!(resolve(&g), Err(ResolveError::NoEntryPoint));
    }

    #[test]
    fn test_cycle_is_blocked() {
        let g = graph(
            &[
                ("a", NodeKind::Model),
                ("b", NodeKind::Training),
                ("c", NodeKind::DataInput),
            ],
            &[("a", "b"), ("b", "a")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["c"]);
        assert_eq!(resolution.blocked, vec![NodeId::from("a"), NodeId::from("b")]);
    }

    #[test]
    fn test_downstream_of_cycle_is_blocked() {
        let g = graph(
            &[
                ("d1", NodeKind::DataInput),
                ("a", NodeKind::Model),
                ("b", NodeKind::Training),
                ("o1", NodeKind::Output),
            ],
            &[("d1", "a"), ("a", "b"), ("b", "a"), ("b", "o1")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1"]);
        assert_eq!(resolution.blocked.len(), 3);
    }

    #[test]
    fn test_dangling_edges_ignored() {
        let g = graph(
            &[("d1", NodeKind::DataInput), ("m1", NodeKind::Model)],
            &[("ghost", "m1"), ("d1", "ghost"), ("d1", "m1")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1", "m1"]);
        assert!(resolution.is_complete());
    }

    #[test]
    fn test_parallel_edges() {
        let g = graph(
            &[("d1", NodeKind::DataInput), ("m1", NodeKind::Model)],
            &[("d1", "m1"), ("d1", "m1")],
        );

        assert_eq!(ids(&resolve(&g).unwrap()), vec!["d1", "m1"]);
    }

    #[test]
    fn test_self_loop_from_file_is_blocked() {
        let g = graph(
            &[("d1", NodeKind::DataInput), ("m1", NodeKind::Model)],
            &[("m1", "m1")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1"]);
        assert_eq!(resolution.blocked, vec![NodeId::from("m1")]);
    }

    #[test]
    fn test_repeated_id_runs_once_after_predecessors() {
        let g = graph(
            &[
                ("d1", NodeKind::DataInput),
                ("p1", NodeKind::Preprocessing),
                ("m1", NodeKind::Model),
                ("m1", NodeKind::Training),
            ],
            &[("d1", "p1"), ("p1", "m1")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1", "p1", "m1"]);
        assert_eq!(resolution.order[2].kind, NodeKind::Model);
        assert!(resolution.is_complete());
    }

    #[test]
    fn test_repeated_id_on_cycle_blocked_once() {
        let g = graph(
            &[
                ("d1", NodeKind::DataInput),
                ("a", NodeKind::Model),
                ("a", NodeKind::Model),
            ],
            &[("a", "a")],
        );

        let resolution = resolve(&g).unwrap();
        assert_eq!(ids(&resolution), vec!["d1"]);
        assert_eq!(resolution.blocked, vec![NodeId::from("a")]);
    }
}
