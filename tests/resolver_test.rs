//! Ordering properties of the execution order resolver.

use ml_playground::{resolve, Edge, Node, NodeId, NodeKind, PipelineGraph, ResolveError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Random DAG: edges only go from lower to higher rank, nodes are listed
/// in shuffled order, rank 0 is always a data input.
fn random_dag(rng: &mut StdRng, size: usize) -> PipelineGraph {
    let mut nodes: Vec<Node> = (0..size)
        .map(|rank| {
            let kind = if rank == 0 {
                NodeKind::DataInput
            } else {
                NodeKind::ALL[rng.gen_range(0..NodeKind::ALL.len())]
            };
            Node::new(format!("n{}", rank), kind)
        })
        .collect();

    let mut edges = Vec::new();
    for from in 0..size {
        for to in (from + 1)..size {
            if rng.gen_bool(0.25) {
                edges.push(Edge::new(
                    format!("e{}", edges.len()),
                    format!("n{}", from),
                    format!("n{}", to),
                ));
            }
        }
    }

    nodes.shuffle(rng);

    PipelineGraph::from_parts(nodes, edges)
}

fn positions(order: &[Node]) -> HashMap<NodeId, usize> {
    order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect()
}

#[test]
fn test_every_edge_respected_on_acyclic_graphs() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let graph = random_dag(&mut rng, 12);
        let resolution = resolve(&graph).unwrap();

        assert!(resolution.is_complete());
        assert_eq!(resolution.order.len(), graph.nodes().len());

        let pos = positions(&resolution.order);
        for edge in graph.edges() {
            assert!(
                pos[&edge.source] < pos[&edge.target],
                "{} must run before {}",
                edge.source,
                edge.target
            );
        }
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    let graph = random_dag(&mut rng, 20);

    let first = resolve(&graph).unwrap();
    for _ in 0..5 {
        assert_eq!(resolve(&graph).unwrap().order_ids(), first.order_ids());
    }
}

#[test]
fn test_empty_graph_is_rejected() {
    assert_eq!(resolve(&PipelineGraph::new()), Err(ResolveError::EmptyPipeline));
}

#[test]
fn test_graph_without_data_input_is_rejected() {
    let graph = PipelineGraph::from_parts(
        vec![
            Node::new("p1", NodeKind::Preprocessing),
            Node::new("m1", NodeKind::Model),
        ],
        vec![Edge::new("e1", "p1", "m1")],
    );

    assert_eq!(resolve(&graph), Err(ResolveError::NoEntryPoint));
}

#[test]
fn test_cycle_excluded_entry_kept() {
    let graph = PipelineGraph::from_parts(
        vec![
            Node::new("A", NodeKind::Model),
            Node::new("B", NodeKind::Training),
            Node::new("C", NodeKind::DataInput),
        ],
        vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "A")],
    );

    let resolution = resolve(&graph).unwrap();
    assert_eq!(resolution.order_ids(), vec![NodeId::from("C")]);
    assert_eq!(
        resolution.blocked,
        vec![NodeId::from("A"), NodeId::from("B")]
    );
}

#[test]
fn test_multiple_entry_points_and_components() {
    // Two independent chains; both run, seeded in input order.
    let graph = PipelineGraph::from_parts(
        vec![
            Node::new("d1", NodeKind::DataInput),
            Node::new("d2", NodeKind::DataInput),
            Node::new("t1", NodeKind::Training),
            Node::new("t2", NodeKind::Training),
        ],
        vec![Edge::new("e1", "d1", "t1"), Edge::new("e2", "d2", "t2")],
    );

    let resolution = resolve(&graph).unwrap();
    let ids: Vec<&str> = resolution.order.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2", "t1", "t2"]);
    assert_eq!(resolution.entry_points, 2);
}

#[test]
fn test_unconnected_non_entry_nodes_still_run() {
    // Zero in-degree means runnable, whatever the kind.
    let graph = PipelineGraph::from_parts(
        vec![
            Node::new("d1", NodeKind::DataInput),
            Node::new("o1", NodeKind::Output),
        ],
        vec![],
    );

    assert_eq!(resolve(&graph).unwrap().order.len(), 2);
}
