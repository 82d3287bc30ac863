//! Pipeline graph model: typed stage nodes joined by directed edges.
//!
//! The graph is whatever the user drew on the canvas. Nothing here checks
//! that it is acyclic or that edge endpoints still exist after a load; the
//! resolver copes with both.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a node in a pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of an edge in a pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The closed set of stage kinds a node can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    DataInput,
    Preprocessing,
    Model,
    Training,
    Evaluation,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::DataInput,
        NodeKind::Preprocessing,
        NodeKind::Model,
        NodeKind::Training,
        NodeKind::Evaluation,
        NodeKind::Output,
    ];

    /// Wire spelling, as used in pipeline files and log messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataInput => "dataInput",
            Self::Preprocessing => "preprocessing",
            Self::Model => "model",
            Self::Training => "training",
            Self::Evaluation => "evaluation",
            Self::Output => "output",
        }
    }

    /// Label the node palette gives a freshly added node of this kind.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::DataInput => "Data Input",
            Self::Preprocessing => "Preprocessing",
            Self::Model => "Model Selection",
            Self::Training => "Training",
            Self::Evaluation => "Evaluation",
            Self::Output => "Output",
        }
    }

    /// Suffix appended to the completion message of a stage of this kind.
    pub fn result_message(&self) -> &'static str {
        match self {
            Self::DataInput => "Data loaded successfully",
            Self::Preprocessing => "Data preprocessed and ready",
            Self::Model => "Model architecture defined",
            Self::Training => "Model training completed",
            Self::Evaluation => "Model evaluation finished",
            Self::Output => "Results exported",
        }
    }

    pub fn is_entry_point(&self) -> bool {
        matches!(self, Self::DataInput)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas coordinate. Has no bearing on execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Display and configuration metadata attached to a node.
///
/// Only `label` is read by the engine. Everything else the editor stores
/// (the `config` object, styling hints) is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NodeData {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// The user-entered stage configuration, if any.
    pub fn config(&self) -> Option<&serde_json::Value> {
        self.extra.get("config")
    }

    pub fn set_config(&mut self, config: serde_json::Value) {
        self.extra.insert("config".to_string(), config);
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            data: NodeData::with_label(kind.default_label()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Label for log messages, falling back to the id.
    pub fn display_name(&self) -> &str {
        match self.data.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => self.id.as_str(),
        }
    }
}

/// A directed dependency: `source` runs before `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Editor-specific keys (handles, styling) preserved across save/load.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: EdgeId(id.into()),
            source: source.into(),
            target: target.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Error returned by graph editing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' does not exist")]
    UnknownNode(NodeId),

    #[error("node '{0}' already exists")]
    DuplicateNode(NodeId),

    #[error("node '{0}' cannot be connected to itself")]
    SelfLoop(NodeId),
}

/// A user-authored pipeline: nodes plus the edges between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(skip)]
    next_seq: u64,
}

// The id counter is editor bookkeeping, not part of the graph.
impl PartialEq for PipelineGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Nodes a run can start from.
    pub fn entry_points(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind.is_entry_point())
    }

    /// Add a palette node of the given kind and return its generated id.
    pub fn add_node(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = self.fresh_node_id(kind);
        let mut node = Node::new(id.clone(), kind).at(position);
        node.data
            .set_config(serde_json::Value::Object(serde_json::Map::new()));
        self.nodes.push(node);
        id
    }

    /// Insert a node built by the caller.
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.contains(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Connect `source` to `target`.
    ///
    /// Any two distinct existing nodes may be connected regardless of
    /// kind. Repeating an existing connection returns the id of the edge
    /// already present.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<EdgeId, GraphError> {
        if source == target {
            return Err(GraphError::SelfLoop(source.clone()));
        }
        for id in [source, target] {
            if !self.contains(id) {
                return Err(GraphError::UnknownNode(id.clone()));
            }
        }
        if let Some(existing) = self
            .edges
            .iter()
            .find(|e| &e.source == source && &e.target == target)
        {
            return Ok(existing.id.clone());
        }

        let mut id = format!("e-{}-{}", source, target);
        let mut n = 1;
        while self.edges.iter().any(|e| e.id.as_str() == id) {
            n += 1;
            id = format!("e-{}-{}-{}", source, target, n);
        }
        let edge = Edge::new(id, source.clone(), target.clone());
        let edge_id = edge.id.clone();
        self.edges.push(edge);
        Ok(edge_id)
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| &n.id == id)?;
        let node = self.nodes.remove(idx);
        self.edges.retain(|e| &e.source != id && &e.target != id);
        Some(node)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| &e.id == id)?;
        Some(self.edges.remove(idx))
    }

    /// Edit the metadata of one node in place.
    pub fn update_node_data<F>(&mut self, id: &NodeId, f: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut NodeData),
    {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        f(&mut node.data);
        Ok(())
    }

    fn fresh_node_id(&mut self, kind: NodeKind) -> NodeId {
        loop {
            self.next_seq += 1;
            let candidate = NodeId(format!("{}-{}", kind.as_str(), self.next_seq));
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_generates_unique_ids() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(NodeKind::DataInput, Position::default());
        let b = graph.add_node(NodeKind::DataInput, Position::default());

        assert_ne!(a, b);
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.node(&a).unwrap().data.label.as_deref(), Some("Data Input"));
        assert!(graph.node(&a).unwrap().data.config().is_some());
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(NodeKind::Model, Position::default());
        graph.remove_node(&a);
        let b = graph.add_node(NodeKind::Model, Position::default());

        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_ids_skip_existing() {
        let mut graph = PipelineGraph::new();
        graph.insert_node(Node::new("model-1", NodeKind::Model)).unwrap();
        let id = graph.add_node(NodeKind::Model, Position::default());

        assert_eq!(id.as_str(), "model-2");
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut graph = PipelineGraph::new();
        graph.insert_node(Node::new("d1", NodeKind::DataInput)).unwrap();
        let err = graph
            .insert_node(Node::new("d1", NodeKind::Output))
            .unwrap_err();

        assert_eq!(err, GraphError::DuplicateNode("d1".into()));
    }

    #[test]
    fn test_connect_validates_endpoints() {
        let mut graph = PipelineGraph::new();
        graph.insert_node(Node::new("d1", NodeKind::DataInput)).unwrap();

        assert_eq!(
            graph.connect(&"d1".into(), &"d1".into()),
            Err(GraphError::SelfLoop("d1".into()))
        );
        assert_eq!(
            graph.connect(&"d1".into(), &"missing".into()),
            Err(GraphError::UnknownNode("missing".into()))
        );
    }

    #[test]
    fn test_connect_any_kinds_and_dedupe() {
        let mut graph = PipelineGraph::new();
        graph.insert_node(Node::new("eval", NodeKind::Evaluation)).unwrap();
        graph.insert_node(Node::new("data", NodeKind::DataInput)).unwrap();

        let first = graph.connect(&"eval".into(), &"data".into()).unwrap();
        let second = graph.connect(&"eval".into(), &"data".into()).unwrap();

        assert_eq!(first, second);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = PipelineGraph::new();
        for (id, kind) in [
            ("d1", NodeKind::DataInput),
            ("p1", NodeKind::Preprocessing),
            ("m1", NodeKind::Model),
        ] {
            graph.insert_node(Node::new(id, kind)).unwrap();
        }
        graph.connect(&"d1".into(), &"p1".into()).unwrap();
        graph.connect(&"p1".into(), &"m1".into()).unwrap();

        let removed = graph.remove_node(&"p1".into()).unwrap();

        assert_eq!(removed.kind, NodeKind::Preprocessing);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.nodes().len(), 2);
    }

    #[test]
    fn test_update_node_data() {
        let mut graph = PipelineGraph::new();
        let id = graph.add_node(NodeKind::Training, Position::new(10.0, 20.0));

        graph
            .update_node_data(&id, |data| {
                data.label = Some("Fine-tune".to_string());
                data.set_config(serde_json::json!({ "epochs": 10 }));
            })
            .unwrap();

        let node = graph.node(&id).unwrap();
        assert_eq!(node.display_name(), "Fine-tune");
        assert_eq!(node.data.config().unwrap()["epochs"], 10);
        assert!(graph.update_node_data(&"nope".into(), |_| {}).is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut node = Node::new("m1", NodeKind::Model);
        node.data.label = None;
        assert_eq!(node.display_name(), "m1");

        node.data.label = Some(String::new());
        assert_eq!(node.display_name(), "m1");
    }
}
