//! Pipeline file format.
//!
//! A saved pipeline is the pretty-printed JSON form of [`PipelineGraph`]:
//! `{"nodes": [...], "edges": [...]}`, with each node's kind under `type`.
//! Unknown keys inside node `data` and on edges are carried through.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::graph::{NodeId, PipelineGraph};

/// Error type for pipeline file operations.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("malformed pipeline file: {0}")]
    MalformedPipelineFile(String),

    #[error("node '{node_id}' has a non-finite position and cannot be saved")]
    NonFinitePosition { node_id: NodeId },

    #[error("pipeline file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serialize a graph to the pipeline file format.
///
/// JSON has no NaN or infinity, so a node placed at a non-finite
/// coordinate is refused rather than written as `null`.
pub fn to_json(graph: &PipelineGraph) -> Result<String, PersistError> {
    if let Some(node) = graph.nodes().iter().find(|n| !n.position.is_finite()) {
        return Err(PersistError::NonFinitePosition {
            node_id: node.id.clone(),
        });
    }
    serde_json::to_string_pretty(graph)
        .map_err(|e| PersistError::MalformedPipelineFile(e.to_string()))
}

/// Parse a pipeline file.
///
/// Missing `nodes` or `edges` arrays mean empty. Unknown node types and
/// repeated node ids are rejected; edges pointing at absent nodes are kept.
pub fn from_json(json: &str) -> Result<PipelineGraph, PersistError> {
    let graph: PipelineGraph = serde_json::from_str(json)
        .map_err(|e| PersistError::MalformedPipelineFile(e.to_string()))?;

    let mut seen = HashSet::with_capacity(graph.nodes().len());
    if let Some(dup) = graph.nodes().iter().find(|n| !seen.insert(&n.id)) {
        return Err(PersistError::MalformedPipelineFile(format!(
            "duplicate node id '{}'",
            dup.id
        )));
    }

    Ok(graph)
}

/// File name a save made at `now` is written under.
pub fn save_file_name(now: DateTime<Utc>) -> String {
    format!("ml-pipeline-{}.json", now.timestamp_millis())
}

/// Write `graph` into `dir` under a timestamped name and return the path.
pub async fn save_to_dir(graph: &PipelineGraph, dir: &Path) -> Result<PathBuf, PersistError> {
    let path = dir.join(save_file_name(Utc::now()));
    let json = to_json(graph)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Read and parse a pipeline file.
pub async fn load_from_file(path: &Path) -> Result<PipelineGraph, PersistError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    from_json(&json)
}

impl PipelineGraph {
    /// Replace this graph with the one in `json`.
    ///
    /// On error the current graph is left untouched.
    pub fn replace_from_json(&mut self, json: &str) -> Result<(), PersistError> {
        *self = from_json(json)?;
        Ok(())
    }
}
