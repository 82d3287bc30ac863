//! Stage executor trait and the default simulated stage.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::StageLatencies;
use crate::graph::Node;

/// Error returned by a stage execution.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StageError(#[source] pub anyhow::Error);

impl StageError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(err.into())
    }

    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

/// Executes one resolved pipeline node.
///
/// The runner awaits exactly one `execute` call per node, in resolved
/// order, and never overlaps two calls within the same run.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, node: &Node) -> Result<(), StageError>;
}

/// Stand-in for real work: waits for the latency configured for the
/// node's kind, then succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedStage {
    latencies: StageLatencies,
    scale: f64,
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new(StageLatencies::default(), 1.0)
    }
}

impl SimulatedStage {
    pub fn new(latencies: StageLatencies, scale: f64) -> Self {
        Self { latencies, scale }
    }

    /// The wait applied to `node`.
    pub fn latency_for(&self, node: &Node) -> Duration {
        let base = self.latencies.for_kind(node.kind);
        Duration::try_from_secs_f64(base.as_secs_f64() * self.scale).unwrap_or(base)
    }
}

#[async_trait]
impl StageExecutor for SimulatedStage {
    async fn execute(&self, node: &Node) -> Result<(), StageError> {
        tokio::time::sleep(self.latency_for(node)).await;
        Ok(())
    }
}
