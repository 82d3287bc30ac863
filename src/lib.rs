//! # ML Playground pipelines
//!
//! Graph model, execution order resolver, and simulated execution engine
//! behind the ML Playground canvas.
//!
//! A pipeline is a set of typed stages (`dataInput`, `preprocessing`,
//! `model`, `training`, `evaluation`, `output`) joined by directed edges.
//! Running it resolves a dependency-respecting order with Kahn's algorithm
//! and then executes the stages one after another, appending timestamped
//! entries to an observable log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ml_playground::{NodeKind, PipelineGraph, PipelineRunner, Position};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = PipelineGraph::new();
//! let data = graph.add_node(NodeKind::DataInput, Position::new(0.0, 0.0));
//! let model = graph.add_node(NodeKind::Model, Position::new(200.0, 0.0));
//! graph.connect(&data, &model)?;
//!
//! let runner = PipelineRunner::builder().latency_scale(0.1).build();
//! let report = runner.run(&graph).await?;
//!
//! for entry in runner.logs() {
//!     println!("{}", entry);
//! }
//! assert!(report.is_completed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cycles
//!
//! The editor lets users draw cycles. Nodes on or behind a cycle are never
//! ordered; by default the run warns and skips them
//! ([`CyclePolicy::Skip`]), or fails up front with
//! [`CyclePolicy::Reject`].

pub mod config;
pub mod graph;
pub mod log;
pub mod persistence;
pub mod resolver;
pub mod runner;
pub mod stage;
pub mod telemetry;

pub use config::{CyclePolicy, RunnerConfig, StageLatencies};
pub use graph::{Edge, EdgeId, GraphError, Node, NodeData, NodeId, NodeKind, PipelineGraph, Position};
pub use log::{ExecutionLog, ExecutionLogEntry, LogEntryId, LogLevel, RunId};
pub use persistence::PersistError;
pub use resolver::{resolve, Resolution, ResolveError};
pub use runner::{PipelineError, PipelineRunner, RunReport, RunStatus, RunnerBuilder, RunnerError};
pub use stage::{SimulatedStage, StageError, StageExecutor};
