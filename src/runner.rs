//! Pipeline runner: resolves a graph and executes it stage by stage.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tracing::{info_span, Instrument};

use crate::config::{CyclePolicy, RunnerConfig, StageLatencies};
use crate::graph::{Node, NodeId, PipelineGraph};
use crate::log::{ExecutionLog, ExecutionLogEntry, LogLevel, RunId};
use crate::persistence::{self, PersistError};
use crate::resolver::{self, ResolveError};
use crate::stage::{SimulatedStage, StageExecutor};

/// Why a run ended without completing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No nodes in pipeline")]
    EmptyPipeline,

    #[error("No data input node found. Please add a Data Input node to start your pipeline.")]
    NoEntryPoint,

    #[error("Cyclic dependency between nodes: {}", join_ids(.nodes))]
    CyclicGraph { nodes: Vec<NodeId> },

    #[error("{message}")]
    StageExecutionError { node_id: NodeId, message: String },
}

impl From<ResolveError> for PipelineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::EmptyPipeline => Self::EmptyPipeline,
            ResolveError::NoEntryPoint => Self::NoEntryPoint,
        }
    }
}

/// Errors returned to the caller of a runner operation.
///
/// Failures inside a run are not errors here; they end up in the log and
/// in [`RunStatus::Failed`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed { error: PipelineError },
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Nodes that completed, in execution order.
    pub executed: Vec<NodeId>,
    /// Nodes left out because of a dependency cycle.
    pub skipped: Vec<NodeId>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

struct Shared {
    config: RunnerConfig,
    executor: Arc<dyn StageExecutor>,
    log: ExecutionLog,
    executing: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    current_pipeline: Mutex<Option<PipelineGraph>>,
    next_run: AtomicU64,
}

/// Runs pipelines and exposes their log and running state.
///
/// Cloning gives another handle to the same runner. At most one run is in
/// flight at a time; a second [`run`](Self::run) is rejected with
/// [`RunnerError::AlreadyRunning`].
#[derive(Clone)]
pub struct PipelineRunner {
    shared: Arc<Shared>,
}

impl Default for PipelineRunner {
    fn default() -> Self {
        RunnerBuilder::new().build()
    }
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig) -> Self {
        RunnerBuilder::new().config(config).build()
    }

    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    /// Resolve and execute `graph`.
    ///
    /// The graph is copied at start, so edits made while the run is in
    /// flight do not affect it. The log is cleared first. Whatever the
    /// outcome, the running flag is false again once this returns or the
    /// future is dropped.
    pub async fn run(&self, graph: &PipelineGraph) -> Result<RunReport, RunnerError> {
        let _guard = self.begin()?;

        let run_id = RunId(self.shared.next_run.fetch_add(1, Ordering::Relaxed) + 1);
        let snapshot = graph.clone();
        let span = info_span!("pipeline_run", run_id = run_id.0, nodes = snapshot.nodes().len());

        let report = self.execute(run_id, snapshot).instrument(span).await;
        Ok(report)
    }

    /// Ask the in-flight run to stop at its next suspension point.
    ///
    /// Does nothing when no run is in flight.
    pub fn cancel(&self) {
        if self.is_executing() {
            self.shared.cancel.send_replace(true);
        }
    }

    pub fn is_executing(&self) -> bool {
        *self.shared.executing.borrow()
    }

    /// Watch the running flag.
    pub fn watch_executing(&self) -> watch::Receiver<bool> {
        self.shared.executing.subscribe()
    }

    /// Snapshot of the current run's log.
    pub fn logs(&self) -> Vec<ExecutionLogEntry> {
        self.shared.log.snapshot()
    }

    /// Receive log entries as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionLogEntry> {
        self.shared.log.subscribe()
    }

    /// The pipeline most recently saved or loaded through this runner.
    pub fn current_pipeline(&self) -> Option<PipelineGraph> {
        self.pipeline_slot().clone()
    }

    /// Save `graph` into `dir` and remember it as the current pipeline.
    pub async fn save_pipeline(
        &self,
        graph: &PipelineGraph,
        dir: &Path,
    ) -> Result<PathBuf, RunnerError> {
        let path = persistence::save_to_dir(graph, dir).await?;
        *self.pipeline_slot() = Some(graph.clone());
        tracing::info!(path = %path.display(), "Pipeline saved");
        Ok(path)
    }

    /// Load a pipeline file and remember it as the current pipeline.
    ///
    /// A file that fails to parse leaves the current pipeline unchanged.
    pub async fn load_pipeline(&self, path: &Path) -> Result<PipelineGraph, RunnerError> {
        let graph = persistence::load_from_file(path).await?;
        *self.pipeline_slot() = Some(graph.clone());
        tracing::info!(path = %path.display(), nodes = graph.nodes().len(), "Pipeline loaded");
        Ok(graph)
    }

    /// Same as [`load_pipeline`](Self::load_pipeline) for in-memory JSON.
    pub fn load_pipeline_str(&self, json: &str) -> Result<PipelineGraph, RunnerError> {
        let graph = persistence::from_json(json)?;
        *self.pipeline_slot() = Some(graph.clone());
        Ok(graph)
    }

    fn begin(&self) -> Result<ExecutingGuard, RunnerError> {
        let acquired = self.shared.executing.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !acquired {
            return Err(RunnerError::AlreadyRunning);
        }
        Ok(ExecutingGuard {
            shared: self.shared.clone(),
        })
    }

    async fn execute(&self, run_id: RunId, graph: PipelineGraph) -> RunReport {
        let log = &self.shared.log;
        let mut report = RunReport {
            run_id,
            status: RunStatus::Completed,
            executed: Vec::new(),
            skipped: Vec::new(),
        };

        log.clear();
        log.append(run_id, LogLevel::Info, "Starting pipeline execution...", None);

        let resolution = match resolver::resolve(&graph) {
            Ok(resolution) => resolution,
            Err(err) => {
                log.append(run_id, LogLevel::Error, err.to_string(), None);
                report.status = RunStatus::Failed { error: err.into() };
                return report;
            }
        };

        if !resolution.is_complete() && self.shared.config.cycle_policy == CyclePolicy::Reject {
            let error = PipelineError::CyclicGraph {
                nodes: resolution.blocked,
            };
            log.append(run_id, LogLevel::Error, error.to_string(), None);
            report.status = RunStatus::Failed { error };
            return report;
        }

        log.append(
            run_id,
            LogLevel::Info,
            format!(
                "Pipeline validation successful: {} data input node(s), {} stage(s) in execution order",
                resolution.entry_points,
                resolution.order.len()
            ),
            None,
        );

        if !resolution.is_complete() {
            log.append(
                run_id,
                LogLevel::Warning,
                format!(
                    "Skipping {} node(s) caught in a dependency cycle: {}",
                    resolution.blocked.len(),
                    join_ids(&resolution.blocked)
                ),
                None,
            );
            report.skipped = resolution.blocked;
        }

        for node in &resolution.order {
            let cancel_requested = *self.shared.cancel.borrow();
            if cancel_requested {
                log.append(run_id, LogLevel::Warning, "Execution cancelled", None);
                report.status = RunStatus::Cancelled;
                return report;
            }

            log.append(
                run_id,
                LogLevel::Info,
                format!("Executing {} node: {}", node.kind, node.display_name()),
                Some(&node.id),
            );

            match self.run_stage(node).await {
                StageOutcome::Done => {
                    log.append(
                        run_id,
                        LogLevel::Success,
                        format!("Completed {} node - {}", node.kind, node.kind.result_message()),
                        Some(&node.id),
                    );
                    report.executed.push(node.id.clone());
                }
                StageOutcome::Cancelled => {
                    log.append(run_id, LogLevel::Warning, "Execution cancelled", Some(&node.id));
                    report.status = RunStatus::Cancelled;
                    return report;
                }
                StageOutcome::Failed(message) => {
                    log.append(
                        run_id,
                        LogLevel::Error,
                        format!("Execution failed: {}", message),
                        Some(&node.id),
                    );
                    report.status = RunStatus::Failed {
                        error: PipelineError::StageExecutionError {
                            node_id: node.id.clone(),
                            message,
                        },
                    };
                    return report;
                }
            }
        }

        log.append(
            run_id,
            LogLevel::Success,
            "Pipeline execution completed successfully!",
            None,
        );
        report
    }

    /// Execute one stage on its own task so a panic in the executor is
    /// contained, racing it against cancellation.
    async fn run_stage(&self, node: &Node) -> StageOutcome {
        let executor = self.shared.executor.clone();
        let owned = node.clone();
        let mut handle = tokio::spawn(async move { executor.execute(&owned).await });
        let _abort = AbortOnDrop(handle.abort_handle());
        let mut cancel = self.shared.cancel.subscribe();

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(())) => StageOutcome::Done,
                Ok(Err(err)) => StageOutcome::Failed(err.to_string()),
                Err(join_error) if join_error.is_panic() => {
                    StageOutcome::Failed(panic_message(join_error.into_panic()))
                }
                Err(_) => StageOutcome::Failed("stage task was aborted".to_string()),
            },
            _ = cancelled(&mut cancel) => StageOutcome::Cancelled,
        }
    }

    fn pipeline_slot(&self) -> MutexGuard<'_, Option<PipelineGraph>> {
        self.shared
            .current_pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

enum StageOutcome {
    Done,
    Cancelled,
    Failed(String),
}

/// Clears the running flag when the run ends, however it ends.
struct ExecutingGuard {
    shared: Arc<Shared>,
}

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        self.shared.cancel.send_replace(false);
        self.shared.executing.send_replace(false);
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resolves once cancellation has been requested.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: no cancellation can arrive any more.
            futures::future::pending::<()>().await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builder for constructing a [`PipelineRunner`].
pub struct RunnerBuilder {
    config: RunnerConfig,
    executor: Option<Arc<dyn StageExecutor>>,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            executor: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn latencies(mut self, latencies: StageLatencies) -> Self {
        self.config.latencies = latencies;
        self
    }

    pub fn latency_scale(mut self, scale: f64) -> Self {
        self.config.latency_scale = scale;
        self
    }

    pub fn cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.config.cycle_policy = policy;
        self
    }

    pub fn log_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.log_channel_capacity = capacity;
        self
    }

    /// Execute stages with `executor` instead of the simulated default.
    pub fn executor<E: StageExecutor + 'static>(mut self, executor: E) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn build(self) -> PipelineRunner {
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(SimulatedStage::new(
                self.config.latencies.clone(),
                self.config.latency_scale,
            ))
        });
        let (executing, _) = watch::channel(false);
        let (cancel, _) = watch::channel(false);

        PipelineRunner {
            shared: Arc::new(Shared {
                log: ExecutionLog::new(self.config.log_channel_capacity),
                config: self.config,
                executor,
                executing,
                cancel,
                current_pipeline: Mutex::new(None),
                next_run: AtomicU64::new(0),
            }),
        }
    }
}
