//! Run a pipeline end to end.
//!
//! ```text
//! cargo run --example run_pipeline                 # built-in six-stage pipeline
//! cargo run --example run_pipeline -- saved.json   # a saved pipeline file
//! ```
//!
//! `PLAYGROUND_LATENCY_SCALE=0.1` speeds the simulation up,
//! `PLAYGROUND_CYCLE_POLICY=reject` refuses graphs with cycles and
//! `LOG_FORMAT=json` switches tracing output to JSON.

use ml_playground::telemetry::{self, LogFormat};
use ml_playground::{NodeKind, PipelineGraph, PipelineRunner, Position, RunStatus, RunnerConfig};
use std::path::PathBuf;

/// The palette in its usual order, each stage feeding the next.
fn demo_pipeline() -> anyhow::Result<PipelineGraph> {
    let mut graph = PipelineGraph::new();
    let mut previous = None;
    for (i, kind) in NodeKind::ALL.iter().enumerate() {
        let id = graph.add_node(*kind, Position::new(100.0 + 220.0 * i as f64, 150.0));
        if let Some(prev) = previous {
            graph.connect(&prev, &id)?;
        }
        previous = Some(id);
    }
    Ok(graph)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format: LogFormat = std::env::var("LOG_FORMAT")
        .unwrap_or_default()
        .parse()
        .unwrap_or_default();
    telemetry::init_tracing(format)?;

    let runner = PipelineRunner::new(RunnerConfig::from_env());

    let graph = match std::env::args().nth(1) {
        Some(path) => runner.load_pipeline(&PathBuf::from(path)).await?,
        None => demo_pipeline()?,
    };

    let mut events = runner.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(entry) = events.recv().await {
            println!("{}", entry);
        }
    });

    let report = runner.run(&graph).await?;
    drop(runner);
    // The log channel closes once the last runner handle is gone.
    let _ = printer.await;

    match report.status {
        RunStatus::Completed => {
            println!(
                "\nRun {} completed: {} stage(s) executed, {} skipped",
                report.run_id,
                report.executed.len(),
                report.skipped.len()
            );
            Ok(())
        }
        RunStatus::Cancelled => {
            println!("\nRun {} was cancelled", report.run_id);
            Ok(())
        }
        RunStatus::Failed { error } => Err(anyhow::anyhow!("run {} failed: {}", report.run_id, error)),
    }
}
