//! Runner configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::graph::NodeKind;

/// Environment variable holding the latency multiplier.
pub const ENV_LATENCY_SCALE: &str = "PLAYGROUND_LATENCY_SCALE";

/// Environment variable holding the cycle policy (`skip` or `reject`).
pub const ENV_CYCLE_POLICY: &str = "PLAYGROUND_CYCLE_POLICY";

/// What a run does with nodes the resolver could not order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Warn, name the skipped nodes, and run the rest.
    #[default]
    Skip,
    /// Fail the run before any stage executes.
    Reject,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown cycle policy: {}", other)),
        }
    }
}

/// Simulated latency per stage kind, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageLatencies {
    pub data_input: u64,
    pub preprocessing: u64,
    pub model: u64,
    pub training: u64,
    pub evaluation: u64,
    pub output: u64,
}

impl Default for StageLatencies {
    fn default() -> Self {
        Self {
            data_input: 800,
            preprocessing: 1200,
            model: 1500,
            training: 2000,
            evaluation: 1000,
            output: 600,
        }
    }
}

impl StageLatencies {
    /// Every kind takes the same time.
    pub fn uniform(millis: u64) -> Self {
        Self {
            data_input: millis,
            preprocessing: millis,
            model: millis,
            training: millis,
            evaluation: millis,
            output: millis,
        }
    }

    pub fn for_kind(&self, kind: NodeKind) -> Duration {
        let millis = match kind {
            NodeKind::DataInput => self.data_input,
            NodeKind::Preprocessing => self.preprocessing,
            NodeKind::Model => self.model,
            NodeKind::Training => self.training,
            NodeKind::Evaluation => self.evaluation,
            NodeKind::Output => self.output,
        };
        Duration::from_millis(millis)
    }
}

/// Configuration for a [`PipelineRunner`](crate::PipelineRunner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    pub latencies: StageLatencies,
    /// Multiplier applied to every latency. `0.0` disables waiting.
    pub latency_scale: f64,
    pub cycle_policy: CyclePolicy,
    /// Buffer size of the live log channel. Slow subscribers that fall
    /// further behind than this miss entries (the snapshot stays complete).
    pub log_channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            latencies: StageLatencies::default(),
            latency_scale: 1.0,
            cycle_policy: CyclePolicy::default(),
            log_channel_capacity: 256,
        }
    }
}

impl RunnerConfig {
    /// Defaults overridden by `PLAYGROUND_LATENCY_SCALE` and
    /// `PLAYGROUND_CYCLE_POLICY`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(scale) = lookup(ENV_LATENCY_SCALE)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
        {
            config.latency_scale = scale;
        }

        if let Some(policy) = lookup(ENV_CYCLE_POLICY).and_then(|s| s.parse().ok()) {
            config.cycle_policy = policy;
        }

        config
    }
}
