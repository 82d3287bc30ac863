//! Execution log: the append-only record of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::graph::NodeId;

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a log entry. Never reused by the same log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogEntryId(pub u64);

/// Severity tag of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the execution log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub id: LogEntryId,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl fmt::Display for ExecutionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:>7}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.message
        )?;
        if let Some(node_id) = &self.node_id {
            write!(f, " (node {})", node_id)?;
        }
        Ok(())
    }
}

/// Append-only log shared between the runner and its observers.
///
/// Readers take snapshots or subscribe to new entries; only the runner
/// appends or clears.
pub struct ExecutionLog {
    entries: Mutex<Vec<ExecutionLogEntry>>,
    next_id: AtomicU64,
    events: broadcast::Sender<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn new(channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Append an entry, mirror it to `tracing`, and publish it to
    /// subscribers.
    pub(crate) fn append(
        &self,
        run_id: RunId,
        level: LogLevel,
        message: impl Into<String>,
        node_id: Option<&NodeId>,
    ) -> ExecutionLogEntry {
        let entry = ExecutionLogEntry {
            id: LogEntryId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            run_id,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            node_id: node_id.cloned(),
        };

        let node = entry.node_id.as_ref().map(NodeId::as_str).unwrap_or("");
        match level {
            LogLevel::Info | LogLevel::Success => {
                info!(run_id = run_id.0, node_id = node, level = %level, "{}", entry.message)
            }
            LogLevel::Warning => warn!(run_id = run_id.0, node_id = node, "{}", entry.message),
            LogLevel::Error => error!(run_id = run_id.0, node_id = node, "{}", entry.message),
        }

        self.lock().push(entry.clone());
        // No subscribers is fine.
        let _ = self.events.send(entry.clone());
        entry
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<ExecutionLogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive every entry appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionLogEntry> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for ExecutionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionLog")
            .field("len", &self.len())
            .finish()
    }
}
