// Run Record
// Per-node status and metric store consulted by input resolution and arbitration

use crate::error::ServiceResult;
use crate::flowgraph::NodeId;
use crate::status::NodeStatus;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Read access to per-node results
///
/// Arbitration tasks and skip-through input resolution only read; writes
/// happen in the scheduler's control loop through the concrete store.
pub trait RecordStore: Send + Sync {
    /// Recorded status, `Pending` when nothing was recorded
    fn get_status(&self, node: &NodeId) -> NodeStatus;

    /// Value a node reported for a metric
    fn get_metric(&self, node: &NodeId, metric: &str) -> Option<f64>;

    /// Whether a node's metric satisfies its goal
    ///
    /// A metric without a goal always does.
    fn meets_goal(&self, node: &NodeId, metric: &str) -> bool;

    /// Weight override for ranking a node on a metric
    fn get_weight(&self, node: &NodeId, metric: &str) -> Option<f64>;
}

/// Everything recorded about one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRecord {
    pub status: NodeStatus,
    pub metrics: BTreeMap<String, f64>,
    /// Goals the node carried when it completed
    pub goals: BTreeMap<String, f64>,
    /// Verdicts set from outside a run; they take precedence over `goals`
    /// and survive `clear_node`
    pub goals_met: BTreeMap<String, bool>,
    pub weights: BTreeMap<String, f64>,
    /// Configuration fingerprint (hex SHA-256) of the node when it last completed
    pub fingerprint: Option<String>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// In-memory record store, persisted as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    nodes: BTreeMap<NodeId, NodeRecord>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, node: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &NodeRecord)> {
        self.nodes.iter()
    }

    fn entry(&mut self, node: &NodeId) -> &mut NodeRecord {
        self.nodes.entry(node.clone()).or_default()
    }

    pub fn set_status(&mut self, node: &NodeId, status: NodeStatus) {
        self.entry(node).status = status;
    }

    pub fn set_metric(&mut self, node: &NodeId, metric: &str, value: f64) {
        self.entry(node).metrics.insert(metric.to_string(), value);
    }

    pub fn set_goal(&mut self, node: &NodeId, metric: &str, goal: f64) {
        self.entry(node).goals.insert(metric.to_string(), goal);
    }

    pub fn set_goal_met(&mut self, node: &NodeId, metric: &str, met: bool) {
        self.entry(node).goals_met.insert(metric.to_string(), met);
    }

    pub fn set_weight(&mut self, node: &NodeId, metric: &str, weight: f64) {
        self.entry(node).weights.insert(metric.to_string(), weight);
    }

    pub fn set_fingerprint(&mut self, node: &NodeId, fingerprint: Option<String>) {
        self.entry(node).fingerprint = fingerprint;
    }

    pub fn set_exit_code(&mut self, node: &NodeId, exit_code: Option<i32>) {
        self.entry(node).exit_code = exit_code;
    }

    pub fn set_error(&mut self, node: &NodeId, error: Option<String>) {
        self.entry(node).error = error;
    }

    pub fn fingerprint(&self, node: &NodeId) -> Option<&str> {
        self.nodes
            .get(node)
            .and_then(|record| record.fingerprint.as_deref())
    }

    /// Forget the results of a node before it runs again
    ///
    /// Goal verdicts set with `set_goal_met` are kept.
    pub fn clear_node(&mut self, node: &NodeId) {
        let Some(record) = self.nodes.remove(node) else {
            return;
        };
        if !record.goals_met.is_empty() {
            self.nodes.insert(
                node.clone(),
                NodeRecord {
                    goals_met: record.goals_met,
                    ..Default::default()
                },
            );
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ServiceResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl RecordStore for Record {
    fn get_status(&self, node: &NodeId) -> NodeStatus {
        self.nodes
            .get(node)
            .map(|record| record.status)
            .unwrap_or_default()
    }

    fn get_metric(&self, node: &NodeId, metric: &str) -> Option<f64> {
        self.nodes
            .get(node)
            .and_then(|record| record.metrics.get(metric).copied())
    }

    /// An explicit verdict wins; otherwise the magnitude of the metric
    /// must not exceed the goal
    fn meets_goal(&self, node: &NodeId, metric: &str) -> bool {
        let Some(record) = self.nodes.get(node) else {
            return true;
        };
        if let Some(met) = record.goals_met.get(metric) {
            return *met;
        }
        match (record.goals.get(metric), record.metrics.get(metric)) {
            (Some(goal), Some(value)) => value.abs() <= *goal,
            _ => true,
        }
    }

    fn get_weight(&self, node: &NodeId, metric: &str) -> Option<f64> {
        self.nodes
            .get(node)
            .and_then(|record| record.weights.get(metric).copied())
    }
}
