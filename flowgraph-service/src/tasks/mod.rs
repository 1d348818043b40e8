// Tasks Module
// Task contract executed by flowgraph nodes, and the registry resolving them

pub mod builtin;
pub mod registry;

// Re-export key types
pub use builtin::{JoinTask, MaximumTask, MinimumTask, MuxTask, NopTask, VerifyTask};
pub use registry::{TaskFactory, TaskRegistry};

use crate::flowgraph::{FlowNode, Flowgraph, NodeId, RuntimeFlowgraph};
use crate::record::RecordStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Metric values reported by a task
pub type Metrics = BTreeMap<String, f64>;

/// Per-node failures
///
/// These never abort a run. The scheduler records them as the node's
/// terminal status and downstream nodes react through input resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Run failed: {0}")]
    Run(String),

    #[error("Task exited with code {0}")]
    ExitCode(i32),

    #[error("Post-processing failed: {0}")]
    PostProcess(String),

    #[error("Invalid inputs: {0}")]
    Input(String),

    #[error("Metric {metric} has not been set for {node}")]
    MissingMetric { node: NodeId, metric: String },

    #[error("No candidate input passed selection")]
    NoCandidate,

    #[error("{metric} fails {metric}{op}{threshold} with value {actual}")]
    Verification {
        metric: String,
        op: String,
        actual: f64,
        threshold: f64,
    },

    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),

    #[error("Skipped: {0}")]
    Skipped(String),
}

/// Owned description of the node a task executes for
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContext {
    pub flow: String,
    pub node: NodeId,
    pub args: Vec<String>,
    /// Inputs chosen by `select_input_nodes`
    pub inputs: Vec<NodeId>,
}

/// Everything input selection may consult
///
/// Selection runs inside the scheduler's control loop, after every
/// predecessor reached a terminal status.
pub struct SelectionContext<'a> {
    pub node: &'a NodeId,
    pub flow: &'a Flowgraph,
    pub runtime: &'a RuntimeFlowgraph<'a>,
    pub record: &'a dyn RecordStore,
}

impl<'a> SelectionContext<'a> {
    pub fn new(
        node: &'a NodeId,
        runtime: &'a RuntimeFlowgraph<'a>,
        record: &'a dyn RecordStore,
    ) -> Self {
        Self {
            node,
            flow: runtime.base(),
            runtime,
            record,
        }
    }

    /// Attributes of the node being resolved
    pub fn attributes(&self) -> Option<&'a FlowNode> {
        self.flow.get(self.node)
    }

    pub fn args(&self) -> &'a [String] {
        self.attributes()
            .map(|node| node.args.as_slice())
            .unwrap_or(&[])
    }

    /// Predecessors in the run view, skipping through SKIPPED nodes
    pub fn default_inputs(&self) -> Result<Vec<NodeId>, TaskError> {
        self.runtime
            .get_node_inputs(&self.node.step, &self.node.index, Some(self.record))
            .map_err(|e| TaskError::Input(e.message))
    }

    /// Recorded weight override, else the weight declared on the node
    pub fn weight(&self, node: &NodeId, metric: &str) -> Option<f64> {
        self.record.get_weight(node, metric).or_else(|| {
            self.flow
                .get(node)
                .and_then(|attributes| attributes.weights.get(metric).copied())
        })
    }

    pub fn metric(&self, node: &NodeId, metric: &str) -> Result<f64, TaskError> {
        self.record
            .get_metric(node, metric)
            .ok_or_else(|| TaskError::MissingMetric {
                node: node.clone(),
                metric: metric.to_string(),
            })
    }
}

/// Work bound to a flowgraph node
///
/// `select_input_nodes` decides which predecessors feed the node; the
/// default takes all of them. The scheduler then drives
/// `setup` -> `run` -> `post_process` on a worker.
#[async_trait]
pub trait Task: Send + Sync {
    fn tool(&self) -> &str;

    fn task(&self) -> &str;

    fn task_name(&self) -> String {
        format!("{}/{}", self.tool(), self.task())
    }

    /// Builtin tasks may run with only part of their inputs succeeded
    fn is_builtin(&self) -> bool {
        false
    }

    /// Whether the node consumes the union of its inputs' outputs
    ///
    /// Selecting tasks forward a single input and so never see a name twice.
    fn merges_inputs(&self) -> bool {
        true
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        ctx.default_inputs()
    }

    /// Prepare the node; returning `TaskError::Skipped` marks it SKIPPED
    async fn setup(&self, _ctx: &NodeContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Execute the node and return its exit code
    async fn run(&self, ctx: &NodeContext) -> Result<i32, TaskError>;

    async fn post_process(&self, _ctx: &NodeContext) -> Result<Metrics, TaskError> {
        Ok(Metrics::new())
    }
}
