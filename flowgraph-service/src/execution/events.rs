// Execution Events
// Progress reporting and event types for flowgraph runs

use crate::flowgraph::NodeId;
use crate::status::NodeStatus;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a flowgraph run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started
    RunStarted {
        flow: String,
        total_nodes: usize,
        total_layers: usize,
    },

    /// Run finished, successfully or not
    RunCompleted {
        flow: String,
        success: bool,
        cancelled: bool,
        duration: Duration,
    },

    /// Scheduling moved to the next execution-order layer
    LayerStarted { layer: usize, nodes: Vec<NodeId> },

    /// Node inputs were resolved and it is waiting for a worker
    NodeQueued { node: NodeId },

    /// Worker began executing the node
    NodeStarted { node: NodeId, task: String },

    /// Inputs chosen by the node's task
    InputsSelected { node: NodeId, inputs: Vec<NodeId> },

    /// Node reached a terminal status
    NodeCompleted {
        node: NodeId,
        status: NodeStatus,
        duration: Duration,
        error: Option<String>,
    },

    /// Node was skipped by its task
    NodeSkipped { node: NodeId, reason: String },

    /// Prior result of the node was reused
    NodeReused { node: NodeId, status: NodeStatus },

    /// Log message (info, warning, error)
    Log {
        level: LogLevel,
        message: String,
        node: Option<NodeId>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl ExecutionEvent {
    pub fn run_started(flow: impl Into<String>, total_nodes: usize, total_layers: usize) -> Self {
        Self::RunStarted {
            flow: flow.into(),
            total_nodes,
            total_layers,
        }
    }

    pub fn run_completed(
        flow: impl Into<String>,
        success: bool,
        cancelled: bool,
        duration: Duration,
    ) -> Self {
        Self::RunCompleted {
            flow: flow.into(),
            success,
            cancelled,
            duration,
        }
    }

    pub fn node_completed(
        node: NodeId,
        status: NodeStatus,
        duration: Duration,
        error: Option<String>,
    ) -> Self {
        Self::NodeCompleted {
            node,
            status,
            duration,
            error,
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
            node,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            node,
        }
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
            node,
        }
    }

    /// Node the event concerns, if any
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::NodeQueued { node }
            | Self::NodeStarted { node, .. }
            | Self::InputsSelected { node, .. }
            | Self::NodeCompleted { node, .. }
            | Self::NodeSkipped { node, .. }
            | Self::NodeReused { node, .. } => Some(node),
            Self::Log { node, .. } => node.as_ref(),
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::LayerStarted { .. } => None,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
