// Node Status
// Lifecycle states of a flowgraph node and their classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single (step, index) node
///
/// A node starts as `Pending`, is `Queued` once its inputs have been resolved,
/// `Running` while its task executes, and finishes in exactly one terminal
/// state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Success,
    Error,
    Skipped,
    Timeout,
}

impl NodeStatus {
    /// Node has not been picked up by the scheduler yet
    pub fn is_waiting(self) -> bool {
        self == NodeStatus::Pending
    }

    /// Node has been dispatched and has not finished
    pub fn is_running(self) -> bool {
        matches!(self, NodeStatus::Queued | NodeStatus::Running)
    }

    /// Node reached a terminal state
    pub fn is_done(self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Error | NodeStatus::Skipped | NodeStatus::Timeout
        )
    }

    /// Terminal state whose result downstream nodes may consume
    pub fn is_success(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Skipped)
    }

    /// Terminal state that counts as a failure
    pub fn is_error(self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Queued => "queued",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
