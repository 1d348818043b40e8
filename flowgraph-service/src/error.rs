// Service Errors
// Crate-wide error and result types for definition, validation and scheduling

use crate::flowgraph::FlowgraphError;

use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that abort an operation before any node executes
///
/// Per-node failures never surface here; they are recorded as a terminal
/// `NodeStatus` instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Flowgraph(#[from] FlowgraphError),

    #[error("Invalid flow {flow}: {}", .diagnostics.join("; "))]
    InvalidFlow {
        flow: String,
        diagnostics: Vec<String>,
    },

    #[error("Task not registered: {0}")]
    UnknownTask(String),

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServiceError {
    /// Diagnostics attached to an invalid flow, empty for other errors
    pub fn diagnostics(&self) -> &[String] {
        match self {
            ServiceError::InvalidFlow { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
