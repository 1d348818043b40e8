// Flowgraph Service Library
// Pipeline flowgraph definition, validation and layered scheduling

pub mod error;
pub mod execution;
pub mod flowgraph;
pub mod record;
pub mod status;
pub mod tasks;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};
pub use status::NodeStatus;

// Re-export flowgraph types
pub use flowgraph::{
    FlowDefinition, FlowNode, Flowgraph, FlowgraphError, FlowgraphErrorKind, NodeId, RunOptions,
    RuntimeFlowgraph, TaskRef,
};

// Re-export execution types
pub use execution::{ExecutionEvent, ProgressSender, RunSummary, Scheduler, SchedulerConfig};

// Re-export record and task types
pub use record::{NodeRecord, Record, RecordStore};
pub use tasks::{Metrics, NodeContext, SelectionContext, Task, TaskError, TaskRegistry};
