// Execution Engine Module
// Pre-run checks, layered scheduling and progress reporting

pub mod checks;
pub mod events;
pub mod scheduler;

// Re-export key types
pub use checks::{check_flowgraph_io, TaskTable};
pub use events::{progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender};
pub use scheduler::{RunSummary, Scheduler, SchedulerConfig};
