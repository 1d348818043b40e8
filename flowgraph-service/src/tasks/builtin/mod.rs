// Builtin Tasks
// Selection and passthrough behaviors shipped with the engine

pub mod join;
pub mod minmax;
pub mod mux;
pub mod nop;
pub mod verify;

pub use join::JoinTask;
pub use minmax::{MaximumTask, MinimumTask};
pub use mux::MuxTask;
pub use nop::NopTask;
pub use verify::{CompareOp, Criterion, VerifyTask};

/// Tool name shared by every builtin task
pub const TOOL: &str = "builtin";
