// Nop Task
// Passthrough node used to reshape a pipeline

use super::TOOL;
use crate::flowgraph::NodeId;
use crate::tasks::{NodeContext, SelectionContext, Task, TaskError};

use async_trait::async_trait;
use tracing::info;

/// Forwards its predecessors unchanged
#[derive(Debug, Clone, Default)]
pub struct NopTask;

#[async_trait]
impl Task for NopTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "nop"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        info!(node = %ctx.node, "Running builtin task 'nop'");
        ctx.default_inputs()
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}
