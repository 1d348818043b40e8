// Join Task
// Merges every predecessor; all of them must have succeeded

use super::TOOL;
use crate::flowgraph::NodeId;
use crate::tasks::{NodeContext, SelectionContext, Task, TaskError};

use async_trait::async_trait;
use tracing::info;

/// Consumes the union of all predecessors' outputs
#[derive(Debug, Clone, Default)]
pub struct JoinTask;

#[async_trait]
impl Task for JoinTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "join"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        info!(node = %ctx.node, "Running builtin task 'join'");
        let inputs = ctx.default_inputs()?;

        let failed: Vec<String> = inputs
            .iter()
            .filter(|node| !ctx.record.get_status(node).is_success())
            .map(|node| format!("{} ({})", node, ctx.record.get_status(node)))
            .collect();
        if !failed.is_empty() {
            return Err(TaskError::Input(format!(
                "{} requires every input to succeed: {}",
                ctx.node,
                failed.join(", ")
            )));
        }

        Ok(inputs)
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}
