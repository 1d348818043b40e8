// Minimum / Maximum Tasks
// Pick one winning branch by weighted metric score

use super::TOOL;
use crate::flowgraph::NodeId;
use crate::tasks::{NodeContext, SelectionContext, Task, TaskError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Minimum,
    Maximum,
}

impl Extreme {
    fn improves(self, score: f64, best: f64) -> bool {
        match self {
            Extreme::Minimum => score < best,
            Extreme::Maximum => score > best,
        }
    }
}

/// Selects the predecessor with the lowest weighted score
#[derive(Debug, Clone, Default)]
pub struct MinimumTask;

/// Selects the predecessor with the highest weighted score
#[derive(Debug, Clone, Default)]
pub struct MaximumTask;

#[async_trait]
impl Task for MinimumTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "minimum"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn merges_inputs(&self) -> bool {
        false
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        select_winner(ctx, Extreme::Minimum)
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}

#[async_trait]
impl Task for MaximumTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "maximum"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn merges_inputs(&self) -> bool {
        false
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        select_winner(ctx, Extreme::Maximum)
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}

/// Candidates are the inputs that did not fail and meet every declared goal
fn candidates(ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
    let mut candidates = Vec::new();

    for node in ctx.default_inputs()? {
        let status = ctx.record.get_status(&node);
        if status.is_error() {
            debug!(node = %node, %status, "Excluding failed candidate");
            continue;
        }

        let missed = ctx.flow.get(&node).and_then(|attributes| {
            attributes
                .goals
                .keys()
                .find(|metric| !ctx.record.meets_goal(&node, metric))
        });
        if let Some(metric) = missed {
            warn!(
                "Step {} failed because it didn't meet goals for '{}' metric.",
                node, metric
            );
            continue;
        }

        candidates.push(node);
    }

    Ok(candidates)
}

/// Sum of weight x value over the candidate's non-zero weights
fn score(ctx: &SelectionContext<'_>, node: &NodeId) -> Result<f64, TaskError> {
    let Some(attributes) = ctx.flow.get(node) else {
        return Ok(0.0);
    };

    let mut score = 0.0;
    for metric in attributes.weights.keys() {
        let weight = ctx.weight(node, metric).unwrap_or(0.0);
        if weight == 0.0 {
            continue;
        }
        score += weight * ctx.metric(node, metric)?;
    }
    Ok(score)
}

fn select_winner(ctx: &SelectionContext<'_>, extreme: Extreme) -> Result<Vec<NodeId>, TaskError> {
    let candidates = candidates(ctx)?;

    // Ties keep the earliest candidate
    let mut winner: Option<(NodeId, f64)> = None;
    for node in candidates {
        let score = score(ctx, &node)?;
        let better = match &winner {
            Some((_, best)) => extreme.improves(score, *best),
            None => true,
        };
        if better {
            winner = Some((node, score));
        }
    }

    let (node, score) = winner.ok_or(TaskError::NoCandidate)?;
    info!("Selected '{}' with score {:.3}", node, score);
    Ok(vec![node])
}
