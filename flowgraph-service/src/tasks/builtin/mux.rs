// Mux Task
// Narrow candidate branches by an ordered list of metric criteria

use super::TOOL;
use crate::flowgraph::NodeId;
use crate::tasks::{NodeContext, SelectionContext, Task, TaskError};

use async_trait::async_trait;
use tracing::info;

/// One `minimum(metric)` or `maximum(metric)` criterion
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Minimum(String),
    Maximum(String),
}

impl Selector {
    fn parse(arg: &str) -> Result<Self, TaskError> {
        let arg = arg.trim();
        let invalid = || TaskError::InvalidCriterion(arg.to_string());

        let (op, rest) = arg.split_once('(').ok_or_else(invalid)?;
        let metric = rest.strip_suffix(')').ok_or_else(invalid)?.trim();
        if metric.is_empty() {
            return Err(invalid());
        }

        match op.trim() {
            "minimum" => Ok(Selector::Minimum(metric.to_string())),
            "maximum" => Ok(Selector::Maximum(metric.to_string())),
            _ => Err(invalid()),
        }
    }

    fn metric(&self) -> &str {
        match self {
            Selector::Minimum(metric) | Selector::Maximum(metric) => metric,
        }
    }
}

/// Selects one predecessor by applying criteria in order
///
/// Each criterion keeps the candidates that reach its best value; the first
/// remaining candidate wins once a single one is left or criteria run out.
#[derive(Debug, Clone, Default)]
pub struct MuxTask;

#[async_trait]
impl Task for MuxTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "mux"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn merges_inputs(&self) -> bool {
        false
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        let selectors = ctx
            .args()
            .iter()
            .map(|arg| Selector::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let inputs = ctx.default_inputs()?;
        if inputs.is_empty() {
            return Err(TaskError::NoCandidate);
        }

        let mut candidates: Vec<NodeId> = inputs
            .iter()
            .filter(|node| !ctx.record.get_status(node).is_error())
            .cloned()
            .collect();
        if candidates.is_empty() {
            // Still hand something to a downstream check
            candidates = inputs.clone();
        }

        for selector in &selectors {
            if candidates.len() == 1 {
                break;
            }

            let values = candidates
                .iter()
                .map(|node| ctx.metric(node, selector.metric()))
                .collect::<Result<Vec<_>, _>>()?;

            let target = match selector {
                Selector::Minimum(_) => values.iter().copied().fold(f64::INFINITY, f64::min),
                Selector::Maximum(_) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };

            candidates = candidates
                .into_iter()
                .zip(values)
                .filter(|(_, value)| *value == target)
                .map(|(node, _)| node)
                .collect();
        }

        let winner = candidates
            .into_iter()
            .next()
            .or_else(|| inputs.into_iter().next())
            .ok_or(TaskError::NoCandidate)?;

        info!("Selected '{}'", winner);
        Ok(vec![winner])
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}
