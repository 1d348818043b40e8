// Verify Task
// Gate a single predecessor on metric criteria such as errors==0

use super::TOOL;
use crate::flowgraph::NodeId;
use crate::tasks::{NodeContext, SelectionContext, Task, TaskError};

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Comparison operator of a verification criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn holds(self, actual: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Eq => actual == threshold,
            CompareOp::Ne => actual != threshold,
            CompareOp::Lt => actual < threshold,
            CompareOp::Le => actual <= threshold,
            CompareOp::Gt => actual > threshold,
            CompareOp::Ge => actual >= threshold,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `metric<op>threshold` criterion
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub metric: String,
    pub op: CompareOp,
    pub threshold: f64,
}

impl FromStr for Criterion {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TaskError::InvalidCriterion(s.to_string());

        let start = s.find(&['=', '!', '<', '>'][..]).ok_or_else(invalid)?;
        let (metric, rest) = s.split_at(start);

        // Two-character operators first so `<=` is not read as `<`
        let (op, threshold) = if let Some(threshold) = rest.strip_prefix("==") {
            (CompareOp::Eq, threshold)
        } else if let Some(threshold) = rest.strip_prefix("!=") {
            (CompareOp::Ne, threshold)
        } else if let Some(threshold) = rest.strip_prefix("<=") {
            (CompareOp::Le, threshold)
        } else if let Some(threshold) = rest.strip_prefix(">=") {
            (CompareOp::Ge, threshold)
        } else if let Some(threshold) = rest.strip_prefix('<') {
            (CompareOp::Lt, threshold)
        } else if let Some(threshold) = rest.strip_prefix('>') {
            (CompareOp::Gt, threshold)
        } else {
            return Err(invalid());
        };

        let metric = metric.trim();
        if metric.is_empty() {
            return Err(invalid());
        }
        let threshold = threshold.trim().parse::<f64>().map_err(|_| invalid())?;

        Ok(Criterion {
            metric: metric.to_string(),
            op,
            threshold,
        })
    }
}

impl Criterion {
    /// Check a node's recorded metric against this criterion
    pub fn check(&self, ctx: &SelectionContext<'_>, node: &NodeId) -> Result<(), TaskError> {
        let actual = ctx.metric(node, &self.metric)?;
        if self.op.holds(actual, self.threshold) {
            Ok(())
        } else {
            Err(TaskError::Verification {
                metric: self.metric.clone(),
                op: self.op.to_string(),
                actual,
                threshold: self.threshold,
            })
        }
    }
}

/// Passes its single predecessor through when every criterion holds
#[derive(Debug, Clone, Default)]
pub struct VerifyTask;

#[async_trait]
impl Task for VerifyTask {
    fn tool(&self) -> &str {
        TOOL
    }

    fn task(&self) -> &str {
        "verify"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn select_input_nodes(&self, ctx: &SelectionContext<'_>) -> Result<Vec<NodeId>, TaskError> {
        let inputs = ctx.default_inputs()?;
        if inputs.len() > 1 {
            return Err(TaskError::Setup(format!(
                "{} can only receive one input, found {}",
                ctx.node,
                inputs.len()
            )));
        }

        let criteria = ctx
            .args()
            .iter()
            .map(|arg| arg.parse::<Criterion>())
            .collect::<Result<Vec<_>, _>>()?;

        for input in &inputs {
            for criterion in &criteria {
                criterion.check(ctx, input)?;
            }
            info!(node = %ctx.node, "Verified '{}' against {} criteria", input, criteria.len());
        }

        Ok(inputs)
    }

    async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
        Ok(0)
    }
}
