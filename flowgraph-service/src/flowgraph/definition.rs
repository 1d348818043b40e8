// Flow Definition Files
// YAML description of a flowgraph and its conversion into a Flowgraph

use super::{Flowgraph, NodeId};
use crate::error::ServiceResult;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A flowgraph as written in a definition file
///
/// ```yaml
/// name: asicflow
/// nodes:
///   - step: import
///     task: builtin/nop
///   - step: syn
///     index: 0
///     task: yosys/syn_asic
///     weights: { cellarea: 1.0 }
/// edges:
///   - from: import/0
///     to: syn/0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDefinition {
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub step: String,
    /// Index as a number or a string; defaults to `0`
    #[serde(default = "default_index", deserialize_with = "index_from_scalar")]
    pub index: String,
    /// Task identifier `tool/task`
    pub task: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub goals: BTreeMap<String, f64>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Input names the node requires
    #[serde(default, rename = "inputs")]
    pub required_inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: NodeId,
    pub to: NodeId,
}

fn default_index() -> String {
    "0".to_string()
}

fn index_from_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Number(u64),
        Text(String),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Number(n) => n.to_string(),
        Scalar::Text(s) => s,
    })
}

impl FlowDefinition {
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ServiceResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the flowgraph; nodes are created before any edge is connected
    pub fn into_flowgraph(self) -> ServiceResult<Flowgraph> {
        let mut flow = Flowgraph::new(self.name);

        for node in &self.nodes {
            flow.node(&node.step, node.task.as_str(), &node.index)?;
            for arg in &node.args {
                flow.add_arg(&node.step, &node.index, arg)?;
            }
            for (metric, weight) in &node.weights {
                flow.set_weight(&node.step, &node.index, metric, *weight)?;
            }
            for (metric, goal) in &node.goals {
                flow.set_goal(&node.step, &node.index, metric, *goal)?;
            }
            for output in &node.outputs {
                flow.add_output(&node.step, &node.index, output)?;
            }
            for input in &node.required_inputs {
                flow.add_required_input(&node.step, &node.index, input)?;
            }
        }

        for edge in &self.edges {
            flow.edge(&edge.from.step, &edge.to.step, &edge.from.index, &edge.to.index)?;
        }

        Ok(flow)
    }
}
