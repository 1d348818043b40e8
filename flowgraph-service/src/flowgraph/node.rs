// Flowgraph Nodes
// Node identity, task references and per-node attributes

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Identity of a node: a step and one of its parallel indices
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub step: String,
    pub index: String,
}

impl NodeId {
    pub fn new(step: impl Into<String>, index: impl ToString) -> Self {
        Self {
            step: step.into(),
            index: index.to_string(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.step, self.index)
    }
}

impl FromStr for NodeId {
    type Err = String;

    /// Parse `step/index`; the index is the text after the last `/`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('/') {
            Some((step, index)) if !step.is_empty() && !index.is_empty() => {
                Ok(NodeId::new(step, index))
            }
            _ => Err(format!("'{}' is not a node reference of the form step/index", s)),
        }
    }
}

// Serialized as "step/index" so node ids can key JSON maps
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to the task bound to a node, written `tool/task`
///
/// The reference is opaque to the flowgraph; a `TaskRegistry` resolves it
/// to an implementation at run time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub tool: String,
    pub task: String,
}

impl TaskRef {
    pub fn new(tool: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            task: task.into(),
        }
    }

    /// Both halves of the reference are present
    pub fn is_complete(&self) -> bool {
        !self.tool.is_empty() && !self.task.is_empty()
    }

    pub fn identifier(&self) -> String {
        format!("{}/{}", self.tool, self.task)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tool, self.task)
    }
}

impl From<&str> for TaskRef {
    fn from(identifier: &str) -> Self {
        match identifier.split_once('/') {
            Some((tool, task)) => TaskRef::new(tool, task),
            None => TaskRef::new(identifier, ""),
        }
    }
}

impl From<String> for TaskRef {
    fn from(identifier: String) -> Self {
        TaskRef::from(identifier.as_str())
    }
}

/// Attributes of one node in a flowgraph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Task executed by this node
    pub task: TaskRef,
    /// Predecessor nodes, in insertion order
    pub inputs: Vec<NodeId>,
    /// Free-form task arguments (selection criteria for mux/verify)
    pub args: Vec<String>,
    /// Per-metric weights used when ranking this node against siblings
    pub weights: BTreeMap<String, f64>,
    /// Per-metric goals this node must meet to stay a selection candidate
    pub goals: BTreeMap<String, f64>,
    /// Output names this node produces
    pub outputs: BTreeSet<String>,
    /// Input names this node requires from its predecessors
    pub required_inputs: BTreeSet<String>,
}

impl FlowNode {
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_parse() {
        let node = NodeId::new("syn", 3);
        assert_eq!(node.to_string(), "syn/3");
        assert_eq!("syn/3".parse::<NodeId>().unwrap(), node);

        let nested: NodeId = "sub.place/0".parse().unwrap();
        assert_eq!(nested.step, "sub.place");
        assert_eq!(nested.index, "0");

        assert!("syn".parse::<NodeId>().is_err());
        assert!("/0".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_ordering() {
        let mut nodes = vec![
            NodeId::new("b", 0),
            NodeId::new("a", 1),
            NodeId::new("a", 0),
        ];
        nodes.sort();
        assert_eq!(
            nodes,
            vec![NodeId::new("a", 0), NodeId::new("a", 1), NodeId::new("b", 0)]
        );
    }

    #[test]
    fn test_node_id_as_json_key() {
        let mut map = BTreeMap::new();
        map.insert(NodeId::new("place", 0), 1);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"place/0":1}"#);

        let back: BTreeMap<NodeId, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_task_ref_from_identifier() {
        let task = TaskRef::from("builtin/minimum");
        assert_eq!(task.tool, "builtin");
        assert_eq!(task.task, "minimum");
        assert!(task.is_complete());
        assert_eq!(task.identifier(), "builtin/minimum");

        let partial = TaskRef::from("openroad");
        assert!(!partial.is_complete());
    }
}
