// Flowgraph (DAG) Builder
// Named directed acyclic graph of (step, index) nodes bound to tasks

use super::node::{FlowNode, NodeId, TaskRef};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// Error type for flowgraph definition operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowgraphError {
    pub message: String,
    pub kind: FlowgraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowgraphErrorKind {
    /// Step or index uses a reserved name
    ReservedName,
    /// Step or index is not a legal identifier
    InvalidName,
    /// Reference to a node or step that is not defined
    UndefinedNode,
    /// Node or step already exists
    AlreadyDefined,
}

impl fmt::Display for FlowgraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flowgraph error: {}", self.message)
    }
}

impl std::error::Error for FlowgraphError {}

impl FlowgraphError {
    pub fn reserved(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlowgraphErrorKind::ReservedName,
        }
    }

    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlowgraphErrorKind::InvalidName,
        }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlowgraphErrorKind::UndefinedNode,
        }
    }

    pub fn already_defined(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlowgraphErrorKind::AlreadyDefined,
        }
    }
}

pub type FlowgraphResult<T> = Result<T, FlowgraphError>;

/// Names that cannot be used as a step or an index
const RESERVED_NAMES: [&str; 2] = ["global", "default"];
const RESERVED_STEP_PREFIX: &str = "sc_";

/// Memoized structural queries, reset on every mutation
#[derive(Debug, Clone, Default)]
struct FlowgraphCache {
    nodes: OnceLock<Vec<NodeId>>,
    entry: OnceLock<Vec<NodeId>>,
    exit: OnceLock<Vec<NodeId>>,
    forward: OnceLock<Vec<Vec<NodeId>>>,
    reverse: OnceLock<Vec<Vec<NodeId>>>,
    outputs: OnceLock<HashMap<NodeId, Vec<NodeId>>>,
}

/// Static pipeline definition
///
/// Nodes are keyed by step then index. Edges are stored on the head node as
/// its ordered input list.
#[derive(Debug, Clone)]
pub struct Flowgraph {
    name: String,
    steps: BTreeMap<String, BTreeMap<String, FlowNode>>,
    cache: FlowgraphCache,
}

impl Flowgraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: BTreeMap::new(),
            cache: FlowgraphCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn clear_cache(&mut self) {
        self.cache = FlowgraphCache::default();
    }

    /// Create or rebind a node
    ///
    /// Rebinding an existing node only replaces its task; inputs and other
    /// attributes are kept.
    pub fn node(
        &mut self,
        step: &str,
        task: impl Into<TaskRef>,
        index: impl ToString,
    ) -> FlowgraphResult<()> {
        let index = index.to_string();
        check_name(step, "step")?;
        check_name(&index, "index")?;

        if step.starts_with(RESERVED_STEP_PREFIX) {
            return Err(FlowgraphError::reserved(format!(
                "{} is a reserved name",
                step
            )));
        }

        let task = task.into();
        self.steps
            .entry(step.to_string())
            .or_default()
            .entry(index)
            .and_modify(|node| node.task = task.clone())
            .or_insert_with(|| FlowNode::new(task));

        self.clear_cache();
        Ok(())
    }

    /// Connect the output of `tail` to the input of `head`
    ///
    /// Adding an edge that already exists is a no-op.
    pub fn edge(
        &mut self,
        tail: &str,
        head: &str,
        tail_index: impl ToString,
        head_index: impl ToString,
    ) -> FlowgraphResult<()> {
        let tail_node = NodeId::new(tail, tail_index);
        let head_node = NodeId::new(head, head_index);

        for node in [&head_node, &tail_node] {
            if !self.contains(node) {
                return Err(FlowgraphError::undefined(format!(
                    "{} is not a defined node in {}.",
                    node, self.name
                )));
            }
        }

        let head = self.node_entry(&head_node)?;
        if head.inputs.contains(&tail_node) {
            return Ok(());
        }
        head.inputs.push(tail_node);

        self.clear_cache();
        Ok(())
    }

    /// Remove one index of a step, or every index when `index` is `None`
    ///
    /// Edges into the removed nodes are dropped from their successors. The
    /// removed nodes' predecessors are not reconnected.
    pub fn remove_node(&mut self, step: &str, index: Option<&str>) -> FlowgraphResult<()> {
        let Some(indices) = self.steps.get_mut(step) else {
            return Err(FlowgraphError::undefined(format!(
                "{} is not a valid step in {}",
                step, self.name
            )));
        };

        let targets: Vec<String> = match index {
            Some(index) => {
                if !indices.contains_key(index) {
                    return Err(FlowgraphError::undefined(format!(
                        "{} is not a valid index for {} in {}",
                        index, step, self.name
                    )));
                }
                vec![index.to_string()]
            }
            None => indices.keys().cloned().collect(),
        };

        let mut removed = HashSet::new();
        for index in targets {
            indices.remove(&index);
            removed.insert(NodeId::new(step, index));
        }
        if indices.is_empty() {
            self.steps.remove(step);
        }

        for node in self.steps.values_mut().flat_map(|indices| indices.values_mut()) {
            node.inputs.retain(|input| !removed.contains(input));
        }

        self.clear_cache();
        Ok(())
    }

    /// Splice a new node immediately upstream of `before`
    ///
    /// The new node takes over all of `before`'s inputs and becomes its only
    /// input.
    pub fn insert_node(
        &mut self,
        step: &str,
        task: impl Into<TaskRef>,
        index: impl ToString,
        before_step: &str,
        before_index: impl ToString,
    ) -> FlowgraphResult<()> {
        let new_node = NodeId::new(step, index);
        let target = NodeId::new(before_step, before_index);

        if !self.contains(&target) {
            return Err(FlowgraphError::undefined(format!(
                "{} is not a valid node in {}",
                target, self.name
            )));
        }
        if self.contains(&new_node) {
            return Err(FlowgraphError::already_defined(format!(
                "{} is already defined in {}",
                new_node, self.name
            )));
        }

        self.node(&new_node.step, task, &new_node.index)?;

        let inputs = std::mem::take(&mut self.node_entry(&target)?.inputs);
        self.node_entry(&new_node)?.inputs = inputs;
        self.node_entry(&target)?.inputs = vec![new_node];

        self.clear_cache();
        Ok(())
    }

    /// Instantiate another flowgraph inside this one
    ///
    /// With a prefix, every step `s` of the subflow becomes `prefix.s` and its
    /// inputs are renamed to match. Any step collision fails without
    /// modifying this flowgraph.
    pub fn graph(&mut self, subflow: &Flowgraph, prefix: Option<&str>) -> FlowgraphResult<()> {
        if let Some(prefix) = prefix {
            check_name(prefix, "prefix")?;
        }

        let rename = |step: &str| match prefix {
            Some(prefix) => format!("{}.{}", prefix, step),
            None => step.to_string(),
        };

        for step in subflow.steps.keys() {
            let new_step = rename(step);
            if self.steps.contains_key(&new_step) {
                return Err(FlowgraphError::already_defined(format!(
                    "{} is already defined",
                    new_step
                )));
            }
        }

        for (step, indices) in &subflow.steps {
            let new_indices = indices
                .iter()
                .map(|(index, node)| {
                    let mut node = node.clone();
                    node.inputs = node
                        .inputs
                        .iter()
                        .map(|input| NodeId::new(rename(&input.step), &input.index))
                        .collect();
                    (index.clone(), node)
                })
                .collect();
            self.steps.insert(rename(step), new_indices);
        }

        self.clear_cache();
        Ok(())
    }

    /// Replace the input list of a node verbatim
    ///
    /// Unlike `edge`, this performs no deduplication or existence checks on
    /// the inputs; `validate` reports any problems it introduces.
    #[cfg(test)]
    pub(crate) fn set_inputs(&mut self, step: &str, index: impl ToString, inputs: Vec<NodeId>) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?.inputs = inputs;
        self.clear_cache();
        Ok(())
    }

    pub fn set_weight(
        &mut self,
        step: &str,
        index: impl ToString,
        metric: &str,
        weight: f64,
    ) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?
            .weights
            .insert(metric.to_string(), weight);
        Ok(())
    }

    pub fn set_goal(
        &mut self,
        step: &str,
        index: impl ToString,
        metric: &str,
        goal: f64,
    ) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?.goals.insert(metric.to_string(), goal);
        Ok(())
    }

    pub fn add_arg(&mut self, step: &str, index: impl ToString, arg: &str) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?.args.push(arg.to_string());
        Ok(())
    }

    pub fn add_output(
        &mut self,
        step: &str,
        index: impl ToString,
        output: &str,
    ) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?.outputs.insert(output.to_string());
        Ok(())
    }

    pub fn add_required_input(
        &mut self,
        step: &str,
        index: impl ToString,
        input: &str,
    ) -> FlowgraphResult<()> {
        let node = NodeId::new(step, index);
        self.node_entry(&node)?
            .required_inputs
            .insert(input.to_string());
        Ok(())
    }

    fn node_entry(&mut self, node: &NodeId) -> FlowgraphResult<&mut FlowNode> {
        let name = &self.name;
        self.steps
            .get_mut(&node.step)
            .and_then(|indices| indices.get_mut(&node.index))
            .ok_or_else(|| {
                FlowgraphError::undefined(format!("{} is not a valid node in {}", node, name))
            })
    }

    /// Look up a node's attributes
    pub fn get(&self, node: &NodeId) -> Option<&FlowNode> {
        self.steps
            .get(&node.step)
            .and_then(|indices| indices.get(&node.index))
    }

    pub fn get_node(&self, step: &str, index: impl ToString) -> Option<&FlowNode> {
        self.get(&NodeId::new(step, index))
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.get(node).is_some()
    }

    /// Declared inputs of a node, empty when the node is undefined
    pub fn get_inputs(&self, node: &NodeId) -> &[NodeId] {
        self.get(node).map(|n| n.inputs.as_slice()).unwrap_or(&[])
    }

    /// All step names, sorted
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Indices defined for a step, sorted; empty when the step is undefined
    pub fn indices(&self, step: &str) -> Vec<String> {
        self.steps
            .get(step)
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All nodes, sorted
    pub fn get_nodes(&self) -> &[NodeId] {
        self.cache.nodes.get_or_init(|| {
            self.steps
                .iter()
                .flat_map(|(step, indices)| indices.keys().map(move |index| NodeId::new(step, index)))
                .collect()
        })
    }

    /// Nodes without inputs
    pub fn get_entry_nodes(&self) -> &[NodeId] {
        self.cache.entry.get_or_init(|| {
            self.get_nodes()
                .iter()
                .filter(|node| self.get_inputs(node).is_empty())
                .cloned()
                .collect()
        })
    }

    /// Nodes that feed no other node
    pub fn get_exit_nodes(&self) -> &[NodeId] {
        self.cache.exit.get_or_init(|| {
            let feeding: HashSet<&NodeId> = self
                .get_nodes()
                .iter()
                .flat_map(|node| self.get_inputs(node))
                .collect();

            self.get_nodes()
                .iter()
                .filter(|node| !feeding.contains(node))
                .cloned()
                .collect()
        })
    }

    /// Nodes whose inputs include the given node
    pub fn get_node_outputs(&self, step: &str, index: impl ToString) -> FlowgraphResult<&[NodeId]> {
        let node = NodeId::new(step, index);
        if !self.contains(&node) {
            return Err(FlowgraphError::undefined(format!(
                "{} is not a valid node",
                node
            )));
        }
        Ok(self.outputs_of(&node))
    }

    /// Successors of a node without the existence check
    pub(crate) fn outputs_of(&self, node: &NodeId) -> &[NodeId] {
        let outputs = self.cache.outputs.get_or_init(|| {
            let mut outputs: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
            for node in self.get_nodes() {
                outputs.entry(node.clone()).or_default();
                for input in self.get_inputs(node) {
                    outputs.entry(input.clone()).or_default().insert(node.clone());
                }
            }
            outputs
                .into_iter()
                .map(|(node, outputs)| (node, outputs.into_iter().collect()))
                .collect()
        });
        outputs.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes grouped into levels that can execute in parallel
    ///
    /// Level 0 holds the entry nodes and every later level holds nodes whose
    /// predecessors all sit in earlier levels. With `reverse` the walk starts
    /// at the exit nodes and follows edges backwards.
    pub fn get_execution_order(&self, reverse: bool) -> &[Vec<NodeId>] {
        let cell = if reverse {
            &self.cache.reverse
        } else {
            &self.cache.forward
        };
        cell.get_or_init(|| self.compute_execution_order(reverse))
    }

    fn compute_execution_order(&self, reverse: bool) -> Vec<Vec<NodeId>> {
        let defined: HashSet<&NodeId> = self.get_nodes().iter().collect();

        // node -> nodes it unlocks, and node -> nodes it waits on
        let mut unlocks: HashMap<&NodeId, BTreeSet<&NodeId>> = HashMap::new();
        let mut waits_on: HashMap<&NodeId, HashSet<&NodeId>> = HashMap::new();
        for node in self.get_nodes() {
            for input in self.get_inputs(node) {
                let Some(input) = defined.get(input).copied() else {
                    continue;
                };
                let (from, to) = if reverse { (node, input) } else { (input, node) };
                unlocks.entry(from).or_default().insert(to);
                waits_on.entry(to).or_default().insert(from);
            }
        }

        let first: BTreeSet<&NodeId> = self
            .get_nodes()
            .iter()
            .filter(|node| !waits_on.contains_key(node))
            .collect();

        let mut levels = vec![first];
        let mut visited: HashSet<&NodeId> = HashSet::new();
        loop {
            let mut next_level = BTreeSet::new();
            let mut next_visited = Vec::new();

            for &node in levels.last().into_iter().flatten() {
                let ready = waits_on
                    .get(node)
                    .map_or(true, |required| required.iter().all(|n| visited.contains(n)));

                if ready {
                    next_visited.push(node);
                    if let Some(successors) = unlocks.remove(node) {
                        next_level.extend(successors);
                    }
                } else {
                    next_level.insert(node);
                }
            }

            // A level where nothing became ready only happens with cycles
            if next_level.is_empty() || next_visited.is_empty() {
                break;
            }
            visited.extend(next_visited);
            levels.push(next_level);
        }

        // Keep each node only at its deepest placement
        let mut placed: HashSet<&NodeId> = HashSet::new();
        let mut order: Vec<Vec<NodeId>> = Vec::with_capacity(levels.len());
        for level in levels.iter().rev() {
            let nodes: Vec<NodeId> = level
                .iter()
                .filter(|node| placed.insert(**node))
                .map(|node| (*node).clone())
                .collect();
            if !nodes.is_empty() {
                order.push(nodes);
            }
        }
        order.reverse();
        order
    }

    /// Every distinct structural problem in the flowgraph
    pub fn diagnostics(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let nodes: HashSet<&NodeId> = self.get_nodes().iter().collect();

        let mut referenced = BTreeSet::new();
        for node in self.get_nodes() {
            let inputs = self.get_inputs(node);
            let mut seen = BTreeSet::new();
            let mut reported = BTreeSet::new();
            for input in inputs {
                if !nodes.contains(input) {
                    referenced.insert(input);
                }
                if !seen.insert(input) && reported.insert(input) {
                    problems.push(format!(
                        "Duplicate edge from {} to {} in the {} flowgraph",
                        input, node, self.name
                    ));
                }
            }
        }

        for node in referenced {
            problems.push(format!("{} is missing in the {} flowgraph", node, self.name));
        }

        for node in self.get_nodes() {
            let Some(task) = self.get(node).map(|n| &n.task) else {
                continue;
            };
            if task.tool.is_empty() {
                problems.push(format!(
                    "{} is missing a tool definition in the {} flowgraph",
                    node, self.name
                ));
            }
            if task.task.is_empty() {
                problems.push(format!(
                    "{} is missing a task definition in the {} flowgraph",
                    node, self.name
                ));
            }
        }

        for cycle in self.find_cycles() {
            let path: Vec<String> = cycle.iter().map(|n| n.to_string()).collect();
            problems.push(format!("{} forms a loop in {}", path.join(" -> "), self.name));
        }

        problems
    }

    /// Check the flowgraph, logging every problem found
    pub fn validate(&self) -> bool {
        let problems = self.diagnostics();
        for problem in &problems {
            tracing::error!(flow = %self.name, "{}", problem);
        }
        problems.is_empty()
    }

    /// One cycle per starting point that reaches one
    ///
    /// Starting points are the entry nodes, followed by any node no entry node
    /// can reach (a cycle with no way in).
    fn find_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();
        let mut acyclic = HashSet::new();

        for entry in self.get_entry_nodes() {
            if let Some(cycle) = self.find_loop(entry, &mut Vec::new(), &mut acyclic) {
                cycles.push(cycle);
            }
        }

        let mut reachable: HashSet<&NodeId> = HashSet::new();
        self.mark_reachable(self.get_entry_nodes(), &mut reachable);

        for node in self.get_nodes() {
            if reachable.contains(node) {
                continue;
            }
            if let Some(cycle) = self.find_loop(node, &mut Vec::new(), &mut acyclic) {
                cycles.push(cycle);
            }
            self.mark_reachable(std::slice::from_ref(node), &mut reachable);
        }

        cycles
    }

    fn mark_reachable<'a>(&'a self, start: &'a [NodeId], reachable: &mut HashSet<&'a NodeId>) {
        let mut stack: Vec<&NodeId> = start.iter().collect();
        while let Some(node) = stack.pop() {
            if reachable.insert(node) {
                stack.extend(self.outputs_of(node));
            }
        }
    }

    /// Depth-first search for a path that revisits a node
    fn find_loop<'a>(
        &'a self,
        node: &'a NodeId,
        path: &mut Vec<&'a NodeId>,
        acyclic: &mut HashSet<&'a NodeId>,
    ) -> Option<Vec<NodeId>> {
        if path.contains(&node) {
            let mut cycle: Vec<NodeId> = path.iter().map(|n| (*n).clone()).collect();
            cycle.push(node.clone());
            return Some(cycle);
        }
        if acyclic.contains(node) {
            return None;
        }

        path.push(node);
        for output in self.outputs_of(node) {
            if let Some(cycle) = self.find_loop(output, path, acyclic) {
                return Some(cycle);
            }
        }
        path.pop();

        acyclic.insert(node);
        None
    }
}

/// Reject reserved and malformed step/index names
fn check_name(name: &str, what: &str) -> FlowgraphResult<()> {
    if name.is_empty() {
        return Err(FlowgraphError::invalid_name(format!(
            "{} name cannot be empty",
            what
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(FlowgraphError::reserved(format!(
            "{} is a reserved name",
            name
        )));
    }
    if name.contains('/') {
        return Err(FlowgraphError::invalid_name(format!(
            "{} is not a valid {}, it cannot contain '/'",
            name, what
        )));
    }
    Ok(())
}
