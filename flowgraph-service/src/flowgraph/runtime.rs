// Runtime Flowgraph
// Per-run filtered view of a flowgraph honoring from/to/prune selections

use super::graph::{Flowgraph, FlowgraphError, FlowgraphResult};
use super::node::NodeId;
use crate::record::RecordStore;
use crate::status::NodeStatus;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

/// Restrict a run to a single step, or to one index of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelector {
    pub step: String,
    #[serde(default)]
    pub index: Option<String>,
}

/// Selection parameters for one run
///
/// Empty `from`/`to` lists default to the flowgraph's entry and exit nodes.
/// A `node` selector replaces all three other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub prune: Vec<NodeId>,
    pub node: Option<NodeSelector>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_from<S: Into<String>>(mut self, steps: impl IntoIterator<Item = S>) -> Self {
        self.from = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_to<S: Into<String>>(mut self, steps: impl IntoIterator<Item = S>) -> Self {
        self.to = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prune(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.prune = nodes.into_iter().collect();
        self
    }

    pub fn with_node(mut self, step: impl Into<String>, index: Option<String>) -> Self {
        self.node = Some(NodeSelector {
            step: step.into(),
            index,
        });
        self
    }
}

/// Node set and ordering derived from a base flowgraph and run options
#[derive(Debug, Clone, Default)]
struct RuntimeGraph {
    nodes: Vec<NodeId>,
    entry: Vec<NodeId>,
    exit: Vec<NodeId>,
    order: Vec<Vec<NodeId>>,
    reverse_order: Vec<Vec<NodeId>>,
}

/// Boundaries of the view after applying the run options
#[derive(Debug, Clone, Default)]
struct Bounds {
    from: BTreeSet<NodeId>,
    to: BTreeSet<NodeId>,
    prune: HashSet<NodeId>,
}

/// Filtered view of a flowgraph for one run
///
/// The view keeps every node that lies on a path from a `from` node to a
/// `to` node without passing through a pruned node.
#[derive(Debug, Clone)]
pub struct RuntimeFlowgraph<'a> {
    base: &'a Flowgraph,
    options: RunOptions,
    cache: OnceLock<RuntimeGraph>,
}

impl<'a> RuntimeFlowgraph<'a> {
    pub fn new(base: &'a Flowgraph, options: RunOptions) -> Self {
        Self {
            base,
            options,
            cache: OnceLock::new(),
        }
    }

    pub fn base(&self) -> &'a Flowgraph {
        self.base
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn set_from<S: Into<String>>(&mut self, steps: impl IntoIterator<Item = S>) {
        self.options.from = steps.into_iter().map(Into::into).collect();
        self.cache = OnceLock::new();
    }

    pub fn set_to<S: Into<String>>(&mut self, steps: impl IntoIterator<Item = S>) {
        self.options.to = steps.into_iter().map(Into::into).collect();
        self.cache = OnceLock::new();
    }

    pub fn set_prune(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.options.prune = nodes.into_iter().collect();
        self.cache = OnceLock::new();
    }

    pub fn set_node(&mut self, selector: Option<NodeSelector>) {
        self.options.node = selector;
        self.cache = OnceLock::new();
    }

    fn graph(&self) -> &RuntimeGraph {
        self.cache.get_or_init(|| {
            let bounds = Bounds::resolve(self.base, &self.options);
            compute_graph(self.base, &bounds)
        })
    }

    /// Nodes in the view, sorted
    pub fn get_nodes(&self) -> &[NodeId] {
        &self.graph().nodes
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.get_nodes().binary_search(node).is_ok()
    }

    /// Retained from-nodes with no input inside the view
    pub fn get_entry_nodes(&self) -> &[NodeId] {
        &self.graph().entry
    }

    /// Retained to-nodes with no output inside the view
    pub fn get_exit_nodes(&self) -> &[NodeId] {
        &self.graph().exit
    }

    /// Base execution order restricted to this view
    pub fn get_execution_order(&self, reverse: bool) -> &[Vec<NodeId>] {
        if reverse {
            &self.graph().reverse_order
        } else {
            &self.graph().order
        }
    }

    /// Nodes reachable forward from a node without leaving the view
    pub fn get_nodes_starting_at(&self, step: &str, index: impl ToString) -> FlowgraphResult<Vec<NodeId>> {
        let start = NodeId::new(step, index);
        self.check_member(&start)?;

        let bounds = Bounds::resolve(self.base, &self.options);
        let mut reached = BTreeSet::new();
        let mut stack = vec![&start];
        while let Some(node) = stack.pop() {
            if bounds.prune.contains(node) || !self.contains(node) || !reached.insert(node.clone()) {
                continue;
            }
            if bounds.to.contains(node) {
                continue;
            }
            stack.extend(self.base.outputs_of(node));
        }
        Ok(reached.into_iter().collect())
    }

    /// Predecessors feeding a node within this view
    ///
    /// With a record, a SKIPPED predecessor is replaced by its own inputs so
    /// the node sees its nearest executed ancestors.
    pub fn get_node_inputs(
        &self,
        step: &str,
        index: impl ToString,
        record: Option<&dyn RecordStore>,
    ) -> FlowgraphResult<Vec<NodeId>> {
        let node = NodeId::new(step, index);
        self.check_member(&node)?;

        let mut inputs = BTreeSet::new();
        self.collect_inputs(&node, record, &mut inputs);
        Ok(inputs.into_iter().collect())
    }

    fn collect_inputs(
        &self,
        node: &NodeId,
        record: Option<&dyn RecordStore>,
        inputs: &mut BTreeSet<NodeId>,
    ) {
        for input in self.base.get_inputs(node) {
            if !self.contains(input) {
                continue;
            }
            match record {
                Some(record) if record.get_status(input) == NodeStatus::Skipped => {
                    self.collect_inputs(input, Some(record), inputs);
                }
                _ => {
                    inputs.insert(input.clone());
                }
            }
        }
    }

    /// Nodes of this view whose recorded status is a success state
    pub fn get_completed_nodes(&self, record: Option<&dyn RecordStore>) -> Vec<NodeId> {
        let Some(record) = record else {
            return Vec::new();
        };
        self.get_nodes()
            .iter()
            .filter(|node| record.get_status(node).is_success())
            .cloned()
            .collect()
    }

    fn check_member(&self, node: &NodeId) -> FlowgraphResult<()> {
        if self.contains(node) {
            Ok(())
        } else {
            Err(FlowgraphError::undefined(format!(
                "{} is not a valid node",
                node
            )))
        }
    }

    /// Check run options against a flowgraph, logging every problem found
    pub fn validate(flow: &Flowgraph, options: &RunOptions) -> bool {
        let problems = Self::diagnostics(flow, options);
        for problem in &problems {
            tracing::error!(flow = %flow.name(), "{}", problem);
        }
        problems.is_empty()
    }

    /// Every problem with the run options, before any node executes
    ///
    /// Later checks only run when the earlier ones found nothing, since they
    /// need a well-formed selection to build the view.
    pub fn diagnostics(flow: &Flowgraph, options: &RunOptions) -> Vec<String> {
        let mut problems = Vec::new();
        let name = flow.name();
        let all_steps: BTreeSet<&str> = flow.steps().collect();

        if let Some(selector) = &options.node {
            if !all_steps.contains(selector.step.as_str()) {
                problems.push(format!(
                    "{} is not defined in the {} flowgraph",
                    selector.step, name
                ));
            } else if let Some(index) = &selector.index {
                let node = NodeId::new(&selector.step, index);
                if !flow.contains(&node) {
                    problems.push(format!("{} is not defined in the {} flowgraph", node, name));
                }
            }
            return problems;
        }

        let from: BTreeSet<&str> = options.from.iter().map(String::as_str).collect();
        for step in from.iter().filter(|step| !all_steps.contains(*step)) {
            problems.push(format!("From {} is not defined in the {} flowgraph", step, name));
        }

        let to: BTreeSet<&str> = options.to.iter().map(String::as_str).collect();
        for step in to.iter().filter(|step| !all_steps.contains(*step)) {
            problems.push(format!("To {} is not defined in the {} flowgraph", step, name));
        }

        let prune: BTreeSet<&NodeId> = options.prune.iter().collect();
        for node in prune.iter().filter(|node| !flow.contains(node)) {
            problems.push(format!("{} is not defined in the {} flowgraph", node, name));
        }

        if !problems.is_empty() {
            return problems;
        }

        let runtime = RuntimeFlowgraph::new(flow, options.clone());
        let unpruned = RuntimeFlowgraph::new(
            flow,
            RunOptions {
                prune: Vec::new(),
                ..options.clone()
            },
        );

        let step_set = |nodes: &[NodeId]| -> BTreeSet<String> {
            nodes.iter().map(|node| node.step.clone()).collect()
        };

        let runtime_exits = step_set(runtime.get_exit_nodes());
        for step in step_set(unpruned.get_exit_nodes()).difference(&runtime_exits) {
            problems.push(format!(
                "pruning removed all exit nodes for {} in the {} flowgraph",
                step, name
            ));
        }

        let runtime_entry = step_set(runtime.get_entry_nodes());
        for step in step_set(unpruned.get_entry_nodes()).difference(&runtime_entry) {
            problems.push(format!(
                "pruning removed all entry nodes for {} in the {} flowgraph",
                step, name
            ));
        }

        if !problems.is_empty() {
            return problems;
        }

        // A selection is only disconnected when no entry reaches any exit
        let bounds = Bounds::resolve(flow, options);
        let exits: Vec<String> = runtime
            .get_exit_nodes()
            .iter()
            .map(|node| node.to_string())
            .collect();
        let mut missing = Vec::new();
        let mut found_any = false;
        for entry in runtime.get_entry_nodes() {
            let found = runtime
                .get_exit_nodes()
                .iter()
                .any(|exit| walk_back(flow, &bounds, std::slice::from_ref(exit)).contains(entry));
            if found {
                found_any = true;
            } else {
                missing.push(format!(
                    "no path from {} to {} in the {} flowgraph",
                    entry,
                    exits.join(","),
                    name
                ));
            }
        }
        if !found_any {
            problems.extend(missing);
        }

        problems
    }
}

impl Bounds {
    fn resolve(base: &Flowgraph, options: &RunOptions) -> Self {
        let expand = |steps: &[String]| -> BTreeSet<NodeId> {
            steps
                .iter()
                .flat_map(|step| {
                    base.indices(step)
                        .into_iter()
                        .map(move |index| NodeId::new(step.as_str(), index))
                })
                .collect()
        };

        if let Some(selector) = &options.node {
            let from: BTreeSet<NodeId> = match &selector.index {
                Some(index) => [NodeId::new(&selector.step, index)]
                    .into_iter()
                    .filter(|node| base.contains(node))
                    .collect(),
                None => expand(std::slice::from_ref(&selector.step)),
            };
            return Self {
                to: from.clone(),
                from,
                prune: HashSet::new(),
            };
        }

        let prune: HashSet<NodeId> = options.prune.iter().cloned().collect();

        let mut from = if options.from.is_empty() {
            base.get_entry_nodes().iter().cloned().collect()
        } else {
            expand(&options.from)
        };
        let mut to = if options.to.is_empty() {
            base.get_exit_nodes().iter().cloned().collect()
        } else {
            expand(&options.to)
        };

        from.retain(|node| !prune.contains(node));
        to.retain(|node| !prune.contains(node));

        Self { from, to, prune }
    }
}

/// Nodes reached walking inputs backwards from `start`
///
/// Pruned nodes are never entered and from-nodes are not expanded further.
fn walk_back<'f>(base: &'f Flowgraph, bounds: &Bounds, start: &'f [NodeId]) -> HashSet<&'f NodeId> {
    let mut reached = HashSet::new();
    let mut stack: Vec<&NodeId> = start.iter().collect();
    while let Some(node) = stack.pop() {
        if bounds.prune.contains(node) || !base.contains(node) || !reached.insert(node) {
            continue;
        }
        if bounds.from.contains(node) {
            continue;
        }
        stack.extend(base.get_inputs(node));
    }
    reached
}

/// Nodes reached walking outputs forwards from the from-nodes
fn walk_forward<'f>(base: &'f Flowgraph, bounds: &'f Bounds) -> HashSet<&'f NodeId> {
    let mut reached = HashSet::new();
    let mut stack: Vec<&NodeId> = bounds.from.iter().collect();
    while let Some(node) = stack.pop() {
        if bounds.prune.contains(node) || !reached.insert(node) {
            continue;
        }
        stack.extend(base.outputs_of(node));
    }
    reached
}

fn compute_graph(base: &Flowgraph, bounds: &Bounds) -> RuntimeGraph {
    let to: Vec<NodeId> = bounds.to.iter().cloned().collect();
    let backward = walk_back(base, bounds, &to);
    let forward = walk_forward(base, bounds);

    // Only nodes that lead to a to-node and are fed from a from-node
    let nodes: Vec<NodeId> = base
        .get_nodes()
        .iter()
        .filter(|node| backward.contains(node) && forward.contains(node))
        .cloned()
        .collect();
    let members: HashSet<&NodeId> = nodes.iter().collect();

    let entry = bounds
        .from
        .iter()
        .filter(|node| {
            base.get_inputs(node)
                .iter()
                .all(|input| !members.contains(input))
        })
        .cloned()
        .collect();

    let exit = bounds
        .to
        .iter()
        .filter(|node| {
            base.outputs_of(node)
                .iter()
                .all(|output| !members.contains(output))
        })
        .cloned()
        .collect();

    let restrict = |order: &[Vec<NodeId>]| -> Vec<Vec<NodeId>> {
        order
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|node| members.contains(node))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect()
    };

    let order = restrict(base.get_execution_order(false));
    let reverse_order = restrict(base.get_execution_order(true));

    RuntimeGraph {
        nodes,
        order,
        reverse_order,
        entry,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::large_flow;
    use crate::record::Record;

    fn ids(nodes: &[(&str, &str)]) -> Vec<NodeId> {
        nodes.iter().map(|(s, i)| NodeId::new(*s, *i)).collect()
    }

    fn pruned_large() -> RunOptions {
        RunOptions::new().with_prune(ids(&[("stepone", "0"), ("steptwo", "1"), ("stepthree", "2")]))
    }

    fn chain(name: &str, steps: &[&str]) -> Flowgraph {
        let mut flow = Flowgraph::new(name);
        append_chain(&mut flow, steps);
        flow
    }

    fn append_chain(flow: &mut Flowgraph, steps: &[&str]) {
        let mut prev: Option<&str> = None;
        for step in steps {
            flow.node(step, "builtin/nop", 0).unwrap();
            if let Some(prev) = prev {
                flow.edge(prev, step, 0, 0).unwrap();
            }
            prev = Some(step);
        }
    }

    /// A -- B -- C -- D, each with a side branch Xa
    fn forked() -> Flowgraph {
        let mut flow = chain("test", &["A", "B", "C", "D"]);
        for step in ["A", "B", "C", "D"] {
            let side = format!("{}a", step);
            flow.node(&side, "builtin/nop", 0).unwrap();
            flow.edge(step, &side, 0, 0).unwrap();
        }
        flow
    }

    fn disjoint() -> Flowgraph {
        let mut flow = chain("test", &["A", "B", "C", "D"]);
        append_chain(&mut flow, &["E", "F", "G", "H"]);
        flow
    }

    fn view_nodes(flow: &Flowgraph, options: RunOptions) -> Vec<NodeId> {
        RuntimeFlowgraph::new(flow, options).get_nodes().to_vec()
    }

    #[test]
    fn test_runtime_default_is_whole_flow() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, RunOptions::default());

        assert_eq!(runtime.get_nodes(), flow.get_nodes());
        assert_eq!(runtime.get_execution_order(false), flow.get_execution_order(false));
        assert_eq!(runtime.get_entry_nodes(), flow.get_entry_nodes());
        assert_eq!(runtime.get_exit_nodes(), flow.get_exit_nodes());
    }

    #[test]
    fn test_runtime_nodes_prune() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());

        assert_eq!(
            runtime.get_nodes(),
            ids(&[
                ("joinone", "0"),
                ("jointhree", "0"),
                ("jointwo", "0"),
                ("stepone", "1"),
                ("stepone", "2"),
                ("stepthree", "0"),
                ("stepthree", "1"),
                ("steptwo", "0"),
                ("steptwo", "2"),
            ])
            .as_slice()
        );
        assert_eq!(
            runtime.get_execution_order(false),
            &[
                ids(&[("stepone", "1"), ("stepone", "2")]),
                ids(&[("joinone", "0")]),
                ids(&[("steptwo", "0"), ("steptwo", "2")]),
                ids(&[("jointwo", "0")]),
                ids(&[("stepthree", "0"), ("stepthree", "1")]),
                ids(&[("jointhree", "0")]),
            ]
        );
        assert_eq!(
            runtime.get_entry_nodes(),
            ids(&[("stepone", "1"), ("stepone", "2")]).as_slice()
        );
        assert_eq!(runtime.get_exit_nodes(), ids(&[("jointhree", "0")]).as_slice());
    }

    #[test]
    fn test_runtime_reverse_order() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());
        let reverse = runtime.get_execution_order(true);

        assert_eq!(reverse.first().unwrap(), &ids(&[("jointhree", "0")]));
        assert_eq!(
            reverse.last().unwrap(),
            &ids(&[("stepone", "1"), ("stepone", "2")])
        );
    }

    #[test]
    fn test_runtime_single_node() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(
            &flow,
            RunOptions::new()
                .with_prune(ids(&[("stepone", "0")]))
                .with_node("stepone", Some("0".to_string())),
        );

        // The selector replaces prune
        assert_eq!(runtime.get_nodes(), ids(&[("stepone", "0")]).as_slice());
        assert_eq!(runtime.get_entry_nodes(), ids(&[("stepone", "0")]).as_slice());
        assert_eq!(runtime.get_exit_nodes(), ids(&[("stepone", "0")]).as_slice());
    }

    #[test]
    fn test_runtime_single_step() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, RunOptions::new().with_node("stepone", None));

        let expected = ids(&[("stepone", "0"), ("stepone", "1"), ("stepone", "2")]);
        assert_eq!(runtime.get_nodes(), expected.as_slice());
        assert_eq!(runtime.get_entry_nodes(), expected.as_slice());
        assert_eq!(runtime.get_exit_nodes(), expected.as_slice());
    }

    #[test]
    fn test_runtime_every_step_as_bounds() {
        let flow = large_flow();
        let all: Vec<&str> = flow.steps().collect();
        let runtime = RuntimeFlowgraph::new(
            &flow,
            RunOptions::new().with_from(all.clone()).with_to(all),
        );

        assert_eq!(runtime.get_nodes(), flow.get_nodes());
        assert_eq!(
            runtime.get_entry_nodes(),
            ids(&[("stepone", "0"), ("stepone", "1"), ("stepone", "2")]).as_slice()
        );
        assert_eq!(runtime.get_exit_nodes(), ids(&[("jointhree", "0")]).as_slice());
    }

    #[test]
    fn test_runtime_unknown_bounds() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(
            &flow,
            RunOptions::new().with_from(["step1"]).with_to(["step1"]),
        );

        assert!(runtime.get_nodes().is_empty());
        assert!(runtime.get_entry_nodes().is_empty());
        assert!(runtime.get_exit_nodes().is_empty());
    }

    #[test]
    fn test_runtime_shortcut_edge() {
        // A -- B -- C -- D with A -- D
        let mut flow = chain("test", &["A", "B", "C", "D"]);
        flow.edge("A", "D", 0, 0).unwrap();

        assert_eq!(view_nodes(&flow, RunOptions::new()), flow.get_nodes());
    }

    #[test]
    fn test_runtime_to_mid_fork() {
        let flow = forked();
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_to(["Ba"])),
            ids(&[("A", "0"), ("B", "0"), ("Ba", "0")])
        );
    }

    #[test]
    fn test_runtime_to_multiple() {
        let flow = forked();
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_to(["Ba", "Da"])),
            ids(&[
                ("A", "0"),
                ("B", "0"),
                ("Ba", "0"),
                ("C", "0"),
                ("D", "0"),
                ("Da", "0"),
            ])
        );
    }

    #[test]
    fn test_runtime_from_mid_chain() {
        let flow = forked();
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_from(["B"])),
            ids(&[
                ("B", "0"),
                ("Ba", "0"),
                ("C", "0"),
                ("Ca", "0"),
                ("D", "0"),
                ("Da", "0"),
            ])
        );
    }

    #[test]
    fn test_runtime_from_to() {
        let flow = forked();
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_from(["B"]).with_to(["Ca"])),
            ids(&[("B", "0"), ("C", "0"), ("Ca", "0")])
        );
    }

    #[test]
    fn test_runtime_disjoint_graphs() {
        let flow = disjoint();
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_from(["B"])),
            ids(&[("B", "0"), ("C", "0"), ("D", "0")])
        );
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_to(["C"])),
            ids(&[("A", "0"), ("B", "0"), ("C", "0")])
        );
        assert_eq!(
            view_nodes(&flow, RunOptions::new().with_from(["B"]).with_to(["C"])),
            ids(&[("B", "0"), ("C", "0")])
        );
    }

    #[test]
    fn test_runtime_prune_middle_of_chain() {
        let flow = chain("test", &["A", "B", "C"]);
        let runtime = RuntimeFlowgraph::new(&flow, RunOptions::new().with_prune(ids(&[("B", "0")])));

        let nodes = runtime.get_nodes();
        assert!(!nodes.contains(&NodeId::new("B", 0)));
        assert!(!nodes.contains(&NodeId::new("C", 0)));
        assert!(nodes.is_empty());
        assert!(runtime.get_execution_order(false).is_empty());
    }

    #[test]
    fn test_runtime_validate_prune_middle_of_chain() {
        let flow = chain("test", &["A", "B", "C"]);
        let options = RunOptions::new().with_prune(ids(&[("B", "0")]));

        assert!(!RuntimeFlowgraph::validate(&flow, &options));
        assert_eq!(
            RuntimeFlowgraph::diagnostics(&flow, &options),
            vec!["no path from A/0 to C/0 in the test flowgraph"]
        );
    }

    #[test]
    fn test_runtime_setters_invalidate_cache() {
        let flow = forked();
        let mut runtime = RuntimeFlowgraph::new(&flow, RunOptions::new());
        assert_eq!(runtime.get_nodes().len(), 8);

        runtime.set_to(["Ba"]);
        assert_eq!(runtime.get_nodes().len(), 3);

        runtime.set_from(["B"]);
        assert_eq!(runtime.get_nodes(), ids(&[("B", "0"), ("Ba", "0")]).as_slice());

        runtime.set_prune(ids(&[("Ba", "0")]));
        assert!(runtime.get_nodes().is_empty());

        runtime.set_node(Some(NodeSelector {
            step: "C".to_string(),
            index: None,
        }));
        assert_eq!(runtime.get_nodes(), ids(&[("C", "0")]).as_slice());
    }

    #[test]
    fn test_get_nodes_starting_at() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());

        assert_eq!(
            runtime.get_nodes_starting_at("steptwo", 0).unwrap(),
            ids(&[
                ("jointhree", "0"),
                ("jointwo", "0"),
                ("stepthree", "0"),
                ("stepthree", "1"),
                ("steptwo", "0"),
            ])
        );

        let err = runtime.get_nodes_starting_at("stepone", 0).unwrap_err();
        assert!(err.message.contains("stepone/0 is not a valid node"));
    }

    #[test]
    fn test_get_node_inputs_no_record() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());

        assert!(runtime.get_node_inputs("stepone", 1, None).unwrap().is_empty());
        assert_eq!(
            runtime.get_node_inputs("joinone", 0, None).unwrap(),
            ids(&[("stepone", "1"), ("stepone", "2")])
        );
        assert_eq!(
            runtime.get_node_inputs("steptwo", 0, None).unwrap(),
            ids(&[("joinone", "0")])
        );
    }

    #[test]
    fn test_get_node_inputs_skip_through() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());

        let mut record = Record::new();
        record.set_status(&NodeId::new("stepone", 1), NodeStatus::Skipped);

        assert!(runtime
            .get_node_inputs("stepone", 1, Some(&record))
            .unwrap()
            .is_empty());
        assert_eq!(
            runtime.get_node_inputs("joinone", 0, Some(&record)).unwrap(),
            ids(&[("stepone", "2")])
        );

        // A skipped join exposes the steps feeding it
        record.set_status(&NodeId::new("joinone", 0), NodeStatus::Skipped);
        assert_eq!(
            runtime.get_node_inputs("steptwo", 0, Some(&record)).unwrap(),
            ids(&[("stepone", "2")])
        );
    }

    #[test]
    fn test_get_node_inputs_outside_view() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, pruned_large());

        let err = runtime.get_node_inputs("stepone", 0, None).unwrap_err();
        assert!(err.message.contains("stepone/0 is not a valid node"));
    }

    #[test]
    fn test_get_completed_nodes() {
        let flow = large_flow();
        let runtime = RuntimeFlowgraph::new(&flow, RunOptions::default());
        assert!(runtime.get_completed_nodes(None).is_empty());

        let mut record = Record::new();
        record.set_status(&NodeId::new("stepone", 1), NodeStatus::Skipped);
        record.set_status(&NodeId::new("stepone", 0), NodeStatus::Success);
        record.set_status(&NodeId::new("stepone", 2), NodeStatus::Error);

        assert_eq!(
            runtime.get_completed_nodes(Some(&record)),
            ids(&[("stepone", "0"), ("stepone", "1")])
        );
    }

    #[test]
    fn test_validate_nothing() {
        assert!(RuntimeFlowgraph::validate(&large_flow(), &RunOptions::default()));
    }

    #[test]
    fn test_validate_undefined_steps() {
        let options = RunOptions::new().with_from(["nothere"]).with_to(["notthere"]);
        let problems = RuntimeFlowgraph::diagnostics(&large_flow(), &options);

        assert_eq!(
            problems,
            vec![
                "From nothere is not defined in the testflow flowgraph",
                "To notthere is not defined in the testflow flowgraph",
            ]
        );
    }

    #[test]
    fn test_validate_undefined_prune() {
        let options = RunOptions::new().with_prune(ids(&[("notthis", "0")]));
        assert_eq!(
            RuntimeFlowgraph::diagnostics(&large_flow(), &options),
            vec!["notthis/0 is not defined in the testflow flowgraph"]
        );
    }

    #[test]
    fn test_validate_undefined_node_selector() {
        let options = RunOptions::new().with_node("stepone", Some("7".to_string()));
        assert_eq!(
            RuntimeFlowgraph::diagnostics(&large_flow(), &options),
            vec!["stepone/7 is not defined in the testflow flowgraph"]
        );
    }

    #[test]
    fn test_validate_prune_exits() {
        let options = RunOptions::new().with_prune(ids(&[("jointhree", "0")]));
        assert_eq!(
            RuntimeFlowgraph::diagnostics(&large_flow(), &options),
            vec!["pruning removed all exit nodes for jointhree in the testflow flowgraph"]
        );
    }

    #[test]
    fn test_validate_prune_entries() {
        let options = RunOptions::new().with_prune(ids(&[
            ("stepone", "0"),
            ("stepone", "1"),
            ("stepone", "2"),
        ]));
        assert_eq!(
            RuntimeFlowgraph::diagnostics(&large_flow(), &options),
            vec!["pruning removed all entry nodes for stepone in the testflow flowgraph"]
        );
    }

    #[test]
    fn test_validate_prune_one_branch_is_fine() {
        assert!(RuntimeFlowgraph::validate(&large_flow(), &pruned_large()));
    }

    #[test]
    fn test_validate_prune_every_branch_of_a_step() {
        let options = RunOptions::new().with_prune(ids(&[
            ("steptwo", "0"),
            ("steptwo", "1"),
            ("steptwo", "2"),
        ]));
        let problems = RuntimeFlowgraph::diagnostics(&large_flow(), &options);

        assert_eq!(problems.len(), 3);
        assert_eq!(
            problems[0],
            "no path from stepone/0 to jointhree/0 in the testflow flowgraph"
        );
    }
}
