// Pre-run Checks
// Verify every node will receive its required inputs exactly once

use crate::flowgraph::{NodeId, RuntimeFlowgraph};
use crate::record::RecordStore;
use crate::tasks::Task;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Task bound to each node of a run
pub type TaskTable = HashMap<NodeId, Arc<dyn Task>>;

/// Output names a node hands downstream
///
/// Declared outputs win. A builtin node with no declared outputs forwards
/// whatever its inputs produce.
struct OutputResolver<'r, 'a> {
    runtime: &'r RuntimeFlowgraph<'a>,
    tasks: &'r TaskTable,
    record: Option<&'r dyn RecordStore>,
    memo: HashMap<NodeId, BTreeSet<String>>,
}

impl<'r, 'a> OutputResolver<'r, 'a> {
    fn new(
        runtime: &'r RuntimeFlowgraph<'a>,
        tasks: &'r TaskTable,
        record: Option<&'r dyn RecordStore>,
    ) -> Self {
        Self {
            runtime,
            tasks,
            record,
            memo: HashMap::new(),
        }
    }

    /// Inputs inside the view plus any base inputs fed from outside it
    fn inputs_of(&self, node: &NodeId) -> Vec<NodeId> {
        let base = self.runtime.base();
        let mut inputs = if self.runtime.contains(node) {
            self.runtime
                .get_node_inputs(&node.step, &node.index, self.record)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        for input in base.get_inputs(node) {
            if base.contains(input) && !self.runtime.contains(input) && !inputs.contains(input) {
                inputs.push(input.clone());
            }
        }
        inputs
    }

    fn outputs_of(&mut self, node: &NodeId) -> BTreeSet<String> {
        if let Some(outputs) = self.memo.get(node) {
            return outputs.clone();
        }
        // Placeholder guards against revisiting a node through a loop
        self.memo.insert(node.clone(), BTreeSet::new());

        let declared = self
            .runtime
            .base()
            .get(node)
            .map(|attributes| attributes.outputs.clone())
            .unwrap_or_default();

        let forwards = declared.is_empty()
            && self
                .tasks
                .get(node)
                .map_or(false, |task| task.is_builtin());

        let outputs = if forwards {
            let mut outputs = BTreeSet::new();
            for input in self.inputs_of(node) {
                outputs.extend(self.outputs_of(&input));
            }
            outputs
        } else {
            declared
        };

        self.memo.insert(node.clone(), outputs.clone());
        outputs
    }
}

/// Problems with how outputs flow into each node of the view
///
/// A node that merges its inputs must not receive the same name from two
/// inputs, and every required input name must be produced upstream.
pub fn check_flowgraph_io(
    runtime: &RuntimeFlowgraph<'_>,
    tasks: &TaskTable,
    record: Option<&dyn RecordStore>,
) -> Vec<String> {
    let mut problems = Vec::new();
    let mut resolver = OutputResolver::new(runtime, tasks, record);

    for node in runtime.get_execution_order(false).iter().flatten() {
        let merges = tasks.get(node).map_or(true, |task| task.merges_inputs());

        let mut received = BTreeSet::new();
        let mut reported = BTreeSet::new();
        for input in resolver.inputs_of(node) {
            for name in resolver.outputs_of(&input) {
                if !received.insert(name.clone()) && merges && reported.insert(name.clone()) {
                    problems.push(format!(
                        "Invalid flow: {} receives {} from multiple input tasks",
                        node, name
                    ));
                }
            }
        }

        if let Some(attributes) = runtime.base().get(node) {
            for required in attributes.required_inputs.difference(&received) {
                problems.push(format!(
                    "Invalid flow: {} will not receive required input {}.",
                    node, required
                ));
            }
        }
    }

    problems
}
