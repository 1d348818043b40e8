// Flowgraph Module
// Static pipeline DAG, its per-run view, definition files and DOT export

pub mod definition;
pub mod dot;
pub mod graph;
pub mod node;
pub mod runtime;

// Re-export key types
pub use definition::{EdgeDefinition, FlowDefinition, NodeDefinition};
pub use graph::{Flowgraph, FlowgraphError, FlowgraphErrorKind, FlowgraphResult};
pub use node::{FlowNode, NodeId, TaskRef};
pub use runtime::{NodeSelector, RunOptions, RuntimeFlowgraph};

/// Three fan-out/join stages of three branches each
#[cfg(test)]
pub(crate) fn large_flow() -> Flowgraph {
    let mut flow = Flowgraph::new("testflow");

    let stages = [
        ("stepone", "joinone"),
        ("steptwo", "jointwo"),
        ("stepthree", "jointhree"),
    ];

    let mut prev_join: Option<&str> = None;
    for (step, join) in stages {
        flow.node(join, "builtin/join", 0).unwrap();
        for n in 0..3 {
            flow.node(step, "builtin/nop", n).unwrap();
            if let Some(prev_join) = prev_join {
                flow.edge(prev_join, step, 0, n).unwrap();
            }
            flow.edge(step, join, n, 0).unwrap();
        }
        prev_join = Some(join);
    }

    flow
}
