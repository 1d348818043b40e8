// Flowgraph DOT Export
// Render a flowgraph as Graphviz text, optionally coloured by node status

use super::{Flowgraph, NodeId};
use crate::error::ServiceResult;
use crate::record::RecordStore;
use crate::status::NodeStatus;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn status_color(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "white",
        NodeStatus::Queued => "lightgray",
        NodeStatus::Running => "lightblue",
        NodeStatus::Success => "palegreen",
        NodeStatus::Error => "lightcoral",
        NodeStatus::Skipped => "khaki",
        NodeStatus::Timeout => "orange",
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Flowgraph {
    fn write_dot_node(&self, out: &mut String, node: &NodeId, indent: &str, statuses: Option<&dyn RecordStore>) {
        let task = self
            .get(node)
            .map(|attributes| attributes.task.identifier())
            .unwrap_or_default();
        let label = format!("{} ({})", node, task);

        let _ = match statuses {
            Some(record) => writeln!(
                out,
                "{}{} [label={}, style=filled, fillcolor={}];",
                indent,
                quote(&node.to_string()),
                quote(&label),
                status_color(record.get_status(node))
            ),
            None => writeln!(out, "{}{} [label={}];", indent, quote(&node.to_string()), quote(&label)),
        };
    }

    /// Graphviz DOT text for this flowgraph
    ///
    /// Steps embedded under a prefix by `graph` are grouped into one cluster
    /// per prefix. With a record, nodes are filled by their current status.
    pub fn to_dot(&self, statuses: Option<&dyn RecordStore>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph {} {{", quote(self.name()));
        out.push_str("  rankdir=TB;\n");
        out.push_str("  node [shape=box];\n");

        let mut clusters: BTreeMap<&str, Vec<&NodeId>> = BTreeMap::new();
        for node in self.get_nodes() {
            match node.step.split_once('.') {
                Some((prefix, _)) => clusters.entry(prefix).or_default().push(node),
                None => self.write_dot_node(&mut out, node, "  ", statuses),
            }
        }

        for (prefix, nodes) in clusters {
            let _ = writeln!(out, "  subgraph {} {{", quote(&format!("cluster_{}", prefix)));
            let _ = writeln!(out, "    label={};", quote(prefix));
            for node in nodes {
                self.write_dot_node(&mut out, node, "    ", statuses);
            }
            out.push_str("  }\n");
        }

        for node in self.get_nodes() {
            for input in self.get_inputs(node) {
                let _ = writeln!(
                    out,
                    "  {} -> {};",
                    quote(&input.to_string()),
                    quote(&node.to_string())
                );
            }
        }

        out.push_str("}\n");
        out
    }

    /// Write the DOT rendering to `path`, creating parent directories
    pub fn write_flowgraph(&self, path: impl AsRef<Path>, statuses: Option<&dyn RecordStore>) -> ServiceResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot(statuses))?;
        Ok(())
    }
}
