//! Graphviz rendering of a run
//!
//! Each leaf becomes a node between a `begin` and an `end` box. Edges follow
//! serial and parallel precedence and carry the finish offset of their
//! source. The slowest path through the run is drawn bold.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::aggregate::LeafReport;
use super::visitor::ResultVisitor;
use crate::utils::format_timespan;

const BEGIN: usize = 0;

#[derive(Clone, Debug)]
struct GraphNode {
    label: String,
    /// Offset from `begin` at which this node finishes on its slowest path
    finish: Duration,
    /// Predecessor on the slowest path
    critical: Option<usize>,
}

#[derive(Clone, Debug)]
enum Frame {
    Serial,
    Parallel { entry: Vec<usize>, exits: Vec<usize> },
}

/// Builds a precedence graph while walking a result tree
#[derive(Clone, Debug)]
pub struct GraphReport {
    nodes: Vec<GraphNode>,
    edges: Vec<(usize, usize)>,
    frontier: Vec<usize>,
    frames: Vec<Frame>,
}

impl Default for GraphReport {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphReport {
    pub fn new() -> Self {
        Self {
            nodes: vec![GraphNode {
                label: "begin".to_string(),
                finish: Duration::ZERO,
                critical: None,
            }],
            edges: Vec::new(),
            frontier: vec![BEGIN],
            frames: Vec::new(),
        }
    }

    /// Each parallel branch starts from the frontier its group was entered with
    fn begin_child(&mut self) {
        if let Some(Frame::Parallel { entry, .. }) = self.frames.last() {
            self.frontier = entry.clone();
        }
    }

    fn end_child(&mut self) {
        if let Some(Frame::Parallel { exits, .. }) = self.frames.last_mut() {
            for node in &self.frontier {
                if !exits.contains(node) {
                    exits.push(*node);
                }
            }
        }
    }

    /// Add a node reached from every node of the current frontier
    fn add_node(&mut self, label: String, duration: Duration) -> usize {
        let id = self.nodes.len();
        let critical = self
            .frontier
            .iter()
            .copied()
            .max_by_key(|pred| self.nodes[*pred].finish);
        let start = critical
            .map(|pred| self.nodes[pred].finish)
            .unwrap_or(Duration::ZERO);

        self.nodes.push(GraphNode {
            label,
            finish: start + duration,
            critical,
        });
        self.edges
            .extend(self.frontier.iter().map(|pred| (*pred, id)));
        self.frontier = vec![id];
        id
    }

    /// Render the graph in DOT format
    pub fn to_dot(&self, name: &str) -> String {
        let mut graph = self.clone();
        let end = graph.add_node("end".to_string(), Duration::ZERO);

        let mut bold = HashSet::new();
        let mut cursor = end;
        while let Some(pred) = graph.nodes[cursor].critical {
            bold.insert((pred, cursor));
            cursor = pred;
        }

        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(name));
        for (id, node) in graph.nodes.iter().enumerate() {
            let shape = if id == BEGIN || id == end {
                ", shape=box"
            } else {
                ""
            };
            let _ = writeln!(out, "    n{} [label=\"{}\"{}];", id, escape(&node.label), shape);
        }
        for (from, to) in &graph.edges {
            let style = if bold.contains(&(*from, *to)) {
                "bold"
            } else {
                "solid"
            };
            let _ = writeln!(
                out,
                "    n{} -> n{} [label=\"{}\", style=\"{}\"];",
                from,
                to,
                format_timespan(graph.nodes[*from].finish),
                style
            );
        }
        out.push('}');
        out.push('\n');
        out
    }

    /// Total duration along the slowest path
    pub fn critical_duration(&self) -> Duration {
        self.frontier
            .iter()
            .map(|id| self.nodes[*id].finish)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn write_dot(&self, name: &str, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_dot(name))
            .with_context(|| format!("Failed to write graph: {}", path.display()))?;
        info!("Exported graph to {}", path.display());
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ResultVisitor for GraphReport {
    fn visit_test(&mut self, test: &LeafReport) {
        self.begin_child();
        self.add_node(test.name.clone(), test.duration());
        self.end_child();
    }

    fn start_serial(&mut self) {
        self.begin_child();
        self.frames.push(Frame::Serial);
    }

    fn end_serial(&mut self) {
        self.frames.pop();
        self.end_child();
    }

    fn start_parallel(&mut self) {
        self.begin_child();
        self.frames.push(Frame::Parallel {
            entry: self.frontier.clone(),
            exits: Vec::new(),
        });
    }

    fn end_parallel(&mut self) {
        if let Some(Frame::Parallel { exits, .. }) = self.frames.pop() {
            self.frontier = exits;
        }
        self.end_child();
    }
}
