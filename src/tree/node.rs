//! Execution tree
//!
//! The immutable tree built once from a [`Sequence`] before anything runs.
//! Each leaf owns a write-once result slot that only the task executing it
//! writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::warn;

use super::Sequence;
use crate::models::{Expectation, ResultRecord, TestCase, Window};

/// Kind of a group node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Serial,
    Parallel,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Serial => write!(f, "serial"),
            GroupKind::Parallel => write!(f, "parallel"),
        }
    }
}

/// Malformed input sequence
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("{kind} group at {path} has no children")]
    EmptyGroup { kind: GroupKind, path: String },

    #[error("test case at {path} has an empty name")]
    EmptyName { path: String },

    #[error("test case name '{name}' is used more than once")]
    DuplicateName { name: String },
}

/// Execution state of a leaf, as seen by a reader
#[derive(Clone, Copy, Debug)]
pub enum LeafState<'a> {
    NotRun,
    Running { since: DateTime<Utc> },
    Finished(&'a ResultRecord),
}

/// A single test case in the tree
pub struct Leaf {
    case: Arc<dyn TestCase>,
    name: String,
    description: String,
    expectation: Expectation,
    started: OnceLock<DateTime<Utc>>,
    record: OnceLock<ResultRecord>,
}

impl Leaf {
    fn new(case: Arc<dyn TestCase>) -> Self {
        Self {
            name: case.name().to_string(),
            description: trim_description(case.description()),
            expectation: case.expectation(),
            case,
            started: OnceLock::new(),
            record: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    pub fn case(&self) -> &Arc<dyn TestCase> {
        &self.case
    }

    pub fn record(&self) -> Option<&ResultRecord> {
        self.record.get()
    }

    pub fn state(&self) -> LeafState<'_> {
        match (self.record.get(), self.started.get()) {
            (Some(record), _) => LeafState::Finished(record),
            (None, Some(since)) => LeafState::Running { since: *since },
            (None, None) => LeafState::NotRun,
        }
    }

    /// Mark the leaf as started. Returns false if it already was.
    pub(crate) fn mark_started(&self, at: DateTime<Utc>) -> bool {
        self.started.set(at).is_ok()
    }

    /// Store the final record. Returns false if one was already stored.
    pub(crate) fn finalize(&self, record: ResultRecord) -> bool {
        match self.record.set(record) {
            Ok(()) => true,
            Err(rejected) => {
                warn!(
                    "Result for {} already recorded, dropping {}",
                    self.name, rejected.outcome
                );
                false
            }
        }
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("name", &self.name)
            .field("expectation", &self.expectation)
            .field("record", &self.record.get())
            .finish()
    }
}

/// Shape of a node
#[derive(Debug)]
pub enum NodeKind {
    Leaf(Arc<Leaf>),
    Serial(Vec<Arc<Node>>),
    Parallel(Vec<Arc<Node>>),
}

/// Tree node with its measured execution window
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    window: OnceLock<Window>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            window: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Measured span from first start to last completion
    pub fn window(&self) -> Option<Window> {
        self.window.get().copied()
    }

    pub(crate) fn set_window(&self, window: Window) {
        let _ = self.window.set(window);
    }

    pub fn group_kind(&self) -> Option<GroupKind> {
        match self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Serial(_) => Some(GroupKind::Serial),
            NodeKind::Parallel(_) => Some(GroupKind::Parallel),
        }
    }
}

/// Tree built from a sequence, with an index of its leaves in declaration order
#[derive(Debug)]
pub struct TestTree {
    root: Arc<Node>,
    leaves: Vec<Arc<Leaf>>,
    index: HashMap<String, usize>,
}

impl TestTree {
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn leaves(&self) -> &[Arc<Leaf>] {
        &self.leaves
    }

    pub fn leaf(&self, name: &str) -> Option<&Arc<Leaf>> {
        self.index.get(name).map(|&i| &self.leaves[i])
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Whether every leaf has a final record
    pub fn is_complete(&self) -> bool {
        self.leaves.iter().all(|leaf| leaf.record().is_some())
    }
}

/// Build the execution tree for a sequence.
///
/// Every group must have at least one child and every test case name must be
/// non-empty and unique across the whole tree.
pub fn build(sequence: &Sequence) -> Result<TestTree, StructureError> {
    let mut builder = Builder::default();
    let root = builder.node(sequence, "root".to_string())?;

    Ok(TestTree {
        root,
        leaves: builder.leaves,
        index: builder.index,
    })
}

#[derive(Default)]
struct Builder {
    leaves: Vec<Arc<Leaf>>,
    index: HashMap<String, usize>,
}

impl Builder {
    fn node(&mut self, sequence: &Sequence, path: String) -> Result<Arc<Node>, StructureError> {
        let kind = match sequence {
            Sequence::Test(case) => NodeKind::Leaf(self.leaf(case, &path)?),
            Sequence::Serial(children) => {
                NodeKind::Serial(self.children(children, GroupKind::Serial, &path)?)
            }
            Sequence::Parallel(children) => {
                NodeKind::Parallel(self.children(children, GroupKind::Parallel, &path)?)
            }
        };

        Ok(Arc::new(Node::new(kind)))
    }

    fn children(
        &mut self,
        children: &[Sequence],
        kind: GroupKind,
        path: &str,
    ) -> Result<Vec<Arc<Node>>, StructureError> {
        if children.is_empty() {
            return Err(StructureError::EmptyGroup {
                kind,
                path: path.to_string(),
            });
        }

        children
            .iter()
            .enumerate()
            .map(|(i, child)| self.node(child, format!("{path}[{i}]")))
            .collect()
    }

    fn leaf(&mut self, case: &Arc<dyn TestCase>, path: &str) -> Result<Arc<Leaf>, StructureError> {
        let leaf = Leaf::new(case.clone());

        if leaf.name.is_empty() {
            return Err(StructureError::EmptyName {
                path: path.to_string(),
            });
        }
        if self.index.contains_key(&leaf.name) {
            return Err(StructureError::DuplicateName { name: leaf.name });
        }

        let leaf = Arc::new(leaf);
        self.index.insert(leaf.name.clone(), self.leaves.len());
        self.leaves.push(leaf.clone());
        Ok(leaf)
    }
}

/// Normalize a description: strip surrounding blank text and the common
/// indentation of every line after the first.
pub fn trim_description(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let expanded = text.replace('\t', "        ");
    let mut lines = expanded.lines();
    let first = lines.next().unwrap_or_default().trim().to_string();
    let rest: Vec<&str> = lines.collect();

    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut trimmed = vec![first];
    for line in rest {
        let line = line.get(indent..).unwrap_or_else(|| line.trim_start());
        trimmed.push(line.trim_end().to_string());
    }

    trimmed.join("\n")
}
