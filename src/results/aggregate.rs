//! Result aggregation
//!
//! Rolls leaf records up through the tree. Every aggregate is derived from
//! the leaves' records on demand and never stored or mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use crate::models::{Outcome, ResultRecord};
use crate::tree::{GroupKind, Leaf, LeafState, Node, NodeKind, TestTree};

/// Overall pass/fail judgment of a subtree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    /// Process exit code for this verdict
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "PASSED"),
            Verdict::Failed => write!(f, "FAILED"),
        }
    }
}

/// Number of leaves per outcome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub xpassed: usize,
    pub xfailed: usize,
    /// Leaves without a final record yet
    pub not_run: usize,
}

impl Counts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::UnexpectedPass => self.xpassed += 1,
            Outcome::ExpectedFailure => self.xfailed += 1,
        }
    }

    /// Leaves with a final outcome
    pub fn finished(&self) -> usize {
        self.passed + self.failed + self.skipped + self.xpassed + self.xfailed
    }

    pub fn total(&self) -> usize {
        self.finished() + self.not_run
    }

    /// `Passed` iff nothing failed and nothing passed unexpectedly
    pub fn verdict(&self) -> Verdict {
        if self.failed == 0 && self.xpassed == 0 {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.xpassed += other.xpassed;
        self.xfailed += other.xfailed;
        self.not_run += other.not_run;
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped, {} xpassed, {} xfailed",
            self.passed, self.failed, self.skipped, self.xpassed, self.xfailed
        )?;
        if self.not_run > 0 {
            write!(f, ", {} not run", self.not_run)?;
        }
        Ok(())
    }
}

/// Snapshot of one leaf for reporting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafReport {
    pub name: String,
    pub description: String,
    pub record: Option<ResultRecord>,
    pub running_since: Option<DateTime<Utc>>,
}

impl LeafReport {
    fn from_leaf(leaf: &Leaf) -> Self {
        let (record, running_since) = match leaf.state() {
            LeafState::Finished(record) => (Some(record.clone()), None),
            LeafState::Running { since } => (None, Some(since)),
            LeafState::NotRun => (None, None),
        };

        Self {
            name: leaf.name().to_string(),
            description: leaf.description().to_string(),
            record,
            running_since,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.record.as_ref().map(|r| r.outcome)
    }

    pub fn duration(&self) -> Duration {
        self.record.as_ref().map(|r| r.duration).unwrap_or(Duration::ZERO)
    }

    pub fn message(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.message.as_deref())
    }

    /// Outcome label, or the execution state when no outcome exists yet
    pub fn status_label(&self) -> String {
        match (&self.record, self.running_since) {
            (Some(record), _) => record.outcome.to_string(),
            (None, Some(_)) => "RUNNING".to_string(),
            (None, None) => "NOT RUN".to_string(),
        }
    }
}

/// Shape of an aggregate node, mirroring the execution tree
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateNode {
    Leaf(LeafReport),
    Serial(Vec<AggregateResult>),
    Parallel(Vec<AggregateResult>),
}

/// Aggregated result of a subtree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregateResult {
    pub node: AggregateNode,
    pub counts: Counts,
    /// Sum of children for serial groups, max for parallel groups
    pub elapsed: Duration,
    /// Measured span from first start to last completion
    pub wall_time: Option<Duration>,
    pub verdict: Verdict,
}

impl AggregateResult {
    pub fn group_kind(&self) -> Option<GroupKind> {
        match self.node {
            AggregateNode::Leaf(_) => None,
            AggregateNode::Serial(_) => Some(GroupKind::Serial),
            AggregateNode::Parallel(_) => Some(GroupKind::Parallel),
        }
    }

    pub fn children(&self) -> &[AggregateResult] {
        match &self.node {
            AggregateNode::Leaf(_) => &[],
            AggregateNode::Serial(children) | AggregateNode::Parallel(children) => children,
        }
    }

    /// All leaves of the subtree in declaration order
    pub fn leaves(&self) -> Vec<&LeafReport> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafReport>) {
        match &self.node {
            AggregateNode::Leaf(leaf) => out.push(leaf),
            AggregateNode::Serial(children) | AggregateNode::Parallel(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    pub fn leaf(&self, name: &str) -> Option<&LeafReport> {
        self.leaves().into_iter().find(|l| l.name == name)
    }
}

/// Aggregate the current state of a tree.
///
/// Safe to call while the tree is still executing; unfinished leaves are
/// counted as `not_run`.
pub fn aggregate(tree: &TestTree) -> AggregateResult {
    aggregate_node(tree.root())
}

fn aggregate_node(node: &Node) -> AggregateResult {
    match node.kind() {
        NodeKind::Leaf(leaf) => {
            let report = LeafReport::from_leaf(leaf);
            let mut counts = Counts::default();
            match report.outcome() {
                Some(outcome) => counts.record(outcome),
                None => counts.not_run += 1,
            }

            AggregateResult {
                elapsed: report.duration(),
                wall_time: report.record.as_ref().map(|r| r.window.elapsed()),
                verdict: counts.verdict(),
                counts,
                node: AggregateNode::Leaf(report),
            }
        }
        NodeKind::Serial(children) => {
            let children: Vec<_> = children.iter().map(|c| aggregate_node(c)).collect();
            let elapsed = children.iter().map(|c| c.elapsed).sum();
            group(AggregateNode::Serial(children), elapsed, node)
        }
        NodeKind::Parallel(children) => {
            let children: Vec<_> = children.iter().map(|c| aggregate_node(c)).collect();
            let elapsed = children
                .iter()
                .map(|c| c.elapsed)
                .max()
                .unwrap_or(Duration::ZERO);
            group(AggregateNode::Parallel(children), elapsed, node)
        }
    }
}

fn group(aggregate: AggregateNode, elapsed: Duration, node: &Node) -> AggregateResult {
    let mut counts = Counts::default();
    if let AggregateNode::Serial(children) | AggregateNode::Parallel(children) = &aggregate {
        for child in children {
            counts += child.counts;
        }
    }

    AggregateResult {
        node: aggregate,
        verdict: counts.verdict(),
        counts,
        elapsed,
        wall_time: node.window().map(|w| w.elapsed()),
    }
}
