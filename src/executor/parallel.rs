//! Tree execution
//!
//! Walks the execution tree: serial children run in order on the current
//! task, parallel children each get their own spawned task and are joined
//! before the group completes.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, error};

use super::runner::{LeafRunner, RunOptions};
use crate::models::Window;
use crate::tree::{Node, NodeKind, TestTree};
use crate::utils::Clock;

/// Executes a test tree, writing each leaf's result record as a side effect.
///
/// Must be driven from within a tokio runtime.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<LeafRunner>,
}

impl Executor {
    pub fn new(options: RunOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            runner: Arc::new(LeafRunner::new(options, clock)),
        }
    }

    pub fn options(&self) -> &RunOptions {
        self.runner.options()
    }

    /// Execute every leaf of the tree
    pub async fn execute(&self, tree: &TestTree) {
        debug!("Executing {} test cases", tree.len());
        self.execute_node(tree.root().clone()).await
    }

    /// Execute a subtree. Serial children never stop early on failure.
    pub fn execute_node(&self, node: Arc<Node>) -> BoxFuture<'static, ()> {
        let this = self.clone();

        async move {
            let start = this.runner.clock().now();

            match node.kind() {
                NodeKind::Leaf(leaf) => this.runner.run(leaf).await,
                NodeKind::Serial(children) => this.run_serial(children).await,
                NodeKind::Parallel(children) if this.options().force_serial => {
                    debug!("Running {} parallel children serially", children.len());
                    this.run_serial(children).await
                }
                NodeKind::Parallel(children) => this.fork_join(children).await,
            }

            let end = this.runner.clock().now();
            node.set_window(group_window(&node).unwrap_or_else(|| Window::new(start, end)));
        }
        .boxed()
    }

    async fn run_serial(&self, children: &[Arc<Node>]) {
        for child in children {
            self.execute_node(child.clone()).await;
        }
    }

    /// Spawn one worker per child and wait for all of them
    async fn fork_join(&self, children: &[Arc<Node>]) {
        debug!("Forking {} parallel workers", children.len());

        let handles: Vec<_> = children
            .iter()
            .map(|child| tokio::spawn(self.execute_node(child.clone())))
            .collect();

        for (i, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!("Parallel worker {} ended abnormally: {}", i, e);
            }
        }

        debug!("Joined {} parallel workers", children.len());
    }
}

/// Span of a group from its first child start to its last child completion
fn group_window(node: &Node) -> Option<Window> {
    let children = match node.kind() {
        NodeKind::Leaf(leaf) => return leaf.record().map(|r| r.window),
        NodeKind::Serial(children) | NodeKind::Parallel(children) => children,
    };

    let windows: Vec<Window> = children.iter().filter_map(|c| c.window()).collect();
    let start = windows.iter().map(|w| w.start).min()?;
    let end = windows.iter().map(|w| w.end).max()?;
    Some(Window::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, TestCase, TestError, TestResult};
    use crate::tree::{build, Sequence};
    use crate::utils::SystemClock;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Work {
        name: String,
        work: Duration,
        fail: bool,
        panic: bool,
        runs: Arc<AtomicUsize>,
    }

    impl Work {
        fn new(name: &str, work_ms: u64) -> Self {
            Self {
                name: name.to_string(),
                work: Duration::from_millis(work_ms),
                fail: false,
                panic: false,
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn panicking(mut self) -> Self {
            self.panic = true;
            self
        }
    }

    #[async_trait]
    impl TestCase for Work {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) -> TestResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            if self.panic {
                panic!("worker exploded");
            }
            if self.fail {
                return Err(TestError::failed(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    fn executor(options: RunOptions) -> Executor {
        Executor::new(options, Arc::new(SystemClock::new()))
    }

    fn outcomes(tree: &TestTree) -> HashMap<String, Outcome> {
        tree.leaves()
            .iter()
            .map(|l| (l.name().to_string(), l.record().unwrap().outcome))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serial_order_and_no_abort() {
        let sequence = Sequence::serial([
            Sequence::test(Work::new("a", 20)),
            Sequence::test(Work::new("b", 20).failing()),
            Sequence::test(Work::new("c", 20)),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new()).execute(&tree).await;

        let records: Vec<_> = tree.leaves().iter().map(|l| l.record().unwrap()).collect();
        for pair in records.windows(2) {
            assert!(pair[1].window.start >= pair[0].window.end);
        }

        let outcomes = outcomes(&tree);
        assert_eq!(outcomes["a"], Outcome::Passed);
        assert_eq!(outcomes["b"], Outcome::Failed);
        assert_eq!(outcomes["c"], Outcome::Passed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_overlaps() {
        let sequence = Sequence::parallel([
            Sequence::test(Work::new("a", 200)),
            Sequence::test(Work::new("b", 200)),
            Sequence::test(Work::new("c", 200)),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new()).execute(&tree).await;

        let wall = tree.root().window().unwrap().elapsed();
        let longest = tree
            .leaves()
            .iter()
            .map(|l| l.record().unwrap().duration)
            .max()
            .unwrap();

        assert!(wall >= longest);
        assert!(wall < Duration::from_millis(500), "wall time {wall:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_failure_isolation() {
        let sequence = Sequence::parallel([
            Sequence::test(Work::new("ok1", 50)),
            Sequence::test(Work::new("bad", 10).failing()),
            Sequence::test(Work::new("boom", 10).panicking()),
            Sequence::test(Work::new("ok2", 50)),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new()).execute(&tree).await;

        let outcomes = outcomes(&tree);
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes["ok1"], Outcome::Passed);
        assert_eq!(outcomes["ok2"], Outcome::Passed);
        assert_eq!(outcomes["bad"], Outcome::Failed);
        assert_eq!(outcomes["boom"], Outcome::Failed);

        let boom = tree.leaf("boom").unwrap().record().unwrap();
        assert_eq!(boom.message.as_deref(), Some("panicked: worker exploded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nested_groups_run_everything_once() {
        let leaves: Vec<Work> = (1..=7).map(|i| Work::new(&i.to_string(), 5)).collect();
        let counters: Vec<_> = leaves.iter().map(|w| w.runs.clone()).collect();
        let mut leaves = leaves.into_iter().map(Sequence::test);
        let mut next = || leaves.next().unwrap();

        let sequence = Sequence::serial([
            next(),
            Sequence::parallel([
                Sequence::serial([next(), Sequence::parallel([next(), next()])]),
                Sequence::parallel([next(), next()]),
            ]),
            next(),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new()).execute(&tree).await;

        assert!(tree.is_complete());
        for runs in counters {
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_force_serial() {
        let sequence = Sequence::parallel([
            Sequence::test(Work::new("a", 50)),
            Sequence::test(Work::new("b", 50)),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new().force_serial(true))
            .execute(&tree)
            .await;

        let a = tree.leaf("a").unwrap().record().unwrap();
        let b = tree.leaf("b").unwrap().record().unwrap();
        assert!(b.window.start >= a.window.end);
        assert!(tree.root().window().unwrap().elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_group_window_spans_children() {
        let sequence = Sequence::serial([
            Sequence::test(Work::new("first", 10)),
            Sequence::test(Work::new("second", 10)),
        ]);
        let tree = build(&sequence).unwrap();
        executor(RunOptions::new()).execute(&tree).await;

        let window = tree.root().window().unwrap();
        let first = tree.leaf("first").unwrap().record().unwrap();
        let second = tree.leaf("second").unwrap().record().unwrap();
        assert_eq!(window.start, first.window.start);
        assert_eq!(window.end, second.window.end);
    }
}
