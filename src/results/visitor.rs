//! Result tree traversal
//!
//! Reporters implement [`ResultVisitor`] and are driven over an aggregate
//! result in declaration order.

use super::aggregate::{AggregateNode, AggregateResult, LeafReport};

/// Callbacks for a depth-first walk of an aggregate result
pub trait ResultVisitor {
    /// Called once per leaf
    fn visit_test(&mut self, test: &LeafReport);

    fn start_serial(&mut self) {}

    fn end_serial(&mut self) {}

    fn start_parallel(&mut self) {}

    fn end_parallel(&mut self) {}
}

/// Drive `visitor` over `result`
pub fn walk<V: ResultVisitor + ?Sized>(result: &AggregateResult, visitor: &mut V) {
    match &result.node {
        AggregateNode::Leaf(leaf) => visitor.visit_test(leaf),
        AggregateNode::Serial(children) => {
            visitor.start_serial();
            for child in children {
                walk(child, visitor);
            }
            visitor.end_serial();
        }
        AggregateNode::Parallel(children) => {
            visitor.start_parallel();
            for child in children {
                walk(child, visitor);
            }
            visitor.end_parallel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::aggregate::{Counts, Verdict};
    use std::time::Duration;

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl ResultVisitor for Trace {
        fn visit_test(&mut self, test: &LeafReport) {
            self.0.push(test.name.clone());
        }

        fn start_serial(&mut self) {
            self.0.push("[".into());
        }

        fn end_serial(&mut self) {
            self.0.push("]".into());
        }

        fn start_parallel(&mut self) {
            self.0.push("(".into());
        }

        fn end_parallel(&mut self) {
            self.0.push(")".into());
        }
    }

    fn node(node: AggregateNode) -> AggregateResult {
        AggregateResult {
            node,
            counts: Counts::default(),
            elapsed: Duration::ZERO,
            wall_time: None,
            verdict: Verdict::Passed,
        }
    }

    fn leaf(name: &str) -> AggregateResult {
        node(AggregateNode::Leaf(LeafReport {
            name: name.to_string(),
            description: String::new(),
            record: None,
            running_since: None,
        }))
    }

    #[test]
    fn test_walk_order() {
        let tree = node(AggregateNode::Serial(vec![
            leaf("a"),
            node(AggregateNode::Parallel(vec![leaf("b"), leaf("c")])),
            leaf("d"),
        ]));

        let mut trace = Trace::default();
        walk(&tree, &mut trace);
        assert_eq!(trace.0.join(" "), "[ a ( b c ) d ]");
    }
}
