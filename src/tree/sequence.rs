//! Caller input
//!
//! A nested composition of test cases, serial groups, and parallel groups.

use std::fmt;
use std::sync::Arc;

use crate::models::{TestCase, XFail};

/// Nested test sequence supplied by the caller.
///
/// A `Serial` group runs its children one after another, a `Parallel` group
/// runs them concurrently. Groups nest to any depth.
///
/// ```
/// use systest::{FnTest, Sequence, TestResult};
///
/// async fn passes() -> TestResult {
///     Ok(())
/// }
///
/// let test = |name: &str| Sequence::test(FnTest::new(name, passes));
///
/// let sequence = Sequence::serial([
///     test("1"),
///     Sequence::parallel([test("2"), Sequence::serial([test("3"), test("4")])]),
///     test("5"),
/// ]);
/// assert_eq!(sequence.leaf_count(), 5);
/// ```
#[derive(Clone)]
pub enum Sequence {
    Test(Arc<dyn TestCase>),
    Serial(Vec<Sequence>),
    Parallel(Vec<Sequence>),
}

impl Sequence {
    pub fn test(case: impl TestCase + 'static) -> Self {
        Sequence::Test(Arc::new(case))
    }

    /// A test case that is expected to fail
    pub fn xfail(case: impl TestCase + 'static, reason: impl Into<String>) -> Self {
        Sequence::Test(Arc::new(XFail::new(case, reason)))
    }

    pub fn serial(children: impl IntoIterator<Item = Sequence>) -> Self {
        Sequence::Serial(children.into_iter().collect())
    }

    pub fn parallel(children: impl IntoIterator<Item = Sequence>) -> Self {
        Sequence::Parallel(children.into_iter().collect())
    }

    /// Number of test cases in the sequence
    pub fn leaf_count(&self) -> usize {
        match self {
            Sequence::Test(_) => 1,
            Sequence::Serial(children) | Sequence::Parallel(children) => {
                children.iter().map(Sequence::leaf_count).sum()
            }
        }
    }
}

impl From<Arc<dyn TestCase>> for Sequence {
    fn from(case: Arc<dyn TestCase>) -> Self {
        Sequence::Test(case)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Test(case) => write!(f, "{}", case.name()),
            Sequence::Serial(children) => f.debug_list().entries(children).finish(),
            Sequence::Parallel(children) => {
                let mut tuple = f.debug_tuple("");
                for child in children {
                    tuple.field(child);
                }
                tuple.finish()
            }
        }
    }
}
