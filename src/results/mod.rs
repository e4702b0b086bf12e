//! Result aggregation and reporting module
//!
//! Rolls leaf records up into tree-shaped aggregates and renders them as
//! counts, summary trees, JSON, DOT graphs, and CSV.

mod aggregate;
mod graph;
mod report;
mod visitor;

pub use aggregate::{aggregate, AggregateNode, AggregateResult, Counts, LeafReport, Verdict};
pub use graph::GraphReport;
pub use report::{
    export, CountReport, ExportFormat, JsonEntry, JsonReport, JsonRun, JsonTest, RunHeader,
    SummaryReport,
};
pub use visitor::{walk, ResultVisitor};
