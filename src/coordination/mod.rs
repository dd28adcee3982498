//! Sequential batch coordination and run-report bookkeeping

pub mod coordinator;
pub mod report;

pub use coordinator::{BatchSummary, Coordinator, RunConfig, RunConfigBuilder};
pub use report::{RunOutcome, StepStatus};
