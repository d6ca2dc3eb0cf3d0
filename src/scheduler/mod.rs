//! Dependency-graph planning and bounded-parallel execution.

mod groups;
mod runner;
mod task;

pub use groups::{build_groups, CyclePolicy, ExecutionGroup};
pub use runner::{ProgressFn, RunOptions, TaskExecutor, TaskGraphScheduler};
pub use task::{Task, TaskOutcome, TaskStatus};
