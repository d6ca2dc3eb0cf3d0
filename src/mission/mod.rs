//! End-to-end mission orchestration over the execution-control core.
//!
//! Composes the dependency scheduler with admission control, adaptive
//! retry, degradation tracking, result caching, and in-flight
//! deduplication around a caller-supplied backend.

mod report;
mod runner;

pub use report::{MissionReport, TaskReport};
pub use runner::MissionRunner;
