//! Tiered graceful degradation: a four-level state machine driven by
//! classified failures and successes, consulted for feature gating,
//! concurrency ceilings, and fallback execution targets.

mod controller;
mod level;

pub use controller::DegradationController;
pub use level::{DegradationLevel, ExecutionTarget, LevelConfig};
