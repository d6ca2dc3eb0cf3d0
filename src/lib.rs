//! Execution-control core for multi-agent mission dispatch.
//!
//! A mission is a dependency graph of tasks, each of which resolves to
//! one call against an external model backend. This crate owns everything
//! between the graph and that call:
//!
//! - [`scheduler`] — topological grouping and bounded-parallel execution
//! - [`admission`] — concurrency/quota/memory gating with FIFO waiters
//! - [`retry`] — per-class adaptive backoff under a global attempt cap
//! - [`degradation`] — tiered feature shedding under sustained failure
//! - [`context`] — bounded, importance-weighted context windowing
//! - [`cache`] — result caching, deduplication, and bounded stores
//!
//! Components are explicit instances composed by [`mission::MissionRunner`]
//! (or by the caller directly); there is no global state.

pub mod admission;
pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod degradation;
pub mod error;
pub mod mission;
pub mod persistence;
pub mod retry;
pub mod scheduler;
pub mod utils;

pub use admission::{
    AdmissionController, AdmissionDecision, DenyReason, Recommendation, ResourceState,
};
pub use backend::{Backend, CallRequest, CallResponse, TelemetrySource};
pub use cache::{cache_key, BoundedStore, CacheStats, Deduplicator, ResultCache};
pub use config::FlightdeckConfig;
pub use context::{ChunkRole, ContextChunk, ContextWindow};
pub use degradation::{DegradationController, DegradationLevel, ExecutionTarget, LevelConfig};
pub use error::{ErrorClass, FlightdeckError, Result};
pub use mission::{MissionReport, MissionRunner, TaskReport};
pub use persistence::{FileSnapshotStore, Snapshot, SnapshotEntry, SnapshotStore};
pub use retry::{ErrorClassifier, KeywordClassifier, RetryEvent, RetryExecutor};
pub use scheduler::{
    build_groups, CyclePolicy, ExecutionGroup, RunOptions, Task, TaskExecutor, TaskGraphScheduler,
    TaskOutcome, TaskStatus,
};
